//! Distributed result collection and merging
//!
//! A [`ResultCollector`] is the per-search meeting point for partial results
//! arriving asynchronously from cluster nodes. Each response carries a
//! payload map keyed by coprocessor, an optional error list, and whether that
//! node is now done. Payloads merge through a caller-supplied
//! [`PayloadMerger`] (merge semantics belong to coprocessors, the collector
//! never invents them), errors accumulate per node, and when the last
//! expected node retires the completion latch fires.
//!
//! Completion is absorbing: once COMPLETE, nothing moves it back. Late
//! responses are still merged so callers reading the terminal snapshot see as
//! much data as possible, but they change no externally observable signal. A
//! merge failure is fatal to the search only: it is recorded as an error and
//! forces completion so callers never hang on an aggregation defect.

use crate::completion::CompletionLatch;
use crate::error::SearchexError;
use crate::identifiers::{NodeId, SearchId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Identifies one coprocessor's slot in the merged result store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct CoprocessorKey(pub u32);

impl Display for CoprocessorKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One coprocessor's partial result, opaque to the collector
///
/// The bytes mean whatever the owning coprocessor says they mean; the
/// collector only stores and hands them to the merger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(pub Vec<u8>);

impl Payload {
    /// Wrap raw payload bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Observable completion state of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionState {
    /// Nodes are still outstanding
    Pending,
    /// Terminal; never reverts
    Complete,
}

/// One node's partial result delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Node this result came from
    pub node: NodeId,
    /// Per-coprocessor payloads to merge
    pub payloads: HashMap<CoprocessorKey, Payload>,
    /// Errors the node accumulated while searching
    pub errors: Vec<String>,
    /// Whether this node has now delivered everything it ever will
    pub complete: bool,
}

impl NodeResult {
    /// Create an empty result for a node
    pub fn new(node: NodeId, complete: bool) -> Self {
        Self {
            node,
            payloads: HashMap::new(),
            errors: Vec::new(),
            complete,
        }
    }

    /// Attach one coprocessor payload
    pub fn with_payload(mut self, key: CoprocessorKey, payload: Payload) -> Self {
        self.payloads.insert(key, payload);
        self
    }

    /// Attach one node-side error message
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }
}

/// Per-node callback outcome, consumed by pattern matching
///
/// `Terminated` is deliberately distinct from `Failure`: a node that was told
/// to stop is not a fault and records no error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeResponse {
    /// The node delivered a partial (or final) result
    Success(NodeResult),
    /// The node failed outright; no payloads will come from it
    Failure {
        /// Node that failed
        node: NodeId,
        /// Why it failed
        error: String,
    },
    /// The node was terminated before or during its work
    Terminated {
        /// Node that was terminated
        node: NodeId,
    },
}

/// Domain-specific payload merging, owned by coprocessors
///
/// `merge` folds `incoming` into `existing` in place. Implementations must
/// aggregate rather than overwrite; losing either side's data breaks the
/// partial-results guarantee.
pub trait PayloadMerger: Send + Sync {
    /// Merge an incoming payload into the existing one for `key`
    fn merge(&self, key: CoprocessorKey, existing: &mut Payload, incoming: Payload) -> Result<(), SearchexError>;
}

/// Per-search merge point for distributed partial results
///
/// Constructed with the expected node set; transitions to COMPLETE when every
/// node has retired (final result, failure, or termination) or when
/// `terminate()` is called. With an empty node set the collector stays
/// pending until terminated, since no node will ever drive it.
pub struct ResultCollector {
    search_id: SearchId,
    merger: Arc<dyn PayloadMerger>,
    payloads: Mutex<HashMap<CoprocessorKey, Payload>>,
    errors: Mutex<BTreeMap<NodeId, BTreeSet<String>>>,
    outstanding: Mutex<HashSet<NodeId>>,
    expected_nodes: usize,
    latch: CompletionLatch,
}

impl ResultCollector {
    /// Create a collector expecting results from the given nodes
    pub fn new(search_id: SearchId, expected_nodes: Vec<NodeId>, merger: Arc<dyn PayloadMerger>) -> Self {
        let outstanding: HashSet<NodeId> = expected_nodes.into_iter().collect();
        debug!(
            "Created result collector for search {} expecting {} nodes",
            search_id,
            outstanding.len()
        );

        Self {
            search_id,
            merger,
            payloads: Mutex::new(HashMap::new()),
            errors: Mutex::new(BTreeMap::new()),
            expected_nodes: outstanding.len(),
            outstanding: Mutex::new(outstanding),
            latch: CompletionLatch::new(),
        }
    }

    /// Identifier of the search this collector belongs to
    pub fn search_id(&self) -> SearchId {
        self.search_id
    }

    /// Number of nodes expected at construction
    pub fn expected_nodes(&self) -> usize {
        self.expected_nodes
    }

    /// Number of nodes that have not yet retired
    pub fn outstanding_nodes(&self) -> usize {
        self.outstanding.lock().len()
    }

    /// Current completion state
    pub fn completion_state(&self) -> CompletionState {
        if self.latch.is_complete() {
            CompletionState::Complete
        } else {
            CompletionState::Pending
        }
    }

    /// Check whether the search has completed
    pub fn is_complete(&self) -> bool {
        self.latch.is_complete()
    }

    /// Deliver one node's response
    ///
    /// Invoked asynchronously by the cluster dispatch layer, any number of
    /// times per node, from any thread. Payloads merge even after completion
    /// (the terminal snapshot stays as rich as possible), but nothing can
    /// reopen a completed collector.
    pub fn on_node_response(&self, response: NodeResponse) {
        match response {
            NodeResponse::Success(result) => self.on_success(result),
            NodeResponse::Failure { node, error } => {
                warn!("Search {} node {} failed: {}", self.search_id, node, error);
                self.add_error(node, error);
                self.retire(node);
            }
            NodeResponse::Terminated { node } => {
                // Terminated is orderly shutdown, not a failure: no error.
                debug!("Search {} node {} terminated", self.search_id, node);
                self.retire(node);
            }
        }
    }

    /// Force completion without waiting for remaining nodes
    ///
    /// Safe to call any number of times; later node responses are still
    /// merged but the completion signal never moves again.
    pub fn terminate(&self) {
        if self.latch.fire() {
            debug!("Search {} collector terminated", self.search_id);
        }
    }

    /// Release the collector; equivalent to [`terminate`](Self::terminate)
    ///
    /// Exists so owners can unconditionally destroy a collector in cleanup
    /// paths without tracking whether the search already finished.
    pub fn destroy(&self) {
        self.terminate();
    }

    /// Wait until the search completes
    pub async fn await_completion(&self) {
        self.latch.wait().await;
    }

    /// Bounded wait; returns whether completion happened within the bound
    ///
    /// Timing out changes nothing: the caller may poll again or keep treating
    /// the search as in progress.
    pub async fn await_completion_timeout(&self, duration: Duration) -> bool {
        self.latch.wait_timeout(duration).await
    }

    /// Snapshot of the merged payloads per coprocessor
    pub fn merged_payloads(&self) -> HashMap<CoprocessorKey, Payload> {
        self.payloads.lock().clone()
    }

    /// The merged payload for one coprocessor, if any node delivered one
    pub fn payload(&self, key: CoprocessorKey) -> Option<Payload> {
        self.payloads.lock().get(&key).cloned()
    }

    /// Accumulated errors, flattened and sorted for display
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .iter()
            .flat_map(|(node, messages)| {
                messages
                    .iter()
                    .map(move |message| format!("node={}: {}", node, message))
            })
            .collect()
    }

    /// Accumulated errors attributed to the node that produced them
    pub fn errors_by_node(&self) -> BTreeMap<NodeId, BTreeSet<String>> {
        self.errors.lock().clone()
    }

    fn on_success(&self, result: NodeResult) {
        let node = result.node;
        if self.is_complete() {
            debug!(
                "Search {} received late response from node {} after completion",
                self.search_id, node
            );
        }

        if let Err(e) = self.merge_payloads(result.payloads) {
            error!(
                "Search {} failed merging payloads from node {}: {}",
                self.search_id, node, e
            );
            self.add_error(node, e.to_string());
            // An aggregation defect must not hang the caller: complete now
            // with whatever merged before the failure.
            if self.latch.fire() {
                debug!("Search {} collector completed after merge failure", self.search_id);
            }
            return;
        }

        for message in result.errors {
            self.add_error(node, message);
        }

        if result.complete {
            self.retire(node);
        }
    }

    fn merge_payloads(&self, incoming: HashMap<CoprocessorKey, Payload>) -> Result<(), SearchexError> {
        let mut payloads = self.payloads.lock();
        for (key, payload) in incoming {
            match payloads.entry(key) {
                Entry::Occupied(mut existing) => self.merger.merge(key, existing.get_mut(), payload)?,
                Entry::Vacant(slot) => {
                    slot.insert(payload);
                }
            }
        }
        Ok(())
    }

    fn add_error(&self, node: NodeId, message: String) {
        self.errors.lock().entry(node).or_default().insert(message);
    }

    /// Mark a node as terminally reported; the last retirement completes
    fn retire(&self, node: NodeId) {
        let (removed, all_done) = {
            let mut outstanding = self.outstanding.lock();
            let removed = outstanding.remove(&node);
            (removed, removed && outstanding.is_empty())
        };

        if !removed {
            debug!(
                "Search {} ignoring retirement of unknown or already retired node {}",
                self.search_id, node
            );
            return;
        }

        if all_done && self.latch.fire() {
            debug!("Search {} collector complete: all nodes reported", self.search_id);
        }
    }
}

impl fmt::Debug for ResultCollector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCollector")
            .field("search_id", &self.search_id)
            .field("state", &self.completion_state())
            .field("expected_nodes", &self.expected_nodes)
            .field("outstanding_nodes", &self.outstanding_nodes())
            .finish()
    }
}
