//! Common test utilities for integration tests
//!
//! This module provides the stub searchers and merger shared by the
//! integration suite. Integration tests cannot access the main crate's
//! test_utils module, so the stubs are kept here in parallel.

use async_trait::async_trait;
use searchex::{
    BatchSink, CompletionLatch, CoprocessorKey, ExecutorConfig, Payload, PayloadMerger, RowBatch, SearchExecutor,
    SearchexError, ShardId, ShardSearcher, SubTask,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Test constants for consistent configuration across integration tests
pub mod test_constants {
    /// Queue capacity large enough that tests never rely on backpressure
    #[allow(dead_code)]
    pub const ROOMY_QUEUE_CAPACITY: usize = 64;
    /// Polling interval for tests that wait on a counter
    pub const POLL_INTERVAL_MS: u64 = 2;
}

/// Create an executor with a small, fully specified configuration
#[allow(dead_code)]
pub fn create_test_executor(worker_threads: usize, default_cap: usize) -> SearchExecutor {
    let config = ExecutorConfig::new()
        .worker_threads(worker_threads)
        .default_max_threads_per_task(default_cap)
        .queue_capacity(test_constants::ROOMY_QUEUE_CAPACITY);
    SearchExecutor::new(config).expect("test executor config must validate")
}

/// Generate fresh shard identifiers
#[allow(dead_code)]
pub fn shard_ids(count: usize) -> Vec<ShardId> {
    (0..count).map(|_| ShardId::new()).collect()
}

/// Searcher that pushes a fixed number of rows per shard and records
/// how many sub-tasks ran, and how many ran at the same time
#[allow(dead_code)]
pub struct CountingSearcher {
    rows_per_shard: usize,
    searches: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
}

#[allow(dead_code)]
impl CountingSearcher {
    pub fn new(rows_per_shard: usize) -> Self {
        Self {
            rows_per_shard,
            searches: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
        }
    }

    /// Total sub-tasks executed
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Highest number of sub-tasks observed running simultaneously
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShardSearcher for CountingSearcher {
    async fn search(&self, sub_task: &SubTask, sink: &BatchSink) -> Result<(), SearchexError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        // Hold the slot briefly so overlapping sub-tasks actually overlap.
        tokio::time::sleep(Duration::from_millis(test_constants::POLL_INTERVAL_MS)).await;

        for row in 0..self.rows_per_shard {
            let batch = RowBatch::new(sub_task.shard_id, vec![format!("row-{}", row)]);
            sink.push(batch).await?;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Searcher that fails on one marked shard and pushes rows on the rest
#[allow(dead_code)]
pub struct FailingSearcher {
    failing_shard: ShardId,
    rows_per_healthy_shard: usize,
}

#[allow(dead_code)]
impl FailingSearcher {
    pub fn failing_on(failing_shard: ShardId, rows_per_healthy_shard: usize) -> Self {
        Self {
            failing_shard,
            rows_per_healthy_shard,
        }
    }
}

#[async_trait]
impl ShardSearcher for FailingSearcher {
    async fn search(&self, sub_task: &SubTask, sink: &BatchSink) -> Result<(), SearchexError> {
        if sub_task.shard_id == self.failing_shard {
            return Err(SearchexError::shard_search(sub_task.shard_id, "synthetic shard failure"));
        }

        for row in 0..self.rows_per_healthy_shard {
            let batch = RowBatch::new(sub_task.shard_id, vec![format!("row-{}", row)]);
            sink.push(batch).await?;
        }
        Ok(())
    }
}

/// Searcher that blocks inside each sub-task until released
///
/// Lets tests pin sub-tasks in flight: start some, observe counters or call
/// terminate, then release the gate and let them finish. Each released
/// sub-task pushes exactly one row.
#[allow(dead_code)]
pub struct GatedSearcher {
    started: AtomicUsize,
    gate: CompletionLatch,
}

#[allow(dead_code)]
impl GatedSearcher {
    pub fn new() -> Self {
        Self {
            started: AtomicUsize::new(0),
            gate: CompletionLatch::new(),
        }
    }

    /// Number of sub-tasks that have entered the searcher
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` sub-tasks are blocked inside the gate
    pub async fn wait_for_started(&self, count: usize) {
        while self.started() < count {
            tokio::time::sleep(Duration::from_millis(test_constants::POLL_INTERVAL_MS)).await;
        }
    }

    /// Open the gate for every current and future sub-task
    pub fn release_all(&self) {
        self.gate.fire();
    }
}

impl Default for GatedSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardSearcher for GatedSearcher {
    async fn search(&self, sub_task: &SubTask, sink: &BatchSink) -> Result<(), SearchexError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.wait().await;
        sink.push(RowBatch::new(sub_task.shard_id, vec!["gated-row".to_string()]))
            .await
    }
}

/// Merger that treats payloads as little-endian u64 counters and adds them
#[allow(dead_code)]
pub struct SummingMerger;

impl PayloadMerger for SummingMerger {
    fn merge(&self, key: CoprocessorKey, existing: &mut Payload, incoming: Payload) -> Result<(), SearchexError> {
        let current = payload_value(existing)
            .ok_or_else(|| SearchexError::merge(key, "existing payload is not a u64 counter"))?;
        let added =
            payload_value(&incoming).ok_or_else(|| SearchexError::merge(key, "incoming payload is not a u64 counter"))?;
        *existing = u64_payload(current + added);
        Ok(())
    }
}

/// Build a u64 counter payload
#[allow(dead_code)]
pub fn u64_payload(value: u64) -> Payload {
    Payload(value.to_le_bytes().to_vec())
}

/// Read a u64 counter payload, if well formed
#[allow(dead_code)]
pub fn payload_value(payload: &Payload) -> Option<u64> {
    let bytes: [u8; 8] = payload.0.as_slice().try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
