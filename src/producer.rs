//! Per-search task production and completion bookkeeping
//!
//! A [`TaskProducer`] owns everything one search needs to run its shard
//! sub-tasks: the backlog of shards still to search, the in-flight and
//! remaining counters, the per-search concurrency cap, and the completion
//! barrier. The scheduler pulls sub-tasks out of producers; each dispatched
//! sub-task runs a [`ShardSearcher`] against one shard and feeds row batches
//! into the search's streaming queue.
//!
//! Completion is driven by counting down `tasks_remaining`: the sub-task that
//! observes the zero crossing pushes the single completion sentinel onto the
//! queue, fires the one-shot latch, and detaches the producer from the
//! scheduler. Shard failures are absorbed here: they are logged, recorded in
//! the producer's error list, and still count the task as finished, so one
//! bad shard never stalls a search.

use crate::completion::CompletionLatch;
use crate::error::SearchexError;
use crate::identifiers::{SearchId, ShardId};
use crate::queue::{BatchSink, StreamItem, StreamingQueue};
use crate::scheduler::SchedulerCore;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// The unit of work searching exactly one shard for one search
///
/// Sequence numbers are assigned lazily at dispatch time, so they record pull
/// order rather than backlog order. They exist for progress reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    /// Shard this sub-task searches
    pub shard_id: ShardId,
    /// Dispatch-order sequence number within the search, starting at 1
    pub sequence: usize,
    /// Total number of sub-tasks in the search
    pub total: usize,
}

/// Progress snapshot of one producer, suitable for UI polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerProgress {
    /// Sub-tasks dispatched so far
    pub requested: usize,
    /// Sub-tasks not yet finished (dispatched or still queued)
    pub remaining: usize,
    /// Total sub-tasks in the search
    pub total: usize,
}

impl Display for ProducerProgress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested={}, remaining={}, total={}",
            self.requested, self.remaining, self.total
        )
    }
}

/// Per-shard search execution primitive
///
/// Implementations run one sub-task's query against one shard and report
/// matches through the supplied sink. Each shard may fail independently; an
/// error return is absorbed by the producer and never aborts the search.
#[async_trait]
pub trait ShardSearcher: Send + Sync {
    /// Search one shard, pushing any matches through the sink
    async fn search(&self, sub_task: &SubTask, sink: &BatchSink) -> Result<(), SearchexError>;
}

/// Outcome of asking a producer for its next runnable sub-task
#[derive(Debug)]
pub(crate) enum TaskPull {
    /// A sub-task ready to execute
    Dispatch(SubTask),
    /// The producer is at its per-search concurrency cap; try again later
    AtCapacity,
    /// The producer has nothing left to offer and should be detached
    Exhausted,
}

/// Owner of one search's shard backlog and completion bookkeeping
///
/// Constructed with the full shard list and registered with the scheduler;
/// after that, all mutation happens from scheduler workers pulling sub-tasks
/// and from the completion logic those sub-tasks run as they finish.
pub struct TaskProducer {
    search_id: SearchId,
    created_at: Instant,
    backlog: Mutex<VecDeque<ShardId>>,
    searcher: Arc<dyn ShardSearcher>,
    sink: BatchSink,
    item_sender: mpsc::Sender<StreamItem>,
    max_threads_per_task: usize,
    tasks_total: usize,
    tasks_requested: AtomicUsize,
    tasks_remaining: AtomicUsize,
    threads_in_use: AtomicUsize,
    terminated: AtomicBool,
    completed: AtomicBool,
    attached: AtomicBool,
    latch: CompletionLatch,
    errors: Mutex<Vec<SearchexError>>,
    scheduler: Mutex<Option<Weak<SchedulerCore>>>,
}

impl TaskProducer {
    /// Create a producer for one search over the given shards
    ///
    /// The producer does nothing until registered with a scheduler; a search
    /// with zero shards completes at registration time.
    pub fn new(
        search_id: SearchId,
        shards: Vec<ShardId>,
        searcher: Arc<dyn ShardSearcher>,
        queue: &StreamingQueue,
        max_threads_per_task: usize,
    ) -> Self {
        let tasks_total = shards.len();
        debug!("Queued {} shard search sub-tasks for search {}", tasks_total, search_id);

        Self {
            search_id,
            created_at: Instant::now(),
            backlog: Mutex::new(shards.into()),
            searcher,
            sink: queue.sink(),
            item_sender: queue.item_sender(),
            max_threads_per_task,
            tasks_total,
            tasks_requested: AtomicUsize::new(0),
            tasks_remaining: AtomicUsize::new(tasks_total),
            threads_in_use: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            latch: CompletionLatch::new(),
            errors: Mutex::new(Vec::new()),
            scheduler: Mutex::new(None),
        }
    }

    /// Identifier of the search this producer belongs to
    pub fn search_id(&self) -> SearchId {
        self.search_id
    }

    /// Total number of sub-tasks in this search
    pub fn total_tasks(&self) -> usize {
        self.tasks_total
    }

    /// Number of sub-tasks currently executing
    pub fn threads_in_use(&self) -> usize {
        self.threads_in_use.load(Ordering::SeqCst)
    }

    /// Check whether this search has finished all its sub-tasks
    pub fn is_complete(&self) -> bool {
        self.latch.is_complete()
    }

    /// Check whether this producer was cancelled
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Progress counters for UI polling
    pub fn progress(&self) -> ProducerProgress {
        ProducerProgress {
            requested: self.tasks_requested.load(Ordering::SeqCst),
            remaining: self.tasks_remaining.load(Ordering::SeqCst),
            total: self.tasks_total,
        }
    }

    /// Errors absorbed from failed sub-tasks, rendered for display
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.to_string()).collect()
    }

    /// Wait until every sub-task has finished and the sentinel is emitted
    pub async fn await_completion(&self) {
        self.latch.wait().await;
    }

    /// Bounded wait for completion; returns whether it happened in time
    pub async fn await_completion_timeout(&self, duration: Duration) -> bool {
        self.latch.wait_timeout(duration).await
    }

    /// Cancel this search
    ///
    /// Queued sub-tasks are discarded and no new ones are offered to the
    /// scheduler; sub-tasks already executing run to completion and their
    /// results are delivered harmlessly. Safe to call more than once.
    pub async fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained = {
            let mut backlog = self.backlog.lock();
            let drained = backlog.len();
            backlog.clear();
            drained
        };
        debug!(
            "Terminating search {}: discarded {} queued sub-tasks",
            self.search_id, drained
        );

        if drained > 0 {
            let remaining = self.tasks_remaining.fetch_sub(drained, Ordering::SeqCst) - drained;
            if remaining == 0 {
                self.complete().await;
            }
        } else if self.tasks_remaining.load(Ordering::SeqCst) == 0 {
            // Nothing queued and nothing in flight; completion may already be
            // done, in which case complete() is a no-op.
            self.complete().await;
        }
    }

    /// Record the scheduler this producer is attached to
    pub(crate) fn attach(&self, core: &Arc<SchedulerCore>) {
        *self.scheduler.lock() = Some(Arc::downgrade(core));
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Timestamp used for oldest-first scheduling order
    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Complete the search now if no sub-tasks were ever queued
    ///
    /// Called at registration time so zero-shard searches emit their sentinel
    /// immediately instead of waiting for a pull that will never dispatch.
    pub(crate) async fn complete_if_empty(&self) {
        if self.tasks_total == 0 {
            self.complete().await;
        }
    }

    /// Pull the next runnable sub-task, respecting the per-search cap
    ///
    /// Mirrors the scheduler contract: increment the in-flight counter, back
    /// out if that exceeded the cap, otherwise pop a shard off the backlog
    /// and assign its dispatch sequence number. The in-flight slot taken here
    /// is released by [`run_sub_task`](Self::run_sub_task) when the sub-task
    /// finishes, or immediately if the backlog turned out to be empty.
    pub(crate) fn try_dispatch(&self) -> TaskPull {
        if self.terminated.load(Ordering::SeqCst) || self.completed.load(Ordering::SeqCst) {
            return TaskPull::Exhausted;
        }

        let count = self.threads_in_use.fetch_add(1, Ordering::SeqCst) + 1;
        if count > self.max_threads_per_task {
            self.threads_in_use.fetch_sub(1, Ordering::SeqCst);
            return TaskPull::AtCapacity;
        }

        match self.pop_next() {
            Some(sub_task) => TaskPull::Dispatch(sub_task),
            None => {
                self.threads_in_use.fetch_sub(1, Ordering::SeqCst);
                self.detach();
                TaskPull::Exhausted
            }
        }
    }

    /// Execute one dispatched sub-task and run the completion bookkeeping
    ///
    /// Failure or panic in the searcher is absorbed: logged, recorded, and
    /// still counted as a finished task. Whatever happens, the in-flight slot
    /// is released and the remaining count is decremented; the call that
    /// crosses zero completes the search. Returns whether the sub-task
    /// finished cleanly, so the scheduler can count failures.
    pub(crate) async fn run_sub_task(&self, sub_task: SubTask) -> bool {
        debug!(
            "Executing sub-task {}/{} for search {} on shard {}",
            sub_task.sequence, sub_task.total, self.search_id, sub_task.shard_id
        );

        let searcher = Arc::clone(&self.searcher);
        let sink = self.sink.clone();
        let task = sub_task.clone();
        // Spawned so a panicking searcher surfaces as a JoinError instead of
        // unwinding through the worker and skipping the bookkeeping below.
        let outcome = tokio::spawn(async move { searcher.search(&task, &sink).await }).await;

        let succeeded = match outcome {
            Ok(Ok(())) => {
                debug!(
                    "Sub-task {}/{} finished for search {}",
                    sub_task.sequence, sub_task.total, self.search_id
                );
                true
            }
            Ok(Err(e)) => {
                if e.is_queue_closed() {
                    debug!(
                        "Sub-task {}/{} for search {} stopped: {}",
                        sub_task.sequence, sub_task.total, self.search_id, e
                    );
                } else {
                    error!(
                        "Sub-task {}/{} failed for search {}: {}",
                        sub_task.sequence, sub_task.total, self.search_id, e
                    );
                }
                self.errors.lock().push(e);
                false
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    "sub-task panicked".to_string()
                } else {
                    format!("sub-task aborted: {}", join_error)
                };
                error!(
                    "Sub-task {}/{} failed for search {}: {}",
                    sub_task.sequence, sub_task.total, self.search_id, reason
                );
                self.errors.lock().push(SearchexError::shard_search(sub_task.shard_id, reason));
                false
            }
        };

        self.threads_in_use.fetch_sub(1, Ordering::SeqCst);
        let remaining = self.tasks_remaining.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.complete().await;
        }
        succeeded
    }

    fn pop_next(&self) -> Option<SubTask> {
        let shard_id = self.backlog.lock().pop_front()?;
        let sequence = self.tasks_requested.fetch_add(1, Ordering::SeqCst) + 1;
        Some(SubTask {
            shard_id,
            sequence,
            total: self.tasks_total,
        })
    }

    /// Finish the search: emit the sentinel, release waiters, detach
    ///
    /// Only the first call does anything. The sentinel is pushed before the
    /// latch fires, and since the remaining count reached zero first, it is
    /// the last item this search ever puts on its queue.
    async fn complete(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.backlog.lock().clear();

        if self.item_sender.send(StreamItem::Complete).await.is_err() {
            warn!(
                "Completion sentinel for search {} had no queue to land on",
                self.search_id
            );
        }

        self.latch.fire();
        self.detach();
        debug!("Search {} completed: {}", self.search_id, self.progress());
    }

    /// Remove this producer from its scheduler's registration set
    ///
    /// Idempotent: the attached flag flips false exactly once, and repeated
    /// registry removals are harmless no-ops.
    fn detach(&self) {
        if !self.attached.swap(false, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.scheduler.lock().clone();
        if let Some(core) = scheduler.and_then(|weak| weak.upgrade()) {
            core.remove(self.search_id);
        }
    }
}

impl fmt::Debug for TaskProducer {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProducer")
            .field("search_id", &self.search_id)
            .field("progress", &self.progress())
            .field("threads_in_use", &self.threads_in_use())
            .field("max_threads_per_task", &self.max_threads_per_task)
            .field("terminated", &self.is_terminated())
            .field("complete", &self.is_complete())
            .finish()
    }
}
