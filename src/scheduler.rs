//! Fair, pull-based scheduling of shard sub-tasks across searches
//!
//! The [`Scheduler`] owns a fixed pool of worker tasks (the global thread
//! budget) and a registration set of currently attached producers. Workers
//! repeatedly pull one runnable sub-task and execute it; pulling scans
//! producers oldest-first, so an in-flight search is never starved by a newer
//! one, while a producer already at its own concurrency cap is skipped even
//! if it is oldest. Producers fall out of the set the moment they have
//! nothing left to offer.
//!
//! The registration set holds weak references: the scheduler registers
//! searches, it does not own them. A search whose handles are dropped simply
//! disappears from the scan.

use crate::error::SearchexError;
use crate::identifiers::SearchId;
use crate::producer::{SubTask, TaskProducer, TaskPull};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of scheduler activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Producers currently in the registration set
    pub attached_producers: usize,
    /// Size of the worker pool
    pub workers: usize,
    /// Sub-tasks handed to workers since start
    pub tasks_dispatched: u64,
    /// Sub-tasks that finished executing, cleanly or not
    pub tasks_completed: u64,
    /// Sub-tasks whose searcher reported failure or panicked
    pub tasks_failed: u64,
}

/// Shared state the worker pool and producers both reach
///
/// Producers hold a weak reference back to this so completion can detach them
/// without keeping a stopped scheduler alive.
pub(crate) struct SchedulerCore {
    registry: Mutex<HashMap<SearchId, Weak<TaskProducer>>>,
    work_available: Notify,
    shutdown: AtomicBool,
    tasks_dispatched: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
}

impl SchedulerCore {
    fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            work_available: Notify::new(),
            shutdown: AtomicBool::new(false),
            tasks_dispatched: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
        }
    }

    /// Remove a producer from the registration set
    ///
    /// Called by producers when they run out of work or complete, and safe to
    /// call any number of times for the same search.
    pub(crate) fn remove(&self, search_id: SearchId) {
        if self.registry.lock().remove(&search_id).is_some() {
            debug!("Detached search {} from scheduler", search_id);
        }
    }

    /// Wake one worker to look for runnable work
    fn signal(&self) {
        self.work_available.notify_one();
    }

    fn insert(&self, producer: &Arc<TaskProducer>) {
        self.registry
            .lock()
            .insert(producer.search_id(), Arc::downgrade(producer));
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Pull one runnable sub-task, or None if no producer has capacity
    ///
    /// Never blocks. Producers are scanned oldest-first by creation time;
    /// at-cap producers are skipped, exhausted ones detach themselves inside
    /// the pull and drop out of future scans.
    fn next_unit(&self) -> Option<(Arc<TaskProducer>, SubTask)> {
        let mut producers: Vec<Arc<TaskProducer>> = {
            let mut registry = self.registry.lock();
            registry.retain(|_, weak| weak.strong_count() > 0);
            registry.values().filter_map(Weak::upgrade).collect()
        };
        producers.sort_by_key(|producer| (producer.created_at(), producer.search_id()));

        for producer in producers {
            match producer.try_dispatch() {
                TaskPull::Dispatch(sub_task) => {
                    self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
                    return Some((producer, sub_task));
                }
                TaskPull::AtCapacity => continue,
                TaskPull::Exhausted => continue,
            }
        }
        None
    }
}

/// Process-wide scheduler with an explicit start/stop lifecycle
///
/// Create one, `start()` it, register producers as searches begin, and
/// `shutdown()` it when the process winds down. Workers pull; nothing here
/// pushes work at threads, which is what keeps the per-producer caps and the
/// global budget composable.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    worker_threads: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    /// Create a scheduler with the given worker pool size
    ///
    /// The pool size is the global thread budget: no more than this many
    /// sub-tasks execute simultaneously across all searches.
    pub fn new(worker_threads: usize) -> Self {
        Self {
            core: Arc::new(SchedulerCore::new()),
            worker_threads,
            workers: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Start the worker pool
    pub async fn start(&self) -> Result<(), SearchexError> {
        if self.core.is_shutdown() {
            return Err(SearchexError::scheduler("cannot start a scheduler after shutdown"));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SearchexError::scheduler("scheduler is already started"));
        }

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_threads {
            let core = Arc::clone(&self.core);
            workers.push(tokio::spawn(Self::worker_loop(core, worker_id)));
        }
        info!("Scheduler started with {} workers", self.worker_threads);
        Ok(())
    }

    /// Register a producer and immediately signal availability
    ///
    /// A zero-shard search completes right here, emitting its sentinel
    /// without ever being offered to a worker.
    pub async fn register(&self, producer: &Arc<TaskProducer>) -> Result<(), SearchexError> {
        if self.core.is_shutdown() {
            return Err(SearchexError::scheduler("cannot register a search after shutdown"));
        }

        producer.attach(&self.core);
        self.core.insert(producer);
        self.core.signal();
        debug!(
            "Registered search {} ({} sub-tasks) with scheduler",
            producer.search_id(),
            producer.total_tasks()
        );

        producer.complete_if_empty().await;
        Ok(())
    }

    /// Stop the worker pool, letting in-flight sub-tasks finish
    ///
    /// Idempotent. Queued sub-tasks of still-registered searches stay queued
    /// forever after this; terminate their producers first if the searches
    /// should complete instead.
    pub async fn shutdown(&self) -> Result<(), SearchexError> {
        self.core.shutdown.store(true, Ordering::SeqCst);
        self.core.work_available.notify_waiters();

        let handles = std::mem::take(&mut *self.workers.lock());
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Scheduler worker ended abnormally: {}", e);
            }
        }
        if count > 0 {
            info!("Scheduler stopped, {} workers joined", count);
        }
        Ok(())
    }

    /// Current activity counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            attached_producers: self.core.registry.lock().len(),
            workers: self.worker_threads,
            tasks_dispatched: self.core.tasks_dispatched.load(Ordering::Relaxed),
            tasks_completed: self.core.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.core.tasks_failed.load(Ordering::Relaxed),
        }
    }

    async fn worker_loop(core: Arc<SchedulerCore>, worker_id: usize) {
        debug!("Scheduler worker {} started", worker_id);

        loop {
            if core.is_shutdown() {
                break;
            }

            // Register interest in wakeups before scanning, so a signal that
            // arrives between an empty scan and the await is not lost.
            let notified = core.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match core.next_unit() {
                Some((producer, sub_task)) => {
                    // Chain the wakeup: another worker checks for more work
                    // while this one is busy executing.
                    core.signal();
                    let succeeded = producer.run_sub_task(sub_task).await;
                    core.tasks_completed.fetch_add(1, Ordering::Relaxed);
                    if !succeeded {
                        core.tasks_failed.fetch_add(1, Ordering::Relaxed);
                    }
                    // A capacity slot was released; the producer may have
                    // more backlog that is runnable now.
                    core.signal();
                }
                None => {
                    if core.is_shutdown() {
                        break;
                    }
                    notified.await;
                }
            }
        }

        debug!("Scheduler worker {} stopped", worker_id);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_threads", &self.worker_threads)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("stats", &self.stats())
            .finish()
    }
}
