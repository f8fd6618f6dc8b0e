//! High-level search execution facade
//!
//! [`SearchExecutor`] owns the shared scheduler and stamps out one
//! [`SearchHandle`] per search: a bounded streaming queue plus the producer
//! feeding it. Callers hold the handle, drain row batches until the
//! completion sentinel, and never touch scheduler internals.

use crate::config::ExecutorConfig;
use crate::error::SearchexError;
use crate::identifiers::{SearchId, ShardId};
use crate::producer::{ProducerProgress, ShardSearcher, TaskProducer};
use crate::queue::{StreamItem, StreamingQueue};
use crate::scheduler::{Scheduler, SchedulerStats};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared entry point for running shard searches
///
/// One executor serves many concurrent searches; its worker pool size and the
/// per-search defaults come from [`ExecutorConfig`]. The lifecycle is
/// explicit: searches may be registered before [`start`](Self::start), but no
/// sub-task runs until the workers exist.
pub struct SearchExecutor {
    config: ExecutorConfig,
    scheduler: Scheduler,
}

impl SearchExecutor {
    /// Create an executor from a validated configuration
    pub fn new(config: ExecutorConfig) -> Result<Self, SearchexError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.worker_threads);
        info!(
            "Created search executor: workers={}, default max threads per task={}, queue capacity={}",
            config.worker_threads, config.default_max_threads_per_task, config.queue_capacity
        );
        Ok(Self { config, scheduler })
    }

    /// The configuration this executor was built with
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Spawn the worker pool
    pub async fn start(&self) -> Result<(), SearchexError> {
        self.scheduler.start().await
    }

    /// Begin a search over `shards` with the configured per-search cap
    pub async fn start_search(
        &self,
        shards: Vec<ShardId>,
        searcher: Arc<dyn ShardSearcher>,
    ) -> Result<SearchHandle, SearchexError> {
        self.start_search_with_cap(shards, searcher, self.config.default_max_threads_per_task)
            .await
    }

    /// Begin a search with an explicit per-search concurrency cap
    ///
    /// The cap bounds how many of this search's sub-tasks may run at once; it
    /// does not grow the worker pool, so the effective parallelism is the
    /// smaller of the cap and the pool size.
    pub async fn start_search_with_cap(
        &self,
        shards: Vec<ShardId>,
        searcher: Arc<dyn ShardSearcher>,
        max_threads_per_task: usize,
    ) -> Result<SearchHandle, SearchexError> {
        if max_threads_per_task == 0 {
            return Err(SearchexError::invalid_config(
                "max_threads_per_task",
                "must be at least 1",
                "A search with no thread budget can never dispatch a sub-task",
            ));
        }

        let search_id = SearchId::new();
        let queue = Arc::new(StreamingQueue::new(self.config.queue_capacity));
        let producer = Arc::new(TaskProducer::new(
            search_id,
            shards,
            searcher,
            &queue,
            max_threads_per_task,
        ));
        self.scheduler.register(&producer).await?;

        Ok(SearchHandle { producer, queue })
    }

    /// Scheduler counters for monitoring
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Stop the worker pool and wait for in-flight sub-tasks to finish
    pub async fn shutdown(&self) -> Result<(), SearchexError> {
        self.scheduler.shutdown().await
    }
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Caller-facing handle for one running search
///
/// Pairs the streaming queue (the consumer side) with the producer (progress,
/// errors, termination). Dropping the handle abandons the search: the
/// scheduler prunes the dead producer on its next scan.
pub struct SearchHandle {
    producer: Arc<TaskProducer>,
    queue: Arc<StreamingQueue>,
}

impl SearchHandle {
    /// Identifier of this search
    pub fn search_id(&self) -> SearchId {
        self.producer.search_id()
    }

    /// The producer driving this search
    pub fn producer(&self) -> &Arc<TaskProducer> {
        &self.producer
    }

    /// The queue carrying this search's row batches
    pub fn queue(&self) -> &Arc<StreamingQueue> {
        &self.queue
    }

    /// Take the next stream item, waiting while the queue is empty
    pub async fn take(&self) -> Result<StreamItem, SearchexError> {
        self.queue.take().await
    }

    /// Dispatch progress counters for this search
    pub fn progress(&self) -> ProducerProgress {
        self.producer.progress()
    }

    /// Errors absorbed from failed sub-tasks so far
    pub fn errors(&self) -> Vec<String> {
        self.producer.errors()
    }

    /// Whether the search has signaled completion
    pub fn is_complete(&self) -> bool {
        self.producer.is_complete()
    }

    /// Abandon undispatched work and complete as soon as in-flight tasks drain
    pub async fn terminate(&self) {
        self.producer.terminate().await;
    }

    /// Wait until the search completes
    pub async fn await_completion(&self) {
        self.producer.await_completion().await;
    }

    /// Bounded wait; returns whether the search completed within the bound
    pub async fn await_completion_timeout(&self, duration: Duration) -> bool {
        self.producer.await_completion_timeout(duration).await
    }
}

impl std::fmt::Debug for SearchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchHandle")
            .field("search_id", &self.search_id())
            .field("progress", &self.progress())
            .finish()
    }
}
