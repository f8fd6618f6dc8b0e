//! Searchex - A fair, pull-based distributed search execution engine
//!
//! Searchex runs sharded searches on a fixed pool of async workers that pull
//! sub-tasks fairly across concurrent searches, streams row batches through
//! bounded backpressured queues capped by a completion sentinel, and merges
//! per-node partial results into a single completion-signaled result set.

pub mod collector;
pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod identifiers;
pub mod producer;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
pub mod test_utils;

pub use collector::{
    CompletionState, CoprocessorKey, NodeResponse, NodeResult, Payload, PayloadMerger, ResultCollector,
};
pub use completion::CompletionLatch;
pub use config::ExecutorConfig;
pub use error::SearchexError;
pub use executor::{SearchExecutor, SearchHandle};
pub use identifiers::{NodeId, SearchId, ShardId};
pub use producer::{ProducerProgress, ShardSearcher, SubTask, TaskProducer};
pub use queue::{BatchSink, RowBatch, StreamItem, StreamingQueue};
pub use scheduler::{Scheduler, SchedulerStats};

/// Type alias for Results using SearchexError
pub type Result<T> = std::result::Result<T, SearchexError>;
