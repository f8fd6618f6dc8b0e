//! Configuration structures for search execution
//!
//! This module provides the configuration system for the executor, including
//! parameter validation and builder pattern implementation.

use crate::error::SearchexError;
use serde::{Deserialize, Serialize};

/// Configuration for the search executor and its scheduler
///
/// `worker_threads` is the global thread budget shared by every concurrent
/// search; `default_max_threads_per_task` caps how much of that budget a
/// single search may hold when the caller does not pick its own cap. The two
/// are independent: a per-search cap above the global budget is legal, it
/// just never bites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker tasks pulling from the scheduler (global thread budget)
    pub worker_threads: usize,
    /// Default per-search concurrency cap used when a search does not set one
    pub default_max_threads_per_task: usize,
    /// Capacity of each search's streaming queue (row batches buffered before
    /// shard workers block)
    pub queue_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            default_max_threads_per_task: 2,
            queue_capacity: 1000,
        }
    }
}

impl ExecutorConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker tasks (global thread budget)
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count;
        self
    }

    /// Set the default per-search concurrency cap
    pub fn default_max_threads_per_task(mut self, count: usize) -> Self {
        self.default_max_threads_per_task = count;
        self
    }

    /// Set the streaming queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SearchexError> {
        if self.worker_threads == 0 {
            return Err(SearchexError::invalid_config(
                "worker_threads",
                "must be greater than 0",
                "Set worker_threads to at least 1 (recommended: the number of cores available for search)",
            ));
        }

        if self.default_max_threads_per_task == 0 {
            return Err(SearchexError::invalid_config(
                "default_max_threads_per_task",
                "must be greater than 0",
                "Set default_max_threads_per_task to at least 1 so searches can make progress",
            ));
        }

        if self.queue_capacity == 0 {
            return Err(SearchexError::invalid_config(
                "queue_capacity",
                "must be greater than 0",
                "Set queue_capacity to at least 1; the completion sentinel needs a slot (recommended: 100-10000)",
            ));
        }

        Ok(())
    }

    /// Build the configuration after validation
    pub fn build(self) -> Result<Self, SearchexError> {
        self.validate()?;
        Ok(self)
    }
}
