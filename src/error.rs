//! Error types for search execution
//!
//! This module defines the error types used throughout the crate, providing
//! clear error messages with actionable context. Most failures in this system
//! are absorbed close to where they happen (a failing shard, a lost queue
//! endpoint, a bad merge) and recorded rather than propagated; the variants
//! here carry enough structure for that recording to be useful.

use thiserror::Error;

/// Main error type for all search execution operations
#[derive(Debug, Error)]
pub enum SearchexError {
    /// Configuration validation failed
    #[error("Configuration error: {field} - {reason}. {suggestion}")]
    InvalidConfig {
        field: String,
        reason: String,
        suggestion: String,
    },

    /// Scheduler lifecycle misuse
    #[error("Scheduler error: {reason}")]
    Scheduler { reason: String },

    /// A streaming queue endpoint disappeared while the other side was still active
    #[error("Streaming queue closed: {context}")]
    QueueClosed { context: String },

    /// A single shard's search execution failed
    #[error("Shard search failed: shard {shard_id} - {reason}")]
    ShardSearch { shard_id: String, reason: String },

    /// A coprocessor payload merge failed inside the collector
    #[error("Payload merge failed: coprocessor {key} - {reason}")]
    Merge { key: String, reason: String },
}

impl SearchexError {
    /// Create a configuration error with field context
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a scheduler lifecycle error
    pub fn scheduler(reason: impl Into<String>) -> Self {
        Self::Scheduler { reason: reason.into() }
    }

    /// Create a closed-queue error with operation context
    pub fn queue_closed(context: impl Into<String>) -> Self {
        Self::QueueClosed {
            context: context.into(),
        }
    }

    /// Create a per-shard search failure
    pub fn shard_search(shard_id: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::ShardSearch {
            shard_id: shard_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a payload merge failure for one coprocessor key
    pub fn merge(key: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Merge {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a per-shard execution failure
    pub fn is_shard_failure(&self) -> bool {
        matches!(self, Self::ShardSearch { .. })
    }

    /// Check if this error means a queue endpoint went away
    ///
    /// A closed queue is an orderly request to stop producing, not a fault:
    /// callers log it and unwind instead of surfacing it.
    pub fn is_queue_closed(&self) -> bool {
        matches!(self, Self::QueueClosed { .. })
    }

    /// Check if this error is absorbed within a single search
    ///
    /// Absorbed errors end up in a search's error set rather than aborting
    /// anything; only configuration and scheduler misuse propagate to callers.
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Self::ShardSearch { .. } | Self::Merge { .. } | Self::QueueClosed { .. })
    }
}
