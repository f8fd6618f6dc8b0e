//! Streaming handoff between shard workers and a search's consumer
//!
//! Every search owns one bounded queue. Shard sub-tasks push extracted row
//! batches through [`BatchSink`] handles; the downstream consumer drains with
//! [`StreamingQueue::take`] until the completion sentinel appears. The
//! sentinel is ordinary data, so end-of-stream is control flow rather than an
//! error path, and the bound gives backpressure: a slow consumer makes fast
//! shard workers wait instead of overrunning memory.

use crate::error::SearchexError;
use crate::identifiers::ShardId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

/// Extracted field values for one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
    /// Shard the match came from
    pub shard_id: ShardId,
    /// Field values in extraction order
    pub values: Vec<String>,
}

impl RowBatch {
    /// Create a row batch for one match
    pub fn new(shard_id: ShardId, values: Vec<String>) -> Self {
        Self { shard_id, values }
    }
}

/// Item carried by the streaming queue
///
/// Exactly one `Complete` is produced per search, after every sub-task has
/// finished or on early termination, and it is the last item the search ever
/// pushes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A batch of extracted values for one match
    Batch(RowBatch),
    /// End of stream
    Complete,
}

impl StreamItem {
    /// Check whether this item is the completion sentinel
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Producer-side handle for pushing row batches
///
/// Cloned once per dispatched sub-task. Only batches travel through a sink;
/// the completion sentinel is reserved to the producer's completion path so a
/// shard implementation cannot end the stream early.
#[derive(Debug, Clone)]
pub struct BatchSink {
    sender: mpsc::Sender<StreamItem>,
}

impl BatchSink {
    /// Push one row batch, waiting while the queue is full
    pub async fn push(&self, batch: RowBatch) -> Result<(), SearchexError> {
        self.sender
            .send(StreamItem::Batch(batch))
            .await
            .map_err(|_| SearchexError::queue_closed("row batch send"))
    }
}

/// Fixed-capacity handoff queue for one search
///
/// `put` waits while the queue is at capacity and `take` waits while it is
/// empty. The queue holds both channel ends, so dropping sinks never closes
/// the stream out from under the consumer; the sentinel is the only
/// end-of-stream signal.
#[derive(Debug)]
pub struct StreamingQueue {
    sender: mpsc::Sender<StreamItem>,
    receiver: Mutex<mpsc::Receiver<StreamItem>>,
    capacity: usize,
}

impl StreamingQueue {
    /// Create a queue with the given capacity
    ///
    /// Capacity must be at least 1; the executor validates this through
    /// [`ExecutorConfig`](crate::config::ExecutorConfig).
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
        }
    }

    /// The configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create a producer-side sink for row batches
    pub fn sink(&self) -> BatchSink {
        BatchSink {
            sender: self.sender.clone(),
        }
    }

    /// Sender handle used by the producer's completion path
    pub(crate) fn item_sender(&self) -> mpsc::Sender<StreamItem> {
        self.sender.clone()
    }

    /// Push one item, waiting while the queue is at capacity
    pub async fn put(&self, item: StreamItem) -> Result<(), SearchexError> {
        self.sender
            .send(item)
            .await
            .map_err(|_| SearchexError::queue_closed("put"))
    }

    /// Take the next item, waiting while the queue is empty
    pub async fn take(&self) -> Result<StreamItem, SearchexError> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or_else(|| SearchexError::queue_closed("take"))
    }
}
