//! FIFO of pending compression tasks.
//!
//! The controller fills the queue completely before any worker starts, so
//! an empty queue means there is no more work: `dequeue_or_empty` never waits.

use crate::task::CompressionTask;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

pub struct TaskQueue {
    sender: Sender<CompressionTask>,
    receiver: Receiver<CompressionTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn enqueue(&self, task: CompressionTask) {
        // Both ends live as long as the queue, so the channel cannot be closed
        let _ = self.sender.send(task);
    }

    /// Take the next task, or `None` once the queue is drained.
    pub fn dequeue_or_empty(&self) -> Option<CompressionTask> {
        match self.receiver.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<CompressionTask> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = CompressionTask>>(iter: I) -> Self {
        let queue = TaskQueue::new();
        for task in iter {
            queue.enqueue(task);
        }
        queue
    }
}
