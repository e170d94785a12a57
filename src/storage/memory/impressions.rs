use std::{collections::VecDeque, sync::Mutex};

use crate::{
    storage::{Impression, ImpressionStorage},
    Result,
};

/// Bounded in-process impression queue. Impressions logged while the queue is full are dropped.
#[derive(Debug)]
pub struct InMemoryImpressionStorage {
    capacity: usize,
    queue: Mutex<VecDeque<Impression>>,
}

impl InMemoryImpressionStorage {
    /// Create a queue holding at most `capacity` impressions.
    pub fn new(capacity: usize) -> InMemoryImpressionStorage {
        InMemoryImpressionStorage {
            capacity,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of queued impressions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Impression>> {
        self.queue
            .lock()
            .expect("thread holding impression queue lock should not panic")
    }
}

impl ImpressionStorage for InMemoryImpressionStorage {
    fn log_impressions(&self, impressions: &[Impression]) -> Result<()> {
        let mut queue = self.lock();
        let room = self.capacity.saturating_sub(queue.len());
        if impressions.len() > room {
            log::warn!(target: "splitio", dropped = impressions.len() - room; "impression queue is full, dropping impressions");
        }
        queue.extend(impressions.iter().take(room).cloned());
        Ok(())
    }

    fn pop_n(&self, n: usize) -> Result<Vec<Impression>> {
        let mut queue = self.lock();
        let n = n.min(queue.len());
        Ok(queue.drain(..n).collect())
    }
}
