//! Thread-safe FIFO queues connecting the mining, listening and client
//! threads (§5). Four of these back the node: inbound weak headers,
//! inbound strong blocks, inbound transactions, and inbound peer-protocol
//! messages awaiting the listening thread.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct FifoQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> FifoQueue<T> {
    pub fn new() -> Self {
        FifoQueue {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.inner.lock().push_back(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_fifo_order() {
        let q = FifoQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q: FifoQueue<i32> = FifoQueue::new();
        assert!(q.is_empty());
        q.push(1);
        assert!(!q.is_empty());
    }
}
