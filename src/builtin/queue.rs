use std::collections::VecDeque;

use crate::base::beat::Beat;

/// Bounded beat queue with a commit point. Beats pushed after the last `commit` are pending: they
/// occupy space but cannot be popped, and `rollback` discards them.
#[derive(Debug, Clone)]
pub struct FrameQueue {
    storage: VecDeque<Beat>,
    committed: usize,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be > 0");
        Self {
            storage: VecDeque::with_capacity(capacity),
            committed: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() >= self.capacity
    }

    /// Beats written since the last commit.
    pub fn pending(&self) -> usize {
        self.storage.len() - self.committed
    }

    pub fn try_push(&mut self, beat: Beat) -> bool {
        if self.is_full() {
            return false;
        }
        self.storage.push_back(beat);
        true
    }

    pub fn commit(&mut self) {
        self.committed = self.storage.len();
    }

    /// Discard pending beats, returning how many were dropped.
    pub fn rollback(&mut self) -> usize {
        let dropped = self.pending();
        self.storage.truncate(self.committed);
        dropped
    }

    pub fn front(&self) -> Option<&Beat> {
        if self.committed == 0 {
            return None;
        }
        self.storage.front()
    }

    pub fn try_pop(&mut self) -> Option<Beat> {
        if self.committed == 0 {
            return None;
        }
        self.committed -= 1;
        self.storage.pop_front()
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.committed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beat(v: u64) -> Beat {
        Beat::from_word(v, 4)
    }

    #[test]
    fn pending_beats_are_not_readable() {
        let mut q = FrameQueue::new(4);
        assert!(q.try_push(beat(1)));
        assert!(q.try_push(beat(2)));
        assert_eq!(2, q.pending());
        assert!(q.try_pop().is_none());
        q.commit();
        assert_eq!(Some(1), q.try_pop().map(|b| b.word()));
        assert_eq!(Some(2), q.front().map(|b| b.word()));
    }

    #[test]
    fn rollback_keeps_committed_prefix() {
        let mut q = FrameQueue::new(4);
        q.try_push(beat(1));
        q.commit();
        q.try_push(beat(2));
        q.try_push(beat(3));
        assert_eq!(2, q.rollback());
        assert_eq!(1, q.len());
        assert_eq!(Some(1), q.try_pop().map(|b| b.word()));
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_rejects_push() {
        let mut q = FrameQueue::new(2);
        assert!(q.try_push(beat(1)));
        assert!(q.try_push(beat(2)));
        assert!(q.is_full());
        assert!(!q.try_push(beat(3)));
        q.commit();
        q.try_pop();
        assert!(q.try_push(beat(3)));
    }
}
