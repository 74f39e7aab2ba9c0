use std::collections::VecDeque;

/// Bounded FIFO of pending blocks that favors freshness: pushing into a full
/// queue evicts the oldest entries.
#[derive(Debug)]
pub struct BlockQueue<T> {
    blocks: VecDeque<T>,
    capacity: usize,
    dropped_total: u64,
}

impl<T> BlockQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            blocks: VecDeque::with_capacity(capacity),
            capacity,
            dropped_total: 0,
        }
    }

    /// Appends a block and returns how many old blocks were evicted.
    pub fn push(&mut self, block: T) -> usize {
        self.blocks.push_back(block);
        let mut dropped = 0;
        while self.blocks.len() > self.capacity {
            self.blocks.pop_front();
            dropped += 1;
        }
        self.dropped_total += dropped as u64;
        dropped
    }

    pub fn pop(&mut self) -> Option<T> {
        self.blocks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the capacity, evicting the oldest blocks if needed.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        let mut dropped = 0;
        while self.blocks.len() > self.capacity {
            self.blocks.pop_front();
            dropped += 1;
        }
        self.dropped_total += dropped as u64;
        dropped
    }

    /// Blocks evicted since the queue was created.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_arrival_order() {
        let mut queue = BlockQueue::new(4);
        for block in 0..3 {
            assert_eq!(queue.push(block), 0);
        }
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut queue = BlockQueue::new(32);
        let mut dropped = 0;
        for block in 0..40 {
            dropped += queue.push(block);
        }
        assert_eq!(dropped, 8);
        assert_eq!(queue.dropped_total(), 8);
        assert_eq!(queue.len(), 32);
        assert_eq!(queue.pop(), Some(8));
    }
}
