//! Bounded FIFO ring for queued channel items.
//!
//! The ring itself carries no lock; owners wrap it in their own mutex so a
//! single lock can cover the ring together with adjacent bookkeeping.

use std::collections::VecDeque;

use crate::error::{TransferError, TransferResult};

/// Fixed-capacity FIFO of queued items.
#[derive(Debug)]
pub struct ItemRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> ItemRing<T> {
    /// Creates an empty ring holding at most `capacity` items.
    pub fn new(capacity: usize) -> TransferResult<Self> {
        if capacity == 0 {
            return Err(TransferError::InvalidCapacity);
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Appends an item, or hands it back when the ring is full.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= self.capacity {
            Err(item)
        } else {
            self.items.push_back(item);
            Ok(())
        }
    }

    /// Returns a reference to the oldest item.
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes and returns the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Inserts an item at the front, bypassing the capacity check.
    ///
    /// Used when requeueing items that were previously popped; the ring may
    /// transiently exceed its capacity by the number of requeued items.
    pub fn push_front(&mut self, item: T) {
        self.items.push_front(item);
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the ring holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the ring is at capacity.
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Maximum number of items the ring accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates items oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        assert!(ItemRing::<u32>::new(0).is_err());
    }

    #[test]
    fn push_pop_is_fifo() {
        let mut ring = ItemRing::new(4).unwrap();
        for v in 0..4u32 {
            ring.try_push(v).unwrap();
        }
        assert!(ring.is_full());
        assert_eq!(ring.try_push(9), Err(9));
        assert_eq!(ring.pop(), Some(0));
        assert_eq!(ring.front(), Some(&1));
        ring.try_push(4).unwrap();
        let drained: Vec<_> = std::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4]);
    }

    #[test]
    fn requeue_goes_to_the_front() {
        let mut ring = ItemRing::new(2).unwrap();
        ring.try_push(2).unwrap();
        ring.try_push(3).unwrap();
        ring.push_front(1);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.pop(), Some(2));
    }

    /// Randomised interleaving of pushes and pops against a model deque.
    #[test]
    fn random_interleaving_matches_model() {
        use rand::prelude::*;

        let mut ring = ItemRing::new(16).unwrap();
        let mut model = VecDeque::new();
        let mut rng = StdRng::seed_from_u64(0x5EED);

        for value in 0..10_000u32 {
            if rng.gen_bool(0.6) {
                match ring.try_push(value) {
                    Ok(()) => model.push_back(value),
                    Err(rejected) => {
                        assert_eq!(rejected, value);
                        assert!(ring.is_full());
                    }
                }
            } else {
                assert_eq!(ring.pop(), model.pop_front());
            }
            assert_eq!(ring.len(), model.len());
        }
        while let Some(expected) = model.pop_front() {
            assert_eq!(ring.pop(), Some(expected));
        }
        assert!(ring.is_empty());
    }
}
