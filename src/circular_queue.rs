use std::collections::VecDeque;
use std::fmt;

/// Fixed-capacity buffer ordered oldest to newest; a push into a full
/// queue evicts the oldest item.
pub struct CircularQueue<T> {
    deque: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> Clone for CircularQueue<T> {
    fn clone(&self) -> Self {
        Self {
            deque: self.deque.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deque.fmt(f)
    }
}

impl<T> CircularQueue<T> {
    #[inline]
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.max(1);

        Self {
            deque: VecDeque::with_capacity(cap),
            capacity: cap,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() {
            self.deque.pop_front()
        } else {
            None
        };

        self.deque.push_back(item);

        evicted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.deque.len() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn last(&self) -> Option<&T> {
        self.deque.back()
    }

    /// `(previous, last)`
    #[inline]
    pub fn last_two(&self) -> Option<(&T, &T)> {
        let n = self.deque.len();
        if n < 2 {
            return None;
        }

        Some((&self.deque[n - 2], &self.deque[n - 1]))
    }

    /// Oldest first.
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ T> {
        self.deque.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut q = CircularQueue::with_capacity(3);

        assert_eq!(q.push(1), None);
        assert_eq!(q.push(2), None);
        assert_eq!(q.push(3), None);
        assert!(q.is_full());
        assert_eq!(q.push(4), Some(1));

        assert_eq!(q.len(), 3);
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(q.last(), Some(&4));
        assert_eq!(q.last_two(), Some((&3, &4)));
    }

    #[test]
    fn last_two_needs_two_items() {
        let mut q = CircularQueue::with_capacity(5);
        assert_eq!(q.last_two(), None);

        q.push('a');
        assert_eq!(q.last_two(), None);
        assert_eq!(q.last(), Some(&'a'));
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut q = CircularQueue::with_capacity(0);
        q.push(1);
        q.push(2);

        assert_eq!(q.capacity(), 1);
        assert_eq!(q.iter().copied().collect::<Vec<_>>(), vec![2]);
    }
}
