use std::collections::VecDeque;

/// Fixed-capacity ordered sequence that evicts on overflow.
///
/// `push` appends at the back and evicts from the front (FIFO transcripts);
/// `push_front` prepends and evicts from the back (newest-first histories).
/// `pushed` counts every insertion ever made so renderers can tell which
/// entries they have not shown yet, even after eviction.
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    pushed: u64,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            pushed: 0,
        }
    }

    /// Append `item`, evicting the oldest entries while over capacity.
    /// Returns how many entries were evicted.
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_back(item);
        self.pushed += 1;
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Prepend `item`, dropping from the back while over capacity.
    pub fn push_front(&mut self, item: T) -> usize {
        self.items.push_front(item);
        self.pushed += 1;
        let mut evicted = 0;
        while self.items.len() > self.capacity {
            self.items.pop_back();
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    /// The last `n` entries of a back-appended buffer, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    /// Entries appended with `push` after the insertion counter was `mark`.
    pub fn since(&self, mark: u64) -> impl Iterator<Item = &T> {
        let fresh = self.pushed.saturating_sub(mark).min(self.items.len() as u64);
        self.tail(fresh as usize)
    }
}
