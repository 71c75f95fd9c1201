//! Utility types.

use std::{collections::VecDeque, hash::Hash};

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

/// A FIFO queue that ignores values already waiting in it.
#[derive(Debug)]
pub struct Queue<T> {
    queue: VecDeque<T>,
    hash: Set<T>,
}
impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            hash: Set::default(),
        }
    }
}

impl<T> Queue<T>
where
    T: Clone + Eq + Hash,
{
    pub fn push(&mut self, value: T) -> bool {
        if self.hash.insert(value.clone()) {
            self.queue.push_back(value);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.queue.pop_front()?;
        self.hash.swap_remove(&value);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_skips_waiting_duplicates() {
        let mut queue = Queue::default();
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(!queue.push(1));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.is_empty());
    }
}
