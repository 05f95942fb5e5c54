//! Indexed binary heap with key modification.
//!
//! Backs both the per-core CPU-priority heap and the global core-load
//! heaps (component B). A plain `BinaryHeap` cannot have an element's key
//! raised or lowered in place without an O(n) rebuild, so this keeps a
//! back-pointer from each value to its current slot, the way the original
//! `PriorityHeap`/`Heap` templates do with sibling/parent indices.

use alloc::vec::Vec;
use hashbrown::HashMap;

/// A binary heap over `(key, value)` pairs that supports `modify_key` and
/// `remove` in `O(log n)` by tracking each value's current slot.
///
/// `max_heap = true` makes `peek`/`pop` return the greatest key (used for
/// "highest effective priority" and "most loaded"); `max_heap = false`
/// gives a min-heap (used for "least loaded").
pub struct IndexedHeap<K, V> {
    entries: Vec<(K, V)>,
    position: HashMap<V, usize>,
    max_heap: bool,
}

impl<K, V> IndexedHeap<K, V>
where
    K: Ord + Copy,
    V: Copy + Eq + core::hash::Hash,
{
    pub fn new(max_heap: bool) -> Self {
        Self {
            entries: Vec::new(),
            position: HashMap::new(),
            max_heap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, value: V) -> bool {
        self.position.contains_key(&value)
    }

    pub fn peek(&self) -> Option<(K, V)> {
        self.entries.first().copied()
    }

    fn better(&self, a: K, b: K) -> bool {
        if self.max_heap {
            a > b
        } else {
            a < b
        }
    }

    pub fn push(&mut self, key: K, value: V) {
        debug_assert!(!self.position.contains_key(&value), "value already in heap");
        let idx = self.entries.len();
        self.entries.push((key, value));
        self.position.insert(value, idx);
        self.sift_up(idx);
    }

    pub fn pop(&mut self) -> Option<(K, V)> {
        if self.entries.is_empty() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.swap(0, last);
        let (key, value) = self.entries.pop().unwrap();
        self.position.remove(&value);
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some((key, value))
    }

    /// Remove an arbitrary value from the heap. Returns its key if present.
    pub fn remove(&mut self, value: V) -> Option<K> {
        let idx = *self.position.get(&value)?;
        let last = self.entries.len() - 1;
        self.swap(idx, last);
        let (key, _) = self.entries.pop().unwrap();
        self.position.remove(&value);
        if idx < self.entries.len() {
            self.sift_up(idx);
            self.sift_down(idx);
        }
        Some(key)
    }

    /// Change the key of an already-present value, re-heapifying.
    pub fn modify_key(&mut self, value: V, new_key: K) -> bool {
        let Some(&idx) = self.position.get(&value) else {
            return false;
        };
        self.entries[idx].0 = new_key;
        self.sift_up(idx);
        self.sift_down(idx);
        true
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.position.insert(self.entries[i].1, i);
        self.position.insert(self.entries[j].1, j);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.better(self.entries[idx].0, self.entries[parent].0) {
                self.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut best = idx;
            if left < len && self.better(self.entries[left].0, self.entries[best].0) {
                best = left;
            }
            if right < len && self.better(self.entries[right].0, self.entries[best].0) {
                best = right;
            }
            if best == idx {
                break;
            }
            self.swap(idx, best);
            idx = best;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================================
    // Max-heap behaviour
    // ===========================================================

    #[test]
    fn max_heap_peek_returns_greatest_key() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(5, 0);
        heap.push(30, 1);
        heap.push(10, 2);
        assert_eq!(heap.peek(), Some((30, 1)));
    }

    #[test]
    fn max_heap_pop_order() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(5, 0);
        heap.push(30, 1);
        heap.push(10, 2);
        assert_eq!(heap.pop(), Some((30, 1)));
        assert_eq!(heap.pop(), Some((10, 2)));
        assert_eq!(heap.pop(), Some((5, 0)));
        assert_eq!(heap.pop(), None);
    }

    // ===========================================================
    // Min-heap behaviour
    // ===========================================================

    #[test]
    fn min_heap_peek_returns_least_key() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(false);
        heap.push(500, 0);
        heap.push(10, 1);
        heap.push(200, 2);
        assert_eq!(heap.peek(), Some((10, 1)));
    }

    // ===========================================================
    // Key modification
    // ===========================================================

    #[test]
    fn modify_key_reorders_max_heap() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(10, 0);
        heap.push(20, 1);
        heap.push(5, 2);
        assert_eq!(heap.peek(), Some((20, 1)));

        heap.modify_key(1, 1);
        assert_eq!(heap.peek(), Some((10, 0)));
    }

    #[test]
    fn modify_key_missing_value_is_noop() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(10, 0);
        assert!(!heap.modify_key(99, 50));
    }

    // ===========================================================
    // Removal
    // ===========================================================

    #[test]
    fn remove_arbitrary_value() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(10, 0);
        heap.push(20, 1);
        heap.push(30, 2);
        assert_eq!(heap.remove(1), Some(20));
        assert!(!heap.contains(1));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek(), Some((30, 2)));
    }

    #[test]
    fn remove_last_element_empties_heap() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        heap.push(10, 0);
        assert_eq!(heap.remove(0), Some(10));
        assert!(heap.is_empty());
    }

    #[test]
    fn contains_reflects_membership() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        assert!(!heap.contains(0));
        heap.push(1, 0);
        assert!(heap.contains(0));
        heap.pop();
        assert!(!heap.contains(0));
    }

    #[test]
    fn many_insertions_preserve_heap_order() {
        let mut heap: IndexedHeap<u32, u32> = IndexedHeap::new(true);
        let keys = [42u32, 7, 99, 1, 55, 23, 88, 3, 61, 17];
        for (i, &k) in keys.iter().enumerate() {
            heap.push(k, i as u32);
        }
        let mut popped = Vec::new();
        while let Some((k, _)) = heap.pop() {
            popped.push(k);
        }
        let mut expected = keys.to_vec();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(popped, expected);
    }
}
