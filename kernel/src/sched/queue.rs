//! Priority run-queue (component A).
//!
//! An ordered multiset of elements keyed by an integer priority band in
//! `0..=MAX_PRIORITY`. Elements are intrusive: each one owns a single
//! `Link` slot (prev/next as array-index handles, never raw pointers,
//! per the arena-of-thread-state guidance this scheduler follows
//! throughout) and is a member of at most one queue at a time.
//!
//! A non-empty-priorities sentinel heap (`IndexedHeap`, component B)
//! gives amortised O(1) `peek_maximum` instead of scanning every band.

use super::constants::MAX_PRIORITY;
use super::heap::IndexedHeap;
use alloc::vec;
use alloc::vec::Vec;

/// Intrusive link slot. Lives alongside each element's own scheduling
/// state; the run-queue never owns element storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Link<K> {
    pub prev: Option<K>,
    pub next: Option<K>,
}

/// Storage the run-queue reads/writes intrusive links through. Implemented
/// by whatever arena owns the elements (the thread table, in practice).
pub trait LinkStore<K: Copy + Eq> {
    fn link(&self, key: K) -> Link<K>;
    fn set_link(&mut self, key: K, link: Link<K>);
}

/// A priority run-queue over elements identified by handle `K`.
pub struct RunQueue<K> {
    heads: Vec<Option<K>>,
    tails: Vec<Option<K>>,
    occupied: IndexedHeap<u32, u32>,
}

impl<K: Copy + Eq> RunQueue<K> {
    pub fn new() -> Self {
        Self {
            heads: vec![None; MAX_PRIORITY as usize + 1],
            tails: vec![None; MAX_PRIORITY as usize + 1],
            occupied: IndexedHeap::new(true),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    /// Head of a specific band, or `None` if empty.
    pub fn head(&self, priority: u32) -> Option<K> {
        self.heads[priority as usize]
    }

    /// Highest occupied band's head, with its priority.
    pub fn peek_maximum(&self) -> Option<(K, u32)> {
        let (priority, _) = self.occupied.peek()?;
        self.heads[priority as usize].map(|k| (k, priority))
    }

    /// Insert at the tail of `priority`'s band.
    pub fn push_back(&mut self, store: &mut impl LinkStore<K>, key: K, priority: u32) {
        let p = priority as usize;
        let old_tail = self.tails[p];
        store.set_link(key, Link { prev: old_tail, next: None });
        if let Some(tail) = old_tail {
            let mut tail_link = store.link(tail);
            tail_link.next = Some(key);
            store.set_link(tail, tail_link);
        } else {
            self.heads[p] = Some(key);
            self.occupied.push(priority, priority);
        }
        self.tails[p] = Some(key);
    }

    /// Insert at the head of `priority`'s band (used by `put_back`).
    pub fn push_front(&mut self, store: &mut impl LinkStore<K>, key: K, priority: u32) {
        let p = priority as usize;
        let old_head = self.heads[p];
        store.set_link(key, Link { prev: None, next: old_head });
        if let Some(head) = old_head {
            let mut head_link = store.link(head);
            head_link.prev = Some(key);
            store.set_link(head, head_link);
        } else {
            self.tails[p] = Some(key);
            self.occupied.push(priority, priority);
        }
        self.heads[p] = Some(key);
    }

    /// Unlink `key` from band `priority`. The caller supplies the
    /// priority because elements do not self-report it; callers track
    /// their own current priority (thread scheduling state does).
    pub fn remove(&mut self, store: &mut impl LinkStore<K>, key: K, priority: u32) {
        let p = priority as usize;
        let Link { prev, next } = store.link(key);

        match prev {
            Some(prev_key) => {
                let mut prev_link = store.link(prev_key);
                prev_link.next = next;
                store.set_link(prev_key, prev_link);
            }
            None => self.heads[p] = next,
        }

        match next {
            Some(next_key) => {
                let mut next_link = store.link(next_key);
                next_link.prev = prev;
                store.set_link(next_key, next_link);
            }
            None => self.tails[p] = prev,
        }

        store.set_link(key, Link { prev: None, next: None });

        if self.heads[p].is_none() {
            debug_assert!(self.tails[p].is_none());
            self.occupied.remove(priority);
        }
    }

    /// Priorities with at least one element, highest first. `O(MaxPrio)`;
    /// acceptable for the diagnostic/iteration use case (not the hot
    /// `peek_maximum` path, which uses the sentinel heap instead).
    pub fn priorities_desc(&self) -> impl Iterator<Item = u32> + '_ {
        (0..=MAX_PRIORITY).rev().filter(|&p| self.heads[p as usize].is_some())
    }

    /// Walk a single band head-to-tail.
    pub fn iter_band<'a>(
        &'a self,
        store: &'a impl LinkStore<K>,
        priority: u32,
    ) -> BandIter<'a, K, impl LinkStore<K>> {
        BandIter { store, next: self.heads[priority as usize] }
    }
}

pub struct BandIter<'a, K, S: LinkStore<K>> {
    store: &'a S,
    next: Option<K>,
}

impl<'a, K: Copy + Eq, S: LinkStore<K>> Iterator for BandIter<'a, K, S> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let key = self.next?;
        self.next = self.store.link(key).next;
        Some(key)
    }
}
