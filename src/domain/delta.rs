//! Dedup/delta computation
//!
//! A [`SeenSet`] remembers the most recent K delivered transaction ids in
//! insertion order. Eviction is strictly FIFO by first insertion: seeing an id
//! again does not refresh it, so a slow tail of a wide query window cannot push
//! still-relevant ids out early.

use std::collections::{HashSet, VecDeque};

use crate::core::TransactionRecord;

pub const DEFAULT_SEEN_CAPACITY: usize = 200;

/// Bounded memo of already-delivered ids. Only an at-most-once guarantee
/// within process lifetime; not persisted.
#[derive(Debug, Clone)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns false if the id was already present
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }

    /// Split `page` into records not seen before, sorted oldest first, and
    /// remember every id in the page. The indexer's page direction is not
    /// assumed.
    pub fn compute_delta(&mut self, page: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
        if page.is_empty() {
            return page;
        }

        let mut novel: Vec<TransactionRecord> = page
            .into_iter()
            .filter(|record| self.insert(&record.id))
            .collect();

        // Stable sort keeps indexer order within one round time
        novel.sort_by_key(|record| (record.round_time, record.confirmed_round));
        novel
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}

/// Functional form of [`SeenSet::compute_delta`]: consumes the seen set and
/// hands back the updated one alongside the novel records.
pub fn compute_delta(
    page: Vec<TransactionRecord>,
    mut seen: SeenSet,
) -> (Vec<TransactionRecord>, SeenSet) {
    let novel = seen.compute_delta(page);
    (novel, seen)
}
