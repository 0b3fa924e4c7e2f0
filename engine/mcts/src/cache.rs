//! Bounded least-recently-used cache of evaluation results.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::evaluator::EvalOutput;

/// LRU map from input fingerprint to evaluation.
///
/// Recency is a monotonically increasing tick; `order` maps ticks back to
/// keys so the oldest entry is found in `O(log n)`.
#[derive(Debug, Default)]
pub struct EvalCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<u64, (Arc<EvalOutput>, u64)>,
    order: BTreeMap<u64, u64>,
    hits: u64,
    misses: u64,
}

impl EvalCache {
    /// A cache holding at most `capacity` entries. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: u64) -> Option<Arc<EvalOutput>> {
        if !self.is_enabled() {
            return None;
        }
        let tick = self.next_tick();
        match self.entries.get_mut(&key) {
            Some((output, last_used)) => {
                self.order.remove(last_used);
                *last_used = tick;
                self.order.insert(tick, key);
                self.hits += 1;
                Some(Arc::clone(output))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: u64, output: Arc<EvalOutput>) {
        if !self.is_enabled() {
            return;
        }
        let tick = self.next_tick();
        if let Some((_, old_tick)) = self.entries.insert(key, (output, tick)) {
            self.order.remove(&old_tick);
        }
        self.order.insert(tick, key);

        while self.entries.len() > self.capacity {
            match self.order.pop_first() {
                Some((_, oldest)) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(v: f32) -> Arc<EvalOutput> {
        Arc::new(EvalOutput {
            policy: vec![1.0],
            win_loss: v,
            score_mean: 0.0,
            score_stdev: 0.0,
            ownership: Vec::new(),
        })
    }

    #[test]
    fn test_get_and_insert() {
        let mut cache = EvalCache::new(4);
        assert!(cache.get(1).is_none());
        cache.insert(1, output(0.5));
        assert_eq!(cache.get(1).unwrap().win_loss, 0.5);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = EvalCache::new(2);
        cache.insert(1, output(0.1));
        cache.insert(2, output(0.2));
        // Touch 1 so that 2 becomes the oldest.
        assert!(cache.get(1).is_some());
        cache.insert(3, output(0.3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }

    #[test]
    fn test_reinsert_does_not_grow() {
        let mut cache = EvalCache::new(2);
        cache.insert(1, output(0.1));
        cache.insert(1, output(0.9));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).unwrap().win_loss, 0.9);
    }

    #[test]
    fn test_disabled_and_clear() {
        let mut disabled = EvalCache::new(0);
        disabled.insert(1, output(0.1));
        assert!(disabled.get(1).is_none());

        let mut cache = EvalCache::new(8);
        cache.insert(1, output(0.1));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(1).is_none());
    }
}
