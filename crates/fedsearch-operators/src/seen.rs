//! Bounded "already returned" cache.

use std::collections::{BTreeMap, HashMap};

use fedsearch_core::hit::HitId;

/// Fixed-capacity LRU set of hit identities.
///
/// Owned by exactly one stream; a cloned operation starts with an empty cache.
#[derive(Debug, Clone)]
pub struct SeenHits {
    capacity: usize,
    tick: u64,
    by_id: HashMap<HitId, u64>,
    by_tick: BTreeMap<u64, HitId>,
}

impl SeenHits {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            by_id: HashMap::new(),
            by_tick: BTreeMap::new(),
        }
    }

    /// Record `id`. Returns `false` when it was already present (and refreshes it).
    pub fn insert(&mut self, id: HitId) -> bool {
        self.tick += 1;
        let tick = self.tick;
        if let Some(old) = self.by_id.insert(id.clone(), tick) {
            self.by_tick.remove(&old);
            self.by_tick.insert(tick, id);
            return false;
        }
        self.by_tick.insert(tick, id);
        if self.by_id.len() > self.capacity {
            if let Some((_, evicted)) = self.by_tick.pop_first() {
                self.by_id.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &HitId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_tick.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::id::ItemId;

    fn id(n: u64) -> HitId {
        HitId {
            item_id: ItemId::new(n),
            part: None,
        }
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut s = SeenHits::new(4);
        assert!(s.insert(id(1)));
        assert!(!s.insert(id(1)));
        let part = HitId {
            item_id: ItemId::new(1),
            part: Some("2".into()),
        };
        assert!(s.insert(part));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_least_recently_used_evicted() {
        let mut s = SeenHits::new(2);
        s.insert(id(1));
        s.insert(id(2));
        // touch 1 so 2 becomes the eviction candidate
        s.insert(id(1));
        s.insert(id(3));
        assert!(s.contains(&id(1)));
        assert!(!s.contains(&id(2)));
        assert!(s.contains(&id(3)));
    }
}
