//! Operation cache (computed table).
//!
//! Direct-mapped: `2^bits` slots indexed by the low bits of the key hash. A
//! new entry simply overwrites whatever shared its slot, so memory stays
//! bounded by the configured size. Full keys are stored, so a slot collision
//! is a miss and never a wrong answer.

use std::cell::Cell;

use crate::utils::MyHash;

struct Entry<K, V> {
    key: K,
    value: V,
}

pub struct Cache<K, V> {
    data: Vec<Option<Entry<K, V>>>,
    bitmask: u64,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new(14)
    }
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        let bits = bits.min(31);
        let size = 1usize << bits;
        Self {
            data: std::iter::repeat_with(|| None).take(size).collect(),
            bitmask: (size - 1) as u64,
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|e| e.is_none())
    }

    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    pub fn clear(&mut self) {
        self.data.fill_with(|| None);
    }

    fn index(&self, hash: u64) -> usize {
        (hash & self.bitmask) as usize
    }
}

impl<K, V> Cache<K, V>
where
    K: MyHash + Eq,
    V: Clone,
{
    pub fn get(&mut self, key: &K) -> Option<V> {
        let index = self.index(key.hash());
        match &self.data[index] {
            Some(entry) if &entry.key == key => {
                self.hits.set(self.hits.get() + 1);
                Some(entry.value.clone())
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let index = self.index(key.hash());
        self.data[index] = Some(Entry { key, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache() {
        let mut cache = Cache::<(u64, u64), i32>::new(3);

        cache.insert((1, 2), 3);
        cache.insert((2, 3), 1);

        assert_eq!(cache.get(&(1, 2)), Some(3));
        assert_eq!(cache.get(&(2, 3)), Some(1));
        assert_eq!(cache.get(&(2, 1)), None);

        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = Cache::<(u64, u64), u64>::new(2);
        cache.insert((1, 1), 1);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&(1, 1)), None);
    }

    #[test]
    fn test_size_is_bounded() {
        let mut cache = Cache::<(u64, u64), u64>::new(4);
        for a in 0..50 {
            for b in 0..50 {
                cache.insert((a, b), a + b);
            }
        }
        assert_eq!(cache.capacity(), 16);
        assert!(cache.len() <= 16);
    }

    #[test]
    fn test_collision_is_a_miss() {
        // Every key lands in the single slot
        let mut cache = Cache::<(u64, u64), u64>::new(0);
        cache.insert((1, 2), 3);
        cache.insert((4, 5), 9);
        assert_eq!(cache.get(&(1, 2)), None);
        assert_eq!(cache.get(&(4, 5)), Some(9));
    }
}
