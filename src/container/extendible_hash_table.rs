use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use log::trace;
use parking_lot::Mutex;

struct Bucket<K, V> {
    /// Local depth: the number of low hash bits shared by every directory
    /// slot referencing this bucket.
    depth: usize,
    items: Vec<(K, V)>,
}

struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    /// 2^global_depth slots, each an index into `buckets`.
    slots: Vec<usize>,
    /// Bucket arena; every entry is referenced by at least one slot. A split
    /// rewrites the split bucket in place and appends its twin, so ids stay
    /// stable.
    buckets: Vec<Bucket<K, V>>,
}

/// Extendible hash table with a dynamically-doubled directory.
///
/// All operations go through one table-wide latch, so a split (including a
/// directory doubling) is never observable half-done. Values are returned by
/// clone. The default hasher is deterministic across runs.
pub struct ExtendibleHashTable<K, V, S = BuildHasherDefault<DefaultHasher>> {
    bucket_size: usize,
    hasher: S,
    state: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a table whose buckets hold up to `bucket_size` entries each.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, BuildHasherDefault::default())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size >= 1, "bucket size must be at least 1");
        Self {
            bucket_size,
            hasher,
            state: Mutex::new(Directory {
                global_depth: 0,
                num_buckets: 1,
                slots: vec![0],
                buckets: vec![Bucket {
                    depth: 0,
                    items: Vec::new(),
                }],
            }),
        }
    }

    fn index_of(&self, key: &K, global_depth: usize) -> usize {
        let mask = (1usize << global_depth) - 1;
        self.hasher.hash_one(key) as usize & mask
    }

    /// Looks up `key`, returning a copy of its value.
    pub fn find(&self, key: &K) -> Option<V> {
        let state = self.state.lock();
        let idx = self.index_of(key, state.global_depth);
        let bucket = &state.buckets[state.slots[idx]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts or updates `key`. A full target bucket is split, doubling the
    /// directory first when its local depth has caught up with the global
    /// depth; pathological collisions may need several rounds, hence the loop.
    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        loop {
            let idx = self.index_of(&key, state.global_depth);
            let id = state.slots[idx];
            let bucket = &mut state.buckets[id];
            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if bucket.items.len() < self.bucket_size {
                bucket.items.push((key, value));
                return;
            }

            let depth = bucket.depth;
            if depth == state.global_depth {
                state.global_depth += 1;
                // Each new slot mirrors its low-bit twin.
                for i in 0..state.slots.len() {
                    let twin = state.slots[i];
                    state.slots.push(twin);
                }
                trace!(
                    "hash directory doubled to global depth {}",
                    state.global_depth
                );
            }

            // Replace the full bucket with two at depth + 1: the old arena id
            // keeps the slots whose next bit is 0, the appended twin takes the
            // slots whose next bit is 1.
            let spilled = std::mem::take(&mut state.buckets[id].items);
            state.buckets[id].depth = depth + 1;
            let twin_id = state.buckets.len();
            state.buckets.push(Bucket {
                depth: depth + 1,
                items: Vec::new(),
            });
            state.num_buckets += 1;

            let low_mask = (1usize << depth) - 1;
            let shared = idx & low_mask;
            for i in 0..state.slots.len() {
                if i & low_mask == shared {
                    state.slots[i] = if i & (1 << depth) != 0 { twin_id } else { id };
                }
            }

            // Redistribution cannot overflow: at most bucket_size entries land
            // in two buckets of that capacity. Only the incoming key retries.
            let global_depth = state.global_depth;
            for (k, v) in spilled {
                let target = state.slots[self.index_of(&k, global_depth)];
                state.buckets[target].items.push((k, v));
            }
        }
    }

    /// Removes `key`, reporting whether it was present. Buckets are never
    /// merged and the directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let mut state = self.state.lock();
        let idx = self.index_of(key, state.global_depth);
        let id = state.slots[idx];
        let bucket = &mut state.buckets[id];
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn global_depth(&self) -> usize {
        self.state.lock().global_depth
    }

    /// Local depth of the bucket referenced by directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let state = self.state.lock();
        state.buckets[state.slots[dir_index]].depth
    }

    pub fn num_buckets(&self) -> usize {
        self.state.lock().num_buckets
    }

    /// Total number of stored entries.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hasher;

    /// Hasher that reports integer keys verbatim, so tests control bucket
    /// placement bit-by-bit.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for (i, b) in bytes.iter().enumerate().take(8) {
                self.0 |= (*b as u64) << (8 * i);
            }
        }

        fn write_u32(&mut self, v: u32) {
            self.0 = v as u64;
        }

        fn write_u64(&mut self, v: u64) {
            self.0 = v;
        }
    }

    type IdentityTable<V> = ExtendibleHashTable<u32, V, BuildHasherDefault<IdentityHasher>>;

    fn identity_table<V: Clone>(bucket_size: usize) -> IdentityTable<V> {
        ExtendibleHashTable::with_hasher(bucket_size, BuildHasherDefault::default())
    }

    #[test]
    fn test_hash_table_find_insert_remove() {
        let table = ExtendibleHashTable::new(4);

        assert_eq!(table.find(&1u32), None);
        table.insert(1, "a");
        table.insert(2, "b");
        assert_eq!(table.find(&1), Some("a"));
        assert_eq!(table.find(&2), Some("b"));

        // Insert on an existing key updates in place.
        table.insert(1, "c");
        assert_eq!(table.find(&1), Some("c"));
        assert_eq!(table.len(), 2);

        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
        assert_eq!(table.find(&2), Some("b"));
    }

    #[test]
    fn test_hash_table_split_and_double() {
        let table = identity_table(2);
        assert_eq!(table.global_depth(), 0);
        assert_eq!(table.num_buckets(), 1);

        // Hashes 0b00 and 0b10 fill the single bucket; 0b01 forces a split.
        table.insert(0b00, 0u32);
        table.insert(0b10, 1);
        table.insert(0b01, 2);

        assert_eq!(table.global_depth(), 1);
        assert_eq!(table.num_buckets(), 2);
        assert_eq!(table.find(&0b00), Some(0));
        assert_eq!(table.find(&0b10), Some(1));
        assert_eq!(table.find(&0b01), Some(2));

        // 0b00 and 0b10 still collide at depth 1; one more even key splits
        // that bucket again and doubles the directory to depth 2.
        table.insert(0b100, 3);
        assert_eq!(table.global_depth(), 2);
        assert_eq!(table.num_buckets(), 3);
        for (k, v) in [(0b00u32, 0u32), (0b10, 1), (0b01, 2), (0b100, 3)] {
            assert_eq!(table.find(&k), Some(v));
        }
    }

    #[test]
    fn test_hash_table_local_depths_after_split() {
        let table = identity_table(2);
        table.insert(0, 0u32);
        table.insert(2, 1);
        table.insert(1, 2);

        // Slot 0 (even hashes) and slot 1 (odd hashes) each sit at local
        // depth 1 after the first split.
        assert_eq!(table.local_depth(0), 1);
        assert_eq!(table.local_depth(1), 1);
    }

    #[test]
    fn test_hash_table_growth_invariant() {
        let table = ExtendibleHashTable::new(2);
        for i in 0..256u32 {
            table.insert(i, i * 10);
        }
        assert_eq!(table.len(), 256);
        assert!(table.num_buckets() <= 1 << table.global_depth());
        for i in 0..256u32 {
            assert_eq!(table.find(&i), Some(i * 10));
        }
        assert_eq!(table.find(&999), None);
    }

    #[test]
    fn test_hash_table_concurrent_inserts() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(ExtendibleHashTable::new(4));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        let key = t * 1000 + i;
                        table.insert(key, key as u64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 2000);
        for t in 0..4u32 {
            for i in 0..500u32 {
                let key = t * 1000 + i;
                assert_eq!(table.find(&key), Some(key as u64));
            }
        }
    }
}
