//! Integration tests for the extendible hash table

use std::hash::{BuildHasherDefault, Hasher};
use std::sync::Arc;
use std::thread;

use keel::container::ExtendibleHashTable;

/// Reports integer keys verbatim so tests can steer bucket placement.
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

#[test]
fn test_hash_table_most_recent_value_wins() {
    let table = ExtendibleHashTable::new(4);

    for i in 0..64u32 {
        table.insert(i, i);
    }
    for i in 0..64u32 {
        table.insert(i, i + 1000);
    }
    for i in 0..64u32 {
        assert_eq!(table.find(&i), Some(i + 1000));
    }
    assert_eq!(table.find(&64), None);
    assert_eq!(table.len(), 64);
}

#[test]
fn test_hash_table_split_sequence() {
    // Bucket capacity 2 at global depth 0; hashes 0b00 and 0b10 collide,
    // and 0b01 forces the first split.
    let table: IdentityTable<u32> = ExtendibleHashTable::with_hasher(2, Default::default());

    table.insert(0b00, 1);
    table.insert(0b10, 2);
    assert_eq!(table.global_depth(), 0);

    table.insert(0b01, 3);
    assert_eq!(table.global_depth(), 1);
    assert_eq!(table.num_buckets(), 2);

    assert_eq!(table.find(&0b00), Some(1));
    assert_eq!(table.find(&0b10), Some(2));
    assert_eq!(table.find(&0b01), Some(3));
}

#[test]
fn test_hash_table_repeated_collisions_deepen_directory() {
    // Keys sharing their low bits pile into one bucket until enough splits
    // separate them; the directory doubles once per round.
    let table: IdentityTable<u32> = ExtendibleHashTable::with_hasher(2, Default::default());

    for i in 0..4u32 {
        table.insert(i << 2, i); // hashes 0b0000, 0b0100, 0b1000, 0b1100
    }
    assert!(table.global_depth() >= 3);
    for i in 0..4u32 {
        assert_eq!(table.find(&(i << 2)), Some(i));
    }
}

#[test]
fn test_hash_table_remove_then_miss() {
    let table = ExtendibleHashTable::new(4);

    for i in 0..32u32 {
        table.insert(i, i);
    }
    for i in (0..32u32).step_by(2) {
        assert!(table.remove(&i));
    }
    for i in 0..32u32 {
        if i % 2 == 0 {
            assert_eq!(table.find(&i), None);
            assert!(!table.remove(&i));
        } else {
            assert_eq!(table.find(&i), Some(i));
        }
    }
}

#[test]
fn test_hash_table_bucket_count_bounded_by_directory() {
    let table = ExtendibleHashTable::new(2);
    for i in 0..512u32 {
        table.insert(i, ());
    }
    assert!(table.num_buckets() <= 1 << table.global_depth());
}

#[test]
fn test_hash_table_concurrent_disjoint_inserts() {
    let table = Arc::new(ExtendibleHashTable::new(4));

    let handles: Vec<_> = (0..8u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..1000u32 {
                    let key = t * 10_000 + i;
                    table.insert(key, key);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.len(), 8000);
    for t in 0..8u32 {
        for i in 0..1000u32 {
            let key = t * 10_000 + i;
            assert_eq!(table.find(&key), Some(key));
        }
    }
    assert!(table.num_buckets() <= 1 << table.global_depth());
}
