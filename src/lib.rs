//! Keel - the storage engine core of an educational relational database.
//!
//! The engine is disk-oriented: data lives in fixed-size pages in a database
//! file, and a buffer pool caches a bounded number of them in memory. Four
//! subsystems stack on top of each other:
//!
//! - **LRU-K replacer** (`buffer`): picks eviction victims, preferring frames
//!   with fewer than K recorded accesses and falling back to LRU on the
//!   K-th-most-recent access.
//! - **Extendible hash table** (`container`): the buffer pool's page-id to
//!   frame-id directory, growing by directory doubling and bucket splitting.
//! - **Buffer pool manager** (`buffer`): owns the frames and serves pinned
//!   page access through RAII read/write guards, coordinating the replacer,
//!   the directory, and the disk layer.
//! - **B+Tree index** (`index`): a disk-resident ordered index built on the
//!   buffer pool, with latch-crabbing traversal, split propagation on insert,
//!   coalesce/redistribute on delete, and an ordered leaf-chain iterator.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel::buffer::BufferPoolManager;
//! use keel::index::{BPlusTree, IndexKey, IntegerComparator};
//! use keel::storage::disk::DiskManager;
//! use keel::{PageId, RecordId, SlotId};
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let tree = BPlusTree::new("orders_pk", Arc::clone(&bpm), IntegerComparator, 64, 64);
//! let key = IndexKey::from_u64(42);
//! tree.insert(&key, RecordId::new(PageId::new(7), SlotId::new(0))).unwrap();
//! assert!(tree.get_value(&key).unwrap().is_some());
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, RecordId, Result, SlotId, StoreError};
