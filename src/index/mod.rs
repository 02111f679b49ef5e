pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod key_comparator;

pub use btree_index::BPlusTree;
pub use btree_iterator::IndexIterator;
pub use btree_page::{
    page_type, IndexPageType, InternalNode, InternalNodeRef, LeafNode, LeafNodeRef,
    MAX_INTERNAL_SIZE, MAX_LEAF_SIZE,
};
pub use key_comparator::{BytewiseComparator, IndexKey, IntegerComparator, KeyComparator, KEY_SIZE};
