use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{PageId, RecordId, Result, StoreError, HEADER_PAGE_ID};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::btree_iterator::IndexIterator;
use super::btree_page::{
    page_type, IndexPageType, InternalNode, InternalNodeRef, LeafNode, LeafNodeRef,
    MAX_INTERNAL_SIZE, MAX_LEAF_SIZE,
};
use super::key_comparator::{IndexKey, KeyComparator};

/// What a write-mode descent is about to do; decides when a node is safe
/// enough to let go of its ancestors' latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LatchIntent {
    Insert,
    Delete,
}

/// Disk-resident B+Tree index over the buffer pool.
///
/// The root page id lives in the header page (page 0) under the tree's name,
/// so every operation latches the header first. Traversal uses latch
/// crabbing: readers release each parent as soon as the child is latched;
/// writers keep a stack of ancestor latches until the current node proves it
/// cannot split or underflow, and that stack then doubles as the ancestor
/// chain for split/merge propagation.
pub struct BPlusTree<C: KeyComparator> {
    name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl<C: KeyComparator> BPlusTree<C> {
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Self {
        assert!(
            (2..=MAX_LEAF_SIZE).contains(&leaf_max_size),
            "leaf max size out of range"
        );
        assert!(
            (3..=MAX_INTERNAL_SIZE).contains(&internal_max_size),
            "internal max size out of range"
        );
        Self {
            name: name.into(),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True until the first insert creates a root.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()?.is_none())
    }

    /// Root page id recorded in the header page, if the tree has one.
    pub fn root_page_id(&self) -> Result<Option<PageId>> {
        let header = self.bpm.read_page(HEADER_PAGE_ID)?;
        Ok(HeaderPageRef::new(header.data()).get_root_id(&self.name))
    }

    /// Point lookup. Keys are unique, so at most one record comes back.
    pub fn get_value(&self, key: &IndexKey) -> Result<Option<RecordId>> {
        match self.find_leaf_read(Some(key))? {
            Some(guard) => Ok(LeafNodeRef::new(guard.data()).lookup(key, &self.comparator)),
            None => Ok(None),
        }
    }

    /// Iterator over the whole tree in key order.
    pub fn begin(&self) -> Result<IndexIterator> {
        match self.find_leaf_read(None)? {
            Some(guard) => Ok(IndexIterator::new(
                Arc::clone(&self.bpm),
                Some(guard.page_id()),
                0,
            )),
            None => Ok(self.end()),
        }
    }

    /// Iterator starting at the smallest key >= `key`.
    pub fn begin_at(&self, key: &IndexKey) -> Result<IndexIterator> {
        match self.find_leaf_read(Some(key))? {
            Some(guard) => {
                let index = LeafNodeRef::new(guard.data()).key_index(key, &self.comparator);
                Ok(IndexIterator::new(
                    Arc::clone(&self.bpm),
                    Some(guard.page_id()),
                    index,
                ))
            }
            None => Ok(self.end()),
        }
    }

    /// The exhausted-iterator sentinel.
    pub fn end(&self) -> IndexIterator {
        IndexIterator::new(Arc::clone(&self.bpm), None, 0)
    }

    /// Unique-key insert. Returns false when `key` is already present.
    pub fn insert(&self, key: &IndexKey, value: RecordId) -> Result<bool> {
        let mut header = self.bpm.write_page(HEADER_PAGE_ID)?;
        let root = HeaderPageRef::new(header.data()).get_root_id(&self.name);
        let Some(root) = root else {
            // Empty tree: the first leaf becomes the root, recorded in the
            // header while its write latch is still held.
            let leaf_id = self.bpm.new_page()?;
            {
                let mut guard = self.bpm.write_page(leaf_id)?;
                let mut leaf = LeafNode::new(guard.data_mut());
                leaf.init(leaf_id, self.leaf_max_size);
                leaf.insert(key, value, &self.comparator);
            }
            let mut h = HeaderPage::new(header.data_mut());
            if !h.update_record(&self.name, leaf_id) {
                h.insert_record(&self.name, leaf_id)?;
            }
            debug!("index {} started at root {leaf_id}", self.name);
            return Ok(true);
        };

        let mut stack = vec![header];
        self.find_leaf_write(&mut stack, root, Some(key), LatchIntent::Insert)?;

        let (duplicate, has_room) = {
            let guard = stack.last().unwrap();
            let leaf = LeafNodeRef::new(guard.data());
            (
                leaf.lookup(key, &self.comparator).is_some(),
                leaf.size() < leaf.max_size(),
            )
        };
        if duplicate {
            return Ok(false);
        }
        if has_room {
            let guard = stack.last_mut().unwrap();
            LeafNode::new(guard.data_mut()).insert(key, value, &self.comparator);
            return Ok(true);
        }

        // Full leaf: split it, splice the new leaf into the chain, and thread
        // the separator up through the retained ancestors. Both leaf latches
        // stay held until propagation finishes so no reader can cross the
        // half-linked boundary.
        let mut leaf_guard = stack.pop().unwrap();
        let leaf_id = leaf_guard.page_id();
        let new_leaf_id = self.bpm.new_page()?;
        let mut new_guard = self.bpm.write_page(new_leaf_id)?;
        let split_key = {
            let mut old_leaf = LeafNode::new(leaf_guard.data_mut());
            let mut new_leaf = LeafNode::new(new_guard.data_mut());
            new_leaf.init(new_leaf_id, self.leaf_max_size);
            let upper = old_leaf.split_off_upper();
            new_leaf.extend(&upper);
            new_leaf.set_next_page_id(old_leaf.next_page_id());
            old_leaf.set_next_page_id(Some(new_leaf_id));
            let split_key = new_leaf.key_at(0);
            if self
                .comparator
                .compare(key.as_bytes(), split_key.as_bytes())
                == Ordering::Less
            {
                old_leaf.insert(key, value, &self.comparator);
            } else {
                new_leaf.insert(key, value, &self.comparator);
            }
            split_key
        };
        debug!("leaf {leaf_id} split into {new_leaf_id}");
        self.insert_into_parent(&mut stack, leaf_id, split_key, new_leaf_id)?;
        Ok(true)
    }

    /// Deletes `key` if present; a missing key is a silent no-op. Underfull
    /// leaves borrow from or merge with a sibling, propagating upward under
    /// the retained ancestor latches.
    pub fn remove(&self, key: &IndexKey) -> Result<()> {
        let header = self.bpm.write_page(HEADER_PAGE_ID)?;
        let Some(root) = HeaderPageRef::new(header.data()).get_root_id(&self.name) else {
            return Ok(());
        };
        let mut stack = vec![header];
        self.find_leaf_write(&mut stack, root, Some(key), LatchIntent::Delete)?;

        if stack.len() == 1 {
            // The leaf proved safe, so every ancestor is already released.
            let guard = stack.last_mut().unwrap();
            LeafNode::new(guard.data_mut()).remove(key, &self.comparator);
            return Ok(());
        }

        let removed = {
            let guard = stack.last_mut().unwrap();
            LeafNode::new(guard.data_mut()).remove(key, &self.comparator)
        };
        if !removed {
            return Ok(());
        }
        let mut orphaned = Vec::new();
        self.coalesce_or_redistribute(&mut stack, &mut orphaned)?;
        // Latches first, then page deletion: a page cannot be deleted while
        // its guard still pins it.
        drop(stack);
        for page_id in orphaned {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Read-crab down to the leaf that owns `key` (leftmost leaf when `None`).
    /// Returns `None` on an empty tree.
    fn find_leaf_read(&self, key: Option<&IndexKey>) -> Result<Option<ReadPageGuard>> {
        let header = self.bpm.read_page(HEADER_PAGE_ID)?;
        let Some(root) = HeaderPageRef::new(header.data()).get_root_id(&self.name) else {
            return Ok(None);
        };
        let mut guard = self.bpm.read_page(root)?;
        drop(header);
        loop {
            let child = match page_type(guard.data()) {
                Some(IndexPageType::Leaf) => return Ok(Some(guard)),
                Some(IndexPageType::Internal) => {
                    let node = InternalNodeRef::new(guard.data());
                    match key {
                        Some(k) => node.lookup(k, &self.comparator),
                        None => node.child_at(0),
                    }
                }
                None => {
                    return Err(StoreError::IndexCorrupted(format!(
                        "untyped page {} on search path",
                        guard.page_id()
                    )))
                }
            };
            // Latch the child before the parent goes; the assignment drops
            // the parent guard after the child guard exists.
            let child_guard = self.bpm.read_page(child)?;
            guard = child_guard;
        }
    }

    /// Write-crab from `root` down to the target leaf, pushing every latched
    /// node onto `stack` (which starts as `[header]`). Whenever a node proves
    /// safe for `intent`, all its ancestors are released; what remains on the
    /// stack afterwards is the contiguous unsafe suffix of the path.
    fn find_leaf_write(
        &self,
        stack: &mut Vec<WritePageGuard>,
        root: PageId,
        key: Option<&IndexKey>,
        intent: LatchIntent,
    ) -> Result<()> {
        let mut current = root;
        let mut at_root = true;
        loop {
            let guard = self.bpm.write_page(current)?;
            let (safe, next) = match page_type(guard.data()) {
                Some(IndexPageType::Leaf) => {
                    let leaf = LeafNodeRef::new(guard.data());
                    let safe = match intent {
                        LatchIntent::Insert => leaf.size() < leaf.max_size(),
                        // A root leaf may shrink to empty without repair.
                        LatchIntent::Delete => at_root || leaf.size() > leaf.min_size(),
                    };
                    (safe, None)
                }
                Some(IndexPageType::Internal) => {
                    let node = InternalNodeRef::new(guard.data());
                    let safe = match intent {
                        LatchIntent::Insert => node.size() < node.max_size(),
                        LatchIntent::Delete => {
                            if at_root {
                                // Only a root about to lose its second child
                                // needs the header retained for the collapse.
                                node.size() > 2
                            } else {
                                node.size() > node.min_size()
                            }
                        }
                    };
                    let child = match key {
                        Some(k) => node.lookup(k, &self.comparator),
                        None => node.child_at(0),
                    };
                    (safe, Some(child))
                }
                None => {
                    return Err(StoreError::IndexCorrupted(format!(
                        "untyped page {current} on search path"
                    )))
                }
            };
            stack.push(guard);
            if safe {
                stack.drain(..stack.len() - 1);
            }
            match next {
                Some(child) => current = child,
                None => return Ok(()),
            }
            at_root = false;
        }
    }

    /// After `old_id` split and `new_id` took its upper half, record the
    /// separator in the parent at the top of `stack`, splitting upward as
    /// needed. A header page at the top means `old_id` was the root.
    fn insert_into_parent(
        &self,
        stack: &mut Vec<WritePageGuard>,
        old_id: PageId,
        split_key: IndexKey,
        new_id: PageId,
    ) -> Result<()> {
        let top = stack.last_mut().expect("split node has no retained parent");
        if top.page_id() == HEADER_PAGE_ID {
            let root_id = self.bpm.new_page()?;
            {
                let mut guard = self.bpm.write_page(root_id)?;
                let mut root = InternalNode::new(guard.data_mut());
                root.init(root_id, self.internal_max_size);
                root.populate_new_root(old_id, &split_key, new_id);
            }
            let updated = HeaderPage::new(top.data_mut()).update_record(&self.name, root_id);
            debug_assert!(updated, "root record vanished from the header page");
            debug!("index {} grew a new root {root_id}", self.name);
            return Ok(());
        }

        let has_room = {
            let parent = InternalNodeRef::new(top.data());
            parent.size() < parent.max_size()
        };
        if has_room {
            InternalNode::new(top.data_mut()).insert_node_after(old_id, &split_key, new_id);
            return Ok(());
        }

        // Full parent: insert virtually, take the median up, give the upper
        // half (seeded by the median's child) to a fresh internal page.
        let mut parent_guard = stack.pop().unwrap();
        let parent_id = parent_guard.page_id();
        let new_parent_id = self.bpm.new_page()?;
        let mut new_guard = self.bpm.write_page(new_parent_id)?;
        let median_key = {
            let mut parent = InternalNode::new(parent_guard.data_mut());
            let mut entries = parent.entries();
            let pos = entries
                .iter()
                .position(|(_, child)| *child == old_id)
                .expect("split child missing from its parent");
            entries.insert(pos + 1, (split_key, new_id));
            let mid = entries.len() / 2;
            let median_key = entries[mid].0;
            let mut new_parent = InternalNode::new(new_guard.data_mut());
            new_parent.init(new_parent_id, self.internal_max_size);
            new_parent.set_entries(&entries[mid..]);
            parent.set_entries(&entries[..mid]);
            median_key
        };
        debug!("internal {parent_id} split into {new_parent_id}");
        self.insert_into_parent(stack, parent_id, median_key, new_parent_id)
    }

    /// The node at the top of `stack` fell below its minimum. Borrow from a
    /// sibling when the two sides together overflow one page, otherwise merge
    /// into the left side and recurse on the parent if it underflows in turn.
    /// Drained pages land in `orphaned` for deletion after latch release.
    fn coalesce_or_redistribute(
        &self,
        stack: &mut Vec<WritePageGuard>,
        orphaned: &mut Vec<PageId>,
    ) -> Result<()> {
        let mut node_guard = stack.pop().unwrap();
        let node_id = node_guard.page_id();
        let parent_guard = stack
            .last_mut()
            .expect("underfull node has no retained parent");

        // Prefer the left sibling; only the leftmost child borrows right.
        let (node_index, sibling_id, sibling_is_left) = {
            let parent = InternalNodeRef::new(parent_guard.data());
            let idx = parent
                .child_index_of(node_id)
                .expect("underfull node missing from its parent");
            if idx == 0 {
                (0, parent.child_at(1), false)
            } else {
                (idx, parent.child_at(idx - 1), true)
            }
        };
        let mut sibling_guard = self.bpm.write_page(sibling_id)?;

        let drained = match page_type(node_guard.data()) {
            Some(IndexPageType::Leaf) => self.rebalance_leaf(
                &mut node_guard,
                &mut sibling_guard,
                parent_guard,
                node_index,
                sibling_is_left,
            ),
            Some(IndexPageType::Internal) => self.rebalance_internal(
                &mut node_guard,
                &mut sibling_guard,
                parent_guard,
                node_index,
                sibling_is_left,
            ),
            None => {
                return Err(StoreError::IndexCorrupted(format!(
                    "untyped page {node_id} during rebalance"
                )))
            }
        };
        let Some(drained_id) = drained else {
            return Ok(()); // redistribution fixed the underflow in place
        };
        orphaned.push(drained_id);
        drop(node_guard);
        drop(sibling_guard);

        let parent_size = {
            let guard = stack.last().unwrap();
            InternalNodeRef::new(guard.data()).size()
        };
        if stack.len() == 2 && stack[0].page_id() == HEADER_PAGE_ID {
            // The parent is the root; collapse it once a single child is left.
            if parent_size == 1 {
                let parent_guard = stack.pop().unwrap();
                let new_root = InternalNodeRef::new(parent_guard.data()).child_at(0);
                orphaned.push(parent_guard.page_id());
                drop(parent_guard);
                let header = stack.last_mut().unwrap();
                let updated =
                    HeaderPage::new(header.data_mut()).update_record(&self.name, new_root);
                debug_assert!(updated, "root record vanished from the header page");
                debug!("index {} root collapsed to {new_root}", self.name);
            }
            return Ok(());
        }
        let parent_min = {
            let guard = stack.last().unwrap();
            InternalNodeRef::new(guard.data()).min_size()
        };
        // The stack bottom is a node that proved safe during the descent (or
        // an under-minimum root, which needs no repair); recurse only while a
        // retained parent remains above it.
        if parent_size < parent_min && stack.len() >= 2 {
            self.coalesce_or_redistribute(stack, orphaned)?;
        }
        Ok(())
    }

    fn rebalance_leaf(
        &self,
        node_guard: &mut WritePageGuard,
        sibling_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        node_index: usize,
        sibling_is_left: bool,
    ) -> Option<PageId> {
        let mut node = LeafNode::new(node_guard.data_mut());
        let mut sibling = LeafNode::new(sibling_guard.data_mut());
        let mut parent = InternalNode::new(parent_guard.data_mut());

        if sibling.size() + node.size() > node.max_size() {
            // Borrow one pair across the boundary and rewrite the separator.
            if sibling_is_left {
                let (key, record) = sibling.pop_back();
                node.push_front(&key, record);
                parent.set_key_at(node_index, &key);
            } else {
                let (key, record) = sibling.pop_front();
                node.extend(&[(key, record)]);
                parent.set_key_at(1, &sibling.key_at(0));
            }
            return None;
        }

        // Merge into the left page and bypass the right one in the chain.
        if sibling_is_left {
            let moved = node.drain_all();
            sibling.extend(&moved);
            sibling.set_next_page_id(node.next_page_id());
            parent.remove_at(node_index);
            debug!("leaf {} merged into {}", node.page_id(), sibling.page_id());
            Some(node.page_id())
        } else {
            let moved = sibling.drain_all();
            node.extend(&moved);
            node.set_next_page_id(sibling.next_page_id());
            parent.remove_at(1);
            debug!("leaf {} merged into {}", sibling.page_id(), node.page_id());
            Some(sibling.page_id())
        }
    }

    fn rebalance_internal(
        &self,
        node_guard: &mut WritePageGuard,
        sibling_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        node_index: usize,
        sibling_is_left: bool,
    ) -> Option<PageId> {
        let mut node = InternalNode::new(node_guard.data_mut());
        let mut sibling = InternalNode::new(sibling_guard.data_mut());
        let mut parent = InternalNode::new(parent_guard.data_mut());

        if sibling.size() + node.size() > node.max_size() {
            // One child crosses the boundary. The parent's separator drops
            // into the receiving node and the donated boundary key replaces it.
            if sibling_is_left {
                let separator = parent.key_at(node_index);
                let mut sibling_entries = sibling.entries();
                let (donated_key, donated_child) = sibling_entries.pop().unwrap();
                sibling.set_entries(&sibling_entries);

                let mut node_entries = node.entries();
                node_entries[0].0 = separator;
                node_entries.insert(0, (IndexKey::zeroed(), donated_child));
                node.set_entries(&node_entries);
                parent.set_key_at(node_index, &donated_key);
            } else {
                let separator = parent.key_at(1);
                let mut sibling_entries = sibling.entries();
                let (_, donated_child) = sibling_entries.remove(0);
                let hoisted = sibling_entries[0].0;
                sibling_entries[0].0 = IndexKey::zeroed();
                sibling.set_entries(&sibling_entries);

                let mut node_entries = node.entries();
                node_entries.push((separator, donated_child));
                node.set_entries(&node_entries);
                parent.set_key_at(1, &hoisted);
            }
            return None;
        }

        // Merge into the left side; the separator comes down as the first
        // meaningful key of the moved block.
        if sibling_is_left {
            let mut moved = node.entries();
            moved[0].0 = parent.key_at(node_index);
            let mut merged = sibling.entries();
            merged.extend(moved);
            sibling.set_entries(&merged);
            parent.remove_at(node_index);
            debug!(
                "internal {} merged into {}",
                node.page_id(),
                sibling.page_id()
            );
            Some(node.page_id())
        } else {
            let mut moved = sibling.entries();
            moved[0].0 = parent.key_at(1);
            let mut merged = node.entries();
            merged.extend(moved);
            node.set_entries(&merged);
            parent.remove_at(1);
            debug!(
                "internal {} merged into {}",
                sibling.page_id(),
                node.page_id()
            );
            Some(sibling.page_id())
        }
    }
}
