use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result};

use super::btree_page::LeafNodeRef;
use super::key_comparator::IndexKey;

/// Forward iterator over the leaf chain, yielding pairs by copy.
///
/// Positions are (page id, slot); each advance pins the current leaf just
/// long enough to read one entry, so the iterator never holds more than one
/// pinned page and holds nothing between calls. `None` as the page id is the
/// end sentinel.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    page_id: Option<PageId>,
    index: usize,
}

impl IndexIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: Option<PageId>, index: usize) -> Self {
        Self {
            bpm,
            page_id,
            index,
        }
    }

    pub fn is_end(&self) -> bool {
        self.page_id.is_none()
    }

    /// Yields the next pair, following `next_page_id` across leaves.
    pub fn next_entry(&mut self) -> Result<Option<(IndexKey, RecordId)>> {
        while let Some(page_id) = self.page_id {
            let guard = self.bpm.read_page(page_id)?;
            let leaf = LeafNodeRef::new(guard.data());
            if self.index < leaf.size() {
                let entry = (leaf.key_at(self.index), leaf.record_at(self.index));
                self.index += 1;
                return Ok(Some(entry));
            }
            self.page_id = leaf.next_page_id();
            self.index = 0;
        }
        Ok(None)
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(IndexKey, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
