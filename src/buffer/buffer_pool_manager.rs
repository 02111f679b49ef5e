use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{
    FrameId, PageId, Result, StoreError, DEFAULT_HASH_BUCKET_SIZE, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::container::ExtendibleHashTable;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Pool state shared with the page guards.
pub(crate) struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// Free frames. Its mutex doubles as the pool latch: every operation that
    /// changes page residency holds this lock from start to finish.
    free_list: Mutex<VecDeque<FrameId>>,
    /// Directory mapping resident page ids to frame ids
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Disk I/O worker
    disk_scheduler: DiskScheduler,
}

impl BufferPoolState {
    /// Guard drop hook: report dirtiness and give the pin back.
    pub(crate) fn release(&self, page_id: PageId, is_dirty: bool) {
        self.unpin(page_id, is_dirty);
    }

    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _pool = self.free_list.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return false;
        }
        // Dirty is sticky: unpinning clean never clears an earlier dirty.
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Brings `page_id` into the pool pinned, loading it from disk on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        let mut free_list = self.free_list.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut free_list)?;
        let frame = &self.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            free_list.push_back(frame_id);
            return Err(e);
        }

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        Ok(frame_id)
    }

    /// Pops a free frame, evicting a victim when none is free. A dirty victim
    /// is written back before the frame is reused. Caller holds the pool latch.
    fn acquire_frame(&self, free_list: &mut VecDeque<FrameId>) -> Result<FrameId> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(frame_id);
        }
        let Some(frame_id) = self.replacer.evict() else {
            return Err(StoreError::BufferPoolFull);
        };
        let frame = &self.frames[frame_id.as_usize()];
        let victim = frame.page_id();
        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(victim, &data)?;
        }
        self.page_table.remove(&victim);
        frame.reset();
        debug!("evicted {victim} from {frame_id}");
        Ok(frame_id)
    }
}

/// BufferPoolManager serves page requests out of a fixed set of in-memory
/// frames, loading from and writing back to disk as pages move in and out,
/// with the LRU-K policy choosing eviction victims and an extendible hash
/// table as the page directory.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `pool_size` frames and LRU-`replacer_k`
    /// replacement over the given disk manager.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(pool_size > 0, "buffer pool needs at least one frame");
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            state: Arc::new(BufferPoolState {
                frames,
                free_list: Mutex::new(free_list),
                page_table: ExtendibleHashTable::new(DEFAULT_HASH_BUCKET_SIZE),
                replacer: LruKReplacer::new(replacer_k, pool_size),
                disk_scheduler: DiskScheduler::new(disk_manager),
            }),
        }
    }

    /// Allocates a fresh page on disk and installs it in a frame. The new
    /// page starts unpinned and evictable; take a guard to pin it.
    pub fn new_page(&self) -> Result<PageId> {
        let mut free_list = self.state.free_list.lock();
        let frame_id = self.state.acquire_frame(&mut free_list)?;
        let page_id = match self.state.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true);
        Ok(page_id)
    }

    /// Installs a caller-chosen page id as a fresh zeroed resident page.
    /// A no-op when the page is already resident.
    pub fn new_page_with_id(&self, page_id: PageId) -> Result<PageId> {
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }
        let mut free_list = self.state.free_list.lock();
        if self.state.page_table.find(&page_id).is_some() {
            return Ok(page_id);
        }
        let frame_id = self.state.acquire_frame(&mut free_list)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        frame.reset();
        frame.set_page_id(page_id);
        frame.set_dirty(true);
        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true);
        Ok(page_id)
    }

    /// Pins `page_id` and takes its read latch.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }
        let frame_id = self.state.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Pins `page_id` and takes its write latch.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }
        let frame_id = self.state.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Gives back one pin on `page_id`, folding `is_dirty` into the frame.
    /// Returns false when the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes `page_id` back to disk regardless of its pin count and clears
    /// the dirty flag. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }
        let frame = {
            let _pool = self.state.free_list.lock();
            let Some(frame_id) = self.state.page_table.find(&page_id) else {
                return Ok(false);
            };
            Arc::clone(&self.state.frames[frame_id.as_usize()])
        };
        // Waiting for the page latch must happen outside the pool latch, or a
        // latch holder blocked on a fetch would deadlock against us.
        self.flush_frame(&frame, page_id)
    }

    /// Writes every frame holding a valid page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            self.flush_frame(frame, page_id)?;
        }
        Ok(())
    }

    /// Flushes one frame under its page latch, skipping it if the frame was
    /// repurposed since the caller looked up `expected`.
    fn flush_frame(&self, frame: &FrameHeader, expected: PageId) -> Result<bool> {
        let data = frame.data.read();
        if frame.page_id() != expected {
            return Ok(false);
        }
        self.state
            .disk_scheduler
            .schedule_write_sync(expected, &data[..])?;
        frame.set_dirty(false);
        Ok(true)
    }

    /// Drops `page_id` from the pool and deallocates it on disk. Returns
    /// `Ok(true)` when the page was not resident (nothing to do); fails on a
    /// pinned page.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut free_list = self.state.free_list.lock();
        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Err(StoreError::PageStillPinned(page_id));
        }
        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        free_list.push_back(frame_id);
        self.state
            .disk_scheduler
            .disk_manager()
            .deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _pool = self.state.free_list.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.state.disk_scheduler.disk_manager()
    }
}
