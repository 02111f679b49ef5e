use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::BufferPoolState;
use super::FrameHeader;

/// RAII guard for read access to a pinned page. Holds the page's read latch
/// for its whole lifetime and unpins the page on drop.
pub struct ReadPageGuard {
    page_id: PageId,
    /// Keeps the frame alive for as long as the latch guard below exists
    _frame: Arc<FrameHeader>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    pool: Arc<BufferPoolState>,
}

impl ReadPageGuard {
    /// # Safety
    /// The `'static` latch guard is a lie the `Arc` makes true: the frame
    /// outlives the guard because the guard owns a strong reference to it.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            page_id,
            _frame: frame,
            data_guard: Some(data_guard),
            pool,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch before the pin: a latch must never outlive its pin.
        self.data_guard.take();
        self.pool.release(self.page_id, false);
    }
}

/// RAII guard for exclusive access to a pinned page. Holds the page's write
/// latch, tracks whether the holder touched the data, and unpins on drop,
/// reporting dirtiness to the pool.
pub struct WritePageGuard {
    page_id: PageId,
    _frame: Arc<FrameHeader>,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
    pool: Arc<BufferPoolState>,
    is_dirty: bool,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);
        Self {
            page_id,
            _frame: frame,
            data_guard: Some(data_guard),
            pool,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns the page data for modification and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.data_guard.take();
        self.pool.release(self.page_id, self.is_dirty);
    }
}
