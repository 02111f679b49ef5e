use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, StoreError, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages in a single database file
/// and owns the monotonic page id allocator. Page 0 is reserved for the
/// index header page and is written out when a fresh file is created.
pub struct DiskManager {
    file: Mutex<File>,
    file_path: PathBuf,
    /// Number of pages ever allocated; also the next page id to hand out
    num_pages: AtomicU32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens or creates the database file at `file_path`. A fresh file gets
    /// its header page (page 0) zero-initialized on disk.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&file_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            file: Mutex::new(file),
            file_path,
            num_pages: AtomicU32::new(num_pages.max(1)),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            dm.write_page(HEADER_PAGE_ID, &[0u8; PAGE_SIZE])?;
        }

        Ok(dm)
    }

    /// Reads a page into the provided buffer. Reads past the end of the file
    /// come back zero-filled, matching a freshly allocated page.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < PAGE_SIZE {
            let n = file.read(&mut data[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        data[read..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "buffer must be PAGE_SIZE bytes");
        if page_id == INVALID_PAGE_ID {
            return Err(StoreError::InvalidPageId(page_id));
        }

        let offset = page_id.as_u32() as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Hands out the next page id and zero-extends the file to cover it.
    pub fn allocate_page(&self) -> Result<PageId> {
        let raw = self.num_pages.fetch_add(1, Ordering::SeqCst);
        if raw == INVALID_PAGE_ID.as_u32() {
            return Err(StoreError::DiskScheduler("page id space exhausted".into()));
        }
        let page_id = PageId::new(raw);
        self.write_page(page_id, &[0u8; PAGE_SIZE])?;
        Ok(page_id)
    }

    /// Releases a page id. The allocator is monotonic, so this is a stub; it
    /// exists so callers declare intent and the file layout can reclaim space
    /// later.
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        Ok(())
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_manager_new_reserves_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dm = DiskManager::new(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(dm.num_pages(), 1);

        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(1));
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("rw.db")).unwrap();

        let page_id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut out).unwrap();
        assert_eq!(out[0], 42);
        assert_eq!(out[PAGE_SIZE - 1], 128);
    }

    #[test]
    fn test_disk_manager_read_past_eof_zero_filled() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path().join("eof.db")).unwrap();

        let mut out = [1u8; PAGE_SIZE];
        dm.read_page(PageId::new(9), &mut out).unwrap();
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("persist.db");

        {
            let dm = DiskManager::new(&db_path).unwrap();
            let page_id = dm.allocate_page().unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 123;
            dm.write_page(page_id, &data).unwrap();
        }
        {
            let dm = DiskManager::new(&db_path).unwrap();
            assert_eq!(dm.num_pages(), 2);
            let mut data = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(1), &mut data).unwrap();
            assert_eq!(data[0], 123);
        }
    }
}
