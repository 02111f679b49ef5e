//! Integration tests for the disk manager

use keel::common::{PageId, PAGE_SIZE};
use keel::storage::disk::{DiskManager, DiskScheduler};
use std::sync::Arc;

#[test]
fn test_disk_manager_reserves_header_page() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let dm = DiskManager::new(&db_path).unwrap();
    assert!(db_path.exists());
    assert_eq!(dm.num_pages(), 1);

    // Allocation is monotonic starting after the header page.
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
}

#[test]
fn test_disk_manager_write_read_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new(temp_dir.path().join("rw.db")).unwrap();

    let page_id = dm.allocate_page().unwrap();
    let mut data = [0u8; PAGE_SIZE];
    data[0] = 42;
    data[100] = 255;
    data[PAGE_SIZE - 1] = 128;
    dm.write_page(page_id, &data).unwrap();

    let mut out = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut out).unwrap();
    assert_eq!(out[0], 42);
    assert_eq!(out[100], 255);
    assert_eq!(out[PAGE_SIZE - 1], 128);
}

#[test]
fn test_disk_manager_counters() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dm = DiskManager::new(temp_dir.path().join("count.db")).unwrap();

    let page_id = dm.allocate_page().unwrap();
    let writes_after_alloc = dm.num_writes();

    dm.write_page(page_id, &[7u8; PAGE_SIZE]).unwrap();
    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut buf).unwrap();

    assert_eq!(dm.num_writes(), writes_after_alloc + 1);
    assert_eq!(dm.num_reads(), 1);
}

#[test]
fn test_disk_manager_reopen_keeps_allocator_monotonic() {
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
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));

        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(1), &mut data).unwrap();
        assert_eq!(data[0], 123);
    }
}

#[test]
fn test_disk_scheduler_round_trip() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dm = Arc::new(DiskManager::new(temp_dir.path().join("sched.db")).unwrap());
    let scheduler = DiskScheduler::new(dm);

    let page_id = scheduler.disk_manager().allocate_page().unwrap();

    let mut data = [0u8; PAGE_SIZE];
    data[0] = 0x5A;
    scheduler.schedule_write_sync(page_id, &data).unwrap();

    let mut out = [0u8; PAGE_SIZE];
    scheduler.schedule_read_sync(page_id, &mut out).unwrap();
    assert_eq!(out[0], 0x5A);
}
