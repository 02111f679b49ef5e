use std::sync::Arc;

use keel::buffer::BufferPoolManager;
use keel::index::{BPlusTree, IndexKey, IntegerComparator};
use keel::storage::disk::DiskManager;
use keel::{PageId, RecordId, SlotId};

fn main() {
    env_logger::init();

    println!("Keel - storage engine core demo");
    println!("===============================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to create disk manager"));
    println!("Created disk manager for: {db_path}");

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Created buffer pool manager with 16 frames\n");

    let tree = BPlusTree::new("demo_index", Arc::clone(&bpm), IntegerComparator, 4, 4);

    // Small max sizes force splits early so the demo grows a real tree.
    for v in [5u64, 9, 1, 7, 3, 8, 2, 6, 4] {
        let key = IndexKey::from_u64(v);
        let record = RecordId::new(PageId::new(100), SlotId::new(v as u16));
        tree.insert(&key, record).expect("insert failed");
        println!("Inserted key {v}");
    }

    println!(
        "\nRoot page: {:?}",
        tree.root_page_id().expect("root lookup failed")
    );

    let probe = IndexKey::from_u64(7);
    match tree.get_value(&probe).expect("lookup failed") {
        Some(record) => println!("Lookup 7 -> {record:?}"),
        None => println!("Lookup 7 -> not found"),
    }

    print!("Full scan:");
    for entry in tree.begin().expect("begin failed") {
        let (key, _record) = entry.expect("scan failed");
        print!(" {}", key.to_u64());
    }
    println!();

    for v in [3u64, 4, 5] {
        tree.remove(&IndexKey::from_u64(v)).expect("remove failed");
    }
    print!("After removing 3, 4, 5:");
    for entry in tree.begin().expect("begin failed") {
        let (key, _record) = entry.expect("scan failed");
        print!(" {}", key.to_u64());
    }
    println!();

    bpm.flush_all_pages().expect("flush failed");
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
