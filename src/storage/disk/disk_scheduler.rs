use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, StoreError, PAGE_SIZE};

use super::DiskManager;

type PageBuf = Box<[u8; PAGE_SIZE]>;

/// A disk I/O request handed to the worker thread. Buffers are owned by the
/// request, and completion is reported through the per-request channel.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        done: mpsc::Sender<Result<PageBuf>>,
    },
    Write {
        page_id: PageId,
        data: PageBuf,
        done: mpsc::Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a single background worker thread
/// fed over a bounded queue. The buffer pool uses the synchronous wrappers;
/// `schedule` is the raw entry point.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    request_tx: Sender<DiskRequest>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_tx, request_rx) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let stop = Arc::clone(&shutdown);
        let worker = thread::spawn(move || Self::run_worker(dm, request_rx, stop));

        Self {
            disk_manager,
            request_tx,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Queues a request for the worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_tx
            .send(request)
            .map_err(|e| StoreError::DiskScheduler(format!("failed to queue request: {e}")))
    }

    /// Reads `page_id` into `data`, blocking until the I/O completes.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let (done, result) = mpsc::channel();
        self.schedule(DiskRequest::Read { page_id, done })?;
        let buf = Self::wait(&result)??;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Writes `data` to `page_id`, blocking until the I/O completes.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);
        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);
        let (done, result) = mpsc::channel();
        self.schedule(DiskRequest::Write {
            page_id,
            data: buf,
            done,
        })?;
        Self::wait(&result)?
    }

    fn wait<T>(result: &mpsc::Receiver<T>) -> Result<T> {
        result
            .recv()
            .map_err(|e| StoreError::DiskScheduler(format!("worker dropped request: {e}")))
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        requests: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain what is already queued before exiting.
                while let Ok(request) = requests.try_recv() {
                    Self::process(&disk_manager, request);
                }
                break;
            }
            match requests.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, done } => {
                let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
                let outcome = disk_manager
                    .read_page(page_id, &mut buf[..])
                    .map(|()| buf);
                let _ = done.send(outcome);
            }
            DiskRequest::Write {
                page_id,
                data,
                done,
            } => {
                let _ = done.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id = scheduler.disk_manager().allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.schedule_write_sync(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        scheduler
            .schedule_read_sync(page_id, &mut read_data)
            .unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_interleaved_requests() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let page_id1 = scheduler.disk_manager().allocate_page().unwrap();
        let page_id2 = scheduler.disk_manager().allocate_page().unwrap();

        scheduler
            .schedule_write_sync(page_id1, &[1u8; PAGE_SIZE])
            .unwrap();
        scheduler
            .schedule_write_sync(page_id2, &[2u8; PAGE_SIZE])
            .unwrap();

        let mut read1 = [0u8; PAGE_SIZE];
        let mut read2 = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(page_id1, &mut read1).unwrap();
        scheduler.schedule_read_sync(page_id2, &mut read2).unwrap();
        assert_eq!(read1[0], 1);
        assert_eq!(read2[0], 2);
    }
}
