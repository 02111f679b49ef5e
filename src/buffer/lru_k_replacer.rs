use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// Access history for a single frame. Timestamps are kept oldest-first and
/// trimmed to the most recent k entries, so for a frame with k recorded
/// accesses the front of the queue is the k-th most recent access.
#[derive(Debug)]
struct FrameInfo {
    history: VecDeque<Timestamp>,
    evictable: bool,
}

impl FrameInfo {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: Timestamp, k: usize) {
        self.history.push_back(timestamp);
        while self.history.len() > k {
            self.history.pop_front();
        }
    }
}

struct ReplacerState {
    /// Per-frame access info, indexed by frame id. `None` means the frame has
    /// not been accessed since its last eviction/removal.
    frames: Vec<Option<FrameInfo>>,
    /// Number of evictable frames
    evictable_count: usize,
    /// Monotonic logical clock
    clock: Timestamp,
}

/// LRU-K replacement policy.
///
/// Evicts the frame with the largest backward k-distance: frames with fewer
/// than k recorded accesses count as infinitely distant and are preferred
/// over fully-warmed frames. Among such cold frames the one with the earliest
/// first access wins; among warm frames the one with the oldest k-th most
/// recent access wins. Ties resolve to the smallest frame id.
pub struct LruKReplacer {
    k: usize,
    state: Mutex<ReplacerState>,
}

impl LruKReplacer {
    /// Creates a replacer tracking up to `num_frames` frames with the given k.
    pub fn new(k: usize, num_frames: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        let mut frames = Vec::with_capacity(num_frames);
        frames.resize_with(num_frames, || None);
        Self {
            k,
            state: Mutex::new(ReplacerState {
                frames,
                evictable_count: 0,
                clock: 0,
            }),
        }
    }

    /// Chooses and removes a victim frame. Returns `None` when no frame is
    /// evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.evictable_count == 0 {
            return None;
        }

        let mut victim: Option<usize> = None;
        for (i, slot) in state.frames.iter().enumerate() {
            let info = match slot {
                Some(info) if info.evictable => info,
                _ => continue,
            };
            let selected = match victim {
                None => true,
                Some(v) => {
                    let best = state.frames[v].as_ref().unwrap();
                    let best_cold = best.history.len() < self.k;
                    let cand_cold = info.history.len() < self.k;
                    match (best_cold, cand_cold) {
                        (false, true) => true,
                        (true, false) => false,
                        // Same class: LRU on the front timestamp, which is the
                        // earliest access for cold frames and the k-th most
                        // recent access for warm ones. Strict comparison keeps
                        // the smallest frame id on ties.
                        _ => info.history.front() < best.history.front(),
                    }
                }
            };
            if selected {
                victim = Some(i);
            }
        }

        let v = victim.expect("evictable_count > 0 but no evictable frame found");
        state.frames[v] = None;
        state.evictable_count -= 1;
        Some(FrameId::new(v as u32))
    }

    /// Records an access to `frame_id` at the current logical timestamp.
    /// First access creates the entry in the non-evictable state.
    pub fn record_access(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        assert!(
            frame_id.as_usize() < state.frames.len(),
            "frame id {frame_id} out of range"
        );
        let timestamp = state.clock;
        state.clock += 1;
        state.frames[frame_id.as_usize()]
            .get_or_insert_with(FrameInfo::new)
            .record_access(timestamp, self.k);
    }

    /// Sets whether `frame_id` may be chosen as an eviction victim.
    /// Idempotent when the flag does not change; no-op for untracked frames.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut state = self.state.lock();
        assert!(
            frame_id.as_usize() < state.frames.len(),
            "frame id {frame_id} out of range"
        );
        if let Some(info) = state.frames[frame_id.as_usize()].as_mut() {
            if info.evictable != evictable {
                info.evictable = evictable;
                if evictable {
                    state.evictable_count += 1;
                } else {
                    state.evictable_count -= 1;
                }
            }
        }
    }

    /// Drops `frame_id`'s history entirely, e.g. when its page is deleted.
    /// Removing a tracked, non-evictable frame is a programming error.
    pub fn remove(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        assert!(
            frame_id.as_usize() < state.frames.len(),
            "frame id {frame_id} out of range"
        );
        if let Some(info) = state.frames[frame_id.as_usize()].take() {
            assert!(info.evictable, "remove called on a non-evictable frame");
            state.evictable_count -= 1;
        }
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}
