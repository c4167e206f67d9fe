//! Build progress and cancellation / 构建进度与取消

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

/// Snapshot of a dictionary build / 构建进度快照
#[derive(Debug, Clone, Serialize)]
pub struct BuildProgress {
    pub is_running: bool,
    pub is_done: bool,
    pub entries_read: u64,
    pub entries_stored: u64,
    pub entries_dropped: u64,
    pub batches: u64,
    pub error: Option<String>,
    pub last_done_time: Option<i64>,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            is_running: false,
            is_done: false,
            entries_read: 0,
            entries_stored: 0,
            entries_dropped: 0,
            batches: 0,
            error: None,
            last_done_time: None,
        }
    }
}

/// Shared build state, one per service / 构建状态
pub struct BuildState {
    running: AtomicBool,
    cancel_flag: AtomicBool,
    entries_read: AtomicU64,
    progress: RwLock<BuildProgress>,
}

impl BuildState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            cancel_flag: AtomicBool::new(false),
            entries_read: AtomicU64::new(0),
            progress: RwLock::new(BuildProgress::default()),
        }
    }

    /// Claim the build slot, `false` if a build is already running / 开始构建
    pub fn try_start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.cancel_flag.store(false, Ordering::SeqCst);
        self.entries_read.store(0, Ordering::SeqCst);

        let mut progress = self.progress.write();
        let last_done_time = progress.last_done_time;
        *progress = BuildProgress {
            is_running: true,
            last_done_time,
            ..BuildProgress::default()
        };
        true
    }

    pub fn entry_read(&self) {
        let count = self.entries_read.fetch_add(1, Ordering::Relaxed) + 1;
        // 每 1000 条同步一次快照
        if count % 1000 == 0 {
            self.progress.write().entries_read = count;
        }
    }

    pub fn batch_stored(&self, stored: u64, dropped: u64) {
        let mut progress = self.progress.write();
        progress.entries_read = self.entries_read.load(Ordering::Relaxed);
        progress.entries_stored = stored;
        progress.entries_dropped = dropped;
        progress.batches += 1;
    }

    pub fn finish(&self, error: Option<String>) {
        self.running.store(false, Ordering::SeqCst);
        let mut progress = self.progress.write();
        progress.is_running = false;
        progress.entries_read = self.entries_read.load(Ordering::Relaxed);
        progress.is_done = error.is_none();
        progress.error = error;
        progress.last_done_time = Some(chrono::Utc::now().timestamp());
    }

    /// Request cancellation, honoured between batches / 请求取消（批次之间生效）
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel_flag.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get_progress(&self) -> BuildProgress {
        self.progress.read().clone()
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}
