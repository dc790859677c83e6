use crate::core::SeekStatus;
use crossbeam::atomic::AtomicCell;
use std::sync::atomic::{AtomicI64, Ordering};

/// Seek 子状态 + 目标时间戳
///
/// 状态由 Seek 调用方、读包回调、视频投递线程分别推进：
/// - Seek：NONE → WAIT → VIDEO_DOING（有视频）/ DONE（纯音频）
/// - 视频读包回调：VIDEO_DOING → VIDEO_DONE（找到落点关键帧）
/// - 视频投递线程：VIDEO_DONE → DONE（落点帧送显）
/// - 音频读包回调：DONE → NONE（第一包有效音频）
pub struct SeekState {
    status: AtomicCell<SeekStatus>,
    target_us: AtomicI64,
}

impl SeekState {
    pub fn new() -> Self {
        Self {
            status: AtomicCell::new(SeekStatus::None),
            target_us: AtomicI64::new(0),
        }
    }

    pub fn status(&self) -> SeekStatus {
        self.status.load()
    }

    pub fn set_status(&self, status: SeekStatus) {
        self.status.store(status);
    }

    /// 仅当当前状态为 `from` 时切换到 `to`
    pub fn advance(&self, from: SeekStatus, to: SeekStatus) -> bool {
        self.status.compare_exchange(from, to).is_ok()
    }

    pub fn target_us(&self) -> i64 {
        self.target_us.load(Ordering::Acquire)
    }

    pub fn set_target_us(&self, target_us: i64) {
        self.target_us.store(target_us, Ordering::Release);
    }
}

impl Default for SeekState {
    fn default() -> Self {
        Self::new()
    }
}
