use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// 播放时钟 - 投递线程写，查询接口读
///
/// 内部统一用微秒，对外以毫秒呈现。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    position_us: AtomicI64,     // 当前播放位置
    video_ts_us: AtomicI64,     // 上一帧送显的 PTS，-1 表示尚未送显
    duration_ms: AtomicI64,     // 媒体时长，0 表示未知
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                position_us: AtomicI64::new(0),
                video_ts_us: AtomicI64::new(-1),
                duration_ms: AtomicI64::new(0),
            }),
        }
    }

    pub fn set_position_us(&self, pts_us: i64) {
        self.inner.position_us.store(pts_us, Ordering::Release);
    }

    pub fn position_us(&self) -> i64 {
        self.inner.position_us.load(Ordering::Acquire)
    }

    /// 当前播放位置（毫秒）
    pub fn position_ms(&self) -> i64 {
        self.position_us() / 1000
    }

    /// 播放到结尾时把位置对齐到时长（时长未知时不动）
    pub fn snap_to_duration(&self) {
        let duration_ms = self.duration_ms();
        if duration_ms > 0 {
            self.set_position_us(duration_ms * 1000);
        }
    }

    pub fn set_video_ts_us(&self, pts_us: i64) {
        self.inner.video_ts_us.store(pts_us, Ordering::Release);
    }

    pub fn video_ts_us(&self) -> i64 {
        self.inner.video_ts_us.load(Ordering::Acquire)
    }

    pub fn reset_video_ts(&self) {
        self.set_video_ts_us(-1);
    }

    pub fn set_duration_ms(&self, duration_ms: i64) {
        self.inner.duration_ms.store(duration_ms, Ordering::Release);
    }

    pub fn duration_ms(&self) -> i64 {
        self.inner.duration_ms.load(Ordering::Acquire)
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
