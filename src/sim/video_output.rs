use crate::core::{PlayerError, Result, VideoFrame, VoConfig};
use crate::player::stages::{VideoOutputAttr, VideoOutputStage};
use crate::sim::backend::{StageCounters, StageKind};
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// 回环显示设备：只记录送显情况
pub struct SimVideoOutput {
    config: VoConfig,
    attr: Mutex<Option<VideoOutputAttr>>,
    enabled: AtomicBool,
    paused: AtomicBool,
    frames_shown: AtomicUsize,
    black_frames: AtomicUsize,
    last_pts_us: AtomicI64,
    counters: Arc<StageCounters>,
    destroyed: AtomicBool,
}

impl SimVideoOutput {
    pub(crate) fn new(config: VoConfig, counters: Arc<StageCounters>) -> Self {
        Self {
            config,
            attr: Mutex::new(None),
            enabled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            frames_shown: AtomicUsize::new(0),
            black_frames: AtomicUsize::new(0),
            last_pts_us: AtomicI64::new(-1),
            counters,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 送显的正常帧数
    pub fn frames_shown(&self) -> usize {
        self.frames_shown.load(Ordering::SeqCst)
    }

    /// 结束时送显的黑屏帧数
    pub fn black_frames(&self) -> usize {
        self.black_frames.load(Ordering::SeqCst)
    }

    pub fn last_pts_us(&self) -> i64 {
        self.last_pts_us.load(Ordering::SeqCst)
    }

    pub fn current_attr(&self) -> Option<VideoOutputAttr> {
        self.attr.lock().clone()
    }
}

impl VideoOutputStage for SimVideoOutput {
    fn enable(&self, attr: &VideoOutputAttr) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PlayerError::Resource("显示设备已释放".to_string()));
        }
        debug!(
            "启用视频输出: dev={} layer={} {}x{} {:?}",
            self.config.dev_id, self.config.layer_id, attr.width, attr.height, attr.format
        );
        *self.attr.lock() = Some(attr.clone());
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn send_frame(&self, frame: &VideoFrame) -> Result<()> {
        if !self.is_enabled() {
            return Err(PlayerError::Resource("视频输出通道未启用".to_string()));
        }
        if frame.eos {
            let luma = (frame.vir_width as usize) * (frame.vir_height as usize);
            let data = frame.buffer.as_slice();
            if data[..luma.min(data.len())].iter().all(|b| *b == 0) {
                self.black_frames.fetch_add(1, Ordering::SeqCst);
            }
            return Ok(());
        }
        self.frames_shown.fetch_add(1, Ordering::SeqCst);
        self.last_pts_us.store(frame.pts_us, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.enabled.store(false, Ordering::SeqCst);
            self.counters.on_destroy(StageKind::VideoOutput);
        }
        Ok(())
    }
}
