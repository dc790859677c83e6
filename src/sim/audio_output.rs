use crate::core::{AudioFrame, PlayerError, Result};
use crate::player::stages::{AudioOutputAttr, AudioOutputStage, TrackMode};
use crate::sim::backend::{StageCounters, StageKind};
use crossbeam::queue::SegQueue;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 回环音频输出：写入的帧排进队列，wait_eos 时视为播放完
pub struct SimAudioOutput {
    attr: AudioOutputAttr,
    buffer: Arc<SegQueue<AudioFrame>>,
    volume: Mutex<f32>,
    paused: AtomicBool,
    fail_resume: AtomicBool,
    frames_written: AtomicUsize,
    counters: Arc<StageCounters>,
    destroyed: AtomicBool,
}

impl SimAudioOutput {
    pub(crate) fn new(attr: AudioOutputAttr, counters: Arc<StageCounters>) -> Self {
        info!(
            "初始化音频输出: {} Hz, {} 声道{}",
            attr.sample_rate,
            attr.channels,
            if attr.track_mode == TrackMode::MonoToStereo { "（单声道转立体声）" } else { "" }
        );
        Self {
            attr,
            buffer: Arc::new(SegQueue::new()),
            volume: Mutex::new(1.0),
            paused: AtomicBool::new(false),
            fail_resume: AtomicBool::new(false),
            frames_written: AtomicUsize::new(0),
            counters,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written.load(Ordering::SeqCst)
    }

    /// 当前音量 (0.0 - 1.0)
    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// 下一次 resume 返回失败（一次性）
    pub fn fail_next_resume(&self) {
        self.fail_resume.store(true, Ordering::SeqCst);
    }

    /// 尚未播放的帧数
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn attr(&self) -> &AudioOutputAttr {
        &self.attr
    }

    fn clear_buffer(&self) {
        while self.buffer.pop().is_some() {}
    }
}

impl AudioOutputStage for SimAudioOutput {
    fn send_frame(&self, frame: &AudioFrame) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(PlayerError::Resource("音频输出通道已销毁".to_string()));
        }
        if self.is_paused() {
            return Err(PlayerError::TransientIo("音频输出已暂停".to_string()));
        }
        self.buffer.push(frame.clone());
        self.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_eos(&self, _timeout_ms: u32) -> Result<()> {
        let drained = self.buffer.len();
        self.clear_buffer();
        debug!("音频输出播放完毕（{} 帧）", drained);
        Ok(())
    }

    fn set_volume(&self, volume: u32) -> Result<()> {
        *self.volume.lock() = (volume.min(100) as f32) / 100.0;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        if self.fail_resume.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::Resource("音频输出恢复失败".to_string()));
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            self.clear_buffer();
            self.counters.on_destroy(StageKind::AudioOutput);
            info!("音频输出已停止");
        }
        Ok(())
    }
}
