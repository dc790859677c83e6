use crate::core::{AudioCodec, PlayerError, Result, VoConfig};
use crate::player::demuxer_source::{Demuxer, DemuxerInput};
use crate::player::stages::{
    AudioDecodeAttr, AudioDecodeStage, AudioOutputAttr, AudioOutputStage, JpegEncodeAttr,
    JpegEncodeStage, MediaBackend, VideoDecodeAttr, VideoDecodeStage, VideoOutputStage,
};
use crate::sim::audio_output::SimAudioOutput;
use crate::sim::decoder::{SimAudioDecoder, SimVideoDecoder};
use crate::sim::demuxer::SimDemuxer;
use crate::sim::jpeg::SimJpegEncoder;
use crate::sim::media::SimMedia;
use crate::sim::video_output::SimVideoOutput;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

/// 回环后端里可计数 / 可注入故障的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Demuxer,
    VideoDecoder,
    VideoOutput,
    AudioDecoder,
    AudioOutput,
    JpegEncoder,
    AudioCodec,
}

impl StageKind {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        match self {
            StageKind::Demuxer => 0,
            StageKind::VideoDecoder => 1,
            StageKind::VideoOutput => 2,
            StageKind::AudioDecoder => 3,
            StageKind::AudioOutput => 4,
            StageKind::JpegEncoder => 5,
            StageKind::AudioCodec => 6,
        }
    }
}

/// 资源创建 / 销毁计数，以及取出未归还的帧数
#[derive(Debug, Default)]
pub struct StageCounters {
    created: [AtomicUsize; StageKind::COUNT],
    destroyed: [AtomicUsize; StageKind::COUNT],
    frames_outstanding: AtomicI64,
    jpeg_resets: AtomicUsize,
}

impl StageCounters {
    pub(crate) fn on_create(&self, kind: StageKind) {
        self.created[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_destroy(&self, kind: StageKind) {
        self.destroyed[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn on_jpeg_reset(&self) {
        self.jpeg_resets.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn frame_acquired(&self) {
        self.frames_outstanding.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn frame_released(&self) {
        self.frames_outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn created(&self, kind: StageKind) -> usize {
        self.created[kind.index()].load(Ordering::SeqCst)
    }

    pub fn destroyed(&self, kind: StageKind) -> usize {
        self.destroyed[kind.index()].load(Ordering::SeqCst)
    }

    /// 尚未释放的数量
    pub fn live(&self, kind: StageKind) -> usize {
        self.created(kind).saturating_sub(self.destroyed(kind))
    }

    /// JPEG 编码器重新配置的次数
    pub fn jpeg_resets(&self) -> usize {
        self.jpeg_resets.load(Ordering::SeqCst)
    }

    pub fn frames_outstanding(&self) -> i64 {
        self.frames_outstanding.load(Ordering::SeqCst)
    }

    /// 所有资源都已释放、所有帧都已归还
    pub fn all_released(&self) -> bool {
        [
            StageKind::Demuxer,
            StageKind::VideoDecoder,
            StageKind::VideoOutput,
            StageKind::AudioDecoder,
            StageKind::AudioOutput,
            StageKind::JpegEncoder,
            StageKind::AudioCodec,
        ]
        .iter()
        .all(|kind| self.live(*kind) == 0)
            && self.frames_outstanding() == 0
    }
}

/// 内存回环后端
///
/// 媒体按 URI 登记在目录里，解封装器从目录取参数并在自己的线程里推包；
/// 解码器把包原样变成帧，输出端只计数。用于演示程序和测试。
#[derive(Default)]
pub struct SimBackend {
    catalog: Arc<RwLock<HashMap<String, SimMedia>>>,
    counters: Arc<StageCounters>,
    failures: Mutex<HashSet<StageKind>>,
    read_starts: Arc<Mutex<Vec<i64>>>,
    video_output: Mutex<Option<Arc<SimVideoOutput>>>,
    audio_output: Mutex<Option<Arc<SimAudioOutput>>>,
    last_audio_output_attr: Mutex<Option<AudioOutputAttr>>,
    next_id: AtomicUsize,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条媒体
    pub fn add_media(&self, uri: &str, media: SimMedia) {
        debug!("登记媒体: {}", uri);
        self.catalog.write().insert(uri.to_string(), media);
    }

    pub fn counters(&self) -> Arc<StageCounters> {
        self.counters.clone()
    }

    /// 下一次创建该类资源时失败（一次性）
    pub fn fail_next(&self, kind: StageKind) {
        self.failures.lock().insert(kind);
    }

    /// 最近创建的视频输出设备
    pub fn video_output(&self) -> Option<Arc<SimVideoOutput>> {
        self.video_output.lock().clone()
    }

    /// 最近创建的音频输出通道
    pub fn audio_output(&self) -> Option<Arc<SimAudioOutput>> {
        self.audio_output.lock().clone()
    }

    pub fn last_audio_output_attr(&self) -> Option<AudioOutputAttr> {
        self.last_audio_output_attr.lock().clone()
    }

    /// 每次 read_packet_start 的起点（微秒）
    pub fn read_starts(&self) -> Vec<i64> {
        self.read_starts.lock().clone()
    }

    fn check_failure(&self, kind: StageKind) -> Result<()> {
        if self.failures.lock().remove(&kind) {
            info!("💥 注入故障: 创建 {:?} 失败", kind);
            return Err(PlayerError::Resource(format!("创建 {:?} 失败（注入）", kind)));
        }
        Ok(())
    }
}

impl MediaBackend for SimBackend {
    fn create_demuxer(&self, input: &DemuxerInput) -> Result<Box<dyn Demuxer>> {
        self.check_failure(StageKind::Demuxer)?;
        self.counters.on_create(StageKind::Demuxer);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimDemuxer::new(
            id,
            input.clone(),
            self.catalog.clone(),
            self.counters.clone(),
            self.read_starts.clone(),
        )))
    }

    fn create_video_decoder(&self, attr: &VideoDecodeAttr) -> Result<Arc<dyn VideoDecodeStage>> {
        self.check_failure(StageKind::VideoDecoder)?;
        self.counters.on_create(StageKind::VideoDecoder);
        Ok(Arc::new(SimVideoDecoder::new(attr.clone(), self.counters.clone())))
    }

    fn create_video_output(&self, config: &VoConfig) -> Result<Arc<dyn VideoOutputStage>> {
        self.check_failure(StageKind::VideoOutput)?;
        self.counters.on_create(StageKind::VideoOutput);
        let output = Arc::new(SimVideoOutput::new(config.clone(), self.counters.clone()));
        *self.video_output.lock() = Some(output.clone());
        Ok(output)
    }

    fn create_audio_decoder(&self, attr: &AudioDecodeAttr) -> Result<Arc<dyn AudioDecodeStage>> {
        self.check_failure(StageKind::AudioDecoder)?;
        self.counters.on_create(StageKind::AudioDecoder);
        Ok(Arc::new(SimAudioDecoder::new(attr.clone(), self.counters.clone())))
    }

    fn create_audio_output(&self, attr: &AudioOutputAttr) -> Result<Arc<dyn AudioOutputStage>> {
        self.check_failure(StageKind::AudioOutput)?;
        self.counters.on_create(StageKind::AudioOutput);
        let output = Arc::new(SimAudioOutput::new(attr.clone(), self.counters.clone()));
        *self.audio_output.lock() = Some(output.clone());
        *self.last_audio_output_attr.lock() = Some(attr.clone());
        Ok(output)
    }

    fn create_jpeg_encoder(&self, attr: &JpegEncodeAttr) -> Result<Box<dyn JpegEncodeStage>> {
        self.check_failure(StageKind::JpegEncoder)?;
        self.counters.on_create(StageKind::JpegEncoder);
        Ok(Box::new(SimJpegEncoder::new(attr.clone(), self.counters.clone())))
    }

    fn register_audio_codec(&self, codec: AudioCodec) -> Result<()> {
        self.check_failure(StageKind::AudioCodec)?;
        debug!("注册音频解码: {}", codec.as_str());
        self.counters.on_create(StageKind::AudioCodec);
        Ok(())
    }

    fn unregister_audio_codec(&self, codec: AudioCodec) -> Result<()> {
        debug!("注销音频解码: {}", codec.as_str());
        self.counters.on_destroy(StageKind::AudioCodec);
        Ok(())
    }
}
