//! 管线各级（解码 / 输出 / 抓图编码）的抽象接口
//!
//! 所有 stage 都是 `Send + Sync`，I/O 方法取 `&self`，由持有 `Arc` 的投递线程与
//! 读包回调共享。`release_frame` 按值消费帧，释放即归还缓冲区。

use crate::core::{
    AudioCodec, AudioFrame, BitWidth, DemuxerPacket, MirrorMode, PixelFormat, Result, VideoCodec,
    VideoFrame, VoConfig, VoFormat,
};
use crate::player::demuxer_source::{Demuxer, DemuxerInput};
use std::sync::Arc;

/// 视频解码通道参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDecodeAttr {
    pub chn_id: u32,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub output_pix_fmt: PixelFormat,
    pub frame_buf_cnt: u32,
    pub stream_buf_cnt: u32,
}

/// 视频输出通道启用参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutputAttr {
    pub width: u32,
    pub height: u32,
    pub format: VoFormat,
    pub mirror: MirrorMode,
    pub rotation: u32,
}

/// 音频解码通道参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDecodeAttr {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_width: BitWidth,
}

/// 声道模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    /// 单声道复制到双声道输出
    MonoToStereo,
    Normal,
}

/// 音频输出通道参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutputAttr {
    pub dev_id: u32,
    pub chn_id: u32,
    pub sample_rate: u32,
    pub resample_rate: u32,
    pub channels: u32,
    pub bit_width: BitWidth,
    pub track_mode: TrackMode,
}

/// JPEG 编码通道参数
#[derive(Debug, Clone, PartialEq)]
pub struct JpegEncodeAttr {
    pub chn_id: u32,
    pub width: u32,
    pub height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub pix_fmt: PixelFormat,
}

pub trait VideoDecodeStage: Send + Sync {
    /// 送入一个压缩包；eof 包会让解码器在输出端产生一帧 eos 帧。
    /// 缓冲满时返回 `TransientIo`
    fn send_stream(&self, packet: &DemuxerPacket, timeout_ms: u32) -> Result<()>;

    /// 等待解码输出就绪
    fn poll(&self, timeout_ms: u32) -> bool;

    /// 取一帧，超时返回 `Ok(None)`
    fn get_frame(&self, timeout_ms: u32) -> Result<Option<VideoFrame>>;

    fn release_frame(&self, frame: VideoFrame);

    fn destroy(&self) -> Result<()>;
}

pub trait VideoOutputStage: Send + Sync {
    fn enable(&self, attr: &VideoOutputAttr) -> Result<()>;
    fn disable(&self) -> Result<()>;
    fn send_frame(&self, frame: &VideoFrame) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    /// 释放显示设备
    fn destroy(&self) -> Result<()>;
}

pub trait AudioDecodeStage: Send + Sync {
    /// 缓冲满时返回 `TransientIo`
    fn send_stream(&self, packet: &DemuxerPacket) -> Result<()>;
    fn send_end_of_stream(&self) -> Result<()>;
    /// 取一帧，超时返回 `Ok(None)`，长度为 0 的帧表示流结束
    fn get_frame(&self, timeout_ms: u32) -> Result<Option<AudioFrame>>;
    fn release_frame(&self, frame: AudioFrame);
    fn destroy(&self) -> Result<()>;
}

pub trait AudioOutputStage: Send + Sync {
    /// 暂停中或缓冲满时返回 `TransientIo`
    fn send_frame(&self, frame: &AudioFrame) -> Result<()>;
    /// 等待已写入的数据播放完
    fn wait_eos(&self, timeout_ms: u32) -> Result<()>;
    fn set_volume(&self, volume: u32) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn destroy(&self) -> Result<()>;
}

pub trait JpegEncodeStage: Send {
    /// 几何尺寸变化时重新配置
    fn reset(&mut self, attr: &JpegEncodeAttr) -> Result<()>;
    fn send_frame(&mut self, frame: &VideoFrame) -> Result<()>;
    fn get_stream(&mut self, timeout_ms: u32) -> Result<Vec<u8>>;
    fn destroy(&mut self) -> Result<()>;
}

/// 媒体后端：负责创建解封装器和各级 stage
pub trait MediaBackend: Send + Sync {
    fn create_demuxer(&self, input: &DemuxerInput) -> Result<Box<dyn Demuxer>>;
    fn create_video_decoder(&self, attr: &VideoDecodeAttr) -> Result<Arc<dyn VideoDecodeStage>>;
    /// 绑定显示设备（create 时调用，destroy 时释放）
    fn create_video_output(&self, config: &VoConfig) -> Result<Arc<dyn VideoOutputStage>>;
    fn create_audio_decoder(&self, attr: &AudioDecodeAttr) -> Result<Arc<dyn AudioDecodeStage>>;
    fn create_audio_output(&self, attr: &AudioOutputAttr) -> Result<Arc<dyn AudioOutputStage>>;
    fn create_jpeg_encoder(&self, attr: &JpegEncodeAttr) -> Result<Box<dyn JpegEncodeStage>>;
    fn register_audio_codec(&self, codec: AudioCodec) -> Result<()>;
    fn unregister_audio_codec(&self, codec: AudioCodec) -> Result<()>;
}
