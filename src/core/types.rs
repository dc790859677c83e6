use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 播放器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerState {
    /// 构造中（create 尚未完成）
    Unset,
    Idle,
    Init,
    Prepared,
    Play,
    Pause,
    Stop,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Unset => "UNSET",
            PlayerState::Idle => "IDLE",
            PlayerState::Init => "INIT",
            PlayerState::Prepared => "PREPARED",
            PlayerState::Play => "PLAY",
            PlayerState::Pause => "PAUSE",
            PlayerState::Stop => "STOP",
        }
    }

    /// Seek 允许的状态区间：PREPARED..=STOP
    pub fn is_seekable(&self) -> bool {
        matches!(
            self,
            PlayerState::Prepared | PlayerState::Play | PlayerState::Pause | PlayerState::Stop
        )
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        PlayerState::Unset
    }
}

/// Seek 子状态机
///
/// NONE → WAIT → VIDEO_DOING → VIDEO_DONE → DONE → NONE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeekStatus {
    None,
    /// 正在重建管线，丢弃所有包
    Wait,
    /// 等待 PTS >= 目标的视频关键帧
    VideoDoing,
    /// 视频已找到落点，等待视频线程确认显示
    VideoDone,
    /// 视频就绪，音频从新目标开始投递
    Done,
}

impl SeekStatus {
    /// 是否允许对外发送事件
    pub fn allows_events(&self) -> bool {
        matches!(self, SeekStatus::None | SeekStatus::Done)
    }
}

/// 流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 音视频两路 EOF 汇合状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofState {
    NoneYet,
    VideoDone,
    AudioDone,
    BothDone,
}

impl EofState {
    /// 标记某一路结束，返回新的汇合状态
    pub fn mark(self, stream: StreamKind) -> EofState {
        match (self, stream) {
            (EofState::NoneYet, StreamKind::Video) => EofState::VideoDone,
            (EofState::NoneYet, StreamKind::Audio) => EofState::AudioDone,
            (EofState::VideoDone, StreamKind::Audio) | (EofState::AudioDone, StreamKind::Video) => {
                EofState::BothDone
            }
            (state, _) => state,
        }
    }
}

impl Default for EofState {
    fn default() -> Self {
        EofState::NoneYet
    }
}

/// 对外事件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEvent {
    StateChanged,
    Eof,
    Sof,
    SeekEnd,
    Error,
    Prepared,
    Play,
    Paused,
    Stopped,
}

/// 支持的视频编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "h264" => Some(VideoCodec::H264),
            "h265" => Some(VideoCodec::H265),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
        }
    }
}

/// 支持的音频编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Mp3,
    /// 原始 PCM（wav），不经过音频解码器
    Pcm,
    /// G.711 A-law
    G711a,
}

impl AudioCodec {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mp3" => Some(AudioCodec::Mp3),
            "wav" => Some(AudioCodec::Pcm),
            "pcm_alaw" => Some(AudioCodec::G711a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
            AudioCodec::Pcm => "wav",
            AudioCodec::G711a => "pcm_alaw",
        }
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// NV12
    Yuv420sp,
    Yuv420sp10bit,
    Yuv420p,
    Rgb888,
}

/// 采样位宽
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitWidth {
    Bit8,
    Bit16,
}

impl BitWidth {
    /// 解封装器上报的位宽码：0 → 8bit，1 → 16bit
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(BitWidth::Bit8),
            1 => Some(BitWidth::Bit16),
            _ => None,
        }
    }

    pub fn bytes(&self) -> usize {
        match self {
            BitWidth::Bit8 => 1,
            BitWidth::Bit16 => 2,
        }
    }
}

/// 解封装器上报的 10bit 视频格式码
pub const DEMUXER_VIDEO_FORMAT_10BIT: i32 = 1;

/// 解封装器上报的流参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemuxerParam {
    pub video_codec: Option<String>,
    pub video_width: i32,
    pub video_height: i32,
    pub video_format: i32,
    pub video_avg_frame_rate: i32,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: i32,
    pub audio_channels: i32,
    pub audio_format: i32,
}

/// 解封装出来的一个压缩包（按值传递即转移所有权）
#[derive(Debug, Clone, Default)]
pub struct DemuxerPacket {
    pub data: Vec<u8>,
    /// 微秒
    pub pts_us: i64,
    pub key_frame: bool,
    pub eof: bool,
}

impl DemuxerPacket {
    pub fn eof() -> Self {
        Self {
            eof: true,
            ..Default::default()
        }
    }
}

/// 媒体缓冲区（引用计数，clone 即持有一份引用）
#[derive(Debug, Clone, Default)]
pub struct MediaBuffer(Arc<Vec<u8>>);

impl MediaBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        MediaBuffer(Arc::new(data))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// 当前引用数（调试 / 测试用）
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// 写时复制
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }
}

/// 解码后的视频帧
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts_us: i64,
    pub width: u32,
    pub height: u32,
    pub vir_width: u32,
    pub vir_height: u32,
    pub pix_fmt: PixelFormat,
    /// 解码器输出的流结束标记帧
    pub eos: bool,
    pub buffer: MediaBuffer,
}

impl VideoFrame {
    /// 涂黑：亮度 0，色度 128（半平面 YUV 布局）
    pub fn blank(&mut self) {
        let luma = (self.vir_width as usize) * (self.vir_height as usize);
        let data = self.buffer.make_mut();
        let split = luma.min(data.len());
        data[..split].fill(0);
        data[split..].fill(128);
    }
}

/// 解码后的音频帧（长度为 0 表示流结束）
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub ts_us: i64,
    pub buffer: MediaBuffer,
}

impl AudioFrame {
    pub fn is_eos(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// 抓图结果（JPEG）
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_state_aggregation() {
        let s = EofState::NoneYet.mark(StreamKind::Video);
        assert_eq!(s, EofState::VideoDone);
        assert_eq!(s.mark(StreamKind::Video), EofState::VideoDone);
        assert_eq!(s.mark(StreamKind::Audio), EofState::BothDone);

        let s = EofState::NoneYet.mark(StreamKind::Audio);
        assert_eq!(s.mark(StreamKind::Video), EofState::BothDone);
        assert_eq!(EofState::BothDone.mark(StreamKind::Audio), EofState::BothDone);
    }

    #[test]
    fn test_codec_names() {
        assert_eq!(VideoCodec::from_name("h265"), Some(VideoCodec::H265));
        assert_eq!(VideoCodec::from_name("vp9"), None);
        assert_eq!(AudioCodec::from_name("wav"), Some(AudioCodec::Pcm));
        assert_eq!(AudioCodec::from_name("pcm_alaw"), Some(AudioCodec::G711a));
        assert_eq!(AudioCodec::from_name("aac"), None);
        assert_eq!(BitWidth::from_code(1), Some(BitWidth::Bit16));
        assert_eq!(BitWidth::from_code(2), None);
    }

    #[test]
    fn test_blank_frame_copy_on_write() {
        let original = MediaBuffer::new(vec![7u8; 6]);
        let mut frame = VideoFrame {
            pts_us: 0,
            width: 2,
            height: 2,
            vir_width: 2,
            vir_height: 2,
            pix_fmt: PixelFormat::Yuv420sp,
            eos: true,
            buffer: original.clone(),
        };
        frame.blank();
        assert_eq!(frame.buffer.as_slice(), &[0, 0, 0, 0, 128, 128]);
        // 其他持有者不受影响
        assert_eq!(original.as_slice(), &[7u8; 6]);
    }

    #[test]
    fn test_seek_status_event_gate() {
        assert!(SeekStatus::None.allows_events());
        assert!(SeekStatus::Done.allows_events());
        assert!(!SeekStatus::Wait.allows_events());
        assert!(!SeekStatus::VideoDoing.allows_events());
        assert!(!SeekStatus::VideoDone.allows_events());
    }
}
