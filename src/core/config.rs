//! 播放器配置（JSON）

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::Result;

/// 数据源路径上限（字节，含结尾）
pub const PATH_MAX_LEN: usize = 128;
/// 视频解码就绪 / 取帧等待
pub const POLL_TIMEOUT_MS: u32 = 20;
/// 音频解码取帧等待
pub const AUDIO_GET_TIMEOUT_MS: u32 = 20;
/// 暂停时投递线程的休眠间隔
pub const PAUSE_SLEEP_MS: u64 = 1;
/// 送流 / 送帧失败后的重试间隔
pub const RETRY_BACKOFF_MS: u64 = 1;
/// 小于该距离的 Seek 直接视为完成
pub const SEEK_MARGIN_MS: i64 = 500;
/// 帧率无效时使用的名义帧率
pub const FALLBACK_FRAME_RATE: i32 = 25;
/// 等待音频输出播空的上限
pub const AO_DRAIN_TIMEOUT_MS: u32 = 2000;

/// 播放器总配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub enable_video: bool,
    pub enable_audio: bool,
    /// 播放结束时送一帧黑屏
    pub enable_black_background: bool,
    pub vdec: VdecConfig,
    pub vo: VoConfig,
    pub ao: AoConfig,
    pub snapshot: SnapshotConfig,
    pub rtsp: RtspConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            enable_video: true,
            enable_audio: true,
            enable_black_background: false,
            vdec: VdecConfig::default(),
            vo: VoConfig::default(),
            ao: AoConfig::default(),
            snapshot: SnapshotConfig::default(),
            rtsp: RtspConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

/// 视频解码通道
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VdecConfig {
    pub chn_id: u32,
    pub frame_buf_cnt: u32,
    pub stream_buf_cnt: u32,
}

impl Default for VdecConfig {
    fn default() -> Self {
        Self {
            chn_id: 0,
            frame_buf_cnt: 3,
            stream_buf_cnt: 3,
        }
    }
}

/// 显示格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoFormat {
    Nv12,
    Rgb888,
}

/// 拼接模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpliceMode {
    Gpu,
    Rga,
    Bypass,
}

/// 镜像模式（由 mirror / flip 组合得出）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    None,
    Horizontal,
    Vertical,
    Both,
}

/// 视频输出
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoConfig {
    pub dev_id: u32,
    pub layer_id: u32,
    pub chn_id: u32,
    pub x: u32,
    pub y: u32,
    /// 0 表示跟随视频宽高
    pub width: u32,
    pub height: u32,
    /// "NV12" / "RGB888"
    pub format: String,
    pub splice_mode: SpliceMode,
    pub mirror: bool,
    pub flip: bool,
    pub rotation: u32,
}

impl Default for VoConfig {
    fn default() -> Self {
        Self {
            dev_id: 0,
            layer_id: 0,
            chn_id: 0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            format: "NV12".to_string(),
            splice_mode: SpliceMode::Rga,
            mirror: false,
            flip: false,
            rotation: 0,
        }
    }
}

impl VoConfig {
    /// 解析显示格式，未知格式回退 RGB888
    pub fn display_format(&self) -> VoFormat {
        match self.format.to_ascii_uppercase().as_str() {
            "NV12" => VoFormat::Nv12,
            "RGB888" => VoFormat::Rgb888,
            other => {
                warn!("⚠️  未知的显示格式 {}，使用 RGB888", other);
                VoFormat::Rgb888
            }
        }
    }

    pub fn mirror_mode(&self) -> MirrorMode {
        match (self.mirror, self.flip) {
            (false, false) => MirrorMode::None,
            (true, false) => MirrorMode::Horizontal,
            (false, true) => MirrorMode::Vertical,
            (true, true) => MirrorMode::Both,
        }
    }
}

/// 音频输出
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AoConfig {
    pub dev_id: u32,
    pub chn_id: u32,
    /// 0 ~ 100
    pub volume: u32,
}

impl Default for AoConfig {
    fn default() -> Self {
        Self {
            dev_id: 0,
            chn_id: 0,
            volume: 100,
        }
    }
}

/// 抓图（JPEG 编码）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub venc_chn_id: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            venc_chn_id: 0,
            max_width: 4096,
            max_height: 4096,
        }
    }
}

/// RTSP 拉流参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    /// "tcp" / "udp"
    pub transport: String,
    pub io_timeout_ms: u32,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            transport: "tcp".to_string(),
            io_timeout_ms: 3000,
        }
    }
}
