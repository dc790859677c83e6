use crate::core::{DemuxerPacket, DemuxerParam, Result};
use std::sync::Arc;

/// 包回调：由解封装器的读包线程调用
pub type PacketCallback = Arc<dyn Fn(DemuxerPacket) + Send + Sync>;

/// 读包回调槽位（视频 / 音频各一个）
#[derive(Clone, Default)]
pub struct PacketCallbacks {
    pub video: Option<PacketCallback>,
    pub audio: Option<PacketCallback>,
}

/// 创建解封装器的参数
#[derive(Debug, Clone)]
pub struct DemuxerInput {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    /// 被动模式：由解封装器自己的线程推包（播放用）；主动模式只用于探测时长
    pub passive: bool,
    pub rtsp_transport: String,
    pub io_timeout_ms: u32,
}

/// Demuxer 抽象接口
///
/// 不同的媒体源（本地文件、RTSP、内存回环等）实现这个接口。
/// `read_packet_start` 之后，包通过回调推送，直到流结束或 `read_packet_stop`。
pub trait Demuxer: Send {
    /// 打开媒体并读取流参数
    fn get_param(&mut self, uri: &str) -> Result<DemuxerParam>;

    /// 从指定位置（微秒）开始推包
    fn read_packet_start(&mut self, start_pts_us: i64, callbacks: PacketCallbacks) -> Result<()>;

    /// 停止推包，返回时不会再有回调被调用
    fn read_packet_stop(&mut self) -> Result<()>;

    /// 音频流时长（毫秒）
    fn read_audio_duration(&mut self) -> Result<i64>;

    /// 视频流时长（毫秒）
    fn read_video_duration(&mut self) -> Result<i64>;

    /// 释放解封装器
    fn destroy(&mut self);

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
