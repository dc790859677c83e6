//! 读包回调：解封装线程推来的包在这里按 Seek 子状态过滤后送解码通道
//! （原始 PCM 直接写音频输出）。

use crate::core::{
    AudioFrame, DemuxerPacket, MediaBuffer, SeekStatus, StreamKind, AO_DRAIN_TIMEOUT_MS,
    POLL_TIMEOUT_MS,
};
use crate::player::context::SessionShared;
use crate::player::demuxer_source::{PacketCallback, PacketCallbacks};
use crate::player::stages::{AudioDecodeStage, AudioOutputStage, VideoDecodeStage};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 音频等待视频落点时每次自旋的间隔
const AUDIO_SPIN_SLEEP_MS: u64 = 1;

/// 构造读包回调所需的通道句柄
pub struct RouteTargets {
    pub video_decoder: Option<Arc<dyn VideoDecodeStage>>,
    pub audio_decoder: Option<Arc<dyn AudioDecodeStage>>,
    /// 仅原始 PCM 需要：回调直接写音频输出
    pub pcm_output: Option<Arc<dyn AudioOutputStage>>,
    /// 音频等待视频落点的上限（一帧视频时长）
    pub audio_spin_limit: Duration,
}

pub fn build_callbacks(shared: &Arc<SessionShared>, targets: RouteTargets) -> PacketCallbacks {
    let video = targets.video_decoder.map(|decoder| {
        let shared = shared.clone();
        Arc::new(move |packet: DemuxerPacket| on_video_packet(&shared, decoder.as_ref(), packet)) as PacketCallback
    });

    let spin_limit = targets.audio_spin_limit;
    let audio = match (targets.audio_decoder, targets.pcm_output) {
        (Some(decoder), _) => {
            let shared = shared.clone();
            Some(Arc::new(move |packet: DemuxerPacket| {
                on_audio_packet(&shared, decoder.as_ref(), spin_limit, packet)
            }) as PacketCallback)
        }
        (None, Some(output)) => {
            let shared = shared.clone();
            Some(Arc::new(move |packet: DemuxerPacket| {
                on_pcm_packet(&shared, output.as_ref(), spin_limit, packet)
            }) as PacketCallback)
        }
        (None, None) => None,
    };

    PacketCallbacks { video, audio }
}

fn on_video_packet(shared: &SessionShared, decoder: &dyn VideoDecodeStage, packet: DemuxerPacket) {
    if shared.is_stopped() {
        return;
    }

    let seek = shared.seek.status();
    let target = shared.seek.target_us();
    let deliver = match seek {
        SeekStatus::Wait => packet.eof,
        SeekStatus::VideoDoing => packet.eof || (packet.key_frame && packet.pts_us >= target),
        _ => true,
    };
    if !deliver {
        return;
    }

    if seek == SeekStatus::VideoDoing {
        if !packet.eof {
            shared.seek.set_target_us(packet.pts_us);
        }
        shared.seek.advance(SeekStatus::VideoDoing, SeekStatus::VideoDone);
        info!("⏩ Seek 视频落点: PTS={}us (eof={})", packet.pts_us, packet.eof);
    }

    shared.send_with_retry("送视频码流", || decoder.send_stream(&packet, POLL_TIMEOUT_MS));
}

/// 音频包的 Seek 过滤，返回 true 表示放行
fn audio_gate(shared: &SessionShared, spin_limit: Duration, packet: &DemuxerPacket) -> bool {
    match shared.seek.status() {
        SeekStatus::Wait => return false,
        // 结束标记照常放行，否则音频投递线程等不到 EOS
        SeekStatus::VideoDone => return packet.eof,
        SeekStatus::VideoDoing => {
            // 等视频找到落点，最多一帧时长；普通包丢弃
            let deadline = Instant::now() + spin_limit;
            while matches!(shared.seek.status(), SeekStatus::VideoDoing | SeekStatus::VideoDone)
                && !shared.is_stopped()
                && Instant::now() < deadline
            {
                thread::sleep(Duration::from_millis(AUDIO_SPIN_SLEEP_MS));
            }
            return packet.eof;
        }
        SeekStatus::None | SeekStatus::Done => {}
    }

    if packet.eof {
        return true;
    }

    match shared.seek.status() {
        SeekStatus::None => true,
        SeekStatus::Done if packet.pts_us >= shared.seek.target_us() => {
            if shared.seek.advance(SeekStatus::Done, SeekStatus::None) {
                debug!("⏩ Seek 完成，音频从 {}us 恢复", packet.pts_us);
            }
            true
        }
        _ => false,
    }
}

fn on_audio_packet(
    shared: &SessionShared,
    decoder: &dyn AudioDecodeStage,
    spin_limit: Duration,
    packet: DemuxerPacket,
) {
    if shared.is_stopped() || !audio_gate(shared, spin_limit, &packet) {
        return;
    }

    if packet.eof {
        shared.send_with_retry("送音频结束标记", || decoder.send_end_of_stream());
        return;
    }
    shared.send_with_retry("送音频码流", || decoder.send_stream(&packet));
}

fn on_pcm_packet(
    shared: &SessionShared,
    output: &dyn AudioOutputStage,
    spin_limit: Duration,
    packet: DemuxerPacket,
) {
    if shared.is_stopped() || !audio_gate(shared, spin_limit, &packet) {
        return;
    }

    if packet.eof || packet.data.is_empty() {
        if let Err(e) = output.wait_eos(AO_DRAIN_TIMEOUT_MS) {
            warn!("⚠️  等待 PCM 播放完成失败: {}", e);
        }
        if !shared.is_stopped() {
            shared.clock.snap_to_duration();
            shared.finish_stream(StreamKind::Audio);
        }
        return;
    }

    shared.clock.set_position_us(packet.pts_us);
    let frame = AudioFrame {
        ts_us: packet.pts_us,
        buffer: MediaBuffer::new(packet.data),
    };
    shared.send_with_retry("写 PCM", || output.send_frame(&frame));
}
