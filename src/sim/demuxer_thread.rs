use crate::core::{DemuxerPacket, Result, StreamKind};
use crate::player::demuxer_source::PacketCallbacks;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, info, warn};
use std::process;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// Demuxer 线程命令
pub enum DemuxerCommand {
    Stop,
}

/// 回环解封装器的推包线程
///
/// 按顺序把包交给读包回调（回调内部自己做背压），推完后补一个 eof 包，
/// 然后保持存活直到收到 Stop。
pub struct DemuxerThread {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<DemuxerCommand>,
}

impl DemuxerThread {
    pub fn start(
        label: String,
        packets: Vec<(StreamKind, DemuxerPacket)>,
        callbacks: PacketCallbacks,
    ) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<DemuxerCommand>();

        let thread_handle = thread::Builder::new()
            .name("demuxer".to_string())
            .spawn(move || Self::demux_loop(&label, packets, &callbacks, command_rx))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            command_tx,
        })
    }

    fn demux_loop(
        label: &str,
        packets: Vec<(StreamKind, DemuxerPacket)>,
        callbacks: &PacketCallbacks,
        command_rx: Receiver<DemuxerCommand>,
    ) {
        info!("{} 🎬 Demuxer 线程启动: {}（{} 个包）", log_ctx(), label, packets.len());

        let mut video_packet_count: usize = 0;
        let mut audio_packet_count: usize = 0;
        const LOG_FIRST_N: usize = 5;

        for (kind, packet) in packets {
            // 优先处理命令（非阻塞）
            match command_rx.try_recv() {
                Ok(DemuxerCommand::Stop) | Err(TryRecvError::Disconnected) => {
                    info!("{} ⏹ Demuxer 线程收到停止命令", log_ctx());
                    return;
                }
                Err(TryRecvError::Empty) => {}
            }

            match kind {
                StreamKind::Video => {
                    if let Some(callback) = &callbacks.video {
                        video_packet_count += 1;
                        if video_packet_count <= LOG_FIRST_N || video_packet_count % 100 == 0 {
                            debug!("{} 📦 推送视频包 #{}: PTS={}us", log_ctx(), video_packet_count, packet.pts_us);
                        }
                        callback(packet);
                    }
                }
                StreamKind::Audio => {
                    if let Some(callback) = &callbacks.audio {
                        audio_packet_count += 1;
                        if audio_packet_count <= LOG_FIRST_N || audio_packet_count % 100 == 0 {
                            debug!("{} 🔊 推送音频包 #{}: PTS={}us", log_ctx(), audio_packet_count, packet.pts_us);
                        }
                        callback(packet);
                    }
                }
            }
        }

        if let Some(callback) = &callbacks.video {
            callback(DemuxerPacket::eof());
        }
        if let Some(callback) = &callbacks.audio {
            callback(DemuxerPacket::eof());
        }

        // 到达末尾：保持线程存活，等待 Stop
        info!(
            "{} 📄 Demuxer 到达末尾（{} 视频，{} 音频），等待停止命令...",
            log_ctx(),
            video_packet_count,
            audio_packet_count
        );
        let _ = command_rx.recv();
        info!("{} 🛑 Demuxer 线程退出", log_ctx());
    }

    /// 发送 Stop 命令并等待线程退出
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(DemuxerCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ DemuxerThread 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}
