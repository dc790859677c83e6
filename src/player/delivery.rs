//! 音视频投递线程：从解码通道取帧送输出通道，按 PTS 差值控速，检测播放结束。

use crate::core::{
    PlayerState, Result, SeekStatus, StreamKind, AO_DRAIN_TIMEOUT_MS, AUDIO_GET_TIMEOUT_MS,
    PAUSE_SLEEP_MS, POLL_TIMEOUT_MS,
};
use crate::player::context::SessionShared;
use crate::player::stages::{AudioDecodeStage, AudioOutputStage, VideoDecodeStage, VideoOutputStage};
use log::{debug, info, warn};
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

const LOG_FIRST_N: usize = 5;

/// 视频投递线程的输入
pub struct VideoDelivery {
    pub shared: Arc<SessionShared>,
    pub decoder: Arc<dyn VideoDecodeStage>,
    pub output: Arc<dyn VideoOutputStage>,
    /// 一帧时长（微秒），控速延时的上限
    pub frame_period_us: i64,
}

/// 音频投递线程的输入
pub struct AudioDelivery {
    pub shared: Arc<SessionShared>,
    pub decoder: Arc<dyn AudioDecodeStage>,
    pub output: Arc<dyn AudioOutputStage>,
}

pub fn spawn_video_thread(delivery: VideoDelivery) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("video-send".to_string())
        .spawn(move || delivery.run())?)
}

pub fn spawn_audio_thread(delivery: AudioDelivery) -> Result<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("audio-send".to_string())
        .spawn(move || delivery.run())?)
}

impl VideoDelivery {
    fn run(self) {
        info!("{} 🎬 视频投递线程启动", log_ctx());
        let shared = &self.shared;
        let mut last_send = Instant::now();
        let mut frame_count: usize = 0;
        let mut reached_end = false;

        loop {
            let status = shared.status();
            if status == PlayerState::Stop {
                break;
            }

            // 暂停中只放行 Seek 落点帧
            if status == PlayerState::Pause && shared.seek.status() != SeekStatus::VideoDone {
                thread::sleep(Duration::from_millis(PAUSE_SLEEP_MS));
                continue;
            }

            if !self.decoder.poll(POLL_TIMEOUT_MS) {
                continue;
            }

            if shared.seek.advance(SeekStatus::VideoDone, SeekStatus::Done) {
                debug!("{} ⏩ Seek 落点帧已就绪，音频恢复投递", log_ctx());
            }

            let mut frame = match self.decoder.get_frame(POLL_TIMEOUT_MS) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{} ⚠️  获取视频帧失败: {}", log_ctx(), e);
                    continue;
                }
            };

            if frame.eos {
                info!("{} 📄 视频解码结束（共送显 {} 帧）", log_ctx(), frame_count);
                if shared.black_background {
                    frame.blank();
                    if let Err(e) = self.output.send_frame(&frame) {
                        warn!("{} ⚠️  送黑屏帧失败: {}", log_ctx(), e);
                    }
                }
                self.decoder.release_frame(frame);
                reached_end = true;
                break;
            }

            if !shared.audio_exists() {
                shared.clock.set_position_us(frame.pts_us);
            }

            // ========== 按 PTS 差值控速（RTSP 实时流不控速）==========
            if !shared.is_rtsp() {
                let prev_pts = shared.clock.video_ts_us();
                if prev_pts >= 0 {
                    let delta = frame.pts_us - prev_pts;
                    let cost = last_send.elapsed().as_micros() as i64;
                    let delay = (delta - cost).clamp(0, self.frame_period_us);
                    if delay > 0 {
                        thread::sleep(Duration::from_micros(delay as u64));
                    }
                }
                shared.clock.set_video_ts_us(frame.pts_us);
            }

            shared.snapshot_slot.update(&frame);

            frame_count += 1;
            if frame_count <= LOG_FIRST_N || frame_count % 100 == 0 {
                debug!("{} 🎬 送显视频帧 #{}: PTS={}us", log_ctx(), frame_count, frame.pts_us);
            }
            if let Err(e) = self.output.send_frame(&frame) {
                warn!("{} ⚠️  送显失败: {}", log_ctx(), e);
            }
            last_send = Instant::now();
            self.decoder.release_frame(frame);
        }

        if reached_end && !shared.is_stopped() {
            if !shared.audio_exists() {
                shared.clock.snap_to_duration();
            }
            shared.finish_stream(StreamKind::Video);
        }
        info!("{} 🛑 视频投递线程退出", log_ctx());
    }
}

impl AudioDelivery {
    fn run(self) {
        info!("{} 🔊 音频投递线程启动", log_ctx());
        let shared = &self.shared;
        let mut frame_count: usize = 0;
        let mut reached_end = false;

        while !shared.is_stopped() {
            let frame = match self.decoder.get_frame(AUDIO_GET_TIMEOUT_MS) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{} ⚠️  获取音频帧失败: {}", log_ctx(), e);
                    thread::sleep(Duration::from_millis(PAUSE_SLEEP_MS));
                    continue;
                }
            };

            if frame.is_eos() {
                info!("{} 📄 音频解码结束（共输出 {} 帧）", log_ctx(), frame_count);
                self.decoder.release_frame(frame);
                reached_end = true;
                break;
            }

            shared.clock.set_position_us(frame.ts_us);
            frame_count += 1;
            if frame_count <= LOG_FIRST_N || frame_count % 100 == 0 {
                debug!("{} 🔊 输出音频帧 #{}: ts={}us", log_ctx(), frame_count, frame.ts_us);
            }

            let output = &self.output;
            shared.send_with_retry("送音频帧", || output.send_frame(&frame));
            self.decoder.release_frame(frame);
        }

        if reached_end && !shared.is_stopped() {
            shared.clock.snap_to_duration();
            if let Err(e) = self.output.wait_eos(AO_DRAIN_TIMEOUT_MS) {
                warn!("{} ⚠️  等待音频播放完成失败: {}", log_ctx(), e);
            }
            shared.finish_stream(StreamKind::Audio);
        }
        info!("{} 🛑 音频投递线程退出", log_ctx());
    }
}
