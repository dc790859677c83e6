use crate::core::{
    AudioCodec, PlayerConfig, PlayerError, PlayerEvent, PlayerState, Result, SeekStatus, SpliceMode,
    VoFormat, SEEK_MARGIN_MS,
};
use crate::player::context::SessionShared;
use crate::player::delivery::{spawn_audio_thread, spawn_video_thread, AudioDelivery, VideoDelivery};
use crate::player::demuxer_source::{Demuxer, DemuxerInput};
use crate::player::events::{EventCallback, EventNotifier};
use crate::player::packet_router::{build_callbacks, RouteTargets};
use crate::player::pipeline::Pipeline;
use crate::player::resolver::{self, AudioRoute, ResolvedSource};
use crate::player::snapshot::{FrameSlot, SnapshotCallback, SnapshotWorker};
use crate::player::stages::{MediaBackend, VideoOutputStage};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 创建会话时注册的回调
#[derive(Clone, Default)]
pub struct PlayerCallbacks {
    pub on_event: Option<EventCallback>,
    /// 设置后启用抓图
    pub on_snapshot: Option<SnapshotCallback>,
}

struct SessionInner {
    file_path: String,
    source: Option<ResolvedSource>,
    demuxer: Option<Box<dyn Demuxer>>,
    video_output: Option<Arc<dyn VideoOutputStage>>,
    codec_registered: bool,
    pipeline: Pipeline,
    reading: bool,
    video_thread: Option<JoinHandle<()>>,
    audio_thread: Option<JoinHandle<()>>,
}

impl SessionInner {
    fn new(demuxer: Box<dyn Demuxer>) -> Self {
        Self {
            file_path: String::new(),
            source: None,
            demuxer: Some(demuxer),
            video_output: None,
            codec_registered: false,
            pipeline: Pipeline::default(),
            reading: false,
            video_thread: None,
            audio_thread: None,
        }
    }
}

/// 播放会话
///
/// 所有改变状态的接口都先拿会话锁再检查 / 修改状态。Seek 在同一把锁内完成
/// Stop → SetDataSource → Prepare → Play 的重建，不会与其他控制接口交错。
pub struct PlayerSession {
    config: PlayerConfig,
    backend: Arc<dyn MediaBackend>,
    shared: Arc<SessionShared>,
    inner: Mutex<SessionInner>,
    snapshot: Option<SnapshotWorker>,
    destroyed: bool,
}

impl PlayerSession {
    /// 创建播放器：解封装器、显示设备、MP3 解码注册、抓图线程
    pub fn create(
        config: PlayerConfig,
        backend: Arc<dyn MediaBackend>,
        callbacks: PlayerCallbacks,
    ) -> Result<Self> {
        info!("{} 🎮 创建播放器...", log_ctx());
        if !config.enable_video && !config.enable_audio {
            return Err(PlayerError::Validation("视频和音频都被禁用".to_string()));
        }

        let demuxer = backend.create_demuxer(&demuxer_input(&config, true))?;
        let mut inner = SessionInner::new(demuxer);

        if config.enable_video {
            match backend.create_video_output(&config.vo) {
                Ok(output) => inner.video_output = Some(output),
                Err(e) => {
                    error!("{} ❌ 创建视频输出设备失败: {}", log_ctx(), e);
                    release_devices(backend.as_ref(), &mut inner);
                    return Err(e);
                }
            }
        }

        if config.enable_audio {
            if let Err(e) = backend.register_audio_codec(AudioCodec::Mp3) {
                error!("{} ❌ 注册 MP3 解码失败: {}", log_ctx(), e);
                release_devices(backend.as_ref(), &mut inner);
                return Err(e);
            }
            inner.codec_registered = true;
        }

        let record_planar_as_nv12 = config.vo.splice_mode == SpliceMode::Bypass
            && config.vo.display_format() == VoFormat::Nv12;
        let shared = Arc::new(SessionShared::new(
            EventNotifier::new(callbacks.on_event),
            config.enable_black_background,
            FrameSlot::new(record_planar_as_nv12),
        ));

        let snapshot = match callbacks.on_snapshot {
            Some(callback) if config.enable_video => {
                match SnapshotWorker::start(shared.clone(), backend.clone(), config.snapshot.clone(), callback) {
                    Ok(worker) => Some(worker),
                    Err(e) => {
                        error!("{} ❌ 启动抓图线程失败: {}", log_ctx(), e);
                        release_devices(backend.as_ref(), &mut inner);
                        return Err(e);
                    }
                }
            }
            Some(_) => {
                warn!("{} ⚠️  视频已禁用，忽略抓图回调", log_ctx());
                None
            }
            None => None,
        };

        shared.set_status(PlayerState::Idle);
        info!("{} ✅ 播放器创建完成", log_ctx());

        Ok(Self {
            config,
            backend,
            shared,
            inner: Mutex::new(inner),
            snapshot,
            destroyed: false,
        })
    }

    /// 设置数据源（IDLE / STOP → INIT）
    pub fn set_data_source(&self, uri: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        self.set_data_source_locked(&mut inner, uri)
    }

    /// 创建解码 / 输出通道（INIT → PREPARED）
    pub fn prepare(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.prepare_locked(&mut inner)
    }

    /// 开始 / 恢复播放（PREPARED / PAUSE → PLAY）
    pub fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.play_locked(&mut inner)
    }

    /// 暂停（PLAY → PAUSE）
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.pause_locked(&mut inner)
    }

    /// 停止（PREPARED / PLAY / PAUSE → STOP，IDLE / INIT 下直接成功）
    pub fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.stop_locked(&mut inner)
    }

    /// 跳转到指定位置（毫秒）
    ///
    /// 停止当前管线，以同一路径重新 SetDataSource / Prepare，再从目标位置 Play；
    /// 原来处于暂停则重新暂停。完成后发 SEEK_END。
    pub fn seek(&self, time_ms: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        let status = self.shared.status();
        if !status.is_seekable() {
            return Err(PlayerError::InvalidState { op: "seek", state: status });
        }
        if self.shared.is_rtsp() {
            return Err(PlayerError::Validation("RTSP 流不支持 Seek".to_string()));
        }
        if time_ms < 0 || time_ms > i64::MAX / 1000 {
            return Err(PlayerError::Validation(format!("Seek 位置无效: {} ms", time_ms)));
        }
        let duration_ms = self.shared.clock.duration_ms();
        if duration_ms > 0 && time_ms > duration_ms {
            return Err(PlayerError::Validation(format!(
                "Seek 位置 {} ms 超出时长 {} ms",
                time_ms, duration_ms
            )));
        }

        // 纯音频不走这条捷径
        if self.shared.video_exists()
            && (time_ms - self.shared.clock.position_ms()).abs() < SEEK_MARGIN_MS
        {
            info!("{} ⏩ Seek 目标距当前位置不足 {}ms，直接完成", log_ctx(), SEEK_MARGIN_MS);
            self.shared.emit_raw(PlayerEvent::SeekEnd);
            return Ok(());
        }

        info!("{} 🎯 Seek 到: {} ms（当前状态 {}）", log_ctx(), time_ms, status.as_str());
        let was_paused = status == PlayerState::Pause;
        self.shared.seek.set_status(SeekStatus::Wait);

        match self.seek_rebuild(&mut inner, status, time_ms, was_paused) {
            Ok(()) => {
                info!("{} ✅ Seek 完成: {} ms", log_ctx(), time_ms);
                self.shared.emit_raw(PlayerEvent::SeekEnd);
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ Seek 失败: {}", log_ctx(), e);
                self.shared.seek.set_status(SeekStatus::None);
                Err(e)
            }
        }
    }

    pub fn get_play_status(&self) -> PlayerState {
        self.shared.status()
    }

    /// 媒体时长（毫秒）：另开一个解封装器探测，结果缓存用于 Seek 校验
    pub fn get_duration(&self) -> Result<i64> {
        let path = {
            let inner = self.inner.lock();
            if inner.file_path.is_empty() {
                return Err(PlayerError::Validation("尚未设置数据源".to_string()));
            }
            if self.shared.is_rtsp() {
                return Err(PlayerError::Validation("RTSP 流没有时长".to_string()));
            }
            inner.file_path.clone()
        };

        let mut probe = self.backend.create_demuxer(&demuxer_input(&self.config, false))?;
        let result = probe.get_param(&path).and_then(|_| {
            if self.shared.audio_exists() {
                probe.read_audio_duration()
            } else {
                probe.read_video_duration()
            }
        });
        probe.destroy();

        let duration_ms = result?;
        self.shared.clock.set_duration_ms(duration_ms);
        debug!("{} 媒体时长: {} ms", log_ctx(), duration_ms);
        Ok(duration_ms)
    }

    /// 当前播放位置（毫秒），只在 PLAY / PAUSE 下有效
    pub fn get_current_position(&self) -> Result<i64> {
        match self.shared.status() {
            PlayerState::Play | PlayerState::Pause => Ok(self.shared.clock.position_ms()),
            state => Err(PlayerError::InvalidState { op: "get_current_position", state }),
        }
    }

    /// 抓取最近送显的一帧，结果通过抓图回调返回
    pub fn snapshot(&self) -> Result<()> {
        if !self.shared.video_exists() {
            return Err(PlayerError::Validation("没有视频流，无法抓图".to_string()));
        }
        let worker = self
            .snapshot
            .as_ref()
            .ok_or_else(|| PlayerError::Validation("未注册抓图回调".to_string()))?;
        worker.request();
        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.shared.video_exists()
    }

    pub fn has_audio(&self) -> bool {
        self.shared.audio_exists()
    }

    /// 销毁播放器（先 Stop）
    pub fn destroy(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn set_data_source_locked(&self, inner: &mut SessionInner, uri: &str) -> Result<()> {
        let status = self.shared.status();
        if !matches!(status, PlayerState::Idle | PlayerState::Stop) {
            return Err(PlayerError::InvalidState { op: "set_data_source", state: status });
        }
        let seeking = self.shared.seek.status() == SeekStatus::Wait;

        match self.resolve_source(inner, uri) {
            Ok(source) => {
                info!(
                    "{} 📂 数据源: {} (视频: {}, 音频: {})",
                    log_ctx(),
                    uri,
                    source.video_exists(),
                    source.audio_exists()
                );
                self.shared
                    .set_streams(source.video_exists(), source.audio_exists(), source.kind.is_rtsp());
                self.shared.clock.reset_video_ts();
                if inner.file_path != uri {
                    self.shared.clock.set_duration_ms(0);
                    inner.file_path = uri.to_string();
                }
                inner.source = Some(source);
                self.shared.set_status(PlayerState::Init);
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ 设置数据源失败 ({}): {}", log_ctx(), uri, e);
                self.shared.set_streams(false, false, false);
                inner.source = None;
                if !seeking {
                    inner.file_path.clear();
                }
                self.shared.emit(PlayerEvent::Error);
                Err(e)
            }
        }
    }

    fn resolve_source(&self, inner: &mut SessionInner, uri: &str) -> Result<ResolvedSource> {
        let kind = resolver::classify(uri)?;
        let demuxer = inner
            .demuxer
            .as_mut()
            .ok_or_else(|| PlayerError::Resource("解封装器不可用".to_string()))?;
        let param = demuxer.get_param(uri)?;
        debug!("{} 解封装参数: {:?}", log_ctx(), param);
        resolver::resolve(kind, &param, self.config.enable_video, self.config.enable_audio)
    }

    fn prepare_locked(&self, inner: &mut SessionInner) -> Result<()> {
        let status = self.shared.status();
        if status != PlayerState::Init {
            return Err(PlayerError::InvalidState { op: "prepare", state: status });
        }

        let result = match inner.source.as_ref() {
            Some(source) => Pipeline::prepare(
                self.backend.as_ref(),
                &self.config,
                source,
                inner.video_output.as_ref(),
            ),
            None => Err(PlayerError::Other("数据源未解析".to_string())),
        };

        match result {
            Ok(pipeline) => {
                inner.pipeline = pipeline;
                self.shared.set_status(PlayerState::Prepared);
                info!("{} ✅ Prepare 完成", log_ctx());
                self.shared.emit(PlayerEvent::Prepared);
                Ok(())
            }
            Err(e) => {
                error!("{} ❌ Prepare 失败: {}", log_ctx(), e);
                self.shared.emit(PlayerEvent::Error);
                Err(e)
            }
        }
    }

    fn play_locked(&self, inner: &mut SessionInner) -> Result<()> {
        let status = self.shared.status();
        let restarted_by_seek = match status {
            PlayerState::Prepared => self.start_delivery(inner)?,
            PlayerState::Pause => {
                if let Err(e) = self.resume_outputs(inner) {
                    error!("{} ❌ 恢复播放失败: {}", log_ctx(), e);
                    self.shared.emit(PlayerEvent::Error);
                    return Err(e);
                }
                false
            }
            state => return Err(PlayerError::InvalidState { op: "play", state }),
        };

        self.shared.set_status(PlayerState::Play);
        info!("{} 🎬 播放", log_ctx());
        if !restarted_by_seek {
            self.shared.emit(PlayerEvent::Play);
        }
        Ok(())
    }

    /// 启动读包和投递线程，返回是否为 Seek 重建
    fn start_delivery(&self, inner: &mut SessionInner) -> Result<bool> {
        let source = inner
            .source
            .clone()
            .ok_or_else(|| PlayerError::Other("数据源未解析".to_string()))?;

        let seeking = self.shared.seek.status() == SeekStatus::Wait;
        let start_pts_us = if seeking { self.shared.seek.target_us() } else { 0 };
        self.shared.reset_eof();

        let audio_spin_limit = source
            .video
            .as_ref()
            .map(|video| Duration::from_micros(video.frame_period_us() as u64))
            .unwrap_or(Duration::ZERO);
        let pcm_output = match source.audio.as_ref().map(|audio| audio.route()) {
            Some(AudioRoute::Passthrough) => inner.pipeline.audio_output.clone(),
            _ => None,
        };
        let callbacks = build_callbacks(
            &self.shared,
            RouteTargets {
                video_decoder: inner.pipeline.video_decoder.clone(),
                audio_decoder: inner.pipeline.audio_decoder.clone(),
                pcm_output,
                audio_spin_limit,
            },
        );

        // 读包前切到找落点阶段，落点关键帧不会在 WAIT 中被丢掉
        if seeking {
            let next = if source.video_exists() {
                SeekStatus::VideoDoing
            } else {
                SeekStatus::Done
            };
            self.shared.seek.set_status(next);
        }

        let demuxer = inner
            .demuxer
            .as_mut()
            .ok_or_else(|| PlayerError::Resource("解封装器不可用".to_string()))?;
        if let Err(e) = demuxer.read_packet_start(start_pts_us, callbacks) {
            error!("{} ❌ 启动读包失败: {}", log_ctx(), e);
            self.shared.emit(PlayerEvent::Error);
            return Err(e);
        }
        inner.reading = true;

        if let Err(e) = self.spawn_delivery_threads(inner, &source) {
            error!("{} ❌ 启动投递线程失败: {}", log_ctx(), e);
            self.abort_delivery(inner, PlayerState::Prepared);
            self.shared.emit(PlayerEvent::Error);
            return Err(e);
        }

        if let Some(output) = inner.pipeline.audio_output.as_ref() {
            if let Err(e) = output.set_volume(self.config.ao.volume) {
                warn!("{} ⚠️  设置音量失败: {}", log_ctx(), e);
            }
        }
        Ok(seeking)
    }

    fn spawn_delivery_threads(&self, inner: &mut SessionInner, source: &ResolvedSource) -> Result<()> {
        if let (Some(video), Some(decoder), Some(output)) = (
            source.video.as_ref(),
            inner.pipeline.video_decoder.clone(),
            inner.pipeline.video_output().cloned(),
        ) {
            inner.video_thread = Some(spawn_video_thread(VideoDelivery {
                shared: self.shared.clone(),
                decoder,
                output,
                frame_period_us: video.frame_period_us(),
            })?);
        }

        if let (Some(decoder), Some(output)) = (
            inner.pipeline.audio_decoder.clone(),
            inner.pipeline.audio_output.clone(),
        ) {
            inner.audio_thread = Some(spawn_audio_thread(AudioDelivery {
                shared: self.shared.clone(),
                decoder,
                output,
            })?);
        }
        Ok(())
    }

    /// 启动失败时撤销已开始的读包 / 线程，状态恢复为 `restore`
    fn abort_delivery(&self, inner: &mut SessionInner, restore: PlayerState) {
        self.shared.set_status(PlayerState::Stop);
        if let Err(e) = self.stop_reading(inner) {
            warn!("{} ⚠️  撤销读包失败: {}", log_ctx(), e);
        }
        join_delivery_threads(inner);
        self.shared.set_status(restore);
    }

    fn stop_reading(&self, inner: &mut SessionInner) -> Result<()> {
        if !inner.reading {
            return Ok(());
        }
        if let Some(demuxer) = inner.demuxer.as_mut() {
            demuxer.read_packet_stop()?;
        }
        inner.reading = false;
        Ok(())
    }

    fn pause_locked(&self, inner: &mut SessionInner) -> Result<()> {
        let status = self.shared.status();
        if status != PlayerState::Play {
            return Err(PlayerError::InvalidState { op: "pause", state: status });
        }

        if let Err(e) = self.pause_outputs(inner) {
            self.shared.emit(PlayerEvent::Error);
            return Err(e);
        }

        self.shared.set_status(PlayerState::Pause);
        info!("{} ⏸️  暂停", log_ctx());
        self.shared.emit(PlayerEvent::Paused);
        Ok(())
    }

    /// 暂停输出通道，音频暂停失败视为整体失败
    fn pause_outputs(&self, inner: &SessionInner) -> Result<()> {
        if let Some(output) = inner.pipeline.audio_output.as_ref() {
            if let Err(e) = output.pause() {
                error!("{} ❌ 暂停音频输出失败: {}", log_ctx(), e);
                return Err(e);
            }
        }
        if let Some(output) = inner.pipeline.video_output() {
            if let Err(e) = output.pause() {
                warn!("{} ⚠️  暂停视频输出失败: {}", log_ctx(), e);
            }
        }
        Ok(())
    }

    /// 先恢复音频输出，失败时视频输出保持暂停
    fn resume_outputs(&self, inner: &SessionInner) -> Result<()> {
        if let Some(output) = inner.pipeline.audio_output.as_ref() {
            output.resume()?;
        }
        resume_video_output(inner);
        Ok(())
    }

    fn stop_locked(&self, inner: &mut SessionInner) -> Result<()> {
        let status = self.shared.status();
        match status {
            PlayerState::Idle | PlayerState::Init => {
                debug!("{} 尚未开始播放，Stop 直接返回", log_ctx());
                return Ok(());
            }
            PlayerState::Prepared | PlayerState::Play | PlayerState::Pause => {}
            state => return Err(PlayerError::InvalidState { op: "stop", state }),
        }
        info!("{} ⏹️  停止播放", log_ctx());

        // ========== 步骤1: 清掉 Seek 子状态，读包回调不再等待落点 ==========
        let saved_seek = self.shared.seek.status();
        self.shared.seek.set_status(SeekStatus::None);
        self.shared.seek.set_target_us(0);

        // ========== 步骤2: 暂停中的输出先恢复，避免投递线程卡在输出上 ==========
        if status == PlayerState::Pause {
            if let Err(e) = self.resume_outputs(inner) {
                warn!("{} ⚠️  恢复音频输出失败: {}", log_ctx(), e);
                resume_video_output(inner);
            }
        }
        if saved_seek != SeekStatus::Wait {
            self.shared.clock.set_position_us(0);
        }

        // ========== 步骤3: 停止读包，等待投递线程退出 ==========
        self.shared.set_status(PlayerState::Stop);
        if let Err(e) = self.stop_reading(inner) {
            error!("{} ❌ 停止读包失败: {}", log_ctx(), e);
            self.shared.set_status(status);
            self.shared.seek.set_status(saved_seek);
            self.shared.emit(PlayerEvent::Error);
            return Err(e);
        }
        join_delivery_threads(inner);

        // ========== 步骤4: 清理瞬态并销毁通道 ==========
        self.shared.snapshot_slot.clear();
        self.shared.reset_eof();
        inner.pipeline.teardown();

        // Seek 触发的 Stop 保留 WAIT，后续 SetDataSource / Prepare 据此处理
        if saved_seek == SeekStatus::Wait {
            self.shared.seek.set_status(SeekStatus::Wait);
        }
        info!("{} ✅ 停止播放完成，所有线程已清理", log_ctx());
        self.shared.emit(PlayerEvent::Stopped);
        Ok(())
    }

    fn seek_rebuild(
        &self,
        inner: &mut SessionInner,
        status: PlayerState,
        time_ms: i64,
        was_paused: bool,
    ) -> Result<()> {
        // ========== 步骤1: 停止当前播放 ==========
        if status != PlayerState::Stop {
            self.stop_locked(inner)?;
        }
        self.shared.clock.set_position_us(time_ms * 1000);

        // ========== 步骤2: 以同一路径重建管线 ==========
        let path = inner.file_path.clone();
        self.set_data_source_locked(inner, &path)?;
        self.prepare_locked(inner)?;

        // ========== 步骤3: 从目标位置开始读包 ==========
        self.shared.seek.set_target_us(time_ms * 1000);
        self.play_locked(inner)?;
        if was_paused {
            // 重新暂停不发 PAUSED，Seek 只以 SEEK_END 收尾
            self.pause_outputs(inner)?;
            self.shared.set_status(PlayerState::Pause);
            info!("{} ⏸️  Seek 后保持暂停", log_ctx());
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        info!("{} 🗑️  销毁播放器", log_ctx());

        {
            let mut inner = self.inner.lock();
            match self.stop_locked(&mut inner) {
                Ok(()) => {}
                Err(e) if e.is_state_error() => debug!("{} 销毁前无需停止: {}", log_ctx(), e),
                Err(e) => warn!("{} ⚠️  销毁前停止失败: {}", log_ctx(), e),
            }
            release_devices(self.backend.as_ref(), &mut inner);
        }

        if let Some(mut worker) = self.snapshot.take() {
            worker.stop();
        }
        info!("{} ✅ 播放器已销毁", log_ctx());
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        if !self.destroyed {
            warn!("{} ⚠ PlayerSession 被 drop，但未调用 destroy()，正在清理", log_ctx());
            self.shutdown();
        }
    }
}

fn demuxer_input(config: &PlayerConfig, passive: bool) -> DemuxerInput {
    DemuxerInput {
        video_enabled: config.enable_video,
        audio_enabled: config.enable_audio,
        passive,
        rtsp_transport: config.rtsp.transport.clone(),
        io_timeout_ms: config.rtsp.io_timeout_ms,
    }
}

fn resume_video_output(inner: &SessionInner) {
    if let Some(output) = inner.pipeline.video_output() {
        if let Err(e) = output.resume() {
            warn!("{} ⚠️  恢复视频输出失败: {}", log_ctx(), e);
        }
    }
}

fn join_delivery_threads(inner: &mut SessionInner) {
    if let Some(handle) = inner.video_thread.take() {
        let _ = handle.join();
        info!("{} ✅ 视频投递线程已结束", log_ctx());
    }
    if let Some(handle) = inner.audio_thread.take() {
        let _ = handle.join();
        info!("{} ✅ 音频投递线程已结束", log_ctx());
    }
}

/// 释放 create 阶段申请的设备（显示设备、MP3 注册、解封装器）
fn release_devices(backend: &dyn MediaBackend, inner: &mut SessionInner) {
    if let Some(output) = inner.video_output.take() {
        if let Err(e) = output.destroy() {
            warn!("{} ⚠️  释放视频输出设备失败: {}", log_ctx(), e);
        }
    }
    if inner.codec_registered {
        if let Err(e) = backend.unregister_audio_codec(AudioCodec::Mp3) {
            warn!("{} ⚠️  注销 MP3 解码失败: {}", log_ctx(), e);
        }
        inner.codec_registered = false;
    }
    if let Some(mut demuxer) = inner.demuxer.take() {
        demuxer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EofState, ErrorKind, SnapshotImage, VideoCodec};
    use crate::sim::{SimBackend, SimMedia, StageKind};
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::Instant;

    const MOVIE: &str = "/data/movie.mp4";
    const SHORT: &str = "/data/short.mp4";
    const CLIP: &str = "/data/clip.h264";
    const SONG: &str = "/data/song.mp3";
    const LIVE: &str = "rtsp://10.0.0.2/live";

    fn backend() -> Arc<SimBackend> {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Arc::new(SimBackend::new());
        backend.add_media(
            MOVIE,
            SimMedia::video(VideoCodec::H264, 64, 48, 25, 6000)
                .with_gop(25)
                .with_audio("mp3", 16000, 2),
        );
        backend.add_media(
            SHORT,
            SimMedia::video(VideoCodec::H264, 64, 48, 25, 400).with_audio("mp3", 16000, 2),
        );
        backend.add_media(CLIP, SimMedia::video(VideoCodec::H264, 64, 48, 50, 200).with_gop(5));
        backend.add_media(SONG, SimMedia::audio("mp3", 16000, 2, 3000));
        backend.add_media(
            LIVE,
            SimMedia::video(VideoCodec::H264, 64, 48, 25, 6000)
                .with_audio("pcm_alaw", 8000, 1)
                .live(),
        );
        backend
    }

    fn open_with(
        backend: &Arc<SimBackend>,
        config: PlayerConfig,
        on_snapshot: Option<SnapshotCallback>,
    ) -> (PlayerSession, Receiver<PlayerEvent>) {
        let (tx, rx) = unbounded();
        let callbacks = PlayerCallbacks {
            on_event: Some(Arc::new(move |ev: PlayerEvent| {
                let _ = tx.send(ev);
            })),
            on_snapshot,
        };
        let session = PlayerSession::create(config, backend.clone(), callbacks).unwrap();
        (session, rx)
    }

    fn open(backend: &Arc<SimBackend>) -> (PlayerSession, Receiver<PlayerEvent>) {
        open_with(backend, PlayerConfig::default(), None)
    }

    fn wait_for(events: &Receiver<PlayerEvent>, expected: PlayerEvent, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while let Ok(ev) = events.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            if ev == expected {
                return true;
            }
        }
        false
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_video_only_plays_to_eof() {
        let backend = backend();
        let mut config = PlayerConfig::default();
        config.enable_black_background = true;
        let (session, events) = open_with(&backend, config, None);
        assert_eq!(session.get_play_status(), PlayerState::Idle);

        session.set_data_source(CLIP).unwrap();
        assert!(session.has_video());
        assert!(!session.has_audio());
        assert_eq!(session.get_duration().unwrap(), 200);

        session.prepare().unwrap();
        session.play().unwrap();
        assert!(wait_for(&events, PlayerEvent::Eof, Duration::from_secs(3)));

        // EOF 不改变状态，位置对齐到时长
        assert_eq!(session.get_play_status(), PlayerState::Play);
        assert_eq!(session.get_current_position().unwrap(), 200);
        let vo = backend.video_output().unwrap();
        assert_eq!(vo.frames_shown(), 10);
        assert_eq!(vo.black_frames(), 1);

        session.stop().unwrap();
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_container_reports_both_streams() {
        let backend = backend();
        let (session, events) = open(&backend);

        session.set_data_source(MOVIE).unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Init);
        assert!(session.has_video());
        assert!(session.has_audio());

        session.prepare().unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Prepared);
        assert_eq!(events.try_recv().unwrap(), PlayerEvent::Prepared);

        let counters = backend.counters();
        assert_eq!(counters.live(StageKind::VideoDecoder), 1);
        assert_eq!(counters.live(StageKind::AudioDecoder), 1);
        assert_eq!(counters.live(StageKind::AudioOutput), 1);
        assert!(backend.video_output().unwrap().is_enabled());

        session.destroy().unwrap();
        assert!(counters.all_released());
    }

    #[test]
    fn test_pause_in_init_is_rejected_silently() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();

        let err = session.pause().unwrap_err();
        assert!(err.is_state_error());
        assert_eq!(session.get_play_status(), PlayerState::Init);
        assert!(events.try_recv().is_err());
        session.destroy().unwrap();
    }

    #[test]
    fn test_seek_from_stop_restarts_at_target() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        assert_eq!(session.get_duration().unwrap(), 6000);
        session.prepare().unwrap();
        session.play().unwrap();
        thread::sleep(Duration::from_millis(100));
        session.stop().unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Stop);
        events.try_iter().for_each(drop);

        session.seek(5000).unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Play);
        // 重建过程中的 Prepared / Play 事件被压制，只有 SEEK_END
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![PlayerEvent::SeekEnd]);
        assert_eq!(backend.read_starts().last().copied(), Some(5_000_000));

        let vo = backend.video_output().unwrap();
        assert!(wait_until(Duration::from_secs(2), || vo.last_pts_us() >= 5_000_000));
        assert!(wait_until(Duration::from_secs(2), || {
            session.shared.seek.status() == SeekStatus::None
        }));
        assert!(session.get_current_position().unwrap() >= 5000);

        session.stop().unwrap();
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_rtsp_rejects_seek_and_duration() {
        let backend = backend();
        let (session, _events) = open(&backend);
        session.set_data_source(LIVE).unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Init);
        assert_eq!(session.get_duration().unwrap_err().kind(), ErrorKind::Validation);

        session.prepare().unwrap();
        session.play().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(session.seek(1000).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(session.get_play_status(), PlayerState::Play);
        assert_eq!(backend.read_starts().len(), 1);

        session.stop().unwrap();
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_illegal_transitions_leave_state_unchanged() {
        let backend = backend();
        let (session, events) = open(&backend);

        for result in [session.prepare(), session.play(), session.pause(), session.seek(0)] {
            assert!(result.unwrap_err().is_state_error());
        }
        assert!(session.get_current_position().unwrap_err().is_state_error());
        session.stop().unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Idle);

        session.set_data_source(MOVIE).unwrap();
        for result in [
            session.play(),
            session.pause(),
            session.set_data_source(MOVIE),
            session.seek(0),
        ] {
            assert!(result.unwrap_err().is_state_error());
        }
        session.stop().unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Init);

        session.prepare().unwrap();
        for result in [session.prepare(), session.pause(), session.set_data_source(MOVIE)] {
            assert!(result.unwrap_err().is_state_error());
        }
        assert_eq!(session.get_play_status(), PlayerState::Prepared);

        session.stop().unwrap();
        assert!(session.stop().unwrap_err().is_state_error());
        for result in [session.prepare(), session.play(), session.pause()] {
            assert!(result.unwrap_err().is_state_error());
        }
        assert_eq!(session.get_play_status(), PlayerState::Stop);
        assert!(events.try_iter().all(|ev| ev != PlayerEvent::Error));

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_restart_after_stop_resolves_same_source() {
        let backend = backend();
        let (session, _events) = open(&backend);

        for _ in 0..2 {
            session.set_data_source(MOVIE).unwrap();
            assert_eq!(session.get_play_status(), PlayerState::Init);
            assert!(session.has_video() && session.has_audio());
            session.prepare().unwrap();
            session.play().unwrap();
            thread::sleep(Duration::from_millis(60));
            session.stop().unwrap();
        }
        assert_eq!(backend.read_starts(), vec![0, 0]);

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_seek_within_margin_skips_rebuild_with_video() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();

        session.seek(200).unwrap();
        assert!(wait_for(&events, PlayerEvent::SeekEnd, Duration::from_millis(100)));
        assert_eq!(backend.read_starts().len(), 1);
        assert_eq!(backend.counters().created(StageKind::VideoDecoder), 1);

        session.destroy().unwrap();
    }

    #[test]
    fn test_audio_only_seek_always_rebuilds() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(SONG).unwrap();
        assert!(!session.has_video());
        session.prepare().unwrap();
        session.play().unwrap();

        session.seek(100).unwrap();
        assert!(wait_for(&events, PlayerEvent::SeekEnd, Duration::from_secs(1)));
        assert_eq!(backend.read_starts(), vec![0, 100_000]);
        assert_eq!(backend.counters().created(StageKind::AudioDecoder), 2);
        assert_eq!(session.get_play_status(), PlayerState::Play);

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_seek_while_paused_stays_paused() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.get_duration().unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        thread::sleep(Duration::from_millis(80));
        session.pause().unwrap();
        events.try_iter().for_each(drop);

        session.seek(3000).unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Pause);
        assert!(session.get_current_position().unwrap() >= 3000);

        // 暂停中仍会显示落点帧
        let vo = backend.video_output().unwrap();
        assert!(wait_until(Duration::from_secs(2), || vo.last_pts_us() >= 3_000_000));
        thread::sleep(Duration::from_millis(150));
        assert!(vo.last_pts_us() <= 3_040_000);
        assert!(vo.is_paused());
        assert!(backend.audio_output().unwrap().is_paused());
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![PlayerEvent::SeekEnd]);

        session.play().unwrap();
        assert!(!vo.is_paused());
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_audio_only_seek_while_paused_emits_only_seek_end() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(SONG).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        thread::sleep(Duration::from_millis(50));
        session.pause().unwrap();
        events.try_iter().for_each(drop);

        session.seek(1500).unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Pause);
        assert!(backend.audio_output().unwrap().is_paused());
        thread::sleep(Duration::from_millis(100));
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![PlayerEvent::SeekEnd]);

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_seek_near_end_still_reaches_eof() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.get_duration().unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        thread::sleep(Duration::from_millis(50));

        // 目标之后没有关键帧：视频以结束标记落点，音频结束标记不能被丢掉
        session.seek(5990).unwrap();
        assert!(wait_for(&events, PlayerEvent::Eof, Duration::from_secs(8)));
        assert_eq!(session.shared.eof_state(), EofState::BothDone);
        assert_eq!(session.get_play_status(), PlayerState::Play);

        session.stop().unwrap();
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_play_from_pause_fails_when_audio_resume_fails() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        session.pause().unwrap();
        events.try_iter().for_each(drop);

        let ao = backend.audio_output().unwrap();
        ao.fail_next_resume();
        assert_eq!(session.play().unwrap_err().kind(), ErrorKind::Resource);
        assert_eq!(session.get_play_status(), PlayerState::Pause);
        assert_eq!(events.try_iter().collect::<Vec<_>>(), vec![PlayerEvent::Error]);
        assert!(backend.video_output().unwrap().is_paused());

        session.play().unwrap();
        assert_eq!(session.get_play_status(), PlayerState::Play);
        assert!(!ao.is_paused());
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_seek_rejects_out_of_range() {
        let backend = backend();
        let (session, _events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.get_duration().unwrap();
        session.prepare().unwrap();

        assert_eq!(session.seek(-1).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(session.seek(6001).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(session.seek(i64::MAX).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(session.get_play_status(), PlayerState::Prepared);
        session.destroy().unwrap();
    }

    #[test]
    fn test_av_eof_fires_once() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(SHORT).unwrap();
        assert_eq!(session.get_duration().unwrap(), 400);
        session.prepare().unwrap();
        session.play().unwrap();

        assert!(wait_for(&events, PlayerEvent::Eof, Duration::from_secs(3)));
        thread::sleep(Duration::from_millis(100));
        assert!(events.try_iter().all(|ev| ev != PlayerEvent::Eof));
        assert_eq!(session.shared.eof_state(), EofState::BothDone);
        assert_eq!(session.get_current_position().unwrap(), 400);

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_destroy_releases_everything_from_any_state() {
        for step in 0..5 {
            let backend = backend();
            let (session, _events) = open(&backend);
            if step >= 1 {
                session.set_data_source(MOVIE).unwrap();
            }
            if step >= 2 {
                session.prepare().unwrap();
            }
            if step >= 3 {
                session.play().unwrap();
                thread::sleep(Duration::from_millis(30));
            }
            if step >= 4 {
                session.pause().unwrap();
            }
            session.destroy().unwrap();
            assert!(backend.counters().all_released(), "step {}", step);
        }

        // 未调用 destroy 时 drop 也会清理
        let backend = backend();
        let (session, _events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        drop(session);
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_prepare_failure_rolls_back() {
        let backend = backend();
        let (session, events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        backend.fail_next(StageKind::AudioDecoder);

        let err = session.prepare().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert_eq!(session.get_play_status(), PlayerState::Init);
        assert_eq!(events.try_recv().unwrap(), PlayerEvent::Error);
        assert_eq!(backend.counters().live(StageKind::VideoDecoder), 0);
        assert!(!backend.video_output().unwrap().is_enabled());

        session.prepare().unwrap();
        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_unknown_media_clears_source() {
        let backend = backend();
        let (session, events) = open(&backend);

        assert_eq!(session.set_data_source("/data/missing.mp4").unwrap_err().kind(), ErrorKind::Resource);
        assert_eq!(events.try_recv().unwrap(), PlayerEvent::Error);
        assert_eq!(session.get_play_status(), PlayerState::Idle);
        assert!(!session.has_video() && !session.has_audio());
        assert_eq!(session.get_duration().unwrap_err().kind(), ErrorKind::Validation);

        assert_eq!(session.set_data_source("/data/movie.avi").unwrap_err().kind(), ErrorKind::Validation);
        session.destroy().unwrap();
    }

    #[test]
    fn test_create_validates_and_rolls_back() {
        let backend = backend();
        let mut config = PlayerConfig::default();
        config.enable_video = false;
        config.enable_audio = false;
        let err = PlayerSession::create(config, backend.clone(), PlayerCallbacks::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);

        backend.fail_next(StageKind::AudioCodec);
        assert!(PlayerSession::create(PlayerConfig::default(), backend.clone(), PlayerCallbacks::default()).is_err());
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_snapshot_delivers_jpeg() {
        let backend = backend();
        let (snap_tx, snap_rx) = unbounded::<SnapshotImage>();
        let on_snapshot: SnapshotCallback = Arc::new(move |image: SnapshotImage| {
            let _ = snap_tx.send(image);
        });
        let (session, _events) = open_with(&backend, PlayerConfig::default(), Some(on_snapshot));
        session.set_data_source(MOVIE).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();

        let vo = backend.video_output().unwrap();
        assert!(wait_until(Duration::from_secs(2), || vo.frames_shown() > 0));
        session.snapshot().unwrap();
        let image = snap_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((image.width, image.height), (64, 48));
        assert_eq!(&image.data[..2], &[0xFF, 0xD8]);

        session.destroy().unwrap();
        assert!(backend.counters().all_released());
    }

    #[test]
    fn test_snapshot_requires_video_and_callback() {
        let backend = backend();
        let (session, _events) = open(&backend);
        session.set_data_source(MOVIE).unwrap();
        assert_eq!(session.snapshot().unwrap_err().kind(), ErrorKind::Validation);
        session.destroy().unwrap();

        let on_snapshot: SnapshotCallback = Arc::new(|_image: SnapshotImage| {});
        let (session, _events) = open_with(&backend, PlayerConfig::default(), Some(on_snapshot));
        session.set_data_source(SONG).unwrap();
        assert_eq!(session.snapshot().unwrap_err().kind(), ErrorKind::Validation);
        session.destroy().unwrap();
    }

    #[test]
    fn test_play_applies_volume() {
        let backend = backend();
        let mut config = PlayerConfig::default();
        config.ao.volume = 40;
        let (session, _events) = open_with(&backend, config, None);
        session.set_data_source(SONG).unwrap();
        session.prepare().unwrap();
        session.play().unwrap();
        assert!((backend.audio_output().unwrap().volume() - 0.4).abs() < 1e-6);
        session.destroy().unwrap();
    }
}
