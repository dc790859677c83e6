//! 抓图：视频投递线程把最近送显的帧记录到 `FrameSlot`，抓图线程收到信号后
//! 持有该帧的一份引用，送 JPEG 编码，再通过回调交给调用方。

use crate::core::{PixelFormat, PlayerError, Result, SnapshotConfig, SnapshotImage, VideoFrame};
use crate::player::context::SessionShared;
use crate::player::stages::{JpegEncodeAttr, JpegEncodeStage, MediaBackend};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// JPEG 码流获取等待
const JPEG_STREAM_TIMEOUT_MS: u32 = 1000;

/// 抓图结果回调
pub type SnapshotCallback = Arc<dyn Fn(SnapshotImage) + Send + Sync>;

/// 最近一帧（独立的锁，不与会话锁嵌套）
pub struct FrameSlot {
    frame: Mutex<Option<VideoFrame>>,
    /// bypass 拼接 + NV12 显示时，YUV420P 帧按 NV12 记录
    record_planar_as_nv12: bool,
}

impl FrameSlot {
    pub fn new(record_planar_as_nv12: bool) -> Self {
        Self {
            frame: Mutex::new(None),
            record_planar_as_nv12,
        }
    }

    pub fn update(&self, frame: &VideoFrame) {
        let mut recorded = frame.clone();
        if self.record_planar_as_nv12 && recorded.pix_fmt == PixelFormat::Yuv420p {
            recorded.pix_fmt = PixelFormat::Yuv420sp;
        }
        *self.frame.lock() = Some(recorded);
    }

    /// 取一份引用（释放即 drop）
    pub fn hold(&self) -> Option<VideoFrame> {
        self.frame.lock().clone()
    }

    pub fn clear(&self) {
        self.frame.lock().take();
    }
}

/// 抓图线程，create 时启动，destroy 时退出
pub struct SnapshotWorker {
    pending: Arc<AtomicBool>,
    exit: Arc<AtomicBool>,
    signal_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SnapshotWorker {
    pub fn start(
        shared: Arc<SessionShared>,
        backend: Arc<dyn MediaBackend>,
        config: SnapshotConfig,
        callback: SnapshotCallback,
    ) -> Result<Self> {
        let (signal_tx, signal_rx) = bounded::<()>(1);
        let pending = Arc::new(AtomicBool::new(false));
        let exit = Arc::new(AtomicBool::new(false));

        let worker = SnapshotProc {
            shared,
            backend,
            config,
            callback,
            pending: pending.clone(),
            exit: exit.clone(),
            encoder: None,
        };
        let thread_handle = thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || worker.run(signal_rx))?;

        Ok(Self {
            pending,
            exit,
            signal_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// 请求抓一张图；上一张尚未完成时忽略
    pub fn request(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            debug!("{} 抓图进行中，忽略本次请求", log_ctx());
            return false;
        }
        match self.signal_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => {
                self.pending.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.exit.store(true, Ordering::Release);
        let _ = self.signal_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            info!("{} ✅ 抓图线程已结束", log_ctx());
        }
    }
}

impl Drop for SnapshotWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ SnapshotWorker 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}

struct SnapshotProc {
    shared: Arc<SessionShared>,
    backend: Arc<dyn MediaBackend>,
    config: SnapshotConfig,
    callback: SnapshotCallback,
    pending: Arc<AtomicBool>,
    exit: Arc<AtomicBool>,
    encoder: Option<(Box<dyn JpegEncodeStage>, JpegEncodeAttr)>,
}

impl SnapshotProc {
    fn run(mut self, signal_rx: Receiver<()>) {
        info!("{} 📸 抓图线程启动", log_ctx());

        while signal_rx.recv().is_ok() {
            if self.exit.load(Ordering::Acquire) {
                break;
            }

            if self.shared.is_stopped() {
                debug!("{} 已停止播放，丢弃抓图请求", log_ctx());
            } else if let Some(frame) = self.shared.snapshot_slot.hold() {
                match self.encode(frame) {
                    Ok(image) => {
                        info!("{} 📸 抓图完成: {}x{}, {} 字节", log_ctx(), image.width, image.height, image.data.len());
                        (self.callback)(image);
                    }
                    Err(e) => error!("{} ❌ 抓图失败: {}", log_ctx(), e),
                }
            } else {
                warn!("{} ⚠️  还没有送显过的视频帧，无法抓图", log_ctx());
            }

            self.pending.store(false, Ordering::Release);
        }

        if let Some((mut encoder, _)) = self.encoder.take() {
            if let Err(e) = encoder.destroy() {
                warn!("{} ⚠️  销毁 JPEG 编码器失败: {}", log_ctx(), e);
            }
        }
        info!("{} 🛑 抓图线程退出", log_ctx());
    }

    fn encode(&mut self, frame: VideoFrame) -> Result<SnapshotImage> {
        if frame.width > self.config.max_width || frame.height > self.config.max_height {
            return Err(PlayerError::Validation(format!(
                "抓图尺寸 {}x{} 超过编码上限 {}x{}",
                frame.width, frame.height, self.config.max_width, self.config.max_height
            )));
        }

        let attr = JpegEncodeAttr {
            chn_id: self.config.venc_chn_id,
            width: frame.width,
            height: frame.height,
            max_width: self.config.max_width,
            max_height: self.config.max_height,
            pix_fmt: frame.pix_fmt,
        };

        // 按需创建；尺寸变化时重新配置
        if let Some((encoder, current)) = self.encoder.as_mut() {
            if *current != attr {
                debug!("{} JPEG 编码参数变化，重新配置: {}x{}", log_ctx(), attr.width, attr.height);
                encoder.reset(&attr)?;
                *current = attr;
            }
        } else {
            let encoder = self.backend.create_jpeg_encoder(&attr)?;
            self.encoder = Some((encoder, attr));
        }
        let encoder = match self.encoder.as_mut() {
            Some((encoder, _)) => encoder,
            None => return Err(PlayerError::Resource("JPEG 编码器不可用".to_string())),
        };

        let (width, height) = (frame.width, frame.height);
        encoder.send_frame(&frame)?;
        drop(frame);
        let data = encoder.get_stream(JPEG_STREAM_TIMEOUT_MS)?;

        Ok(SnapshotImage { width, height, data })
    }
}
