use crate::core::{
    EofState, ErrorKind, PlaybackClock, PlayerEvent, PlayerState, Result, StreamKind, RETRY_BACKOFF_MS,
};
use crate::player::events::EventNotifier;
use crate::player::seek::SeekState;
use crate::player::snapshot::FrameSlot;
use crossbeam::atomic::AtomicCell;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 会话内被控制接口、投递线程、读包回调共享的状态
pub struct SessionShared {
    status: AtomicCell<PlayerState>,
    pub seek: SeekState,
    eof: AtomicCell<EofState>,
    pub clock: PlaybackClock,
    pub events: EventNotifier,
    video_exists: AtomicBool,
    audio_exists: AtomicBool,
    is_rtsp: AtomicBool,
    pub black_background: bool,
    pub snapshot_slot: FrameSlot,
}

impl SessionShared {
    pub fn new(events: EventNotifier, black_background: bool, snapshot_slot: FrameSlot) -> Self {
        Self {
            status: AtomicCell::new(PlayerState::Unset),
            seek: SeekState::new(),
            eof: AtomicCell::new(EofState::NoneYet),
            clock: PlaybackClock::new(),
            events,
            video_exists: AtomicBool::new(false),
            audio_exists: AtomicBool::new(false),
            is_rtsp: AtomicBool::new(false),
            black_background,
            snapshot_slot,
        }
    }

    pub fn status(&self) -> PlayerState {
        self.status.load()
    }

    pub fn set_status(&self, status: PlayerState) {
        self.status.store(status);
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == PlayerState::Stop
    }

    pub fn video_exists(&self) -> bool {
        self.video_exists.load(Ordering::Acquire)
    }

    pub fn audio_exists(&self) -> bool {
        self.audio_exists.load(Ordering::Acquire)
    }

    pub fn is_rtsp(&self) -> bool {
        self.is_rtsp.load(Ordering::Acquire)
    }

    pub fn set_streams(&self, video: bool, audio: bool, rtsp: bool) {
        self.video_exists.store(video, Ordering::Release);
        self.audio_exists.store(audio, Ordering::Release);
        self.is_rtsp.store(rtsp, Ordering::Release);
    }

    pub fn eof_state(&self) -> EofState {
        self.eof.load()
    }

    pub fn reset_eof(&self) {
        self.eof.store(EofState::NoneYet);
    }

    /// 普通事件（Seek 期间抑制）
    pub fn emit(&self, event: PlayerEvent) {
        self.events.notify(event, self.seek.status());
    }

    pub fn emit_raw(&self, event: PlayerEvent) {
        self.events.notify_raw(event);
    }

    /// 某一路自然播完：更新汇合状态，单路播放或两路都结束时发 EOF
    pub fn finish_stream(&self, stream: StreamKind) {
        let mut current = self.eof.load();
        let next = loop {
            let next = current.mark(stream);
            match self.eof.compare_exchange(current, next) {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };
        if next == current {
            return;
        }

        let other_exists = match stream {
            StreamKind::Video => self.audio_exists(),
            StreamKind::Audio => self.video_exists(),
        };
        if !other_exists || next == EofState::BothDone {
            info!("🏁 播放结束 ({:?})", next);
            self.emit_raw(PlayerEvent::Eof);
        }
    }

    /// 送流 / 送帧：`TransientIo` 时短暂退避后重试，进入 STOP 后放弃
    pub fn send_with_retry<F>(&self, what: &str, mut send: F) -> bool
    where
        F: FnMut() -> Result<()>,
    {
        loop {
            match send() {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::TransientIo => {
                    if self.is_stopped() {
                        return false;
                    }
                    thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS));
                }
                Err(e) => {
                    warn!("⚠️  {} 失败: {}", what, e);
                    return false;
                }
            }
        }
    }
}
