use crate::core::{PlayerEvent, SeekStatus};
use log::debug;
use std::sync::Arc;

/// 事件回调。回调里不要调用会阻塞的播放器接口（stop / seek 等），
/// 部分事件是在持有会话锁时发出的。
pub type EventCallback = Arc<dyn Fn(PlayerEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventNotifier {
    callback: Option<EventCallback>,
}

impl EventNotifier {
    pub fn new(callback: Option<EventCallback>) -> Self {
        Self { callback }
    }

    /// 普通事件：Seek 重建期间（非 NONE / DONE）被抑制
    pub fn notify(&self, event: PlayerEvent, seek: SeekStatus) {
        if !seek.allows_events() {
            debug!("Seek 中 ({:?})，抑制事件 {:?}", seek, event);
            return;
        }
        self.notify_raw(event);
    }

    /// 不经过 Seek 过滤（SEEK_END / EOF）
    pub fn notify_raw(&self, event: PlayerEvent) {
        debug!("📣 事件: {:?}", event);
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_notify_respects_seek_gate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier = EventNotifier::new(Some(Arc::new(move |ev: PlayerEvent| sink.lock().push(ev))));

        notifier.notify(PlayerEvent::Prepared, SeekStatus::Wait);
        notifier.notify(PlayerEvent::Play, SeekStatus::VideoDoing);
        notifier.notify_raw(PlayerEvent::SeekEnd);
        notifier.notify(PlayerEvent::Stopped, SeekStatus::None);
        notifier.notify(PlayerEvent::Eof, SeekStatus::Done);

        assert_eq!(
            *seen.lock(),
            vec![PlayerEvent::SeekEnd, PlayerEvent::Stopped, PlayerEvent::Eof]
        );
    }

    #[test]
    fn test_no_callback_is_silent() {
        EventNotifier::default().notify_raw(PlayerEvent::Error);
    }
}
