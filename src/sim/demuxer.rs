use crate::core::{DemuxerParam, PlayerError, Result};
use crate::player::demuxer_source::{Demuxer, DemuxerInput, PacketCallbacks};
use crate::sim::backend::{StageCounters, StageKind};
use crate::sim::demuxer_thread::DemuxerThread;
use crate::sim::media::SimMedia;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// 从回环目录读取媒体的解封装器
pub struct SimDemuxer {
    id: usize,
    input: DemuxerInput,
    catalog: Arc<RwLock<HashMap<String, SimMedia>>>,
    counters: Arc<StageCounters>,
    read_starts: Arc<Mutex<Vec<i64>>>,
    uri: String,
    media: Option<SimMedia>,
    thread: Option<DemuxerThread>,
    destroyed: bool,
}

impl SimDemuxer {
    pub(crate) fn new(
        id: usize,
        input: DemuxerInput,
        catalog: Arc<RwLock<HashMap<String, SimMedia>>>,
        counters: Arc<StageCounters>,
        read_starts: Arc<Mutex<Vec<i64>>>,
    ) -> Self {
        Self {
            id,
            input,
            catalog,
            counters,
            read_starts,
            uri: String::new(),
            media: None,
            thread: None,
            destroyed: false,
        }
    }

    fn opened(&self) -> Result<&SimMedia> {
        self.media
            .as_ref()
            .ok_or_else(|| PlayerError::Other("解封装器尚未打开媒体".to_string()))
    }
}

impl Demuxer for SimDemuxer {
    fn get_param(&mut self, uri: &str) -> Result<DemuxerParam> {
        if self.destroyed {
            return Err(PlayerError::Resource("解封装器已销毁".to_string()));
        }
        let mut media = self
            .catalog
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| PlayerError::Resource(format!("无法打开媒体: {}", uri)))?;

        // 被禁用的流不上报
        if !self.input.video_enabled {
            media.param.video_codec = None;
        }
        if !self.input.audio_enabled {
            media.param.audio_codec = None;
        }

        let param = media.param.clone();
        self.uri = uri.to_string();
        self.media = Some(media);
        Ok(param)
    }

    fn read_packet_start(&mut self, start_pts_us: i64, callbacks: PacketCallbacks) -> Result<()> {
        if !self.input.passive {
            return Err(PlayerError::Validation("主动模式的解封装器不推包".to_string()));
        }
        if self.thread.is_some() {
            return Err(PlayerError::Other("读包已在进行".to_string()));
        }

        let packets = self.opened()?.packets(start_pts_us);
        info!("📂 开始读包: {} 从 {}us（{} 个包）", self.uri, start_pts_us, packets.len());
        self.read_starts.lock().push(start_pts_us);
        self.thread = Some(DemuxerThread::start(self.description(), packets, callbacks)?);
        Ok(())
    }

    fn read_packet_stop(&mut self) -> Result<()> {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            debug!("读包已停止: {}", self.uri);
        }
        Ok(())
    }

    fn read_audio_duration(&mut self) -> Result<i64> {
        let media = self.opened()?;
        if media.live || !media.has_audio() {
            return Err(PlayerError::Resource("没有可读取时长的音频流".to_string()));
        }
        Ok(media.duration_ms)
    }

    fn read_video_duration(&mut self) -> Result<i64> {
        let media = self.opened()?;
        if media.live || !media.has_video() {
            return Err(PlayerError::Resource("没有可读取时长的视频流".to_string()));
        }
        Ok(media.duration_ms)
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        self.destroyed = true;
        self.counters.on_destroy(StageKind::Demuxer);
    }

    fn description(&self) -> String {
        format!("SimDemuxer#{}({})", self.id, self.uri)
    }
}
