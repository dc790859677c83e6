use crate::core::{
    AudioFrame, DemuxerPacket, MediaBuffer, PixelFormat, PlayerError, Result, VideoFrame,
};
use crate::player::stages::{AudioDecodeAttr, AudioDecodeStage, VideoDecodeAttr, VideoDecodeStage};
use crate::sim::backend::{StageCounters, StageKind};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const AUDIO_QUEUE_DEPTH: usize = 8;

fn align16(v: u32) -> u32 {
    (v + 15) & !15
}

/// 回环视频解码器：一个包产出一帧，帧的 PTS 即包的 PTS
pub struct SimVideoDecoder {
    attr: VideoDecodeAttr,
    frame_tx: Sender<VideoFrame>,
    frame_rx: Receiver<VideoFrame>,
    counters: Arc<StageCounters>,
    destroyed: AtomicBool,
}

impl SimVideoDecoder {
    pub(crate) fn new(attr: VideoDecodeAttr, counters: Arc<StageCounters>) -> Self {
        let depth = (attr.frame_buf_cnt + attr.stream_buf_cnt).max(1) as usize;
        let (frame_tx, frame_rx) = bounded(depth);
        Self {
            attr,
            frame_tx,
            frame_rx,
            counters,
            destroyed: AtomicBool::new(false),
        }
    }

    fn decode(&self, packet: &DemuxerPacket) -> VideoFrame {
        let vir_width = align16(self.attr.width);
        let vir_height = align16(self.attr.height);
        let mut size = (vir_width as usize) * (vir_height as usize) * 3 / 2;
        if self.attr.output_pix_fmt == PixelFormat::Yuv420sp10bit {
            size *= 2;
        }
        VideoFrame {
            pts_us: packet.pts_us,
            width: self.attr.width,
            height: self.attr.height,
            vir_width,
            vir_height,
            pix_fmt: self.attr.output_pix_fmt,
            eos: packet.eof,
            buffer: MediaBuffer::new(vec![0x10; size]),
        }
    }
}

impl VideoDecodeStage for SimVideoDecoder {
    fn send_stream(&self, packet: &DemuxerPacket, timeout_ms: u32) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PlayerError::Resource("视频解码通道已销毁".to_string()));
        }
        let frame = self.decode(packet);
        match self
            .frame_tx
            .send_timeout(frame, Duration::from_millis(timeout_ms as u64))
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                Err(PlayerError::TransientIo("视频解码缓冲已满".to_string()))
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(PlayerError::Resource("视频解码通道已断开".to_string()))
            }
        }
    }

    fn poll(&self, timeout_ms: u32) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        while self.frame_rx.is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }

    fn get_frame(&self, timeout_ms: u32) -> Result<Option<VideoFrame>> {
        match self
            .frame_rx
            .recv_timeout(Duration::from_millis(timeout_ms as u64))
        {
            Ok(frame) => {
                self.counters.frame_acquired();
                Ok(Some(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PlayerError::Resource("视频解码通道已断开".to_string()))
            }
        }
    }

    fn release_frame(&self, frame: VideoFrame) {
        self.counters.frame_released();
        drop(frame);
    }

    fn destroy(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            while self.frame_rx.try_recv().is_ok() {}
            self.counters.on_destroy(StageKind::VideoDecoder);
        }
        Ok(())
    }
}

/// 回环音频解码器：一个包产出一帧，结束标记产出空帧
pub struct SimAudioDecoder {
    attr: AudioDecodeAttr,
    frame_tx: Sender<AudioFrame>,
    frame_rx: Receiver<AudioFrame>,
    counters: Arc<StageCounters>,
    destroyed: AtomicBool,
}

impl SimAudioDecoder {
    pub(crate) fn new(attr: AudioDecodeAttr, counters: Arc<StageCounters>) -> Self {
        let (frame_tx, frame_rx) = bounded(AUDIO_QUEUE_DEPTH);
        Self {
            attr,
            frame_tx,
            frame_rx,
            counters,
            destroyed: AtomicBool::new(false),
        }
    }

    fn push(&self, frame: AudioFrame) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PlayerError::Resource("音频解码通道已销毁".to_string()));
        }
        match self.frame_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PlayerError::TransientIo("音频解码缓冲已满".to_string())),
            Err(TrySendError::Disconnected(_)) => {
                Err(PlayerError::Resource("音频解码通道已断开".to_string()))
            }
        }
    }
}

impl AudioDecodeStage for SimAudioDecoder {
    fn send_stream(&self, packet: &DemuxerPacket) -> Result<()> {
        // 解码输出按声道数展开
        let mut pcm = Vec::with_capacity(packet.data.len() * self.attr.channels as usize);
        for _ in 0..self.attr.channels.max(1) {
            pcm.extend_from_slice(&packet.data);
        }
        self.push(AudioFrame {
            ts_us: packet.pts_us,
            buffer: MediaBuffer::new(pcm),
        })
    }

    fn send_end_of_stream(&self) -> Result<()> {
        self.push(AudioFrame {
            ts_us: 0,
            buffer: MediaBuffer::default(),
        })
    }

    fn get_frame(&self, timeout_ms: u32) -> Result<Option<AudioFrame>> {
        match self
            .frame_rx
            .recv_timeout(Duration::from_millis(timeout_ms as u64))
        {
            Ok(frame) => {
                self.counters.frame_acquired();
                Ok(Some(frame))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PlayerError::Resource("音频解码通道已断开".to_string()))
            }
        }
    }

    fn release_frame(&self, frame: AudioFrame) {
        self.counters.frame_released();
        drop(frame);
    }

    fn destroy(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            while self.frame_rx.try_recv().is_ok() {}
            self.counters.on_destroy(StageKind::AudioDecoder);
        }
        Ok(())
    }
}
