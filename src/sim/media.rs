use crate::core::{DemuxerPacket, DemuxerParam, StreamKind, VideoCodec};

const VIDEO_PACKET_BYTES: usize = 64;
const AUDIO_PACKET_BYTES: usize = 32;

/// 回环后端目录中的一条媒体
///
/// 只描述流参数和时长，包内容是固定填充，解码器按包的 PTS 产出帧。
#[derive(Debug, Clone)]
pub struct SimMedia {
    pub param: DemuxerParam,
    pub duration_ms: i64,
    /// 关键帧间隔（帧数）
    pub gop: u32,
    /// 每个音频包的时长
    pub audio_packet_ms: i64,
    /// 实时流：没有时长
    pub live: bool,
}

impl SimMedia {
    /// 只有视频流
    pub fn video(codec: VideoCodec, width: i32, height: i32, frame_rate: i32, duration_ms: i64) -> Self {
        Self {
            param: DemuxerParam {
                video_codec: Some(codec.as_str().to_string()),
                video_width: width,
                video_height: height,
                video_avg_frame_rate: frame_rate,
                ..Default::default()
            },
            duration_ms,
            gop: 25,
            audio_packet_ms: 20,
            live: false,
        }
    }

    /// 只有音频流，`codec` 为解封装器上报的编码名（mp3 / wav / pcm_alaw）
    pub fn audio(codec: &str, sample_rate: i32, channels: i32, duration_ms: i64) -> Self {
        Self {
            param: DemuxerParam::default(),
            duration_ms,
            gop: 25,
            audio_packet_ms: 20,
            live: false,
        }
        .with_audio(codec, sample_rate, channels)
    }

    pub fn with_audio(mut self, codec: &str, sample_rate: i32, channels: i32) -> Self {
        self.param.audio_codec = Some(codec.to_string());
        self.param.audio_sample_rate = sample_rate;
        self.param.audio_channels = channels;
        // 16bit
        self.param.audio_format = 1;
        self
    }

    pub fn with_gop(mut self, gop: u32) -> Self {
        self.gop = gop.max(1);
        self
    }

    pub fn with_video_format(mut self, format: i32) -> Self {
        self.param.video_format = format;
        self
    }

    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn has_video(&self) -> bool {
        self.param.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.param.audio_codec.is_some()
    }

    fn frame_rate(&self) -> i64 {
        if self.param.video_avg_frame_rate > 0 {
            self.param.video_avg_frame_rate as i64
        } else {
            25
        }
    }

    /// 从 `start_pts_us` 开始的包序列（按 PTS 交织）
    ///
    /// 有视频时从不晚于起点的最近关键帧开始，音频对齐到同一位置。
    pub(crate) fn packets(&self, start_pts_us: i64) -> Vec<(StreamKind, DemuxerPacket)> {
        let mut begin_us = start_pts_us.max(0);
        let mut video = Vec::new();

        if self.has_video() {
            let fps = self.frame_rate();
            let count = self.duration_ms * fps / 1000;
            let gop = self.gop as i64;
            let pts_of = |i: i64| i * 1_000_000 / fps;

            let start_index = (0..count)
                .filter(|i| i % gop == 0 && pts_of(*i) <= begin_us)
                .last()
                .unwrap_or(0);
            begin_us = pts_of(start_index);

            for i in start_index..count {
                video.push(DemuxerPacket {
                    data: vec![0x42; VIDEO_PACKET_BYTES],
                    pts_us: pts_of(i),
                    key_frame: i % gop == 0,
                    eof: false,
                });
            }
        }

        let mut audio = Vec::new();
        if self.has_audio() && self.audio_packet_ms > 0 {
            let step_us = self.audio_packet_ms * 1000;
            let count = self.duration_ms / self.audio_packet_ms;
            for j in 0..count {
                let pts_us = j * step_us;
                if pts_us + step_us <= begin_us {
                    continue;
                }
                audio.push(DemuxerPacket {
                    data: vec![0x24; AUDIO_PACKET_BYTES],
                    pts_us,
                    key_frame: true,
                    eof: false,
                });
            }
        }

        // 合并，同一 PTS 视频在前
        let mut merged = Vec::with_capacity(video.len() + audio.len());
        let mut video = video.into_iter().peekable();
        let mut audio = audio.into_iter().peekable();
        loop {
            let take_video = match (video.peek(), audio.peek()) {
                (Some(v), Some(a)) => v.pts_us <= a.pts_us,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            if take_video {
                if let Some(packet) = video.next() {
                    merged.push((StreamKind::Video, packet));
                }
            } else if let Some(packet) = audio.next() {
                merged.push((StreamKind::Audio, packet));
            }
        }
        merged
    }
}
