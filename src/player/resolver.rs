//! 数据源解析：根据路径 / URI 判断源类型，再结合解封装器上报的参数决定
//! 音视频两路是否存在以及各自的编码参数。

use crate::core::{
    AudioCodec, BitWidth, DemuxerParam, PixelFormat, PlayerError, Result, VideoCodec,
    DEMUXER_VIDEO_FORMAT_10BIT, FALLBACK_FRAME_RATE, PATH_MAX_LEN,
};
use log::{info, warn};

/// 源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// rtsp:// 网络流（按容器处理，不支持 seek / 时长）
    Rtsp,
    /// .mp4 容器
    Container,
    /// 裸视频流 .h264 / .h265
    RawVideo(VideoCodec),
    /// 裸音频 .mp3 / .wav
    RawAudio(AudioCodec),
}

impl SourceKind {
    pub fn is_rtsp(&self) -> bool {
        matches!(self, SourceKind::Rtsp)
    }
}

/// 判断源类型
pub fn classify(uri: &str) -> Result<SourceKind> {
    if uri.is_empty() {
        return Err(PlayerError::Validation("数据源路径为空".to_string()));
    }
    if uri.len() >= PATH_MAX_LEN {
        return Err(PlayerError::Validation(format!(
            "数据源路径过长: {} 字节（上限 {}）",
            uri.len(),
            PATH_MAX_LEN - 1
        )));
    }

    if uri.contains("rtsp://") {
        return Ok(SourceKind::Rtsp);
    }

    let suffix = match uri.rfind('.') {
        Some(pos) => &uri[pos + 1..],
        None => {
            return Err(PlayerError::Validation(format!("无法识别文件类型（无扩展名）: {}", uri)));
        }
    };

    match suffix {
        "mp4" => Ok(SourceKind::Container),
        "h264" => Ok(SourceKind::RawVideo(VideoCodec::H264)),
        "h265" => Ok(SourceKind::RawVideo(VideoCodec::H265)),
        "mp3" => Ok(SourceKind::RawAudio(AudioCodec::Mp3)),
        "wav" => Ok(SourceKind::RawAudio(AudioCodec::Pcm)),
        other => Err(PlayerError::Unsupported(format!("不支持的文件类型: .{}", other))),
    }
}

/// 视频轨参数
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub output_pix_fmt: PixelFormat,
    pub frame_rate: i32,
}

impl VideoTrack {
    /// 一帧的时长（微秒）
    pub fn frame_period_us(&self) -> i64 {
        1_000_000 / self.frame_rate.max(1) as i64
    }
}

/// 音频数据走向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRoute {
    /// 经音频解码器，由音频投递线程送输出
    Decoder,
    /// 原始 PCM，由读包回调直接写音频输出
    Passthrough,
}

/// 音频轨参数
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_width: BitWidth,
}

impl AudioTrack {
    pub fn route(&self) -> AudioRoute {
        match self.codec {
            AudioCodec::Pcm => AudioRoute::Passthrough,
            AudioCodec::Mp3 | AudioCodec::G711a => AudioRoute::Decoder,
        }
    }
}

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub kind: SourceKind,
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
}

impl ResolvedSource {
    pub fn video_exists(&self) -> bool {
        self.video.is_some()
    }

    pub fn audio_exists(&self) -> bool {
        self.audio.is_some()
    }
}

/// 结合解封装参数决定最终的音视频配置
pub fn resolve(
    kind: SourceKind,
    param: &DemuxerParam,
    video_enabled: bool,
    audio_enabled: bool,
) -> Result<ResolvedSource> {
    let (video, audio) = match kind {
        SourceKind::RawVideo(codec) => {
            if !video_enabled {
                return Err(PlayerError::Validation("视频已禁用，无法播放裸视频流".to_string()));
            }
            if let Some(reported) = param.video_codec.as_deref() {
                if VideoCodec::from_name(reported) != Some(codec) {
                    return Err(PlayerError::Unsupported(format!(
                        "裸流扩展名 {} 与上报编码 {} 不一致",
                        codec.as_str(),
                        reported
                    )));
                }
            }
            (Some(video_track(codec, param)?), None)
        }
        SourceKind::RawAudio(codec) => {
            if !audio_enabled {
                return Err(PlayerError::Validation("音频已禁用，无法播放裸音频".to_string()));
            }
            (None, Some(audio_track(codec, param)?))
        }
        SourceKind::Container | SourceKind::Rtsp => {
            let video = match (video_enabled, param.video_codec.as_deref()) {
                (true, Some(name)) => {
                    let codec = VideoCodec::from_name(name)
                        .ok_or_else(|| PlayerError::Unsupported(format!("不支持的视频编码: {}", name)))?;
                    Some(video_track(codec, param)?)
                }
                (false, Some(name)) => {
                    info!("视频已禁用，忽略视频流 ({})", name);
                    None
                }
                (_, None) => None,
            };
            let audio = match (audio_enabled, param.audio_codec.as_deref()) {
                (true, Some(name)) => {
                    let codec = AudioCodec::from_name(name)
                        .ok_or_else(|| PlayerError::Unsupported(format!("不支持的音频编码: {}", name)))?;
                    Some(audio_track(codec, param)?)
                }
                (false, Some(name)) => {
                    info!("音频已禁用，忽略音频流 ({})", name);
                    None
                }
                (_, None) => None,
            };

            if video.is_none() && audio.is_none() {
                return Err(PlayerError::Validation("媒体中没有可播放的音视频流".to_string()));
            }
            if video_enabled && video.is_none() {
                warn!("⚠️  未找到视频流，按纯音频播放");
            }
            if audio_enabled && audio.is_none() {
                warn!("⚠️  未找到音频流，按纯视频播放");
            }
            (video, audio)
        }
    };

    Ok(ResolvedSource { kind, video, audio })
}

fn video_track(codec: VideoCodec, param: &DemuxerParam) -> Result<VideoTrack> {
    if param.video_width <= 0 || param.video_height <= 0 {
        return Err(PlayerError::Validation(format!(
            "视频尺寸无效: {}x{}",
            param.video_width, param.video_height
        )));
    }

    let frame_rate = if param.video_avg_frame_rate > 0 {
        param.video_avg_frame_rate
    } else {
        warn!(
            "⚠️  视频帧率无效 ({})，按 {} fps 处理",
            param.video_avg_frame_rate, FALLBACK_FRAME_RATE
        );
        FALLBACK_FRAME_RATE
    };

    let output_pix_fmt = if param.video_format == DEMUXER_VIDEO_FORMAT_10BIT {
        PixelFormat::Yuv420sp10bit
    } else {
        PixelFormat::Yuv420sp
    };

    Ok(VideoTrack {
        codec,
        width: param.video_width as u32,
        height: param.video_height as u32,
        output_pix_fmt,
        frame_rate,
    })
}

fn audio_track(codec: AudioCodec, param: &DemuxerParam) -> Result<AudioTrack> {
    let bit_width = BitWidth::from_code(param.audio_format)
        .ok_or_else(|| PlayerError::Validation(format!("不支持的音频位宽码: {}", param.audio_format)))?;
    if param.audio_channels <= 0 || param.audio_sample_rate <= 0 {
        return Err(PlayerError::Validation(format!(
            "音频参数无效: 声道 {}，采样率 {}",
            param.audio_channels, param.audio_sample_rate
        )));
    }

    Ok(AudioTrack {
        codec,
        sample_rate: param.audio_sample_rate as u32,
        channels: param.audio_channels as u32,
        bit_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;

    fn av_param() -> DemuxerParam {
        DemuxerParam {
            video_codec: Some("h264".to_string()),
            video_width: 1280,
            video_height: 720,
            video_format: 0,
            video_avg_frame_rate: 30,
            audio_codec: Some("mp3".to_string()),
            audio_sample_rate: 44100,
            audio_channels: 2,
            audio_format: 1,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/data/a.mp4").unwrap(), SourceKind::Container);
        assert_eq!(classify("/data/a.h265").unwrap(), SourceKind::RawVideo(VideoCodec::H265));
        assert_eq!(classify("/data/a.wav").unwrap(), SourceKind::RawAudio(AudioCodec::Pcm));
        assert_eq!(classify("rtsp://10.0.0.2/live").unwrap(), SourceKind::Rtsp);
        // rtsp 地址里的点号不参与扩展名判断
        assert_eq!(classify("rtsp://cam.local/stream.sdp").unwrap(), SourceKind::Rtsp);
    }

    #[test]
    fn test_classify_rejects() {
        assert_eq!(classify("").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(classify("/data/noext").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(classify("/data/a.avi").unwrap_err().kind(), ErrorKind::Validation);

        let long = format!("/{}.mp4", "a".repeat(PATH_MAX_LEN));
        assert_eq!(classify(&long).unwrap_err().kind(), ErrorKind::Validation);
        let limit = format!("/{}.mp4", "a".repeat(PATH_MAX_LEN - 6));
        assert_eq!(limit.len(), PATH_MAX_LEN - 1);
        assert!(classify(&limit).is_ok());
    }

    #[test]
    fn test_resolve_container_both() {
        let src = resolve(SourceKind::Container, &av_param(), true, true).unwrap();
        let video = src.video.unwrap();
        assert_eq!(video.codec, VideoCodec::H264);
        assert_eq!(video.output_pix_fmt, PixelFormat::Yuv420sp);
        let audio = src.audio.unwrap();
        assert_eq!(audio.codec, AudioCodec::Mp3);
        assert_eq!(audio.bit_width, BitWidth::Bit16);
        assert_eq!(audio.route(), AudioRoute::Decoder);
    }

    #[test]
    fn test_resolve_degrades_to_single_stream() {
        let mut param = av_param();
        param.video_codec = None;
        let src = resolve(SourceKind::Container, &param, true, true).unwrap();
        assert!(!src.video_exists());
        assert!(src.audio_exists());

        let src = resolve(SourceKind::Container, &av_param(), true, false).unwrap();
        assert!(src.video_exists());
        assert!(!src.audio_exists());
    }

    #[test]
    fn test_resolve_no_stream_fails() {
        let mut param = av_param();
        param.video_codec = None;
        param.audio_codec = None;
        let err = resolve(SourceKind::Container, &param, true, true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        // 两路都被禁用
        let err = resolve(SourceKind::Container, &av_param(), false, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_resolve_validation_failures() {
        let mut param = av_param();
        param.video_width = 0;
        assert!(resolve(SourceKind::Container, &param, true, true).is_err());

        let mut param = av_param();
        param.audio_format = 3;
        assert!(resolve(SourceKind::Container, &param, true, true).is_err());

        let mut param = av_param();
        param.audio_channels = 0;
        assert!(resolve(SourceKind::Container, &param, true, true).is_err());

        let mut param = av_param();
        param.audio_codec = Some("aac".to_string());
        let err = resolve(SourceKind::Container, &param, true, true).unwrap_err();
        assert!(matches!(err, PlayerError::Unsupported(_)));
    }

    #[test]
    fn test_resolve_raw_streams() {
        let mut param = av_param();
        param.audio_codec = None;
        param.video_format = DEMUXER_VIDEO_FORMAT_10BIT;
        param.video_avg_frame_rate = 0;
        let src = resolve(SourceKind::RawVideo(VideoCodec::H264), &param, true, true).unwrap();
        let video = src.video.unwrap();
        assert_eq!(video.output_pix_fmt, PixelFormat::Yuv420sp10bit);
        assert_eq!(video.frame_rate, FALLBACK_FRAME_RATE);
        assert_eq!(video.frame_period_us(), 40_000);
        assert!(src.audio.is_none());

        // 扩展名与上报编码不一致
        assert!(resolve(SourceKind::RawVideo(VideoCodec::H265), &param, true, true).is_err());

        let src = resolve(SourceKind::RawAudio(AudioCodec::Pcm), &av_param(), true, true).unwrap();
        assert!(src.video.is_none());
        assert_eq!(src.audio.unwrap().route(), AudioRoute::Passthrough);
    }
}
