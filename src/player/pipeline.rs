//! 管线生命周期：Prepare 创建解码 / 输出通道，Stop 时销毁。
//! 显示设备绑定（VideoOutputStage 本身）由会话在 create / destroy 时管理，
//! 这里只负责启用 / 禁用它的通道。

use crate::core::{PlayerConfig, PlayerError, Result};
use crate::player::resolver::{AudioRoute, AudioTrack, ResolvedSource, VideoTrack};
use crate::player::stages::{
    AudioDecodeAttr, AudioDecodeStage, AudioOutputAttr, AudioOutputStage, MediaBackend, TrackMode,
    VideoDecodeAttr, VideoDecodeStage, VideoOutputAttr, VideoOutputStage,
};
use log::{info, warn};
use std::sync::Arc;

#[derive(Default)]
pub struct Pipeline {
    pub video_decoder: Option<Arc<dyn VideoDecodeStage>>,
    pub audio_decoder: Option<Arc<dyn AudioDecodeStage>>,
    pub audio_output: Option<Arc<dyn AudioOutputStage>>,
    video_output: Option<Arc<dyn VideoOutputStage>>,
}

impl Pipeline {
    /// 按解析结果创建各级通道；任一步失败都会回滚已创建的部分
    pub fn prepare(
        backend: &dyn MediaBackend,
        config: &PlayerConfig,
        source: &ResolvedSource,
        video_output: Option<&Arc<dyn VideoOutputStage>>,
    ) -> Result<Pipeline> {
        let mut pipeline = Pipeline::default();
        match pipeline.build(backend, config, source, video_output) {
            Ok(()) => Ok(pipeline),
            Err(e) => {
                warn!("⚠️  Prepare 失败，回滚已创建的通道: {}", e);
                pipeline.teardown();
                Err(e)
            }
        }
    }

    fn build(
        &mut self,
        backend: &dyn MediaBackend,
        config: &PlayerConfig,
        source: &ResolvedSource,
        video_output: Option<&Arc<dyn VideoOutputStage>>,
    ) -> Result<()> {
        if let Some(video) = &source.video {
            let output = video_output
                .ok_or_else(|| PlayerError::Resource("视频输出设备未创建".to_string()))?;

            let decoder = backend.create_video_decoder(&video_decode_attr(config, video))?;
            self.video_decoder = Some(decoder);

            output.enable(&video_output_attr(config, video))?;
            self.video_output = Some(output.clone());
            info!("✅ 视频通道就绪: {} {}x{}", video.codec.as_str(), video.width, video.height);
        }

        if let Some(audio) = &source.audio {
            if audio.route() == AudioRoute::Decoder {
                let decoder = backend.create_audio_decoder(&AudioDecodeAttr {
                    codec: audio.codec,
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    bit_width: audio.bit_width,
                })?;
                self.audio_decoder = Some(decoder);
            }

            self.audio_output = Some(backend.create_audio_output(&audio_output_attr(config, audio))?);
            info!(
                "✅ 音频通道就绪: {} {} Hz {} 声道",
                audio.codec.as_str(),
                audio.sample_rate,
                audio.channels
            );
        }

        Ok(())
    }

    /// 销毁解码通道、禁用视频输出通道、销毁音频输出；销毁失败只记录日志
    pub fn teardown(&mut self) {
        if let Some(decoder) = self.video_decoder.take() {
            if let Err(e) = decoder.destroy() {
                warn!("⚠️  销毁视频解码通道失败: {}", e);
            }
        }
        if let Some(output) = self.video_output.take() {
            if let Err(e) = output.disable() {
                warn!("⚠️  禁用视频输出通道失败: {}", e);
            }
        }
        if let Some(decoder) = self.audio_decoder.take() {
            if let Err(e) = decoder.destroy() {
                warn!("⚠️  销毁音频解码通道失败: {}", e);
            }
        }
        if let Some(output) = self.audio_output.take() {
            if let Err(e) = output.destroy() {
                warn!("⚠️  销毁音频输出通道失败: {}", e);
            }
        }
    }

    /// 已启用的视频输出通道
    pub fn video_output(&self) -> Option<&Arc<dyn VideoOutputStage>> {
        self.video_output.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.video_decoder.is_none()
            && self.video_output.is_none()
            && self.audio_decoder.is_none()
            && self.audio_output.is_none()
    }
}

fn video_decode_attr(config: &PlayerConfig, video: &VideoTrack) -> VideoDecodeAttr {
    VideoDecodeAttr {
        chn_id: config.vdec.chn_id,
        codec: video.codec,
        width: video.width,
        height: video.height,
        output_pix_fmt: video.output_pix_fmt,
        frame_buf_cnt: config.vdec.frame_buf_cnt,
        stream_buf_cnt: config.vdec.stream_buf_cnt,
    }
}

fn video_output_attr(config: &PlayerConfig, video: &VideoTrack) -> VideoOutputAttr {
    // 0 表示跟随视频尺寸
    let width = if config.vo.width > 0 { config.vo.width } else { video.width };
    let height = if config.vo.height > 0 { config.vo.height } else { video.height };
    VideoOutputAttr {
        width,
        height,
        format: config.vo.display_format(),
        mirror: config.vo.mirror_mode(),
        rotation: config.vo.rotation,
    }
}

fn audio_output_attr(config: &PlayerConfig, audio: &AudioTrack) -> AudioOutputAttr {
    let track_mode = if audio.channels == 1 {
        TrackMode::MonoToStereo
    } else {
        TrackMode::Normal
    };
    AudioOutputAttr {
        dev_id: config.ao.dev_id,
        chn_id: config.ao.chn_id,
        sample_rate: audio.sample_rate,
        resample_rate: audio.sample_rate,
        channels: audio.channels,
        bit_width: audio.bit_width,
        track_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AudioCodec, BitWidth, PixelFormat, VideoCodec};
    use crate::player::resolver::SourceKind;
    use crate::sim::{SimBackend, StageKind};

    fn av_source() -> ResolvedSource {
        ResolvedSource {
            kind: SourceKind::Container,
            video: Some(VideoTrack {
                codec: VideoCodec::H264,
                width: 64,
                height: 48,
                output_pix_fmt: PixelFormat::Yuv420sp,
                frame_rate: 25,
            }),
            audio: Some(AudioTrack {
                codec: AudioCodec::Mp3,
                sample_rate: 16000,
                channels: 1,
                bit_width: BitWidth::Bit16,
            }),
        }
    }

    #[test]
    fn test_prepare_and_teardown_balance() {
        let backend = SimBackend::new();
        let config = PlayerConfig::default();
        let vo = backend.create_video_output(&config.vo).unwrap();

        let mut pipeline = Pipeline::prepare(&backend, &config, &av_source(), Some(&vo)).unwrap();
        assert!(pipeline.video_decoder.is_some());
        assert!(pipeline.audio_decoder.is_some());
        assert!(pipeline.audio_output.is_some());
        assert!(backend.video_output().unwrap().is_enabled());

        pipeline.teardown();
        assert!(pipeline.is_empty());
        assert!(!backend.video_output().unwrap().is_enabled());
        let counters = backend.counters();
        assert_eq!(counters.live(StageKind::VideoDecoder), 0);
        assert_eq!(counters.live(StageKind::AudioDecoder), 0);
        assert_eq!(counters.live(StageKind::AudioOutput), 0);
    }

    #[test]
    fn test_prepare_rolls_back_on_failure() {
        let backend = SimBackend::new();
        let config = PlayerConfig::default();
        let vo = backend.create_video_output(&config.vo).unwrap();
        backend.fail_next(StageKind::AudioOutput);

        let err = Pipeline::prepare(&backend, &config, &av_source(), Some(&vo))
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::core::ErrorKind::Resource);

        let counters = backend.counters();
        assert_eq!(counters.created(StageKind::VideoDecoder), 1);
        assert_eq!(counters.live(StageKind::VideoDecoder), 0);
        assert_eq!(counters.live(StageKind::AudioDecoder), 0);
        assert!(!backend.video_output().unwrap().is_enabled());
    }

    #[test]
    fn test_pcm_skips_audio_decoder() {
        let backend = SimBackend::new();
        let config = PlayerConfig::default();
        let mut source = av_source();
        source.video = None;
        if let Some(audio) = source.audio.as_mut() {
            audio.codec = AudioCodec::Pcm;
        }

        let mut pipeline = Pipeline::prepare(&backend, &config, &source, None).unwrap();
        assert!(pipeline.audio_decoder.is_none());
        assert!(pipeline.audio_output.is_some());
        assert_eq!(backend.last_audio_output_attr().unwrap().track_mode, TrackMode::MonoToStereo);
        pipeline.teardown();
    }
}
