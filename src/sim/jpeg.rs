use crate::core::{PlayerError, Result, VideoFrame};
use crate::player::stages::{JpegEncodeAttr, JpegEncodeStage};
use crate::sim::backend::{StageCounters, StageKind};
use std::sync::Arc;

/// 回环 JPEG 编码器：输出 SOI + 尺寸 + EOI
pub struct SimJpegEncoder {
    attr: JpegEncodeAttr,
    pending: Option<(u32, u32)>,
    counters: Arc<StageCounters>,
    destroyed: bool,
}

impl SimJpegEncoder {
    pub(crate) fn new(attr: JpegEncodeAttr, counters: Arc<StageCounters>) -> Self {
        Self {
            attr,
            pending: None,
            counters,
            destroyed: false,
        }
    }
}

impl JpegEncodeStage for SimJpegEncoder {
    fn reset(&mut self, attr: &JpegEncodeAttr) -> Result<()> {
        self.attr = attr.clone();
        self.pending = None;
        self.counters.on_jpeg_reset();
        Ok(())
    }

    fn send_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if self.destroyed {
            return Err(PlayerError::Resource("JPEG 编码通道已销毁".to_string()));
        }
        if frame.width != self.attr.width || frame.height != self.attr.height {
            return Err(PlayerError::Validation(format!(
                "帧尺寸 {}x{} 与编码参数 {}x{} 不一致",
                frame.width, frame.height, self.attr.width, self.attr.height
            )));
        }
        self.pending = Some((frame.width, frame.height));
        Ok(())
    }

    fn get_stream(&mut self, _timeout_ms: u32) -> Result<Vec<u8>> {
        let (width, height) = self
            .pending
            .take()
            .ok_or_else(|| PlayerError::TransientIo("没有待取的 JPEG 码流".to_string()))?;
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xD9]);
        Ok(data)
    }

    fn destroy(&mut self) -> Result<()> {
        if !self.destroyed {
            self.destroyed = true;
            self.counters.on_destroy(StageKind::JpegEncoder);
        }
        Ok(())
    }
}
