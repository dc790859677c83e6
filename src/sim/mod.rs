// 内存回环后端：没有硬件时用于演示和测试

mod audio_output;
mod backend;
mod decoder;
mod demuxer;
mod demuxer_thread;
mod jpeg;
mod media;
mod video_output;

pub use audio_output::SimAudioOutput;
pub use backend::{SimBackend, StageCounters, StageKind};
pub use media::SimMedia;
pub use video_output::SimVideoOutput;
