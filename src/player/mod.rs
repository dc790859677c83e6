// 播放器核心模块

pub mod context;
pub mod delivery;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod events;
pub mod packet_router;
pub mod pipeline;
pub mod resolver;
pub mod seek;
pub mod session;
pub mod snapshot;
pub mod stages; // 解码 / 输出 / 抓图编码接口

pub use demuxer_source::{Demuxer, DemuxerInput, PacketCallback, PacketCallbacks};
pub use events::EventCallback;
pub use session::{PlayerCallbacks, PlayerSession};
pub use snapshot::SnapshotCallback;
pub use stages::MediaBackend;
