use thiserror::Error;

use super::types::PlayerState;

/// 错误分类（调用方据此决定是否需要重试 / 上报）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 当前状态不允许该操作，不产生任何副作用
    State,
    /// 输入 / 元数据校验失败
    Validation,
    /// 资源（解码 / 输出通道）创建失败
    Resource,
    /// 短暂 I/O 失败，投递线程内部重试
    TransientIo,
    Other,
}

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("状态错误: {op} 不允许在 {state:?} 状态下调用")]
    InvalidState { op: &'static str, state: PlayerState },

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("不支持的媒体: {0}")]
    Unsupported(String),

    #[error("资源创建失败: {0}")]
    Resource(String),

    #[error("I/O 暂不可用: {0}")]
    TransientIo(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PlayerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::InvalidState { .. } => ErrorKind::State,
            PlayerError::Validation(_) | PlayerError::Unsupported(_) | PlayerError::ConfigError(_) => {
                ErrorKind::Validation
            }
            PlayerError::Resource(_) => ErrorKind::Resource,
            PlayerError::TransientIo(_) => ErrorKind::TransientIo,
            PlayerError::IoError(_) | PlayerError::Other(_) | PlayerError::AnyhowError(_) => {
                ErrorKind::Other
            }
        }
    }

    pub fn is_state_error(&self) -> bool {
        self.kind() == ErrorKind::State
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
