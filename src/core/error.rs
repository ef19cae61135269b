use crate::core::types::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("容器格式无效: {0}")]
    InvalidFormat(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("尺寸超出缓冲区容量: {0}")]
    SizeExceeded(String),

    #[error("解码错误: {0}")]
    DecodeFailed(String),

    #[error("资源分配失败: {0}")]
    AllocationError(String),

    #[error("不支持的格式: {0}")]
    NotSupported(String),

    #[error("没有打开的容器")]
    NotOpen,

    #[error("当前状态不允许该操作: {0}")]
    InvalidState(String),

    #[error("Seek 目标帧 {target} 超出范围（仅找到 {available} 帧）")]
    SeekOutOfRange { target: u32, available: u32 },
}

impl PlayerError {
    /// 回调使用的错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::InvalidFormat(_) => ErrorKind::InvalidFormat,
            PlayerError::IoError(_) => ErrorKind::Io,
            PlayerError::SizeExceeded(_) => ErrorKind::SizeExceeded,
            PlayerError::DecodeFailed(_) => ErrorKind::DecodeFailed,
            PlayerError::AllocationError(_) => ErrorKind::Allocation,
            PlayerError::NotSupported(_) => ErrorKind::NotSupported,
            PlayerError::NotOpen => ErrorKind::NotOpen,
            PlayerError::InvalidState(_) => ErrorKind::InvalidState,
            PlayerError::SeekOutOfRange { .. } => ErrorKind::SeekOutOfRange,
        }
    }

    /// 播放循环中单帧失败是否可以跳过（连续失败计数达到阈值后仍然升级为致命错误）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::DecodeFailed(_) | PlayerError::SizeExceeded(_) | PlayerError::NotSupported(_)
        )
    }
}

impl From<image::ImageError> for PlayerError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => PlayerError::NotSupported(e.to_string()),
            image::ImageError::Limits(e) => PlayerError::SizeExceeded(e.to_string()),
            other => PlayerError::DecodeFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
