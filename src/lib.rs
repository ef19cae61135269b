//! MJPEG/AVI 播放引擎：解封装、JPEG 解码、双缓冲交换与音画同步

pub mod core;
pub mod player;

pub use crate::core::{PlaybackState, PlayerConfig, PlayerError, Result, VideoInfo};
pub use crate::player::PlaybackManager;
