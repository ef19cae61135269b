use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 播放参数（解码缓冲、错误策略、音频队列共用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 容器帧间隔与流速率都为 0 时使用的帧率
    pub default_fps: u16,
    /// 帧缓冲 / 解码器的最大宽度（像素）
    pub max_frame_width: u16,
    /// 帧缓冲 / 解码器的最大高度（像素）
    pub max_frame_height: u16,
    /// 连续解码失败多少次后进入 Error 状态
    pub max_consecutive_decode_failures: u32,
    /// 音频块复用缓冲区大小（字节），超出部分被跳过
    pub audio_chunk_capacity: usize,
    /// 初始音量 0-100
    pub volume: u8,
    /// cpal 输出队列深度（以音频块计），队列满时写入阻塞
    pub audio_queue_chunks: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_fps: 15,
            max_frame_width: 320,
            max_frame_height: 240,
            max_consecutive_decode_failures: 3,
            audio_chunk_capacity: 8192,
            volume: 80,
            audio_queue_chunks: 16,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载，缺失字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(text)
            .map_err(|e| PlayerError::InvalidFormat(format!("配置文件解析失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_fps == 0 {
            return Err(PlayerError::InvalidFormat("default_fps 不能为 0".to_string()));
        }
        if self.max_frame_width == 0 || self.max_frame_height == 0 {
            return Err(PlayerError::InvalidFormat("帧缓冲尺寸不能为 0".to_string()));
        }
        if self.max_consecutive_decode_failures == 0 {
            return Err(PlayerError::InvalidFormat(
                "max_consecutive_decode_failures 不能为 0".to_string(),
            ));
        }
        Ok(())
    }
}
