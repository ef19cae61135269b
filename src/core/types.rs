use serde::{Deserialize, Serialize};

/// 像素格式（解码输出统一为 RGB565）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGB565,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGB565 => 2,
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Error,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

/// 错误类别（通过 on_error 回调传递）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidFormat,
    Io,
    SizeExceeded,
    DecodeFailed,
    Allocation,
    NotSupported,
    NotOpen,
    InvalidState,
    SeekOutOfRange,
}

/// 音频流格式（来自 strf / WAVEFORMATEX）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub const PCM: u16 = 0x0001;

    pub fn is_pcm(&self) -> bool {
        self.format_tag == Self::PCM
    }
}

/// 视频信息（get_info 返回）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub path: String,
    pub width: u16,
    pub height: u16,
    pub fps: u16,
    pub frame_count: u32,
    pub duration_sec: u32,
    pub audio: Option<AudioFormat>,
}

/// 视频数据块类型（由块标签后缀 dc/db 区分）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoChunkKind {
    Compressed,
    Uncompressed,
}

/// 视频帧数据块 - 借用解封装器内部的复用缓冲区，下一次读取前必须消费完
#[derive(Debug)]
pub struct FrameChunk<'a> {
    pub data: &'a [u8],
    pub frame_index: u32,
    pub pts_us: u64,        // 显示时间戳（微秒）= frame_index * micro_sec_per_frame
    pub kind: VideoChunkKind,
}

impl FrameChunk<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 播放线程发往控制端的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    FrameDecoded(u32),
    PlaybackComplete,
    Error(ErrorKind),
}
