use crate::core::{FrameChunk, PlayerError, Result, VideoChunkKind};
use crate::player::frame_buffer::FrameBuffer;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use log::{debug, info};
use std::io::Cursor;
use std::time::{Duration, Instant};

/// 打包为 RGB565：R 高 5 位、G 高 6 位、B 高 5 位
#[inline]
pub fn rgb_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// MJPEG 视频解码器（每个视频块是一张独立的 JPEG）
///
/// JPEG 先解到内部的 RGB8/L8 暂存区，整帧成功后才转换写入目标缓冲，
/// 因此任何失败都不会留下半帧。
pub struct MjpegDecoder {
    max_width: u16,
    max_height: u16,
    scratch: Vec<u8>,
    frames_decoded: u64,
    last_decode_time: Duration,
}

impl MjpegDecoder {
    /// 创建解码器，暂存区按最大尺寸一次性分配
    pub fn new(max_width: u16, max_height: u16) -> Result<Self> {
        let capacity = max_width as usize * max_height as usize * 3;
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(capacity).map_err(|e| {
            PlayerError::AllocationError(format!("解码暂存区 {} 字节分配失败: {}", capacity, e))
        })?;

        info!("创建 MJPEG 解码器: 最大 {}x{}", max_width, max_height);
        Ok(Self {
            max_width,
            max_height,
            scratch,
            frames_decoded: 0,
            last_decode_time: Duration::ZERO,
        })
    }

    /// 解码一帧到 dest，返回实际宽高
    ///
    /// 成功时 dest 的像素与尺寸被更新；ready 标志由帧缓冲的发布流程管理，这里不碰。
    pub fn decode(&mut self, chunk: &FrameChunk<'_>, dest: &mut FrameBuffer) -> Result<(u16, u16)> {
        if chunk.is_empty() {
            return Err(PlayerError::DecodeFailed(format!("帧 {} 数据为空", chunk.frame_index)));
        }
        if chunk.kind == VideoChunkKind::Uncompressed {
            return Err(PlayerError::NotSupported(format!(
                "帧 {} 为非压缩视频块",
                chunk.frame_index
            )));
        }
        if chunk.len() > dest.capacity_bytes() {
            return Err(PlayerError::SizeExceeded(format!(
                "帧 {} 数据 {} 字节超过缓冲容量 {} 字节",
                chunk.frame_index,
                chunk.len(),
                dest.capacity_bytes()
            )));
        }

        let started = Instant::now();
        let decoder = JpegDecoder::new(Cursor::new(chunk.data))?;
        let (width, height) = decoder.dimensions();

        let (cap_width, cap_height) = dest.capacity();
        let limit_width = cap_width.min(self.max_width) as u32;
        let limit_height = cap_height.min(self.max_height) as u32;
        if width > limit_width || height > limit_height {
            return Err(PlayerError::SizeExceeded(format!(
                "帧 {} 尺寸 {}x{} 超过 {}x{}",
                chunk.frame_index, width, height, limit_width, limit_height
            )));
        }

        let color_type = decoder.color_type();
        let channels = match color_type {
            ColorType::Rgb8 => 3,
            ColorType::L8 => 1,
            other => {
                return Err(PlayerError::NotSupported(format!("JPEG 输出格式 {:?}", other)));
            }
        };

        let pixel_count = width as usize * height as usize;
        // 尺寸已校验，不会超出预分配容量
        self.scratch.clear();
        self.scratch.resize(pixel_count * channels, 0);
        decoder.read_image(&mut self.scratch)?;

        let pixels = &mut dest.storage_mut()[..pixel_count];
        if channels == 3 {
            for (pixel, rgb) in pixels.iter_mut().zip(self.scratch.chunks_exact(3)) {
                *pixel = rgb_to_rgb565(rgb[0], rgb[1], rgb[2]);
            }
        } else {
            for (pixel, &luma) in pixels.iter_mut().zip(self.scratch.iter()) {
                *pixel = rgb_to_rgb565(luma, luma, luma);
            }
        }
        // 尺寸不超过 u16 容量，转换不会截断
        dest.set_dimensions(width as u16, height as u16);

        self.frames_decoded += 1;
        self.last_decode_time = started.elapsed();
        debug!(
            "解码帧 {}: {}x{} {:?}, 耗时 {:?}",
            chunk.frame_index, width, height, color_type, self.last_decode_time
        );

        Ok((width as u16, height as u16))
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn last_decode_time(&self) -> Duration {
        self.last_decode_time
    }
}
