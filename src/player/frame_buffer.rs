use crate::core::{PixelFormat, PlayerError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::debug;
use std::time::Duration;

/// RGB565 帧缓冲（容量在创建时固定，之后不再分配）
#[derive(Debug)]
pub struct FrameBuffer {
    id: usize,
    pixels: Vec<u16>,
    capacity_width: u16,
    capacity_height: u16,
    width: u16,
    height: u16,
    ready: bool,
    frame_index: u32,
}

impl FrameBuffer {
    pub fn new(id: usize, capacity_width: u16, capacity_height: u16) -> Result<Self> {
        let len = capacity_width as usize * capacity_height as usize;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|e| {
            PlayerError::AllocationError(format!(
                "帧缓冲 {}x{} 分配失败: {}",
                capacity_width, capacity_height, e
            ))
        })?;
        pixels.resize(len, 0);

        Ok(Self {
            id,
            pixels,
            capacity_width,
            capacity_height,
            width: 0,
            height: 0,
            ready: false,
            frame_index: 0,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// 当前帧的像素（行优先，width * height 个）
    pub fn pixels(&self) -> &[u16] {
        &self.pixels[..self.width as usize * self.height as usize]
    }

    /// 当前帧的原始字节（小端 RGB565）
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.pixels())
    }

    pub(crate) fn storage_mut(&mut self) -> &mut [u16] {
        &mut self.pixels
    }

    pub(crate) fn set_dimensions(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn capacity(&self) -> (u16, u16) {
        (self.capacity_width, self.capacity_height)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.pixels.len() * PixelFormat::RGB565.bytes_per_pixel()
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }
}

/// 生产端（解码器写入 back 缓冲）
pub struct FrameProducer {
    back: Option<FrameBuffer>,
    free_rx: Receiver<FrameBuffer>,
    ready_tx: Sender<FrameBuffer>,
}

/// 消费端（显示读取 front 缓冲）
pub struct FrameConsumer {
    front: Option<FrameBuffer>,
    ready_rx: Receiver<FrameBuffer>,
    free_tx: Sender<FrameBuffer>,
}

/// 创建一对双缓冲
///
/// 缓冲区的所有权在两端之间通过 channel 移交：生产端永远拿不到消费端正在显示的缓冲。
pub fn frame_buffer_pair(
    capacity_width: u16,
    capacity_height: u16,
) -> Result<(FrameProducer, FrameConsumer)> {
    let first = FrameBuffer::new(0, capacity_width, capacity_height)?;
    let second = FrameBuffer::new(1, capacity_width, capacity_height)?;

    let (ready_tx, ready_rx) = bounded(1);
    let (free_tx, free_rx) = bounded(2);
    free_tx
        .send(second)
        .map_err(|_| PlayerError::InvalidState("帧缓冲 channel 已关闭".to_string()))?;

    debug!("双缓冲已分配: 2 x {}x{} RGB565", capacity_width, capacity_height);

    Ok((
        FrameProducer { back: Some(first), free_rx, ready_tx },
        FrameConsumer { front: None, ready_rx, free_tx },
    ))
}

impl FrameProducer {
    /// 获取可写的 back 缓冲；若消费端尚未归还则阻塞等待
    pub fn back_mut(&mut self) -> Result<&mut FrameBuffer> {
        if self.back.is_none() {
            let buffer = self
                .free_rx
                .recv()
                .map_err(|_| PlayerError::InvalidState("显示端已断开".to_string()))?;
            self.back = Some(buffer);
        }
        self.back
            .as_mut()
            .ok_or_else(|| PlayerError::InvalidState("没有可写的帧缓冲".to_string()))
    }

    /// 标记 back 缓冲就绪并交给消费端
    pub fn publish(&mut self, frame_index: u32) -> Result<()> {
        let mut buffer = self
            .back
            .take()
            .ok_or_else(|| PlayerError::InvalidState("没有待发布的帧缓冲".to_string()))?;
        buffer.frame_index = frame_index;
        buffer.ready = true;
        self.ready_tx
            .send(buffer)
            .map_err(|_| PlayerError::InvalidState("显示端已断开".to_string()))
    }
}

impl FrameConsumer {
    /// 非阻塞地切换到最新就绪的帧；没有新帧时保持当前 front
    pub fn try_acquire(&mut self) -> Option<&FrameBuffer> {
        match self.ready_rx.try_recv() {
            Ok(buffer) => self.swap_front(buffer),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }
        self.front.as_ref()
    }

    /// 等待下一帧就绪
    pub fn acquire_timeout(&mut self, timeout: Duration) -> Option<&FrameBuffer> {
        let buffer = self.ready_rx.recv_timeout(timeout).ok()?;
        self.swap_front(buffer);
        self.front.as_ref()
    }

    pub fn front(&self) -> Option<&FrameBuffer> {
        self.front.as_ref()
    }

    fn swap_front(&mut self, buffer: FrameBuffer) {
        if let Some(mut old) = self.front.replace(buffer) {
            old.ready = false;
            // 生产端已退出时旧缓冲直接丢弃
            let _ = self.free_tx.send(old);
        }
    }
}
