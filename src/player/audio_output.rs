use crate::core::{AudioFormat, PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 音频输出端（外部协作者）
///
/// `write` 在输出缓冲已满时阻塞，而不是丢弃样本。
pub trait AudioSink: Send {
    /// 按流的原始采样率 / 声道 / 位深配置输出
    fn configure(&mut self, format: &AudioFormat) -> Result<()>;

    /// 写入原始 PCM，返回被接受的字节数
    fn write(&mut self, pcm: &[u8]) -> Result<usize>;

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    /// 丢弃尚未播放的样本（seek / stop 时调用）
    fn clear(&mut self) {}
}

/// 检查音频格式是否可以直接输出
pub fn check_audio_format(format: &AudioFormat) -> Result<()> {
    if !format.is_pcm() {
        return Err(PlayerError::NotSupported(format!(
            "音频格式 0x{:04X} 不是 PCM",
            format.format_tag
        )));
    }
    if format.bits_per_sample != 8 && format.bits_per_sample != 16 {
        return Err(PlayerError::NotSupported(format!(
            "不支持 {}-bit 音频",
            format.bits_per_sample
        )));
    }
    if format.channels == 0 || format.sample_rate == 0 {
        return Err(PlayerError::NotSupported(format!(
            "音频参数无效: {} Hz, {} 声道",
            format.sample_rate, format.channels
        )));
    }
    Ok(())
}

/// 16-bit 小端 PCM 定点音量缩放（volume < 100 时生效，溢出时饱和）
pub fn scale_pcm16(pcm: &mut [u8], volume: u8) {
    if volume >= 100 {
        return;
    }
    let scale = volume as i32 * 65536 / 100;
    for sample in pcm.chunks_exact_mut(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]) as i32;
        let scaled = ((value * scale) >> 16).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        sample.copy_from_slice(&scaled.to_le_bytes());
    }
}

/// 音频送出阶段：按需缩放音量后写入 sink
pub struct AudioFeed {
    format: Option<AudioFormat>,
    scratch: Vec<u8>,
    bytes_fed: u64,
}

impl AudioFeed {
    pub fn new(chunk_capacity: usize) -> Result<Self> {
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(chunk_capacity).map_err(|e| {
            PlayerError::AllocationError(format!("音频缓冲 {} 字节分配失败: {}", chunk_capacity, e))
        })?;
        Ok(Self { format: None, scratch, bytes_fed: 0 })
    }

    pub fn set_format(&mut self, format: Option<AudioFormat>) {
        self.format = format;
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    /// 送出一个音频块，返回 sink 接受的字节数；没有可用音频格式时不写入
    pub fn feed(&mut self, pcm: &[u8], volume: u8, sink: &mut dyn AudioSink) -> Result<usize> {
        let Some(format) = self.format else {
            return Ok(0);
        };
        if pcm.is_empty() {
            return Ok(0);
        }

        let written = if format.bits_per_sample == 16 && volume < 100 {
            self.scratch.clear();
            self.scratch.extend_from_slice(pcm);
            scale_pcm16(&mut self.scratch, volume);
            sink.write(&self.scratch)?
        } else {
            sink.write(pcm)?
        };

        self.bytes_fed += written as u64;
        Ok(written)
    }

    pub fn bytes_fed(&self) -> u64 {
        self.bytes_fed
    }
}

/// 丢弃所有音频的 sink
#[derive(Debug, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn configure(&mut self, format: &AudioFormat) -> Result<()> {
        check_audio_format(format)
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        Ok(pcm.len())
    }
}

/// 音频输出 - 使用 cpal 播放音频
///
/// 写入端把 PCM 转成 f32 后放入有界队列，队列满时阻塞；
/// 设备回调从队列取样本，取不到时输出静音。
pub struct CpalAudioSink {
    device: Device,
    stream: Option<Stream>,
    format: Option<AudioFormat>,
    queue_tx: Option<Sender<Vec<f32>>>,
    queue_rx: Option<Receiver<Vec<f32>>>,
    queue_chunks: usize,
    paused: Arc<AtomicBool>,
    flush: Arc<AtomicBool>,
}

// cpal::Stream 本身不是 Send；Stream 只在 configure / pause / resume / drop 中使用，
// 这些调用都由持有 sink 锁的一方串行执行
unsafe impl Send for CpalAudioSink {}

impl CpalAudioSink {
    /// 打开默认输出设备
    pub fn new(queue_chunks: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::NotSupported("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        Ok(Self {
            device,
            stream: None,
            format: None,
            queue_tx: None,
            queue_rx: None,
            queue_chunks: queue_chunks.max(1),
            paused: Arc::new(AtomicBool::new(false)),
            flush: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    fn stop_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
        self.queue_tx = None;
        self.queue_rx = None;
    }
}

impl AudioSink for CpalAudioSink {
    fn configure(&mut self, format: &AudioFormat) -> Result<()> {
        check_audio_format(format)?;
        self.stop_stream();

        info!(
            "初始化音频输出: {} Hz, {} 声道, {}-bit",
            format.sample_rate, format.channels, format.bits_per_sample
        );

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let supported_configs = self
            .device
            .supported_output_configs()
            .map_err(|e| PlayerError::NotSupported(format!("无法获取支持的音频配置: {}", e)))?;

        let mut is_supported = false;
        for supported_config in supported_configs {
            if Self::is_config_compatible(&config, &supported_config) {
                is_supported = true;
                break;
            }
        }
        // 不做重采样：设备不支持原始采样率时无法保证音视频同步
        if !is_supported {
            return Err(PlayerError::NotSupported(format!(
                "音频设备不支持 {} Hz, {} 声道",
                format.sample_rate, format.channels
            )));
        }

        let (queue_tx, queue_rx) = bounded::<Vec<f32>>(self.queue_chunks);
        let callback_rx = queue_rx.clone();
        let paused = Arc::clone(&self.paused);
        let flush = Arc::clone(&self.flush);
        let mut pending: Vec<f32> = Vec::new();
        let mut position = 0usize;

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if flush.swap(false, Ordering::AcqRel) {
                        pending.clear();
                        position = 0;
                    }
                    if paused.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }
                    for sample in data.iter_mut() {
                        if position >= pending.len() {
                            match callback_rx.try_recv() {
                                Ok(chunk) => {
                                    pending = chunk;
                                    position = 0;
                                }
                                Err(_) => {
                                    *sample = 0.0;
                                    continue;
                                }
                            }
                        }
                        *sample = pending.get(position).copied().unwrap_or(0.0);
                        position += 1;
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::NotSupported(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::NotSupported(format!("启动音频流失败: {}", e)))?;

        self.paused.store(false, Ordering::Release);
        self.stream = Some(stream);
        self.queue_tx = Some(queue_tx);
        self.queue_rx = Some(queue_rx);
        self.format = Some(*format);
        info!("音频输出已启动");

        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        let (Some(format), Some(queue_tx)) = (self.format, self.queue_tx.as_ref()) else {
            return Err(PlayerError::InvalidState("音频输出尚未配置".to_string()));
        };

        let samples: Vec<f32> = if format.bits_per_sample == 16 {
            pcm.chunks_exact(2)
                .map(|s| i16::from_le_bytes([s[0], s[1]]) as f32 / 32768.0)
                .collect()
        } else {
            pcm.iter().map(|&s| (s as f32 - 128.0) / 128.0).collect()
        };

        queue_tx
            .send(samples)
            .map_err(|_| PlayerError::InvalidState("音频流已关闭".to_string()))?;
        Ok(pcm.len())
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Release);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                warn!("⚠️  暂停音频流失败: {}", e);
            }
        }
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Release);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.play() {
                warn!("⚠️  恢复音频流失败: {}", e);
            }
        }
    }

    fn clear(&mut self) {
        if let Some(queue_rx) = &self.queue_rx {
            while queue_rx.try_recv().is_ok() {}
        }
        self.flush.store(true, Ordering::Release);
    }
}

impl Drop for CpalAudioSink {
    fn drop(&mut self) {
        self.stop_stream();
    }
}
