//! 测试用的 AVI 容器构造器与记录型输出端

use crate::core::{AudioFormat, ErrorKind, PlayerError, PlayerEvent, Result};
use crate::player::audio_output::{check_audio_format, AudioSink};
use crate::player::display::DisplaySink;
use crate::player::frame_buffer::FrameBuffer;
use crate::player::manager::PlayerCallbacks;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn solid_jpeg(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let pixels: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .encode(&pixels, width, height, ColorType::Rgb8)
        .unwrap();
    out
}

pub fn gray_jpeg(width: u32, height: u32, luma: u8) -> Vec<u8> {
    let pixels = vec![luma; (width * height) as usize];
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .encode(&pixels, width, height, ColorType::L8)
        .unwrap();
    out
}

/// 每帧颜色不同的 JPEG
pub fn jpeg_frame(width: u32, height: u32, shade: u8) -> Vec<u8> {
    solid_jpeg(width, height, [shade, 255 - shade, shade / 2])
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_chunk(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(tag);
    put_u32(out, body.len() as u32);
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
}

fn put_list(out: &mut Vec<u8>, list_type: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(b"LIST");
    put_u32(out, body.len() as u32 + 4);
    out.extend_from_slice(list_type);
    out.extend_from_slice(body);
}

struct AudioTrack {
    sample_rate: u32,
    channels: u16,
    bits: u16,
}

/// AVI 构造器：hdrl(avih + strl...) + JUNK + movi，movi 内按 [01wb][00dc] 交错
pub struct AviBuilder {
    width: u32,
    height: u32,
    micro_sec_per_frame: u32,
    rate: u32,
    scale: u32,
    audio: Option<AudioTrack>,
    audio_chunk_len: usize,
    frames: Vec<Vec<u8>>,
    rec_lists: bool,
    drop_marker_after: Option<usize>,
    with_payload: bool,
    declared_frames: Option<u32>,
}

impl AviBuilder {
    pub fn new(width: u32, height: u32, micro_sec_per_frame: u32) -> Self {
        Self {
            width,
            height,
            micro_sec_per_frame,
            rate: 1_000_000,
            scale: micro_sec_per_frame,
            audio: None,
            audio_chunk_len: 64,
            frames: Vec::new(),
            rec_lists: false,
            drop_marker_after: None,
            with_payload: true,
            declared_frames: None,
        }
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16, bits: u16) -> Self {
        self.audio = Some(AudioTrack { sample_rate, channels, bits });
        self
    }

    /// 生成 n 帧 JPEG（尺寸同容器）
    pub fn frames(mut self, n: usize) -> Self {
        self.frames = (0..n)
            .map(|i| jpeg_frame(self.width, self.height, (i % 256) as u8))
            .collect();
        self
    }

    pub fn frame_data(mut self, frames: Vec<Vec<u8>>) -> Self {
        self.frames = frames;
        self
    }

    pub fn audio_chunk_len(mut self, len: usize) -> Self {
        self.audio_chunk_len = len;
        self
    }

    pub fn stream_rate(mut self, rate: u32, scale: u32) -> Self {
        self.rate = rate;
        self.scale = scale;
        self
    }

    pub fn rec_lists(mut self, enabled: bool) -> Self {
        self.rec_lists = enabled;
        self
    }

    /// 在第 index 帧之后插入一个零长度视频块
    pub fn drop_marker_after(mut self, index: usize) -> Self {
        self.drop_marker_after = Some(index);
        self
    }

    pub fn without_payload(mut self) -> Self {
        self.with_payload = false;
        self
    }

    /// 主头中声明的总帧数（默认等于实际帧数）
    pub fn declared_frames(mut self, n: u32) -> Self {
        self.declared_frames = Some(n);
        self
    }

    /// 第 i 个音频块的内容
    pub fn audio_chunk(&self, index: usize) -> Vec<u8> {
        (0..self.audio_chunk_len).map(|j| ((index * 31 + j) % 251) as u8).collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let frame_count = self.declared_frames.unwrap_or(self.frames.len() as u32);
        let stream_count = if self.audio.is_some() { 2 } else { 1 };

        let mut avih = Vec::new();
        put_u32(&mut avih, self.micro_sec_per_frame);
        put_u32(&mut avih, 0); // max bytes per sec
        put_u32(&mut avih, 0); // padding granularity
        put_u32(&mut avih, 0); // flags
        put_u32(&mut avih, frame_count);
        put_u32(&mut avih, 0); // initial frames
        put_u32(&mut avih, stream_count);
        put_u32(&mut avih, 0); // suggested buffer
        put_u32(&mut avih, self.width);
        put_u32(&mut avih, self.height);
        avih.extend_from_slice(&[0u8; 16]);

        let mut hdrl = Vec::new();
        put_chunk(&mut hdrl, b"avih", &avih);

        let mut video_strl = Vec::new();
        put_chunk(
            &mut video_strl,
            b"strh",
            &stream_header(b"vids", b"MJPG", self.scale, self.rate, frame_count),
        );
        let mut bitmap_info = Vec::new();
        put_u32(&mut bitmap_info, 40);
        put_u32(&mut bitmap_info, self.width);
        put_u32(&mut bitmap_info, self.height);
        put_u16(&mut bitmap_info, 1);
        put_u16(&mut bitmap_info, 24);
        bitmap_info.extend_from_slice(b"MJPG");
        put_u32(&mut bitmap_info, self.width * self.height * 3);
        bitmap_info.extend_from_slice(&[0u8; 16]);
        put_chunk(&mut video_strl, b"strf", &bitmap_info);
        put_list(&mut hdrl, b"strl", &video_strl);

        if let Some(audio) = &self.audio {
            let block_align = audio.channels * audio.bits / 8;
            let mut audio_strl = Vec::new();
            put_chunk(
                &mut audio_strl,
                b"strh",
                &stream_header(b"auds", &[0; 4], block_align as u32, audio.sample_rate * block_align as u32, 0),
            );
            let mut wave_format = Vec::new();
            put_u16(&mut wave_format, AudioFormat::PCM);
            put_u16(&mut wave_format, audio.channels);
            put_u32(&mut wave_format, audio.sample_rate);
            put_u32(&mut wave_format, audio.sample_rate * block_align as u32);
            put_u16(&mut wave_format, block_align);
            put_u16(&mut wave_format, audio.bits);
            put_u16(&mut wave_format, 0); // cbSize
            put_chunk(&mut audio_strl, b"strf", &wave_format);
            put_list(&mut hdrl, b"strl", &audio_strl);
        }

        let mut riff_body = Vec::new();
        riff_body.extend_from_slice(b"AVI ");
        put_list(&mut riff_body, b"hdrl", &hdrl);
        put_chunk(&mut riff_body, b"JUNK", &[0u8; 12]);

        if self.with_payload {
            let mut movi = Vec::new();
            for (i, frame) in self.frames.iter().enumerate() {
                let mut group = Vec::new();
                if self.audio.is_some() {
                    put_chunk(&mut group, b"01wb", &self.audio_chunk(i));
                }
                put_chunk(&mut group, b"00dc", frame);

                if self.rec_lists {
                    put_list(&mut movi, b"rec ", &group);
                } else {
                    movi.extend_from_slice(&group);
                }
                if self.drop_marker_after == Some(i) {
                    put_chunk(&mut movi, b"00dc", &[]);
                }
            }
            put_list(&mut riff_body, b"movi", &movi);
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        put_u32(&mut out, riff_body.len() as u32);
        out.extend_from_slice(&riff_body);
        out
    }

    /// 写入临时目录，返回目录句柄（需保持存活）与文件路径
    pub fn write_temp(&self) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.avi");
        std::fs::write(&path, self.build()).unwrap();
        (dir, path)
    }
}

fn stream_header(kind: &[u8; 4], handler: &[u8; 4], scale: u32, rate: u32, length: u32) -> Vec<u8> {
    let mut strh = Vec::new();
    strh.extend_from_slice(kind);
    strh.extend_from_slice(handler);
    put_u32(&mut strh, 0); // flags
    put_u16(&mut strh, 0); // priority
    put_u16(&mut strh, 0); // language
    put_u32(&mut strh, 0); // initial frames
    put_u32(&mut strh, scale);
    put_u32(&mut strh, rate);
    put_u32(&mut strh, 0); // start
    put_u32(&mut strh, length);
    put_u32(&mut strh, 0); // suggested buffer
    put_u32(&mut strh, u32::MAX); // quality
    put_u32(&mut strh, 0); // sample size
    strh.extend_from_slice(&[0u8; 8]); // rcFrame
    strh
}

/// 记录所有写入的音频 sink
#[derive(Clone, Default)]
pub struct RecordingAudioSink {
    data: Arc<Mutex<Vec<u8>>>,
    configured: Arc<Mutex<Option<AudioFormat>>>,
}

impl RecordingAudioSink {
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn configured(&self) -> Option<AudioFormat> {
        *self.configured.lock()
    }
}

impl AudioSink for RecordingAudioSink {
    fn configure(&mut self, format: &AudioFormat) -> Result<()> {
        check_audio_format(format)?;
        *self.configured.lock() = Some(*format);
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<usize> {
        self.data.lock().extend_from_slice(pcm);
        Ok(pcm.len())
    }
}

/// 记录显示过的帧号与尺寸
#[derive(Clone, Default)]
pub struct RecordingDisplay {
    frames: Arc<Mutex<Vec<(u32, u16, u16)>>>,
}

impl RecordingDisplay {
    pub fn frames(&self) -> Vec<(u32, u16, u16)> {
        self.frames.lock().clone()
    }
}

impl DisplaySink for RecordingDisplay {
    fn present(&mut self, frame: &FrameBuffer) -> Result<()> {
        assert!(frame.is_ready());
        self.frames.lock().push((frame.frame_index(), frame.width(), frame.height()));
        Ok(())
    }
}

/// 每次显示都阻塞 delay；failing 为 true 时随后返回 IO 错误
#[derive(Clone)]
pub struct SlowDisplay {
    delay: Duration,
    failing: bool,
    entered: Arc<AtomicBool>,
}

impl SlowDisplay {
    pub fn new(delay: Duration, failing: bool) -> Self {
        Self { delay, failing, entered: Arc::new(AtomicBool::new(false)) }
    }

    /// 等待播放线程进入 present
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.entered.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl DisplaySink for SlowDisplay {
    fn present(&mut self, _frame: &FrameBuffer) -> Result<()> {
        self.entered.store(true, Ordering::SeqCst);
        thread::sleep(self.delay);
        if self.failing {
            return Err(PlayerError::IoError(io::Error::new(io::ErrorKind::BrokenPipe, "显示设备断开")));
        }
        Ok(())
    }
}

/// 记录回调事件
#[derive(Clone, Default)]
pub struct RecordingCallbacks {
    events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<PlayerEvent> {
        self.events.lock().clone()
    }

    pub fn decoded_frames(&self) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                PlayerEvent::FrameDecoded(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PlayerCallbacks for RecordingCallbacks {
    fn on_frame_decoded(&mut self, frame_index: u32) {
        self.events.lock().push(PlayerEvent::FrameDecoded(frame_index));
    }

    fn on_playback_complete(&mut self) {
        self.events.lock().push(PlayerEvent::PlaybackComplete);
    }

    fn on_error(&mut self, kind: ErrorKind) {
        self.events.lock().push(PlayerEvent::Error(kind));
    }
}
