use crate::core::{
    ErrorKind, PlaybackState, PlayerConfig, PlayerError, PlayerEvent, Result, SyncGovernor, SyncStats,
    VideoInfo,
};
use crate::player::audio_output::{check_audio_format, AudioFeed, AudioSink, NullAudioSink};
use crate::player::decoder::MjpegDecoder;
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::display::{DisplaySink, NullDisplay};
use crate::player::frame_buffer::frame_buffer_pair;
use crate::player::playback_thread::{PlaybackContext, PlaybackThread, SessionShared};
use crate::player::riff::is_jpeg_compression;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 应用层回调（在调用 process_events 的线程上执行）
pub trait PlayerCallbacks: Send {
    fn on_frame_decoded(&mut self, _frame_index: u32) {}
    fn on_playback_complete(&mut self) {}
    fn on_error(&mut self, _kind: ErrorKind) {}
}

/// 一次打开的容器及其播放线程
struct Session {
    info: VideoInfo,
    worker: PlaybackThread,
    governor: SyncGovernor,
}

/// 播放管理器 - 整体控制播放流程
///
/// 控制端只修改共享状态并向播放线程发送命令；容器游标、解码器与帧缓冲由播放线程独占。
pub struct PlaybackManager {
    config: PlayerConfig,
    shared: Arc<SessionShared>,
    session: Option<Session>,
    audio_sink: Arc<Mutex<Box<dyn AudioSink>>>,
    display: Arc<Mutex<Box<dyn DisplaySink>>>,
    event_tx: Sender<PlayerEvent>,
    event_rx: Receiver<PlayerEvent>,
    callbacks: Option<Box<dyn PlayerCallbacks>>,
}

impl PlaybackManager {
    pub fn new(config: PlayerConfig, display: Box<dyn DisplaySink>, audio_sink: Box<dyn AudioSink>) -> Self {
        info!("{} 🎮 创建播放管理器...", log_ctx());
        let (event_tx, event_rx) = unbounded();
        Self {
            shared: Arc::new(SessionShared::new(config.volume)),
            config,
            session: None,
            audio_sink: Arc::new(Mutex::new(audio_sink)),
            display: Arc::new(Mutex::new(display)),
            event_tx,
            event_rx,
            callbacks: None,
        }
    }

    /// 不输出画面和声音（测试、基准用）
    pub fn headless(config: PlayerConfig) -> Self {
        Self::new(config, Box::new(NullDisplay), Box::new(NullAudioSink))
    }

    pub fn set_callbacks(&mut self, callbacks: Box<dyn PlayerCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    /// 打开媒体文件
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<VideoInfo> {
        self.close();
        let demuxer = Demuxer::open(path)?;
        self.open_source(Box::new(demuxer))
    }

    /// 使用已创建的 Demuxer 打开（任意数据源）
    pub fn open_source(&mut self, demuxer: Box<dyn DemuxerSource>) -> Result<VideoInfo> {
        self.close();
        info!("{} 📎 打开容器: {}", log_ctx(), demuxer.description());

        let header = demuxer.header().clone();
        let video = header
            .video
            .ok_or_else(|| PlayerError::InvalidFormat("容器中没有视频流".to_string()))?;
        if video.format_found
            && !is_jpeg_compression(video.compression)
            && !is_jpeg_compression(video.handler)
        {
            return Err(PlayerError::NotSupported(format!(
                "视频压缩格式 {} 不是 MJPEG",
                video.compression
            )));
        }

        let fps = header.fps_or(self.config.default_fps);
        if header.frame_interval_us() == 0 {
            warn!("⚠️  容器帧间隔为 0，使用默认帧率 {} fps", fps);
        }
        let frame_count = header.frame_count();
        let (width, height) = header.dimensions();
        let (Ok(width), Ok(height)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(PlayerError::SizeExceeded(format!(
                "容器声明的画面尺寸 {}x{} 过大",
                width, height
            )));
        };

        let audio = header.audio.and_then(|format| {
            let configured = check_audio_format(&format)
                .and_then(|_| self.audio_sink.lock().configure(&format));
            match configured {
                Ok(()) => Some(format),
                Err(e) => {
                    warn!("⚠️  音频流不可用，仅播放视频: {}", e);
                    None
                }
            }
        });

        let info = VideoInfo {
            path: demuxer.description(),
            width,
            height,
            fps,
            frame_count,
            duration_sec: frame_count / fps.max(1) as u32,
            audio,
        };

        let (producer, consumer) =
            frame_buffer_pair(self.config.max_frame_width, self.config.max_frame_height)?;
        let decoder = MjpegDecoder::new(self.config.max_frame_width, self.config.max_frame_height)?;
        let mut audio_feed = AudioFeed::new(self.config.audio_chunk_capacity)?;
        audio_feed.set_format(audio);

        let mut audio_buf = Vec::new();
        audio_buf
            .try_reserve_exact(self.config.audio_chunk_capacity)
            .map_err(|e| PlayerError::AllocationError(format!("音频块缓冲分配失败: {}", e)))?;
        audio_buf.resize(self.config.audio_chunk_capacity, 0);

        let governor = SyncGovernor::new(fps);
        let context = PlaybackContext {
            demuxer,
            decoder,
            producer,
            consumer,
            audio_feed,
            audio_buf,
            audio_sink: Arc::clone(&self.audio_sink),
            display: Arc::clone(&self.display),
            governor: governor.clone(),
            max_consecutive_failures: self.config.max_consecutive_decode_failures,
        };

        self.shared.state.store(PlaybackState::Stopped);
        self.shared.current_frame.store(0, Ordering::SeqCst);
        self.discard_events();

        let worker = PlaybackThread::start(context, Arc::clone(&self.shared), self.event_tx.clone())?;

        info!(
            "{} ✅ 打开成功: {}x{} @ {} fps, {} 帧 ({} 秒)",
            log_ctx(),
            info.width,
            info.height,
            info.fps,
            info.frame_count,
            info.duration_sec
        );
        self.session = Some(Session { info: info.clone(), worker, governor });
        Ok(info)
    }

    /// 开始或继续播放
    pub fn play(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(PlayerError::NotOpen)?;
        let state = self.shared.state.load();
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Stopped | PlaybackState::Paused => {
                if self
                    .shared
                    .state
                    .compare_exchange(state, PlaybackState::Playing)
                    .is_err()
                {
                    return Err(PlayerError::InvalidState("播放状态已被并发修改".to_string()));
                }
                info!("{} ▶ 播放（从帧 {}）", log_ctx(), self.get_current_frame());
                session.worker.wake()
            }
            PlaybackState::Error => Err(PlayerError::InvalidState(
                "播放器处于错误状态，请重新打开".to_string(),
            )),
        }
    }

    /// 暂停：当前迭代完成后生效，位置保留
    pub fn pause(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(PlayerError::NotOpen)?;
        match self.shared.state.compare_exchange(PlaybackState::Playing, PlaybackState::Paused) {
            Ok(_) => {
                info!("{} ⏸ 暂停", log_ctx());
                session.worker.wake()
            }
            Err(PlaybackState::Paused) => Ok(()),
            Err(other) => Err(PlayerError::InvalidState(format!("{:?} 状态下不能暂停", other))),
        }
    }

    /// 定位到指定帧，立即返回
    ///
    /// 超出头部声明帧数时同步返回 SeekOutOfRange；其余情况在播放线程的下一次迭代边界生效，
    /// 容器中实际帧数不足等失败通过 on_error 上报。
    pub fn seek(&mut self, frame_index: u32) -> Result<()> {
        let session = self.session.as_ref().ok_or(PlayerError::NotOpen)?;
        if self.shared.state.load() == PlaybackState::Error {
            return Err(PlayerError::InvalidState("播放器处于错误状态，请重新打开".to_string()));
        }
        let available = session.info.frame_count;
        if frame_index >= available {
            return Err(PlayerError::SeekOutOfRange { target: frame_index, available });
        }

        info!("{} ⏩ Seek: 帧 {}", log_ctx(), frame_index);
        self.shared.current_frame.store(frame_index, Ordering::SeqCst);
        session.worker.seek(frame_index)
    }

    /// 停止并回到第 0 帧，立即返回（进行中的迭代结束后播放线程执行回退）
    pub fn stop(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(PlayerError::NotOpen)?;
        match self.shared.state.load() {
            PlaybackState::Error => Err(PlayerError::InvalidState(
                "播放器处于错误状态，请重新打开".to_string(),
            )),
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Stopped => {
                info!("{} ⏹ 停止", log_ctx());
                self.shared.state.store(PlaybackState::Stopped);
                self.shared.current_frame.store(0, Ordering::SeqCst);
                session.worker.rewind()
            }
        }
    }

    /// 释放容器与缓冲区
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!("{} 🔒 关闭容器: {}", log_ctx(), session.info.path);
            self.shared.state.store(PlaybackState::Stopped);
            session.worker.stop();
            let mut sink = self.audio_sink.lock();
            sink.clear();
            sink.pause();
        }
        self.shared.state.store(PlaybackState::Stopped);
        self.shared.current_frame.store(0, Ordering::SeqCst);
        self.discard_events();
    }

    pub fn get_state(&self) -> PlaybackState {
        self.shared.state.load()
    }

    pub fn get_info(&self) -> Result<VideoInfo> {
        self.session
            .as_ref()
            .map(|session| session.info.clone())
            .ok_or(PlayerError::NotOpen)
    }

    /// 下一帧的帧号（已显示的帧数）
    pub fn get_current_frame(&self) -> u32 {
        self.shared.current_frame.load(Ordering::SeqCst)
    }

    pub fn get_position_sec(&self) -> u32 {
        match &self.session {
            Some(session) => self.get_current_frame() / session.info.fps.max(1) as u32,
            None => 0,
        }
    }

    /// 设置音量 0-100（超出范围截断）
    pub fn set_volume(&self, volume: u8) {
        self.shared.volume.store(volume.min(100), Ordering::Relaxed);
    }

    pub fn volume(&self) -> u8 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    pub fn sync_stats(&self) -> Option<SyncStats> {
        self.session.as_ref().map(|session| session.governor.stats())
    }

    /// 分发所有待处理事件到回调，返回处理的事件数
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// 最多等待 timeout 直到至少有一个事件，然后分发所有待处理事件
    pub fn process_events_timeout(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        match self.event_rx.recv_deadline(deadline) {
            Ok(event) => {
                self.dispatch(event);
                1 + self.process_events()
            }
            Err(_) => 0,
        }
    }

    fn dispatch(&mut self, event: PlayerEvent) {
        let Some(callbacks) = self.callbacks.as_mut() else {
            return;
        };
        match event {
            PlayerEvent::FrameDecoded(index) => callbacks.on_frame_decoded(index),
            PlayerEvent::PlaybackComplete => callbacks.on_playback_complete(),
            PlayerEvent::Error(kind) => callbacks.on_error(kind),
        }
    }

    fn discard_events(&mut self) {
        while self.event_rx.try_recv().is_ok() {}
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.close();
    }
}
