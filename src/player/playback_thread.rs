use crate::core::{PlaybackState, PlayerError, PlayerEvent, Result, SyncGovernor};
use crate::player::audio_output::{AudioFeed, AudioSink};
use crate::player::decoder::MjpegDecoder;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::display::DisplaySink;
use crate::player::frame_buffer::{FrameConsumer, FrameProducer};
use crossbeam::atomic::AtomicCell;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

const LOG_FIRST_N: u32 = 5;

/// 控制端与播放线程共享的会话状态
///
/// 状态字段是两端唯一的同步点：控制端修改状态，播放线程在每次迭代边界读取。
#[derive(Debug)]
pub struct SessionShared {
    pub state: AtomicCell<PlaybackState>,
    pub current_frame: AtomicU32,
    pub volume: AtomicU8,
}

impl SessionShared {
    pub fn new(volume: u8) -> Self {
        Self {
            state: AtomicCell::new(PlaybackState::Stopped),
            current_frame: AtomicU32::new(0),
            volume: AtomicU8::new(volume.min(100)),
        }
    }
}

/// 播放线程命令（控制端发送后立即返回，失败通过事件上报）
pub enum PlaybackCommand {
    /// 定位到指定帧
    Seek { frame_index: u32 },
    /// 回到第 0 帧（stop）
    Rewind,
    /// 状态已改变，重新检查
    Wake,
    Shutdown,
}

/// 播放线程独占的资源（容器游标、解码器、帧缓冲）
pub struct PlaybackContext {
    pub demuxer: Box<dyn DemuxerSource>,
    pub decoder: MjpegDecoder,
    pub producer: FrameProducer,
    pub consumer: FrameConsumer,
    pub audio_feed: AudioFeed,
    pub audio_buf: Vec<u8>,
    pub audio_sink: Arc<Mutex<Box<dyn AudioSink>>>,
    pub display: Arc<Mutex<Box<dyn DisplaySink>>>,
    pub governor: SyncGovernor,
    pub max_consecutive_failures: u32,
}

enum StepOutcome {
    Presented,
    EndOfStream,
}

/// 播放线程管理器
pub struct PlaybackThread {
    thread_handle: Option<JoinHandle<()>>,
    command_tx: Sender<PlaybackCommand>,
}

impl PlaybackThread {
    /// 启动播放线程（初始为空闲，等待状态变为 Playing）
    pub fn start(
        context: PlaybackContext,
        shared: Arc<SessionShared>,
        events: Sender<PlayerEvent>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = unbounded::<PlaybackCommand>();

        let thread_handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let mut worker = Worker {
                    ctx: context,
                    shared,
                    events,
                    consecutive_failures: 0,
                    frames_presented: 0,
                    position: 0,
                };
                worker.run(command_rx);
            })?;

        Ok(Self { thread_handle: Some(thread_handle), command_tx })
    }

    /// 发送 Seek 命令，在下一次迭代边界执行
    pub fn seek(&self, frame_index: u32) -> Result<()> {
        self.send(PlaybackCommand::Seek { frame_index })
    }

    /// 发送回到第 0 帧的命令
    pub fn rewind(&self) -> Result<()> {
        self.send(PlaybackCommand::Rewind)
    }

    /// 唤醒空闲的播放线程
    pub fn wake(&self) -> Result<()> {
        self.send(PlaybackCommand::Wake)
    }

    /// 停止线程并等待退出
    pub fn stop(&mut self) {
        info!("{} 🛑 PlaybackThread::stop() called", log_ctx());
        let _ = self.command_tx.send(PlaybackCommand::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 播放线程异常退出", log_ctx());
            }
        }
    }

    fn send(&self, command: PlaybackCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| PlayerError::InvalidState("播放线程已退出".to_string()))
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ PlaybackThread 被 drop，但可能未调用 stop()，正在尝试优雅停止", log_ctx());
            self.stop();
        }
    }
}

struct Worker {
    ctx: PlaybackContext,
    shared: Arc<SessionShared>,
    events: Sender<PlayerEvent>,
    consecutive_failures: u32,
    frames_presented: u64,
    /// 播放线程最近一次写入 current_frame 的值
    position: u32,
}

impl Worker {
    /// 播放循环（在独立线程中运行）
    ///
    /// - 每次迭代前先处理所有命令（非阻塞），保证 pause/stop/seek 在迭代边界生效
    /// - 非 Playing 状态下阻塞等待命令，不空转
    fn run(&mut self, command_rx: Receiver<PlaybackCommand>) {
        info!("{} 🎬 播放线程启动: {}", log_ctx(), self.ctx.demuxer.description());

        let mut last_state = self.shared.state.load();
        'outer: loop {
            loop {
                match command_rx.try_recv() {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }

            let state = self.shared.state.load();
            self.follow_state(last_state, state);
            last_state = state;

            if state != PlaybackState::Playing {
                match command_rx.recv() {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                        continue;
                    }
                    Err(_) => break,
                }
            }

            // 跳过的帧同样占用一个帧间隔
            let timer = self.ctx.governor.begin_frame();
            match self.step() {
                Ok(StepOutcome::Presented) => {
                    self.consecutive_failures = 0;
                    self.ctx.governor.pace(timer);
                }
                Ok(StepOutcome::EndOfStream) => self.complete(),
                Err(e) if e.is_recoverable() => {
                    self.on_skipped_frame(e);
                    self.ctx.governor.pace(timer);
                }
                Err(e) => {
                    error!("{} ❌ 播放致命错误: {}", log_ctx(), e);
                    self.fail(e);
                }
            }
        }

        self.ctx.audio_sink.lock().pause();
        let stats = self.ctx.governor.stats();
        info!(
            "{} 🛑 播放线程退出（共显示 {} 帧，迟到 {} 帧，最大迟到 {:?}）",
            log_ctx(),
            self.frames_presented,
            stats.late_frames,
            stats.max_lateness
        );
    }

    /// 返回 false 表示线程应退出
    fn handle_command(&mut self, command: PlaybackCommand) -> bool {
        match command {
            PlaybackCommand::Seek { frame_index } => {
                info!("{} ⏩ 播放线程收到 Seek 命令: 帧 {}", log_ctx(), frame_index);
                self.ctx.audio_sink.lock().clear();
                match self.ctx.demuxer.seek(frame_index) {
                    Ok(()) => {
                        self.set_position(frame_index);
                        self.consecutive_failures = 0;
                    }
                    Err(e) => {
                        // 容器游标已恢复，帧号跟随容器
                        error!("{} ❌ Seek 失败: {}", log_ctx(), e);
                        let restored = self.ctx.demuxer.current_frame();
                        self.set_position(restored);
                        self.emit(PlayerEvent::Error(e.kind()));
                    }
                }
                true
            }
            PlaybackCommand::Rewind => {
                debug!("{} ⏮ 播放线程回到第 0 帧", log_ctx());
                self.ctx.audio_sink.lock().clear();
                match self.ctx.demuxer.rewind() {
                    Ok(()) => {
                        self.set_position(0);
                        self.consecutive_failures = 0;
                    }
                    Err(e) => {
                        error!("{} ❌ 回到起点失败: {}", log_ctx(), e);
                        self.fail(e);
                    }
                }
                true
            }
            PlaybackCommand::Wake => true,
            PlaybackCommand::Shutdown => {
                info!("{} ⏹ 播放线程收到停止命令", log_ctx());
                false
            }
        }
    }

    /// Playing 与非 Playing 之间切换时同步音频输出
    fn follow_state(&mut self, previous: PlaybackState, current: PlaybackState) {
        let was_playing = previous == PlaybackState::Playing;
        let is_playing = current == PlaybackState::Playing;
        if was_playing && !is_playing {
            debug!("{} ⏸ 播放线程进入空闲: {:?}", log_ctx(), current);
            self.ctx.audio_sink.lock().pause();
        } else if !was_playing && is_playing {
            debug!("{} ▶ 播放线程开始迭代", log_ctx());
            self.ctx.governor.reset_stats();
            self.ctx.audio_sink.lock().resume();
        }
    }

    /// 一次迭代：送出交错音频 → 读视频块 → 解码到 back → 交换 → 显示 → 通知 → 节拍
    fn step(&mut self) -> Result<StepOutcome> {
        self.feed_interleaved_audio()?;

        let ctx = &mut self.ctx;
        let Some(chunk) = ctx.demuxer.read_video_chunk()? else {
            return Ok(StepOutcome::EndOfStream);
        };
        let frame_index = chunk.frame_index;

        let back = ctx.producer.back_mut()?;
        let decoded = ctx.decoder.decode(&chunk, back);
        // 失败的帧同样被消费，下一次迭代从下一个块继续
        self.advance_position(frame_index + 1);
        let (width, height) = decoded?;
        let ctx = &mut self.ctx;

        ctx.producer.publish(frame_index)?;
        if let Some(front) = ctx.consumer.try_acquire() {
            ctx.display.lock().present(front)?;
        }
        self.frames_presented += 1;

        if frame_index < LOG_FIRST_N || frame_index % 100 == 0 {
            info!(
                "{} 🖼 显示帧 #{} ({}x{}, 解码 {:?})",
                log_ctx(),
                frame_index,
                width,
                height,
                ctx.decoder.last_decode_time()
            );
        } else {
            debug!("{} 显示帧 #{}", log_ctx(), frame_index);
        }

        self.emit(PlayerEvent::FrameDecoded(frame_index));
        Ok(StepOutcome::Presented)
    }

    /// 送出下一个视频块之前的所有音频块
    fn feed_interleaved_audio(&mut self) -> Result<()> {
        let ctx = &mut self.ctx;
        if ctx.audio_feed.format().is_none() {
            return Ok(());
        }

        while let Some(len) = ctx.demuxer.read_interleaved_audio_chunk(&mut ctx.audio_buf)? {
            let volume = self.shared.volume.load(Ordering::Relaxed);
            let mut sink = ctx.audio_sink.lock();
            if let Err(e) = ctx.audio_feed.feed(&ctx.audio_buf[..len], volume, &mut **sink) {
                // 音频输出失败不影响视频，后续只播放画面
                warn!("{} ⚠️  音频输出失败，关闭音频: {}", log_ctx(), e);
                ctx.audio_feed.set_format(None);
                break;
            }
        }
        Ok(())
    }

    /// 控制端写入的 current_frame（stop / seek）优先于播放线程的推进
    fn advance_position(&mut self, next: u32) {
        if self
            .shared
            .current_frame
            .compare_exchange(self.position, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.position = next;
        }
    }

    fn set_position(&mut self, frame_index: u32) {
        self.position = frame_index;
        self.shared.current_frame.store(frame_index, Ordering::SeqCst);
    }

    fn complete(&mut self) {
        info!("{} 📄 播放完成（共显示 {} 帧）", log_ctx(), self.frames_presented);
        if let Err(e) = self.ctx.demuxer.rewind() {
            error!("{} ❌ 回到起点失败: {}", log_ctx(), e);
            self.fail(e);
            return;
        }
        self.set_position(0);
        let _ = self
            .shared
            .state
            .compare_exchange(PlaybackState::Playing, PlaybackState::Stopped);
        self.emit(PlayerEvent::PlaybackComplete);
    }

    fn on_skipped_frame(&mut self, e: PlayerError) {
        self.consecutive_failures += 1;
        warn!(
            "{} ⚠️  跳过损坏的帧（连续 {}/{}）: {}",
            log_ctx(),
            self.consecutive_failures,
            self.ctx.max_consecutive_failures,
            e
        );
        self.emit(PlayerEvent::Error(e.kind()));

        if self.consecutive_failures >= self.ctx.max_consecutive_failures {
            error!("{} ❌ 连续解码失败达到上限，停止播放", log_ctx());
            self.enter_error();
        }
    }

    fn fail(&mut self, e: PlayerError) {
        self.enter_error();
        self.emit(PlayerEvent::Error(e.kind()));
    }

    /// 只有 Playing 会被置为 Error；控制端先一步写入的 Stopped / Paused 保持不变
    fn enter_error(&self) {
        if let Err(current) = self
            .shared
            .state
            .compare_exchange(PlaybackState::Playing, PlaybackState::Error)
        {
            warn!("{} ⚠️  状态已变为 {:?}，不再标记错误", log_ctx(), current);
        }
    }

    fn emit(&self, event: PlayerEvent) {
        // 控制端已释放时直接丢弃事件
        let _ = self.events.send(event);
    }
}
