use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use watchman_player::core::{ErrorKind, PlaybackState, PlayerConfig};
use watchman_player::player::{
    AudioSink, CpalAudioSink, DisplaySink, FrameBuffer, NullAudioSink, PlaybackManager, PlayerCallbacks,
};

/// 只统计帧数的显示端（没有屏幕时使用）
#[derive(Default)]
struct FrameCounter {
    presented: u64,
}

impl DisplaySink for FrameCounter {
    fn present(&mut self, frame: &FrameBuffer) -> watchman_player::Result<()> {
        self.presented += 1;
        if self.presented % 100 == 0 {
            info!(
                "🖼 已显示 {} 帧（当前 #{} {}x{}）",
                self.presented,
                frame.frame_index(),
                frame.width(),
                frame.height()
            );
        }
        Ok(())
    }
}

struct ConsoleCallbacks {
    finished: Arc<AtomicBool>,
}

impl PlayerCallbacks for ConsoleCallbacks {
    fn on_playback_complete(&mut self) {
        info!("✅ 播放完成");
        self.finished.store(true, Ordering::SeqCst);
    }

    fn on_error(&mut self, kind: ErrorKind) {
        warn!("⚠️  播放错误: {:?}", kind);
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("cpal", log::LevelFilter::Warn)
        .init();

    info!("🎬 Watchman Player 启动");

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("用法: watchman-player <文件.avi> [配置.json]");
    };
    let config = match args.next() {
        Some(config_path) => PlayerConfig::from_json_file(&config_path)
            .with_context(|| format!("加载配置失败: {}", config_path))?,
        None => PlayerConfig::default(),
    };

    let audio: Box<dyn AudioSink> = match CpalAudioSink::new(config.audio_queue_chunks) {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            warn!("⚠️  音频输出不可用，静音播放: {}", e);
            Box::new(NullAudioSink)
        }
    };

    let finished = Arc::new(AtomicBool::new(false));
    let mut manager = PlaybackManager::new(config, Box::new(FrameCounter::default()), audio);
    manager.set_callbacks(Box::new(ConsoleCallbacks { finished: Arc::clone(&finished) }));

    let info = manager.open(&path).with_context(|| format!("打开文件失败: {}", path))?;
    info!("媒体信息: {:?}", info);

    manager.play()?;
    while !finished.load(Ordering::SeqCst) {
        manager.process_events_timeout(Duration::from_millis(200));
        if manager.get_state() == PlaybackState::Error {
            manager.process_events();
            error!("❌ 播放在第 {} 帧处终止", manager.get_current_frame());
            manager.close();
            bail!("播放失败");
        }
    }

    if let Some(stats) = manager.sync_stats() {
        info!(
            "📊 节拍统计: {} 帧, 迟到 {} 帧, 最大迟到 {:?}",
            stats.paced_frames, stats.late_frames, stats.max_lateness
        );
    }
    manager.close();
    Ok(())
}
