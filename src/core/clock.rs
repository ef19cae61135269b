use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 帧节拍器 - 用于音视频同步
///
/// 每次循环从自身的起始时刻计时：耗时不足一个帧间隔就睡眠补齐，超出则立即继续（不丢帧）。
/// 不跨帧累积误差，因此任意时刻的偏差最多为一个帧间隔。
#[derive(Clone)]
pub struct SyncGovernor {
    interval: Duration,
    stats: Arc<Mutex<SyncStats>>,
}

/// 节拍统计（诊断用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub paced_frames: u64,
    pub late_frames: u64,
    pub max_lateness: Duration,
}

/// 单次节拍结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    OnTime { slept: Duration },
    Late { by: Duration },
}

/// 单帧计时起点
#[derive(Debug, Clone, Copy)]
pub struct FrameTimer {
    started: Instant,
}

impl FrameTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl SyncGovernor {
    /// fps 应已由调用方回退到配置的默认帧率；0 按 1 fps 处理
    pub fn new(fps: u16) -> Self {
        let fps = fps.max(1) as u64;
        Self {
            interval: Duration::from_micros(1_000_000 / fps),
            stats: Arc::new(Mutex::new(SyncStats::default())),
        }
    }

    /// 目标帧间隔
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 开始一帧
    pub fn begin_frame(&self) -> FrameTimer {
        FrameTimer { started: Instant::now() }
    }

    /// 结束一帧：睡眠到目标间隔，或记录迟到
    pub fn pace(&self, timer: FrameTimer) -> Pace {
        let elapsed = timer.elapsed();
        let pace = match self.interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => {
                thread::sleep(remaining);
                Pace::OnTime { slept: remaining }
            }
            _ => Pace::Late { by: elapsed - self.interval },
        };

        let mut stats = self.stats.lock();
        stats.paced_frames += 1;
        if let Pace::Late { by } = pace {
            stats.late_frames += 1;
            stats.max_lateness = stats.max_lateness.max(by);
        }
        pace
    }

    pub fn stats(&self) -> SyncStats {
        *self.stats.lock()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = SyncStats::default();
    }
}
