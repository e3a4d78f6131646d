use crate::core::types::AudioFormat;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 时钟快照：内容时间 `pts`（秒）对应的真实时刻 `wall_time`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    pub pts: f64,
    pub wall_time: Instant,
}

impl Clock {
    pub fn new(pts: f64, wall_time: Instant) -> Self {
        Self { pts, wall_time }
    }

    pub fn now(pts: f64) -> Self {
        Self::new(pts, Instant::now())
    }

    /// 以本快照为基准，`pts` 对应的真实时刻
    pub fn wall_time_for(&self, pts: f64) -> Instant {
        offset_instant(self.wall_time, pts - self.pts)
    }
}

/// `base + seconds`，seconds 可以为负
pub fn offset_instant(base: Instant, seconds: f64) -> Instant {
    if seconds >= 0.0 {
        base + Duration::from_secs_f64(seconds)
    } else {
        base.checked_sub(Duration::from_secs_f64(-seconds))
            .unwrap_or(base)
    }
}

/// 音频主时钟 - 正在播放的音频内容时间
///
/// 由音频回调写入、渲染线程读取，全部是原子操作（回调里不能加锁）。
/// `position` 是最后一个交给设备的真实样本的内容时间（块 pts + 块内偏移），
/// 补的静音不推进它。欠载期间标记为 stalled，此时不作为参考，
/// 渲染线程退回到按上一帧排期，视频不会因为音频饥饿而停住。
pub struct AudioClock {
    format: AudioFormat,
    /// 交给设备的总字节数（含静音）
    bytes_played: AtomicU64,
    /// f64 秒的位表示
    content_position: AtomicU64,
    started: AtomicBool,
    stalled: AtomicBool,
    ended: AtomicBool,
}

impl AudioClock {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            bytes_played: AtomicU64::new(0),
            content_position: AtomicU64::new(0f64.to_bits()),
            started: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// 当前音频内容位置（秒）；尚未开始、欠载中或已经结束时返回 None
    pub fn position(&self) -> Option<f64> {
        if !self.started.load(Ordering::Acquire)
            || self.stalled.load(Ordering::Acquire)
            || self.ended.load(Ordering::Acquire)
        {
            return None;
        }
        Some(f64::from_bits(self.content_position.load(Ordering::Acquire)))
    }

    pub fn bytes_played(&self) -> u64 {
        self.bytes_played.load(Ordering::Acquire)
    }

    /// 设备实际输出的时长（秒，含静音）
    pub fn device_seconds(&self) -> f64 {
        self.format.bytes_to_seconds(self.bytes_played())
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub(crate) fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }

    pub(crate) fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Release);
    }

    pub(crate) fn set_position(&self, seconds: f64) {
        self.content_position.store(seconds.to_bits(), Ordering::Release);
    }

    pub(crate) fn advance(&self, bytes: usize) {
        self.bytes_played.fetch_add(bytes as u64, Ordering::AcqRel);
    }
}
