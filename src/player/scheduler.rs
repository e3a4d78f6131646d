use crate::core::clock::offset_instant;
use crate::core::{AudioClock, Clock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 对一帧的处理决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 在 `at` 时刻显示（不早于现在）
    Show { at: Instant },
    /// 已经落后超过阈值，丢弃
    Drop { late_by: Duration },
}

/// 视频帧调度
///
/// 有音频且音频正在播放时，以正在播放的音频内容时间为主时钟：
/// `scheduled = now + (pts - audio_position)`。
/// 音频尚未开始、欠载、已经结束或根本没有音频时，退回到以上一帧为基准：
/// `scheduled = previous.wall_time + (pts - previous.pts)`。
pub struct FrameScheduler {
    drop_threshold: Duration,
    previous: Option<Clock>,
    master: Option<Arc<AudioClock>>,
}

impl FrameScheduler {
    pub fn new(drop_threshold: Duration, master: Option<Arc<AudioClock>>) -> Self {
        Self {
            drop_threshold,
            previous: None,
            master,
        }
    }

    /// 上一帧实际显示时的时钟
    pub fn previous(&self) -> Option<Clock> {
        self.previous
    }

    /// 计算 `pts` 应该显示的真实时刻
    pub fn scheduled_time(&self, pts: f64, now: Instant) -> Instant {
        let audio_position = self.master.as_ref().and_then(|clock| clock.position());

        let scheduled = match (audio_position, self.previous) {
            (Some(position), _) => offset_instant(now, pts - position),
            (None, Some(previous)) => previous.wall_time_for(pts),
            (None, None) => now,
        };

        // 时间戳不回退时，显示时刻也不能早于上一帧
        match self.previous {
            Some(previous) if pts >= previous.pts => scheduled.max(previous.wall_time),
            _ => scheduled,
        }
    }

    pub fn decide(&self, pts: f64, now: Instant) -> Decision {
        let scheduled = self.scheduled_time(pts, now);

        if now > scheduled + self.drop_threshold {
            return Decision::Drop {
                late_by: now - scheduled,
            };
        }
        Decision::Show {
            at: scheduled.max(now),
        }
    }

    /// 记录实际显示时刻，作为下一帧的基准
    pub fn mark_presented(&mut self, pts: f64, at: Instant) {
        self.previous = Some(Clock::new(pts, at));
    }
}
