use crate::core::{BoundedQueue, PlayState, Result, ShutdownSignal, VideoFrame};
use crate::player::scheduler::{Decision, FrameScheduler};
use log::{debug, error, info};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

// 等待显示时刻时的最大睡眠粒度，保证退出信号能被及时看到
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// 视频呈现面（图形上下文的边界）
///
/// 只能在呈现线程上调用：纹理和图形上下文都不跨线程共享
pub trait VideoSurface {
    /// 上传三个平面（Y 全分辨率，U/V 半分辨率）
    fn upload(&mut self, frame: &VideoFrame) -> Result<()>;

    /// 绘制并显示最近一次上传的帧
    fn present(&mut self) -> Result<()>;

    /// 用户是否请求了关闭窗口
    fn poll_quit(&mut self) -> bool;
}

/// 呈现统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PresentStats {
    pub presented: u64,
    pub dropped: u64,
    pub last_pts: Option<f64>,
}

/// 视频呈现循环：取帧 → 决定显示/丢弃/等待 → 上传 → 显示
pub struct VideoPresenter<S: VideoSurface> {
    surface: S,
    queue: Arc<BoundedQueue<PlayState>>,
    scheduler: FrameScheduler,
    shutdown: ShutdownSignal,
    stats: PresentStats,
}

impl<S: VideoSurface> VideoPresenter<S> {
    pub fn new(
        surface: S,
        queue: Arc<BoundedQueue<PlayState>>,
        scheduler: FrameScheduler,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            surface,
            queue,
            scheduler,
            shutdown,
            stats: PresentStats::default(),
        }
    }

    /// 运行到退出信号，或者解码结束且队列取空
    ///
    /// 渲染失败视为致命：请求退出后返回错误
    pub fn run(mut self) -> Result<PresentStats> {
        info!("{} 🖼️ 呈现线程启动", log_ctx());

        match self.present_all() {
            Ok(()) => {
                info!(
                    "{} ✅ 呈现线程结束: 显示 {} 帧, 丢弃 {} 帧, 最后 pts={:?}",
                    log_ctx(),
                    self.stats.presented,
                    self.stats.dropped,
                    self.stats.last_pts
                );
                Ok(self.stats)
            }
            Err(e) => {
                error!("{} ❌ 渲染失败，停止播放: {}", log_ctx(), e);
                self.shutdown.request();
                self.queue.close();
                Err(e)
            }
        }
    }

    fn present_all(&mut self) -> Result<()> {
        loop {
            if self.shutdown.is_requested() {
                debug!("{} 收到退出信号，停止呈现", log_ctx());
                return Ok(());
            }

            // 队列关闭且取空时返回 None
            let Some(state) = self.queue.pop() else {
                debug!("{} 视频队列已取空", log_ctx());
                return Ok(());
            };

            let pts = state.frame.pts;
            let now = Instant::now();
            let at = match self.scheduler.decide(pts, now) {
                Decision::Drop { late_by } => {
                    debug!(
                        "{} 🗑️ 丢弃视频帧 pts={:.3}s（落后 {:?}，解码于 {:?} 前）",
                        log_ctx(),
                        pts,
                        late_by,
                        now.saturating_duration_since(state.clock.wall_time)
                    );
                    self.stats.dropped += 1;
                    continue;
                }
                Decision::Show { at } => at,
            };

            if !self.wait_until(at) {
                return Ok(());
            }

            self.surface.upload(&state.frame)?;
            self.surface.present()?;
            let shown_at = Instant::now();

            self.scheduler.mark_presented(pts, shown_at);
            self.stats.presented += 1;
            self.stats.last_pts = Some(pts);

            if self.surface.poll_quit() {
                info!("{} 🚪 收到关闭请求", log_ctx());
                self.shutdown.request();
                return Ok(());
            }
        }
    }

    /// 分片睡眠到目标时刻；期间收到退出信号返回 false
    fn wait_until(&self, target: Instant) -> bool {
        loop {
            if self.shutdown.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= target {
                return true;
            }
            thread::sleep((target - now).min(WAIT_SLICE));
        }
    }
}
