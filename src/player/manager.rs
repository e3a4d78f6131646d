use crate::core::{
    AudioChunk, AudioClock, AudioFormat, BoundedQueue, MediaInfo, PlayState, PlayerConfig,
    PlayerError, Result, ShutdownSignal, StreamKind,
};
use crate::player::audio_output::{AudioFeeder, AudioOutput};
use crate::player::decode_loop::{DecodeLoop, DecodeSummary, StreamPath};
use crate::player::decoder::{AudioDecoder, BoxedAudioDecoder, BoxedVideoDecoder, VideoDecoder};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::PacketSource;
use crate::player::presenter::{PresentStats, VideoPresenter, VideoSurface};
use crate::player::scheduler::FrameScheduler;
use log::{error, info, warn};
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 一次播放的汇总（线程异常退出时对应项为 None）
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub decode: Option<DecodeSummary>,
    pub present: Option<PresentStats>,
}

/// open 之后、start 之前准备好的部分
struct Pending {
    decode: DecodeLoop,
    feeder: Option<AudioFeeder>,
}

/// 播放管理器 - 整体控制播放流程
///
/// 三个线程：解码线程（独占 demuxer 和解码器）、呈现线程（独占渲染面）、
/// 音频设备线程（cpal 驱动，只跑回调）。共享的只有两个队列和退出标志。
pub struct PlaybackManager {
    config: PlayerConfig,
    media_info: MediaInfo,
    shutdown: ShutdownSignal,
    video_queue: Arc<BoundedQueue<PlayState>>,
    audio_queue: Arc<BoundedQueue<AudioChunk>>,
    audio_clock: Option<Arc<AudioClock>>,
    has_video: bool,
    pending: Option<Pending>,
    audio_output: Option<AudioOutput>,
    decode_thread: Option<JoinHandle<Result<DecodeSummary>>>,
    present_thread: Option<JoinHandle<Result<PresentStats>>>,
    present_done: Arc<AtomicBool>,
    report: Option<SessionReport>,
}

impl PlaybackManager {
    /// 打开媒体文件并准备好整条管线（线程在 start 时才启动）
    pub fn open(path: &Path, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        info!("{} 📂 打开媒体文件: {}", log_ctx(), path.display());

        let demuxer = Demuxer::open(path)?;
        let mut media_info = demuxer.media_info().clone();
        info!("{} 📎 媒体信息: {:?}", log_ctx(), media_info);

        let video = match (demuxer.video_stream(), demuxer.stream_of(StreamKind::Video).cloned()) {
            (Some(stream), Some(info)) => {
                let (width, height) = config.output_size(media_info.width, media_info.height);
                media_info.width = width;
                media_info.height = height;
                let decoder = VideoDecoder::from_stream(stream, width, height)?;
                info!(
                    "{} 📎 视频解码器: {}x{} → {}x{}",
                    log_ctx(),
                    demuxer.media_info().width,
                    demuxer.media_info().height,
                    width,
                    height
                );
                Some(StreamPath {
                    info,
                    decoder: Box::new(decoder) as BoxedVideoDecoder,
                })
            }
            _ => None,
        };

        let mut audio_output = None;
        let audio = match (demuxer.audio_stream(), demuxer.stream_of(StreamKind::Audio).cloned()) {
            (Some(stream), Some(info)) => {
                let preferred = AudioFormat {
                    sample_rate: config.preferred_sample_rate.unwrap_or(media_info.sample_rate),
                    channels: config.preferred_channels.unwrap_or(media_info.channels),
                };
                match AudioOutput::new(preferred) {
                    Ok(output) => {
                        let format = output.format();
                        let decoder = AudioDecoder::from_stream(stream, format)?;
                        audio_output = Some(output);
                        Some((
                            StreamPath {
                                info,
                                decoder: Box::new(decoder) as BoxedAudioDecoder,
                            },
                            format,
                        ))
                    }
                    Err(e) => {
                        warn!("{} ❌ 创建音频输出失败: {}，继续播放（无声音）", log_ctx(), e);
                        None
                    }
                }
            }
            _ => None,
        };

        if video.is_none() && audio.is_none() {
            error!("{} ❌ 没有可以播放的流", log_ctx());
            return Err(PlayerError::NoPlayableStream);
        }
        if audio.is_none() {
            media_info.sample_rate = 0;
            media_info.channels = 0;
        }

        let mut manager = Self::assemble(config, media_info, Box::new(demuxer), video, audio);
        manager.audio_output = audio_output;
        Ok(manager)
    }

    /// 用给定的包源和解码器组装管线
    pub(crate) fn assemble(
        config: PlayerConfig,
        media_info: MediaInfo,
        source: Box<dyn PacketSource>,
        video: Option<StreamPath<BoxedVideoDecoder>>,
        audio: Option<(StreamPath<BoxedAudioDecoder>, AudioFormat)>,
    ) -> Self {
        let shutdown = ShutdownSignal::new();
        let video_queue = Arc::new(BoundedQueue::new(config.video_queue_capacity));
        let audio_queue = Arc::new(BoundedQueue::new(config.audio_queue_capacity));

        let audio_clock = audio
            .as_ref()
            .map(|(_, format)| Arc::new(AudioClock::new(*format)));
        let feeder = audio_clock
            .as_ref()
            .map(|clock| AudioFeeder::new(audio_queue.clone(), clock.clone()));
        let has_video = video.is_some();

        let decode = DecodeLoop::new(
            source,
            video,
            audio,
            video_queue.clone(),
            audio_queue.clone(),
            shutdown.clone(),
        );

        Self {
            config,
            media_info,
            shutdown,
            video_queue,
            audio_queue,
            audio_clock,
            has_video,
            pending: Some(Pending { decode, feeder }),
            audio_output: None,
            decode_thread: None,
            present_thread: None,
            present_done: Arc::new(AtomicBool::new(false)),
            report: None,
        }
    }

    /// 取走音频回调的供数端，由调用方自己按设备节奏驱动
    #[cfg(test)]
    pub(crate) fn take_audio_feeder(&mut self) -> Option<AudioFeeder> {
        self.pending.as_mut().and_then(|p| p.feeder.take())
    }

    /// 启动音频输出、解码线程和呈现线程
    pub fn start<S>(&mut self, surface: S) -> Result<()>
    where
        S: VideoSurface + Send + 'static,
    {
        let Some(pending) = self.pending.take() else {
            warn!("{} ⚠️ 播放已经启动过", log_ctx());
            return Ok(());
        };
        info!("{} 🚀 启动播放", log_ctx());

        // 音频先启动：启动失败时还没有线程需要收拾
        if let (Some(feeder), Some(output)) = (pending.feeder, self.audio_output.as_mut()) {
            output.start(feeder)?;
        }

        let decode = pending.decode;
        self.decode_thread = Some(thread::spawn(move || decode.run()));

        if self.has_video {
            let master = if self.config.audio_sync {
                self.audio_clock.clone()
            } else {
                None
            };
            let scheduler = FrameScheduler::new(self.config.drop_threshold(), master);
            let presenter = VideoPresenter::new(
                surface,
                self.video_queue.clone(),
                scheduler,
                self.shutdown.clone(),
            );
            let present_done = self.present_done.clone();
            self.present_thread = Some(thread::spawn(move || {
                let result = presenter.run();
                present_done.store(true, Ordering::SeqCst);
                result
            }));
        }

        Ok(())
    }

    /// 视频呈现完毕并且音频（如果有）也播放完毕
    pub fn is_finished(&self) -> bool {
        if self.report.is_some() {
            return true;
        }
        if self.pending.is_some() {
            return false;
        }

        let video_done = if self.has_video {
            self.present_done.load(Ordering::SeqCst)
        } else {
            self.decode_thread
                .as_ref()
                .map_or(true, |handle| handle.is_finished())
        };
        let audio_done = self
            .audio_clock
            .as_ref()
            .map_or(true, |clock| clock.has_ended());

        video_done && audio_done
    }

    /// 停止播放：置退出标志、关闭并清空队列、停止音频、回收线程
    ///
    /// 队列中尚未消费的帧直接丢弃。可以重复调用，后续调用返回同一份报告。
    pub fn stop(&mut self) -> SessionReport {
        if let Some(report) = self.report {
            return report;
        }
        info!("{} ⏹️  停止播放", log_ctx());

        self.shutdown.request();
        // close 唤醒阻塞在 push/pop 上的线程
        self.video_queue.close();
        self.audio_queue.close();

        let video_count = self.video_queue.clear();
        let audio_count = self.audio_queue.clear();
        info!(
            "{} 🗑️  清空队列: {} 视频帧, {} 音频块",
            log_ctx(),
            video_count,
            audio_count
        );

        if let Some(mut output) = self.audio_output.take() {
            output.stop();
            if let Some(clock) = &self.audio_clock {
                info!("{} 🔊 音频设备共输出 {:.2}s", log_ctx(), clock.device_seconds());
            }
        }
        self.pending = None;

        let decode = join_thread(self.decode_thread.take(), "解码");
        let present = join_thread(self.present_thread.take(), "呈现");

        let report = SessionReport { decode, present };
        info!("{} ✅ 停止播放完成，所有线程已清理: {:?}", log_ctx(), report);
        self.report = Some(report);
        report
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_thread<T>(handle: Option<JoinHandle<Result<T>>>, name: &str) -> Option<T> {
    match handle?.join() {
        Ok(Ok(value)) => {
            info!("{} ✅ {}线程已结束", log_ctx(), name);
            Some(value)
        }
        Ok(Err(e)) => {
            warn!("{} ⚠️ {}线程返回错误: {}", log_ctx(), name, e);
            None
        }
        Err(_) => {
            error!("{} ❌ {}线程 panic", log_ctx(), name);
            None
        }
    }
}
