use crate::core::{
    AudioChunk, AudioFormat, BoundedQueue, Clock, PlayState, Result, ShutdownSignal, StreamInfo,
    VideoFrame,
};
use crate::player::decoder::{BoxedAudioDecoder, BoxedVideoDecoder, Decoded};
use crate::player::demuxer_source::{PacketSource, ReadOutcome};
use log::{debug, error, info, warn};
use std::process;
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 解码线程的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// 读到文件末尾，所有帧已入队
    EndOfStream,
    /// 收到退出信号或队列被关闭
    Cancelled,
}

/// 解码线程统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub packets: u64,
    pub video_frames: u64,
    pub audio_chunks: u64,
    pub decode_failures: u64,
    pub outcome: DecodeOutcome,
}

/// 单条流的解码路径
pub struct StreamPath<D> {
    pub info: StreamInfo,
    pub decoder: D,
}

/// 解码循环：读包 → 按流分发 → 解码 → 入队
///
/// 单线程独占 PacketSource 和两个解码器。入队是阻塞的，
/// 队列满时解码自然停下来等渲染/音频消费（背压）。
pub struct DecodeLoop {
    source: Box<dyn PacketSource>,
    video: Option<StreamPath<BoxedVideoDecoder>>,
    audio: Option<StreamPath<BoxedAudioDecoder>>,
    // 解码输出的 PCM 格式，用于推算缺失的音频 PTS
    audio_format: Option<AudioFormat>,
    video_queue: Arc<BoundedQueue<PlayState>>,
    audio_queue: Arc<BoundedQueue<AudioChunk>>,
    shutdown: ShutdownSignal,

    // 缺失 PTS 时用上一帧推算
    last_video_pts: Option<f64>,
    next_audio_pts: f64,
    summary: DecodeSummary,
}

impl DecodeLoop {
    pub fn new(
        source: Box<dyn PacketSource>,
        video: Option<StreamPath<BoxedVideoDecoder>>,
        audio: Option<(StreamPath<BoxedAudioDecoder>, AudioFormat)>,
        video_queue: Arc<BoundedQueue<PlayState>>,
        audio_queue: Arc<BoundedQueue<AudioChunk>>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (audio, audio_format) = match audio {
            Some((path, format)) => (Some(path), Some(format)),
            None => (None, None),
        };
        Self {
            source,
            video,
            audio,
            audio_format,
            video_queue,
            audio_queue,
            shutdown,
            last_video_pts: None,
            next_audio_pts: 0.0,
            summary: DecodeSummary {
                packets: 0,
                video_frames: 0,
                audio_chunks: 0,
                decode_failures: 0,
                outcome: DecodeOutcome::Cancelled,
            },
        }
    }

    /// 运行到文件结束、退出信号或读包错误。无论哪种方式退出，两个队列都会被关闭
    pub fn run(mut self) -> Result<DecodeSummary> {
        info!("{} 🎬 解码线程启动: {}", log_ctx(), self.source.description());
        if let Some(video) = &self.video {
            info!(
                "{} 视频: 流 #{} - {}",
                log_ctx(),
                video.info.index,
                video.decoder.describe()
            );
        }
        if let Some(audio) = &self.audio {
            info!(
                "{} 音频: 流 #{} - {}",
                log_ctx(),
                audio.info.index,
                audio.decoder.describe()
            );
        }

        let result = self.pump();

        // 先关队列：渲染循环和音频回调据此判断"没有更多数据"
        self.video_queue.close();
        self.audio_queue.close();

        match result {
            Ok(outcome) => {
                self.summary.outcome = outcome;
                info!(
                    "{} ✅ 解码线程结束 ({:?}): {} 个包, {} 视频帧, {} 音频块, {} 次解码失败",
                    log_ctx(),
                    outcome,
                    self.summary.packets,
                    self.summary.video_frames,
                    self.summary.audio_chunks,
                    self.summary.decode_failures
                );
                Ok(self.summary)
            }
            Err(e) => {
                error!("{} ❌ 解码线程异常退出: {}", log_ctx(), e);
                Err(e)
            }
        }
    }

    fn pump(&mut self) -> Result<DecodeOutcome> {
        loop {
            if self.shutdown.is_requested() {
                debug!("{} 收到退出信号，停止读包", log_ctx());
                return Ok(DecodeOutcome::Cancelled);
            }

            let packet = match self.source.read_packet()? {
                ReadOutcome::Packet(packet) => packet,
                ReadOutcome::EndOfStream => {
                    info!("{} 📭 读到文件末尾，刷新解码器", log_ctx());
                    return self.drain();
                }
            };
            self.summary.packets += 1;

            let stream_index = packet.stream();
            let delivered = if self.is_stream(&self.video, stream_index) {
                let decoded = self.video.as_mut().map(|v| v.decoder.decode(&packet));
                self.handle_video(decoded)
            } else if self.is_stream(&self.audio, stream_index) {
                let decoded = self.audio.as_mut().map(|a| a.decoder.decode(&packet));
                self.handle_audio(decoded)
            } else {
                true
            };

            if !delivered {
                debug!("{} 队列已关闭，停止解码", log_ctx());
                return Ok(DecodeOutcome::Cancelled);
            }
        }
    }

    /// 流结束：取出两个解码器中缓冲的帧
    fn drain(&mut self) -> Result<DecodeOutcome> {
        let video = self.video.as_mut().map(|v| v.decoder.flush());
        if !self.handle_video(video) {
            return Ok(DecodeOutcome::Cancelled);
        }
        let audio = self.audio.as_mut().map(|a| a.decoder.flush());
        if !self.handle_audio(audio) {
            return Ok(DecodeOutcome::Cancelled);
        }
        Ok(DecodeOutcome::EndOfStream)
    }

    fn is_stream<D>(&self, path: &Option<StreamPath<D>>, index: usize) -> bool {
        path.as_ref().is_some_and(|p| p.info.index == index)
    }

    /// 解码失败只记录并跳过；返回 false 表示队列已关闭
    fn handle_video(&mut self, decoded: Option<Result<Vec<Decoded<VideoFrame>>>>) -> bool {
        let frames = match decoded {
            None => return true,
            Some(Ok(frames)) => frames,
            Some(Err(e)) => {
                warn!("{} ⚠️ 视频包解码失败（已跳过）: {}", log_ctx(), e);
                self.summary.decode_failures += 1;
                return true;
            }
        };
        let Some(info) = self.video.as_ref().map(|v| v.info.clone()) else {
            return true;
        };

        for Decoded { pts, payload: mut frame } in frames {
            frame.pts = match (pts, self.last_video_pts) {
                (Some(ticks), _) => info.ticks_to_seconds(ticks),
                (None, Some(last)) => last + info.frame_interval(),
                (None, None) => 0.0,
            };
            self.last_video_pts = Some(frame.pts);

            let state = PlayState {
                clock: Clock::now(frame.pts),
                frame,
            };
            if self.video_queue.push(state).is_err() {
                return false;
            }
            self.summary.video_frames += 1;
        }
        true
    }

    fn handle_audio(&mut self, decoded: Option<Result<Vec<Decoded<AudioChunk>>>>) -> bool {
        let chunks = match decoded {
            None => return true,
            Some(Ok(chunks)) => chunks,
            Some(Err(e)) => {
                warn!("{} ⚠️ 音频包解码失败（已跳过）: {}", log_ctx(), e);
                self.summary.decode_failures += 1;
                return true;
            }
        };
        let Some(info) = self.audio.as_ref().map(|a| a.info.clone()) else {
            return true;
        };

        for Decoded { pts, payload: mut chunk } in chunks {
            chunk.pts = match pts {
                Some(ticks) => info.ticks_to_seconds(ticks),
                None => self.next_audio_pts,
            };
            // 下一块的推算起点：本块起点 + 本块时长
            self.next_audio_pts = chunk.pts + self.chunk_duration(&chunk);

            if self.audio_queue.push(chunk).is_err() {
                return false;
            }
            self.summary.audio_chunks += 1;
        }
        true
    }

    fn chunk_duration(&self, chunk: &AudioChunk) -> f64 {
        self.audio_format
            .map(|format| format.bytes_to_seconds(chunk.len() as u64))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PlayerError, StreamKind};
    use crate::player::testing::*;

    fn queues(
        video: usize,
        audio: usize,
    ) -> (Arc<BoundedQueue<PlayState>>, Arc<BoundedQueue<AudioChunk>>) {
        (
            Arc::new(BoundedQueue::new(video)),
            Arc::new(BoundedQueue::new(audio)),
        )
    }

    fn stereo_48k() -> AudioFormat {
        AudioFormat {
            sample_rate: 48000,
            channels: 2,
        }
    }

    fn build(
        source: ScriptedSource,
        video_decoder: FakeVideoDecoder,
        with_audio: bool,
        video_queue: Arc<BoundedQueue<PlayState>>,
        audio_queue: Arc<BoundedQueue<AudioChunk>>,
        shutdown: ShutdownSignal,
    ) -> DecodeLoop {
        let video = source
            .stream_of(StreamKind::Video)
            .cloned()
            .map(|info| StreamPath {
                info,
                decoder: Box::new(video_decoder) as BoxedVideoDecoder,
            });
        let audio = if with_audio {
            source.stream_of(StreamKind::Audio).cloned().map(|info| {
                (
                    StreamPath {
                        info,
                        decoder: Box::new(FakeAudioDecoder::new(2)) as BoxedAudioDecoder,
                    },
                    stereo_48k(),
                )
            })
        } else {
            None
        };
        DecodeLoop::new(Box::new(source), video, audio, video_queue, audio_queue, shutdown)
    }

    fn drain_video(queue: &BoundedQueue<PlayState>) -> Vec<f64> {
        let mut pts = Vec::new();
        while let Some(state) = queue.pop() {
            pts.push(state.frame.pts);
        }
        pts
    }

    #[test]
    fn test_end_of_stream_delivers_everything_and_closes_queues() {
        let (video_queue, audio_queue) = queues(64, 64);
        let mut decoder = FakeVideoDecoder::new(16, 16);
        decoder.delay = 2;

        let summary = build(
            ScriptedSource::one_second(true),
            decoder,
            true,
            video_queue.clone(),
            audio_queue.clone(),
            ShutdownSignal::new(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.outcome, DecodeOutcome::EndOfStream);
        // 被解码器缓冲的最后两帧在 flush 时补齐
        assert_eq!(summary.video_frames, 30);
        assert_eq!(summary.audio_chunks, 47);
        assert!(video_queue.is_closed());
        assert!(audio_queue.is_closed());

        let pts = drain_video(&video_queue);
        assert_eq!(pts.len(), 30);
        assert!((pts[29] - 29.0 / 30.0).abs() < 1e-9);
        assert!(pts.windows(2).all(|w| w[0] < w[1]));

        let first = audio_queue.pop().unwrap();
        let second = audio_queue.pop().unwrap();
        assert_eq!(first.pts, 0.0);
        assert!((second.pts - 1024.0 / 48000.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_failure_is_skipped() {
        let (video_queue, audio_queue) = queues(64, 4);
        let mut decoder = FakeVideoDecoder::new(16, 16);
        decoder.fail_on = vec![3, 7];

        let summary = build(
            ScriptedSource::one_second(false),
            decoder,
            false,
            video_queue.clone(),
            audio_queue,
            ShutdownSignal::new(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.outcome, DecodeOutcome::EndOfStream);
        assert_eq!(summary.decode_failures, 2);
        assert_eq!(summary.video_frames, 28);
        assert_eq!(drain_video(&video_queue).len(), 28);
    }

    #[test]
    fn test_read_error_is_reported_and_closes_queues() {
        let (video_queue, audio_queue) = queues(8, 4);
        let source = ScriptedSource::new(
            vec![video_stream(30.0)],
            vec![
                Scripted::Packet(packet(VIDEO_INDEX, Some(0))),
                Scripted::Fail("磁盘读取失败".into()),
                Scripted::Packet(packet(VIDEO_INDEX, Some(1))),
            ],
        );

        let result = build(
            source,
            FakeVideoDecoder::new(16, 16),
            false,
            video_queue.clone(),
            audio_queue.clone(),
            ShutdownSignal::new(),
        )
        .run();

        assert!(matches!(result, Err(PlayerError::ReadError(_))));
        assert!(video_queue.is_closed());
        assert!(audio_queue.is_closed());
        // 出错前已入队的帧仍然可以被消费
        assert_eq!(drain_video(&video_queue), vec![0.0]);
    }

    #[test]
    fn test_missing_pts_uses_frame_interval() {
        let (video_queue, audio_queue) = queues(64, 4);
        let mut decoder = FakeVideoDecoder::new(16, 16);
        decoder.strip_pts = true;

        build(
            ScriptedSource::one_second(false),
            decoder,
            false,
            video_queue.clone(),
            audio_queue,
            ShutdownSignal::new(),
        )
        .run()
        .unwrap();

        let pts = drain_video(&video_queue);
        assert_eq!(pts[0], 0.0);
        assert!((pts[1] - 1.0 / 30.0).abs() < 1e-9);
        assert!((pts[29] - 29.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_packets_of_unselected_streams_are_ignored() {
        let (video_queue, audio_queue) = queues(8, 4);
        let source = ScriptedSource::new(
            vec![video_stream(30.0)],
            vec![
                Scripted::Packet(packet(VIDEO_INDEX, Some(0))),
                Scripted::Packet(packet(AUDIO_INDEX, Some(0))),
                Scripted::Packet(packet(7, Some(0))),
            ],
        );

        let summary = build(
            source,
            FakeVideoDecoder::new(16, 16),
            false,
            video_queue,
            audio_queue.clone(),
            ShutdownSignal::new(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.packets, 3);
        assert_eq!(summary.video_frames, 1);
        assert_eq!(summary.audio_chunks, 0);
        assert!(audio_queue.is_drained());
    }

    #[test]
    fn test_closed_queue_unblocks_producer() {
        let (video_queue, audio_queue) = queues(2, 4);
        let shutdown = ShutdownSignal::new();
        let decode = build(
            ScriptedSource::one_second(false),
            FakeVideoDecoder::new(16, 16),
            false,
            video_queue.clone(),
            audio_queue,
            shutdown.clone(),
        );

        let handle = std::thread::spawn(move || decode.run());

        // 等解码线程把队列填满并阻塞在 push 上
        while video_queue.len() < 2 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        shutdown.request();
        video_queue.close();

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.outcome, DecodeOutcome::Cancelled);
        assert!(summary.video_frames <= 3);
    }

    #[test]
    fn test_flushed_audio_is_timed_after_last_chunk() {
        let (video_queue, audio_queue) = queues(64, 64);
        let source = ScriptedSource::one_second(true);
        let info = source.stream_of(StreamKind::Audio).cloned().unwrap();
        let mut decoder = FakeAudioDecoder::new(2);
        decoder.flush_chunks = 1;
        let audio = Some((
            StreamPath {
                info,
                decoder: Box::new(decoder) as BoxedAudioDecoder,
            },
            stereo_48k(),
        ));

        let summary = DecodeLoop::new(
            Box::new(source),
            None,
            audio,
            video_queue,
            audio_queue.clone(),
            ShutdownSignal::new(),
        )
        .run()
        .unwrap();

        assert_eq!(summary.audio_chunks, 48);
        let mut chunks = Vec::new();
        while let Some(chunk) = audio_queue.pop() {
            chunks.push(chunk);
        }
        assert_eq!(chunks.len(), 48);
        let tail = &chunks[47];
        assert!((tail.pts - 47.0 * 1024.0 / 48000.0).abs() < 1e-9);
    }
}
