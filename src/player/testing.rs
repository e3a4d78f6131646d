//! 测试用的合成组件：内存包源、假解码器、记录型渲染面
use crate::core::{AudioChunk, PlayerError, Result, StreamInfo, StreamKind, VideoFrame};
use crate::player::decoder::{Decoded, FrameDecoder};
use crate::player::demuxer_source::{PacketSource, ReadOutcome};
use crate::player::presenter::VideoSurface;
use ffmpeg_next as ffmpeg;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

pub const VIDEO_INDEX: usize = 0;
pub const AUDIO_INDEX: usize = 1;

pub fn video_stream(fps: f64) -> StreamInfo {
    StreamInfo {
        index: VIDEO_INDEX,
        kind: StreamKind::Video,
        time_base: 1.0 / fps,
        frame_rate: Some(fps),
    }
}

pub fn audio_stream(sample_rate: u32) -> StreamInfo {
    StreamInfo {
        index: AUDIO_INDEX,
        kind: StreamKind::Audio,
        time_base: 1.0 / sample_rate as f64,
        frame_rate: None,
    }
}

/// 构造一个带流索引和 pts 的包
pub fn packet(stream: usize, pts: Option<i64>) -> ffmpeg::Packet {
    let mut packet = ffmpeg::Packet::copy(&[0u8; 8]);
    packet.set_stream(stream);
    packet.set_pts(pts);
    packet
}

/// 读到什么
pub enum Scripted {
    Packet(ffmpeg::Packet),
    Fail(String),
}

/// 内存包源：按脚本依次返回包，脚本读完即 EndOfStream
pub struct ScriptedSource {
    streams: Vec<StreamInfo>,
    script: VecDeque<Scripted>,
}

impl ScriptedSource {
    pub fn new(streams: Vec<StreamInfo>, script: Vec<Scripted>) -> Self {
        Self {
            streams,
            script: script.into(),
        }
    }

    /// 1 秒 30fps 视频 + 可选的 48kHz 立体声静音音频，按时间交错
    pub fn one_second(with_audio: bool) -> Self {
        let mut entries: Vec<(f64, ffmpeg::Packet)> = (0..30)
            .map(|i| (i as f64 / 30.0, packet(VIDEO_INDEX, Some(i))))
            .collect();
        let mut streams = vec![video_stream(30.0)];

        if with_audio {
            streams.push(audio_stream(48000));
            let mut sample = 0i64;
            while sample < 48000 {
                entries.push((sample as f64 / 48000.0, packet(AUDIO_INDEX, Some(sample))));
                sample += AUDIO_SAMPLES_PER_PACKET as i64;
            }
        }

        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        let script = entries
            .into_iter()
            .map(|(_, p)| Scripted::Packet(p))
            .collect();
        Self::new(streams, script)
    }
}

impl PacketSource for ScriptedSource {
    fn read_packet(&mut self) -> Result<ReadOutcome> {
        match self.script.pop_front() {
            Some(Scripted::Packet(packet)) => Ok(ReadOutcome::Packet(packet)),
            Some(Scripted::Fail(message)) => Err(PlayerError::ReadError(message)),
            None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn description(&self) -> String {
        format!("ScriptedSource ({} 个包待读)", self.script.len())
    }
}

/// 假视频解码器：每个包出一帧纯色帧，可以缓冲若干帧（模拟 B 帧重排延迟）
pub struct FakeVideoDecoder {
    pub width: u32,
    pub height: u32,
    pub delay: usize,
    /// 这些 pts 的包解码失败
    pub fail_on: Vec<i64>,
    /// 输出帧不带 pts
    pub strip_pts: bool,
    held: VecDeque<Decoded<VideoFrame>>,
}

impl FakeVideoDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            delay: 0,
            fail_on: Vec::new(),
            strip_pts: false,
            held: VecDeque::new(),
        }
    }
}

impl FrameDecoder for FakeVideoDecoder {
    type Output = VideoFrame;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<Decoded<VideoFrame>>> {
        let pts = packet.pts();
        if pts.is_some_and(|p| self.fail_on.contains(&p)) {
            return Err(PlayerError::DecodeError(format!("坏包 pts={:?}", pts)));
        }
        self.held.push_back(Decoded {
            pts: if self.strip_pts { None } else { pts },
            payload: VideoFrame::solid(self.width, self.height, 0.0, [128, 128, 128]),
        });
        let mut out = Vec::new();
        while self.held.len() > self.delay {
            if let Some(frame) = self.held.pop_front() {
                out.push(frame);
            }
        }
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Decoded<VideoFrame>>> {
        Ok(self.held.drain(..).collect())
    }

    fn describe(&self) -> String {
        format!("FakeVideoDecoder {}x{}", self.width, self.height)
    }
}

pub const AUDIO_SAMPLES_PER_PACKET: usize = 1024;

/// 假音频解码器：每个包出 1024 个立体声 f32 静音样本
pub struct FakeAudioDecoder {
    pub channels: usize,
    /// flush 时再吐出的块数（模拟重采样器里压着的样本，没有 pts）
    pub flush_chunks: usize,
}

impl FakeAudioDecoder {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            flush_chunks: 0,
        }
    }

    pub fn chunk_bytes(&self) -> usize {
        AUDIO_SAMPLES_PER_PACKET * self.channels * std::mem::size_of::<f32>()
    }
}

impl FrameDecoder for FakeAudioDecoder {
    type Output = AudioChunk;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<Decoded<AudioChunk>>> {
        Ok(vec![Decoded {
            pts: packet.pts(),
            payload: AudioChunk::new(vec![0u8; self.chunk_bytes()], 0.0),
        }])
    }

    fn flush(&mut self) -> Result<Vec<Decoded<AudioChunk>>> {
        Ok((0..self.flush_chunks)
            .map(|_| Decoded {
                pts: None,
                payload: AudioChunk::new(vec![0u8; self.chunk_bytes()], 0.0),
            })
            .collect())
    }

    fn describe(&self) -> String {
        format!("FakeAudioDecoder {}ch", self.channels)
    }
}

/// 记录每次呈现的帧 pts
#[derive(Clone, Default)]
pub struct RecordingSurface {
    pub uploaded: Arc<Mutex<Vec<f64>>>,
    pub presented: Arc<Mutex<Vec<f64>>>,
    pending: Option<f64>,
    /// 呈现这么多帧后报告关闭请求
    pub quit_after: Option<usize>,
    /// 第 N 次上传时报错
    pub fail_upload_at: Option<usize>,
}

impl VideoSurface for RecordingSurface {
    fn upload(&mut self, frame: &VideoFrame) -> Result<()> {
        let mut uploaded = self.uploaded.lock();
        if self.fail_upload_at == Some(uploaded.len()) {
            return Err(PlayerError::RenderError("纹理上传失败".into()));
        }
        uploaded.push(frame.pts);
        self.pending = Some(frame.pts);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let Some(pts) = self.pending.take() {
            self.presented.lock().push(pts);
        }
        Ok(())
    }

    fn poll_quit(&mut self) -> bool {
        self.quit_after
            .is_some_and(|limit| self.presented.lock().len() >= limit)
    }
}
