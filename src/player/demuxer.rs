use crate::core::{MediaInfo, PlayerError, Result, StreamInfo, StreamKind};
use crate::player::demuxer_source::{PacketSource, ReadOutcome};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};
use std::path::Path;

/// 解封装器 - 负责读取本地媒体文件并分离音视频流
pub struct Demuxer {
    input_ctx: format::context::Input,
    streams: Vec<StreamInfo>,
    video_stream_index: Option<usize>,
    audio_stream_index: Option<usize>,
    media_info: MediaInfo,  // 缓存媒体信息
    source_path: String,    // 媒体源路径（用于描述）
}

impl Demuxer {
    /// 打开媒体文件
    pub fn open(path: &Path) -> Result<Self> {
        let source_path = path.display().to_string();
        info!("正在打开文件: {}", source_path);

        let input_ctx = format::input(path)
            .map_err(|e| PlayerError::OpenError(format!("{}: {}", source_path, e)))?;

        // 查找视频流和音频流
        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index());

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index());

        if video_stream_index.is_none() && audio_stream_index.is_none() {
            return Err(PlayerError::NoPlayableStream);
        }

        debug!("视频流索引: {:?}", video_stream_index);
        debug!("音频流索引: {:?}", audio_stream_index);

        let mut streams = Vec::new();
        for (index, kind) in [
            (video_stream_index, StreamKind::Video),
            (audio_stream_index, StreamKind::Audio),
        ] {
            let Some(index) = index else { continue };
            let stream = input_ctx
                .stream(index)
                .ok_or_else(|| PlayerError::OpenError(format!("流 #{} 不存在", index)))?;
            let tb = stream.time_base();
            let frame_rate = match kind {
                StreamKind::Video => rational_to_f64(stream.avg_frame_rate()),
                StreamKind::Audio => None,
            };
            streams.push(StreamInfo {
                index,
                kind,
                time_base: tb.numerator() as f64 / tb.denominator() as f64,
                frame_rate,
            });
        }

        let mut demuxer = Self {
            input_ctx,
            streams,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo::default(),
            source_path,
        };

        demuxer.media_info = demuxer.extract_media_info()?;

        Ok(demuxer)
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(&self) -> Result<MediaInfo> {
        let mut info = MediaInfo {
            source: self.source_path.clone(),
            duration: self.input_ctx.duration().max(0) as f64 / 1_000_000.0, // 微秒转秒
            video_codec: "none".to_string(),
            audio_codec: "none".to_string(),
            ..MediaInfo::default()
        };

        if let Some(video_stream) = self.video_stream() {
            let parameters = video_stream.parameters();
            // 先获取编解码器名称（在 parameters 被移动前）
            info.video_codec = parameters.id().name().to_string();

            let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
                .decoder()
                .video()?;
            info.width = decoder.width();
            info.height = decoder.height();
            info.fps = rational_to_f64(video_stream.avg_frame_rate()).unwrap_or(0.0);
        }

        if let Some(audio_stream) = self.audio_stream() {
            let parameters = audio_stream.parameters();
            info.audio_codec = parameters.id().name().to_string();

            let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)?
                .decoder()
                .audio()?;
            info.sample_rate = decoder.rate();
            info.channels = decoder.channels();
        }

        Ok(info)
    }

    /// 获取视频流
    pub fn video_stream(&self) -> Option<format::stream::Stream> {
        self.video_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> Option<format::stream::Stream> {
        self.audio_stream_index
            .and_then(|idx| self.input_ctx.stream(idx))
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }
}

impl PacketSource for Demuxer {
    fn read_packet(&mut self) -> Result<ReadOutcome> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => {
                    let stream_index = packet.stream();
                    if self.streams.iter().any(|s| s.index == stream_index) {
                        return Ok(ReadOutcome::Packet(packet));
                    }
                    // 字幕/数据等其他流的包直接丢弃
                }
                Err(ffmpeg::Error::Eof) => return Ok(ReadOutcome::EndOfStream),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    debug!("读包返回 EAGAIN，重试");
                }
                Err(e) => return Err(PlayerError::ReadError(e.to_string())),
            }
        }
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}

fn rational_to_f64(rational: ffmpeg::Rational) -> Option<f64> {
    if rational.numerator() > 0 && rational.denominator() > 0 {
        Some(rational.numerator() as f64 / rational.denominator() as f64)
    } else {
        None
    }
}
