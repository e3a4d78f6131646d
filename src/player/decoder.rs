use crate::core::{AudioChunk, AudioFormat, Plane, PlayerError, Result, VideoFrame};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 解码输出：负载 + 流内时间戳（tick，尚未乘 time_base）
pub struct Decoded<T> {
    pub pts: Option<i64>,
    pub payload: T,
}

/// 解码器抽象：解码 + 格式转换
///
/// 每个包可能产出 0 到多个帧（解码器内部有缓冲）。
/// 音频、视频两种实现，解码循环对它们一视同仁。
pub trait FrameDecoder: Send {
    type Output: Send;

    /// 解码一个数据包
    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<Decoded<Self::Output>>>;

    /// 刷新解码器（取出缓冲的帧），流结束时调用
    fn flush(&mut self) -> Result<Vec<Decoded<Self::Output>>>;

    /// 解码器描述（用于日志）
    fn describe(&self) -> String;
}

pub type BoxedVideoDecoder = Box<dyn FrameDecoder<Output = VideoFrame>>;
pub type BoxedAudioDecoder = Box<dyn FrameDecoder<Output = AudioChunk>>;

fn send_error(e: ffmpeg::Error) -> PlayerError {
    PlayerError::DecodeError(format!("send_packet: {}", e))
}

/// 视频格式转换：任意源格式/尺寸 → 呈现尺寸的 planar YUV420
pub struct VideoConverter {
    scaler: Option<software::scaling::Context>,
    // 源格式/尺寸变化时需要重建 scaler
    scaler_input: Option<(util::format::Pixel, u32, u32)>,
    output_width: u32,
    output_height: u32,
}

impl VideoConverter {
    pub fn new(output_width: u32, output_height: u32) -> Self {
        Self {
            scaler: None,
            scaler_input: None,
            output_width,
            output_height,
        }
    }

    /// 转换为 YUV420P，三个平面各自拷贝一份（保留 stride）
    pub fn convert(&mut self, frame: &util::frame::Video) -> Result<VideoFrame> {
        let input = (frame.format(), frame.width(), frame.height());

        if self.scaler_input != Some(input) {
            debug!(
                "🔧 初始化 scaler: {:?} {}x{} → YUV420P {}x{}",
                input.0, input.1, input.2, self.output_width, self.output_height
            );
            self.scaler = Some(software::scaling::Context::get(
                input.0,
                input.1,
                input.2,
                util::format::Pixel::YUV420P,
                self.output_width,
                self.output_height,
                software::scaling::Flags::BILINEAR,
            )?);
            self.scaler_input = Some(input);
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(PlayerError::DecodeError("scaler 未初始化".into()));
        };

        let mut yuv_frame = util::frame::Video::empty();
        scaler.run(frame, &mut yuv_frame)?;

        let (chroma_width, chroma_height) =
            VideoFrame::chroma_size(self.output_width, self.output_height);
        let plane = |index: usize, width: u32, height: u32| {
            let stride = yuv_frame.stride(index);
            let size = stride * height as usize;
            let data = yuv_frame.data(index);
            Plane {
                data: data[..size.min(data.len())].to_vec(),
                stride,
                width: width as usize,
                height: height as usize,
            }
        };

        Ok(VideoFrame {
            pts: 0.0,
            width: self.output_width,
            height: self.output_height,
            planes: [
                plane(0, self.output_width, self.output_height),
                plane(1, chroma_width, chroma_height),
                plane(2, chroma_width, chroma_height),
            ],
        })
    }
}

/// 视频解码器：解码后缩放/转换为 planar YUV420
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    converter: VideoConverter,
}

// SwsContext 本身不是 Send，但解码器只会被移动到解码线程并在那里独占使用
unsafe impl Send for VideoDecoder {}

impl VideoDecoder {
    /// 从视频流创建解码器，输出尺寸为呈现尺寸
    pub fn from_stream(
        stream: format::stream::Stream,
        output_width: u32,
        output_height: u32,
    ) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        debug!(
            "视频解码器: {}x{}, 格式: {:?} → YUV420P {}x{}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            output_width,
            output_height
        );

        Ok(Self {
            decoder,
            converter: VideoConverter::new(output_width, output_height),
        })
    }

    fn receive_frames(&mut self) -> Result<Vec<Decoded<VideoFrame>>> {
        let mut frames = Vec::new();

        loop {
            let mut decoded_frame = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => {
                    let pts = decoded_frame.timestamp();
                    frames.push(Decoded {
                        pts,
                        payload: self.converter.convert(&decoded_frame)?,
                    });
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("视频帧解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }

        Ok(frames)
    }
}

impl FrameDecoder for VideoDecoder {
    type Output = VideoFrame;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<Decoded<VideoFrame>>> {
        match self.decoder.send_packet(packet) {
            Ok(()) => self.receive_frames(),
            // 解码器输入已满：先取走已解出的帧再重发一次
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                let mut frames = self.receive_frames()?;
                self.decoder.send_packet(packet).map_err(send_error)?;
                frames.extend(self.receive_frames()?);
                Ok(frames)
            }
            Err(e) => Err(send_error(e)),
        }
    }

    fn flush(&mut self) -> Result<Vec<Decoded<VideoFrame>>> {
        self.decoder.send_eof()?;
        let frames = self.receive_frames()?;
        self.decoder.flush();
        Ok(frames)
    }

    fn describe(&self) -> String {
        format!(
            "软件视频解码 → YUV420P {}x{}",
            self.converter.output_width, self.converter.output_height
        )
    }
}

// 冲刷重采样器时每轮最多取出的样本数
const FLUSH_SAMPLES: usize = 4096;
const MAX_FLUSH_ROUNDS: usize = 16;

/// 音频格式转换：任意源格式 → 输出设备格式（packed f32）
pub struct AudioConverter {
    resampler: Option<software::resampling::Context>,
    resampler_input: Option<(util::format::Sample, u64, u32)>,
    target: AudioFormat,
}

impl AudioConverter {
    pub fn new(target: AudioFormat) -> Self {
        Self {
            resampler: None,
            resampler_input: None,
            target,
        }
    }

    fn target_layout(&self) -> util::channel_layout::ChannelLayout {
        util::channel_layout::ChannelLayout::default(i32::from(self.target.channels))
    }

    /// 重采样为 packed f32，返回字节块（没有产出样本时为 None）
    pub fn convert(&mut self, frame: &util::frame::Audio) -> Result<Option<AudioChunk>> {
        // 部分编码器不填声道布局，按声道数取默认布局
        let source_layout = if frame.channel_layout().is_empty() {
            util::channel_layout::ChannelLayout::default(i32::from(frame.channels()))
        } else {
            frame.channel_layout()
        };
        let input = (frame.format(), source_layout.bits(), frame.rate());

        if self.resampler_input != Some(input) {
            debug!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
                frame.rate(),
                frame.channels(),
                self.target.sample_rate,
                self.target.channels
            );
            self.resampler = Some(software::resampling::Context::get(
                frame.format(),
                source_layout,
                frame.rate(),
                util::format::Sample::F32(util::format::sample::Type::Packed),
                self.target_layout(),
                self.target.sample_rate,
            )?);
            self.resampler_input = Some(input);
        }

        let Some(resampler) = self.resampler.as_mut() else {
            return Err(PlayerError::DecodeError("resampler 未初始化".into()));
        };

        let mut resampled = util::frame::Audio::empty();
        resampler.run(frame, &mut resampled)?;

        Ok(self.take_chunk(&resampled))
    }

    /// 取出重采样器内部缓冲的样本（流结束时调用）
    pub fn flush(&mut self) -> Result<Vec<AudioChunk>> {
        let layout = self.target_layout();
        let mut chunks = Vec::new();

        for _ in 0..MAX_FLUSH_ROUNDS {
            let Some(resampler) = self.resampler.as_mut() else {
                break;
            };
            let mut out = util::frame::Audio::new(
                util::format::Sample::F32(util::format::sample::Type::Packed),
                FLUSH_SAMPLES,
                layout,
            );
            resampler.flush(&mut out)?;

            match self.take_chunk(&out) {
                Some(chunk) => chunks.push(chunk),
                None => break,
            }
        }

        if !chunks.is_empty() {
            debug!("🔧 重采样器冲刷出 {} 个音频块", chunks.len());
        }
        Ok(chunks)
    }

    fn take_chunk(&self, resampled: &util::frame::Audio) -> Option<AudioChunk> {
        let bytes = resampled.samples() * self.target.bytes_per_frame();
        if bytes == 0 {
            return None;
        }

        let data = resampled.data(0);
        let bytes = bytes.min(data.len());
        Some(AudioChunk::new(data[..bytes].to_vec(), 0.0))
    }
}

/// 音频解码器：解码后重采样为输出设备格式（packed f32）
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    converter: AudioConverter,
}

// SwrContext 同样只在解码线程内使用
unsafe impl Send for AudioDecoder {}

impl AudioDecoder {
    /// 从音频流创建解码器（目标格式取自实际打开的音频设备）
    pub fn from_stream(stream: format::stream::Stream, target: AudioFormat) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?} → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            target.sample_rate,
            target.channels
        );

        Ok(Self {
            decoder,
            converter: AudioConverter::new(target),
        })
    }

    fn receive_frames(&mut self) -> Result<Vec<Decoded<AudioChunk>>> {
        let mut chunks = Vec::new();

        loop {
            let mut decoded_frame = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => {
                    let pts = decoded_frame.timestamp();
                    if let Some(chunk) = self.converter.convert(&decoded_frame)? {
                        chunks.push(Decoded { pts, payload: chunk });
                    }
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    warn!("音频帧解码错误（已跳过）: {}", e);
                    break;
                }
            }
        }

        Ok(chunks)
    }
}

impl FrameDecoder for AudioDecoder {
    type Output = AudioChunk;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<Decoded<AudioChunk>>> {
        match self.decoder.send_packet(packet) {
            Ok(()) => self.receive_frames(),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                let mut chunks = self.receive_frames()?;
                self.decoder.send_packet(packet).map_err(send_error)?;
                chunks.extend(self.receive_frames()?);
                Ok(chunks)
            }
            Err(e) => Err(send_error(e)),
        }
    }

    fn flush(&mut self) -> Result<Vec<Decoded<AudioChunk>>> {
        self.decoder.send_eof()?;
        let mut chunks = self.receive_frames()?;
        self.decoder.flush();

        // 重采样器里还压着的样本没有时间戳，由解码循环按累计时长补齐
        chunks.extend(
            self.converter
                .flush()?
                .into_iter()
                .map(|chunk| Decoded { pts: None, payload: chunk }),
        );
        Ok(chunks)
    }

    fn describe(&self) -> String {
        format!(
            "音频解码 → f32 {} Hz / {} 声道",
            self.converter.target.sample_rate, self.converter.target.channels
        )
    }
}
