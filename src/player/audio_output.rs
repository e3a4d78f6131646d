use crate::core::{AudioChunk, AudioClock, AudioFormat, BoundedQueue, PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// 设备不支持源格式时依次尝试的标准配置
const FALLBACK_FORMATS: [(u32, u16); 4] = [
    (48000, 2), // 最常见
    (44100, 2), // CD 音质
    (48000, 1), // 单声道高质量
    (44100, 1), // 单声道 CD 质量
];

/// 音频回调的取数逻辑（运行在音频设备线程上）
///
/// 不阻塞、不打日志：队列只用 try_pop，数据不够就补静音。
/// 一个块可能跨多次回调才读完，读位置保存在块自身。
pub struct AudioFeeder {
    queue: Arc<BoundedQueue<AudioChunk>>,
    current: Option<AudioChunk>,
    clock: Arc<AudioClock>,
}

impl AudioFeeder {
    pub fn new(queue: Arc<BoundedQueue<AudioChunk>>, clock: Arc<AudioClock>) -> Self {
        Self {
            queue,
            current: None,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<AudioClock> {
        &self.clock
    }

    /// 填满 `dst`（总是写满 `dst.len()` 字节），返回其中真实样本的字节数
    pub fn fill(&mut self, dst: &mut [u8]) -> usize {
        let format = self.clock.format();
        let mut written = 0;

        while written < dst.len() {
            if self.current.is_none() {
                self.current = self.queue.try_pop();
            }
            let Some(chunk) = self.current.as_mut() else {
                break;
            };

            written += chunk.read_into(&mut dst[written..]);
            // 内容位置 = 块起点 + 已读部分
            self.clock
                .set_position(chunk.pts + format.bytes_to_seconds(chunk.offset() as u64));
            if chunk.is_consumed() {
                self.current = None;
            }
        }

        // 欠载：剩余部分补静音
        dst[written..].fill(0);

        if written > 0 {
            self.clock.mark_started();
        }
        if self.clock.has_started() {
            self.clock.advance(dst.len());
            self.clock.set_stalled(written < dst.len());
        }
        if self.current.is_none() && self.queue.is_drained() {
            self.clock.mark_ended();
        }

        written
    }
}

/// 音频输出 - 使用 cpal 播放 packed f32 PCM
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

// cpal::Stream 在部分平台上不是 Send；AudioOutput 只由 PlaybackManager 持有，
// 在创建它的线程上启动和停止
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 打开默认输出设备（设备不支持期望格式时自动回退）
    pub fn new(preferred: AudioFormat) -> Result<Self> {
        info!(
            "初始化音频输出: {} Hz, {} 声道",
            preferred.sample_rate, preferred.channels
        );

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let supported: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
            .collect();

        let format = Self::negotiate(preferred, &supported).ok_or_else(|| {
            PlayerError::AudioError(format!(
                "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                preferred.sample_rate, preferred.channels
            ))
        })?;

        if format != preferred {
            warn!(
                "⚠️  音频设备不支持 {} Hz, {} 声道，使用回退配置: {} Hz, {} 声道",
                preferred.sample_rate, preferred.channels, format.sample_rate, format.channels
            );
        }

        Ok(Self {
            device,
            config: StreamConfig {
                channels: format.channels,
                sample_rate: cpal::SampleRate(format.sample_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            stream: None,
        })
    }

    /// 期望格式可用就用它，否则取第一个可用的标准配置
    fn negotiate(
        preferred: AudioFormat,
        supported: &[SupportedStreamConfigRange],
    ) -> Option<AudioFormat> {
        std::iter::once(preferred)
            .chain(
                FALLBACK_FORMATS
                    .iter()
                    .map(|&(sample_rate, channels)| AudioFormat {
                        sample_rate,
                        channels,
                    }),
            )
            .find(|format| {
                supported
                    .iter()
                    .any(|range| Self::is_config_compatible(format, range))
            })
    }

    /// 检查配置是否兼容（只接受 f32 样本）
    fn is_config_compatible(format: &AudioFormat, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = format.sample_rate >= supported.min_sample_rate().0
            && format.sample_rate <= supported.max_sample_rate().0;

        let channels_match = format.channels == supported.channels();

        rate_in_range && channels_match && supported.sample_format() == SampleFormat::F32
    }

    /// 实际打开的输出格式
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.config.sample_rate.0,
            channels: self.config.channels,
        }
    }

    /// 开始播放，回调由 `feeder` 供数
    pub fn start(&mut self, mut feeder: AudioFeeder) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let bytes: &mut [u8] = bytemuck::cast_slice_mut(data);
                    feeder.fill(bytes);
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("🔊 音频输出已启动");

        Ok(())
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("🔇 音频输出已停止");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
