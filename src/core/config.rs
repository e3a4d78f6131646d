use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 播放器配置
///
/// 优先级：默认值 < JSON 配置文件 < 命令行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 呈现宽度（None 表示使用源尺寸）
    pub width: Option<u32>,
    /// 呈现高度（None 表示使用源尺寸）
    pub height: Option<u32>,
    /// 视频队列容量：决定解码最多领先渲染多少帧
    pub video_queue_capacity: usize,
    /// 音频队列容量（块）
    pub audio_queue_capacity: usize,
    /// 帧落后超过该阈值直接丢弃（毫秒）
    pub drop_threshold_ms: u64,
    /// 有音频时以音频播放位置为主时钟
    pub audio_sync: bool,
    /// 期望的输出采样率（None 表示跟随源）
    pub preferred_sample_rate: Option<u32>,
    /// 期望的输出声道数（None 表示跟随源）
    pub preferred_channels: Option<u16>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            video_queue_capacity: 3,
            audio_queue_capacity: 10,
            drop_threshold_ms: 100,
            audio_sync: true,
            preferred_sample_rate: None,
            preferred_channels: None,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载（缺省字段取默认值）
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("video_queue_capacity 必须 >= 1".into()));
        }
        if self.audio_queue_capacity == 0 {
            return Err(PlayerError::ConfigError("audio_queue_capacity 必须 >= 1".into()));
        }
        if self.drop_threshold_ms == 0 {
            return Err(PlayerError::ConfigError("drop_threshold_ms 必须 > 0".into()));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(PlayerError::ConfigError("呈现尺寸不能为 0".into()));
        }
        if self.preferred_sample_rate == Some(0) || self.preferred_channels == Some(0) {
            return Err(PlayerError::ConfigError("采样率/声道数不能为 0".into()));
        }
        Ok(())
    }

    pub fn drop_threshold(&self) -> Duration {
        Duration::from_millis(self.drop_threshold_ms)
    }

    /// 根据源尺寸计算呈现尺寸；只给出一边时按源宽高比推算另一边，结果取偶数
    pub fn output_size(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let aspect = if source_height > 0 {
            source_width as f64 / source_height as f64
        } else {
            1.0
        };
        let (w, h) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, (w as f64 / aspect).round() as u32),
            (None, Some(h)) => ((h as f64 * aspect).round() as u32, h),
            (None, None) => (source_width, source_height),
        };
        (even(w), even(h))
    }
}

fn even(value: u32) -> u32 {
    (value.max(2) + 1) & !1
}
