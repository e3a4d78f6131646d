use crate::core::clock::Clock;

/// 流类型（只关心音频和视频）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// 流描述 - 解封装后由解码循环用于路由和时间换算
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    /// 秒 / tick
    pub time_base: f64,
    /// 标称帧率（仅视频，用于补齐缺失的 PTS）
    pub frame_rate: Option<f64>,
}

impl StreamInfo {
    pub fn ticks_to_seconds(&self, ticks: i64) -> f64 {
        ticks as f64 * self.time_base
    }

    /// 标称帧间隔（秒），未知时按 30fps
    pub fn frame_interval(&self) -> f64 {
        match self.frame_rate {
            Some(fps) if fps > 0.0 => 1.0 / fps,
            _ => 1.0 / 30.0,
        }
    }
}

/// 单个像素平面（单通道），每行 `stride` 字节，有效宽度 `width`
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    pub stride: usize,
    pub width: usize,
    pub height: usize,
}

impl Plane {
    /// 第 y 行的有效像素（去掉 stride 对齐填充）
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }
}

/// 解码后的视频帧：planar YUV420
///
/// Y 为全分辨率，U/V 在两个方向上都是一半分辨率（奇数尺寸向上取整）。
/// 帧只有一个所有者：解码循环 -> 视频队列 -> 渲染循环，drop 即释放。
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// 显示时间戳（秒）
    pub pts: f64,
    pub width: u32,
    pub height: u32,
    pub planes: [Plane; 3],
}

impl VideoFrame {
    pub fn y(&self) -> &Plane {
        &self.planes[0]
    }

    pub fn u(&self) -> &Plane {
        &self.planes[1]
    }

    pub fn v(&self) -> &Plane {
        &self.planes[2]
    }

    pub fn chroma_size(width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(2), height.div_ceil(2))
    }
}

/// 视频队列的工作单元：帧 + 解码时刻的时钟快照
#[derive(Debug)]
pub struct PlayState {
    pub frame: VideoFrame,
    pub clock: Clock,
}

/// 输出设备使用的音频格式（样本固定为 packed f32）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    pub fn bytes_to_seconds(&self, bytes: u64) -> f64 {
        bytes as f64 / self.bytes_per_second() as f64
    }
}

/// 重采样后的一段 PCM 数据
///
/// `offset` 只增不减：一个块可能跨越多次音频回调才被读完，读完即释放。
#[derive(Debug)]
pub struct AudioChunk {
    data: Vec<u8>,
    offset: usize,
    /// 块起始时间（秒）
    pub pts: f64,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>, pts: f64) -> Self {
        Self {
            data,
            offset: 0,
            pts,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_consumed(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// 从当前读位置拷贝 `min(dst.len(), remaining)` 字节并推进读位置
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.offset..self.offset + n]);
        self.offset += n;
        n
    }
}

/// 媒体信息
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub source: String,
    /// 总时长（秒）
    pub duration: f64,
    /// 输出（呈现）尺寸
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn has_audio(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }
}

#[cfg(test)]
impl VideoFrame {
    /// 纯色帧（测试用）
    pub fn solid(width: u32, height: u32, pts: f64, yuv: [u8; 3]) -> Self {
        let (cw, ch) = Self::chroma_size(width, height);
        let plane = |w: u32, h: u32, value: u8| Plane {
            data: vec![value; (w * h) as usize],
            stride: w as usize,
            width: w as usize,
            height: h as usize,
        };
        Self {
            pts,
            width,
            height,
            planes: [
                plane(width, height, yuv[0]),
                plane(cw, ch, yuv[1]),
                plane(cw, ch, yuv[2]),
            ],
        }
    }
}
