use crate::core::{Plane, PlayerError, Result, VideoFrame};
use egui::ColorImage;
use ffmpeg_next::{software, util};
use log::debug;

/// planar YUV420 → RGBA 纹理图像（swscale 完成色彩转换）
///
/// scaler 按帧尺寸懒创建，尺寸变化时重建。只在呈现线程上使用。
#[derive(Default)]
pub struct RgbaConverter {
    scaler: Option<software::scaling::Context>,
    size: Option<(u32, u32)>,
    rgba: Vec<u8>,
}

// SwsContext 不是 Send；转换器随渲染面一起移动到呈现线程后只在那里使用
unsafe impl Send for RgbaConverter {}

impl RgbaConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(&mut self, frame: &VideoFrame) -> Result<ColorImage> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        let (chroma_width, chroma_height) = VideoFrame::chroma_size(frame.width, frame.height);

        check_plane("Y", frame.y(), width, height)?;
        check_plane("U", frame.u(), chroma_width as usize, chroma_height as usize)?;
        check_plane("V", frame.v(), chroma_width as usize, chroma_height as usize)?;

        if self.size != Some((frame.width, frame.height)) {
            debug!("🔧 初始化 RGBA scaler: {}x{}", frame.width, frame.height);
            self.scaler = Some(software::scaling::Context::get(
                util::format::Pixel::YUV420P,
                frame.width,
                frame.height,
                util::format::Pixel::RGBA,
                frame.width,
                frame.height,
                software::scaling::Flags::BILINEAR,
            )?);
            self.size = Some((frame.width, frame.height));
        }

        let Some(scaler) = self.scaler.as_mut() else {
            return Err(PlayerError::RenderError("scaler 未初始化".into()));
        };

        // 把三个平面按 ffmpeg 帧自己的 stride 逐行拷进去
        let mut yuv_frame =
            util::frame::Video::new(util::format::Pixel::YUV420P, frame.width, frame.height);
        for (index, plane) in frame.planes.iter().enumerate() {
            let stride = yuv_frame.stride(index);
            let dst = yuv_frame.data_mut(index);
            for row in 0..plane.height {
                dst[row * stride..row * stride + plane.width].copy_from_slice(plane.row(row));
            }
        }

        let mut rgba_frame = util::frame::Video::empty();
        scaler.run(&yuv_frame, &mut rgba_frame)?;

        // 去掉行尾对齐，拷到连续内存
        let row_bytes = width * 4;
        let stride = rgba_frame.stride(0);
        let data = rgba_frame.data(0);
        self.rgba.resize(row_bytes * height, 0);
        for (row, dst) in self.rgba.chunks_exact_mut(row_bytes).enumerate() {
            dst.copy_from_slice(&data[row * stride..row * stride + row_bytes]);
        }

        Ok(ColorImage::from_rgba_unmultiplied([width, height], &self.rgba))
    }
}

fn check_plane(name: &str, plane: &Plane, width: usize, height: usize) -> Result<()> {
    let needed = if height == 0 {
        0
    } else {
        (height - 1) * plane.stride + width
    };
    if plane.width < width
        || plane.height < height
        || plane.stride < width
        || plane.data.len() < needed
    {
        return Err(PlayerError::RenderError(format!(
            "{} 平面尺寸不匹配: {}x{} stride={} len={}，需要 {}x{}",
            name,
            plane.width,
            plane.height,
            plane.stride,
            plane.data.len(),
            width,
            height
        )));
    }
    Ok(())
}
