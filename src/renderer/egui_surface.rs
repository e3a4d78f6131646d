use crate::core::{Result, VideoFrame};
use crate::player::presenter::VideoSurface;
use crate::renderer::rgba::RgbaConverter;
use egui::{ColorImage, TextureHandle, TextureOptions};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// egui 纹理渲染面
///
/// 在呈现线程上用 swscale 把 YUV420 转成 RGBA 并更新 egui 纹理，
/// 窗口线程只负责把纹理画出来。
/// 关闭请求由窗口线程写入 `close_requested`。
pub struct EguiSurface {
    ctx: egui::Context,
    texture: TextureHandle,
    close_requested: Arc<AtomicBool>,
    converter: RgbaConverter,
    pending: Option<ColorImage>,
    size: Option<[usize; 2]>,
}

impl EguiSurface {
    pub fn new(
        ctx: egui::Context,
        texture: TextureHandle,
        close_requested: Arc<AtomicBool>,
    ) -> Self {
        info!("🎨 初始化 EguiSurface");
        Self {
            ctx,
            texture,
            close_requested,
            converter: RgbaConverter::new(),
            pending: None,
            size: None,
        }
    }
}

impl VideoSurface for EguiSurface {
    fn upload(&mut self, frame: &VideoFrame) -> Result<()> {
        let size = [frame.width as usize, frame.height as usize];
        if self.size != Some(size) {
            debug!("🆕 视频纹理尺寸: {}x{}", frame.width, frame.height);
            self.size = Some(size);
        }

        self.pending = Some(self.converter.convert(frame)?);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let Some(image) = self.pending.take() {
            // egui 在下一次绘制时完成实际的 GPU 上传
            self.texture.set(image, TextureOptions::LINEAR);
        }
        self.ctx.request_repaint();
        Ok(())
    }

    fn poll_quit(&mut self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}
