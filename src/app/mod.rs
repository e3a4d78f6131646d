use egui::{Color32, ColorImage, Context, Rect, TextureHandle, TextureOptions, Ui};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::player::manager::PlaybackManager;
use crate::renderer::EguiSurface;

/// 播放窗口：画出呈现线程更新的视频纹理，处理关闭
pub struct PlayerWindow {
    /// 播放管理器
    player: PlaybackManager,

    /// 视频纹理（内容由呈现线程写入）
    texture: TextureHandle,

    /// 视频尺寸（用于保持宽高比）
    video_size: egui::Vec2,

    /// 窗口关闭请求，呈现线程通过 poll_quit 读取
    close_requested: Arc<AtomicBool>,

    /// 已经发出过关闭窗口命令
    close_sent: bool,
}

impl PlayerWindow {
    pub fn new(cc: &eframe::CreationContext<'_>, mut player: PlaybackManager) -> Self {
        info!("🎮 初始化播放窗口");

        Self::setup_window_theme(&cc.egui_ctx);

        let info = player.media_info();
        let width = info.width.max(1) as usize;
        let height = info.height.max(1) as usize;
        let texture = cc.egui_ctx.load_texture(
            "video_frame",
            ColorImage::new([width, height], Color32::BLACK),
            TextureOptions::LINEAR, // 线性过滤获得更好的缩放质量
        );

        let close_requested = Arc::new(AtomicBool::new(false));
        let surface =
            EguiSurface::new(cc.egui_ctx.clone(), texture.clone(), close_requested.clone());

        if let Err(e) = player.start(surface) {
            error!("❌ 启动播放失败: {}", e);
            cc.egui_ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        Self {
            player,
            texture,
            video_size: egui::Vec2::new(width as f32, height as f32),
            close_requested,
            close_sent: false,
        }
    }

    /// 配置窗口主题（深色背景）
    fn setup_window_theme(ctx: &Context) {
        let mut style = (*ctx.style()).clone();

        style.visuals.dark_mode = true;
        style.visuals.window_fill = egui::Color32::from_rgb(29, 29, 29);
        style.visuals.panel_fill = egui::Color32::BLACK;

        ctx.set_style(style);
    }

    /// 渲染视频区域（保持宽高比，居中显示）
    fn render_video_area(&self, ui: &mut Ui) {
        let rect = ui.available_rect_before_wrap();
        let display_rect = fit_rect(rect, self.video_size);

        ui.allocate_ui_at_rect(display_rect, |ui| {
            ui.add(
                egui::Image::from_texture(&self.texture).fit_to_exact_size(display_rect.size()),
            );
        });
    }
}

/// 在 `rect` 内按 `video` 的宽高比居中放置
fn fit_rect(rect: Rect, video: egui::Vec2) -> Rect {
    if video.x <= 0.0 || video.y <= 0.0 || rect.width() <= 0.0 || rect.height() <= 0.0 {
        return rect;
    }

    let video_aspect = video.x / video.y;
    let rect_aspect = rect.width() / rect.height();

    let display_size = if video_aspect > rect_aspect {
        // 视频更宽，以宽度为准
        egui::Vec2::new(rect.width(), rect.width() / video_aspect)
    } else {
        // 视频更高，以高度为准
        egui::Vec2::new(rect.height() * video_aspect, rect.height())
    };

    Rect::from_center_size(rect.center(), display_size)
}

impl eframe::App for PlayerWindow {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let close_requested = ctx.input(|i| i.viewport().close_requested());
        if close_requested && !self.close_requested.load(Ordering::SeqCst) {
            info!("🚪 窗口关闭请求");
            self.close_requested.store(true, Ordering::SeqCst);
            self.player.shutdown_signal().request();
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                self.render_video_area(ui);
            });

        if !self.close_sent && self.player.is_finished() {
            info!("🏁 播放结束，关闭窗口");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            self.close_sent = true;
        }

        // 新帧到来时呈现线程会主动请求重绘，这里只保证能及时发现播放结束
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 播放窗口退出");

        let report = self.player.stop();
        if let Some(decode) = report.decode {
            info!(
                "📊 解码: {} 个包, {} 视频帧, {} 音频块, {} 次解码失败 ({:?})",
                decode.packets,
                decode.video_frames,
                decode.audio_chunks,
                decode.decode_failures,
                decode.outcome
            );
        }
        if let Some(present) = report.present {
            info!(
                "📊 呈现: 显示 {} 帧, 丢弃 {} 帧",
                present.presented, present.dropped
            );
        }
    }
}
