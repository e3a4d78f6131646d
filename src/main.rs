use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

mod app;
mod core;
mod player;
mod renderer;

use app::PlayerWindow;
use crate::core::PlayerConfig;
use player::PlaybackManager;

#[derive(Parser, Debug)]
#[command(name = "yuv_player")]
#[command(about = "本地音视频文件播放器")]
struct CliArgs {
    /// 媒体文件路径
    path: PathBuf,

    /// 呈现宽度（只给一边时按源宽高比推算另一边）
    #[arg(long)]
    width: Option<u32>,

    /// 呈现高度
    #[arg(long)]
    height: Option<u32>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 视频队列容量（帧）
    #[arg(long)]
    video_queue: Option<usize>,

    /// 音频队列容量（块）
    #[arg(long)]
    audio_queue: Option<usize>,

    /// 丢帧阈值（毫秒）
    #[arg(long)]
    drop_threshold_ms: Option<u64>,

    /// 不以音频为主时钟
    #[arg(long)]
    no_audio_sync: bool,
}

impl CliArgs {
    /// 默认值 < 配置文件 < 命令行
    fn resolve_config(&self) -> Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)
                .with_context(|| format!("读取配置文件失败: {}", path.display()))?,
            None => PlayerConfig::default(),
        };

        if self.width.is_some() {
            config.width = self.width;
        }
        if self.height.is_some() {
            config.height = self.height;
        }
        if let Some(capacity) = self.video_queue {
            config.video_queue_capacity = capacity;
        }
        if let Some(capacity) = self.audio_queue {
            config.audio_queue_capacity = capacity;
        }
        if let Some(threshold) = self.drop_threshold_ms {
            config.drop_threshold_ms = threshold;
        }
        if self.no_audio_sync {
            config.audio_sync = false;
        }

        config.validate().context("配置无效")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .filter_module("eframe", log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let args = CliArgs::parse();
    let config = args.resolve_config()?;

    info!("🎬 YUV Player 启动");

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let player = PlaybackManager::open(&args.path, config)
        .with_context(|| format!("无法播放: {}", args.path.display()))?;

    let info = player.media_info();
    info!(
        "📺 视频: {}, 🔊 音频: {}",
        if info.has_video() { "有" } else { "无" },
        if info.has_audio() { "有" } else { "无" }
    );
    let title = format!(
        "{} - YUV 播放器",
        args.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| info.source.clone())
    );
    let (width, height) = if info.has_video() {
        (info.width as f32, info.height as f32)
    } else {
        (480.0, 270.0)
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_title(title.clone()),
        renderer: eframe::Renderer::Wgpu, // 使用 wgpu 后端
        ..Default::default()
    };

    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Box::new(PlayerWindow::new(cc, player))),
    )
    .map_err(|e| anyhow::anyhow!("窗口启动失败: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "yuv_player",
            "movie.mp4",
            "--width",
            "640",
            "--video-queue",
            "5",
            "--drop-threshold-ms",
            "40",
            "--no-audio-sync",
        ]);
        let config = args.resolve_config().unwrap();

        assert_eq!(args.path, PathBuf::from("movie.mp4"));
        assert_eq!(config.width, Some(640));
        assert_eq!(config.height, None);
        assert_eq!(config.video_queue_capacity, 5);
        assert_eq!(config.audio_queue_capacity, 10);
        assert_eq!(config.drop_threshold_ms, 40);
        assert!(!config.audio_sync);
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let path =
            std::env::temp_dir().join(format!("yuv_player_test_{}.json", std::process::id()));
        {
            let mut file = std::fs::File::create(&path).unwrap();
            write!(
                file,
                r#"{{ "audio_queue_capacity": 20, "video_queue_capacity": 8 }}"#
            )
            .unwrap();
        }

        let args = CliArgs::parse_from([
            "yuv_player",
            "movie.mp4",
            "--config",
            path.to_str().unwrap(),
            "--video-queue",
            "2",
        ]);
        let config = args.resolve_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.audio_queue_capacity, 20);
        assert_eq!(config.video_queue_capacity, 2);
    }

    #[test]
    fn test_zero_queue_from_cli_is_rejected() {
        let args = CliArgs::parse_from(["yuv_player", "movie.mp4", "--audio-queue", "0"]);
        assert!(args.resolve_config().is_err());
    }
}
