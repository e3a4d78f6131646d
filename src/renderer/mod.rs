// 渲染模块

pub mod egui_surface;
pub mod rgba;

pub use egui_surface::EguiSurface;
