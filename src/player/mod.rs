// 播放器核心模块

pub mod audio_output;
pub mod decode_loop;
pub mod decoder;
pub mod demuxer;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod manager;
pub mod presenter;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{PlaybackManager, SessionReport};
