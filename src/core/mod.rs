// 核心数据结构和类型定义

pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod types;

// 重新导出常用类型
pub use clock::{AudioClock, Clock};
pub use config::PlayerConfig;
pub use error::*;
pub use queue::{BoundedQueue, Closed};
pub use shutdown::ShutdownSignal;
pub use types::*;
