use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 进程级退出标志
///
/// 每个循环每轮检查一次（协作式），由渲染线程在窗口关闭时或外部 stop 调用写入。
/// 已经阻塞在队列上的线程靠队列的 close 唤醒，不靠这个标志。
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
