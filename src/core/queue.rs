use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;

/// 队列已关闭时 push 被拒绝，原样交还数据
pub struct Closed<T>(pub T);

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

/// 有界阻塞队列 - 解码线程与消费线程之间的唯一交接点
///
/// - `push` 在队列满时阻塞（背压），`pop` 在队列空时阻塞
/// - 严格 FIFO，容量在构造时固定
/// - `close` 唤醒所有等待者：之后 push 直接失败，pop 取完剩余数据后返回 None
pub struct BoundedQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

struct QueueInner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "BoundedQueue 容量必须 >= 1");
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// 入队，队列满时阻塞直到有空位或队列被关闭
    pub fn push(&self, item: T) -> Result<(), Closed<T>> {
        let mut inner = self.inner.lock();

        while inner.items.len() >= self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }

        if inner.closed {
            return Err(Closed(item));
        }

        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// 出队，队列空时阻塞；队列关闭且已取空时返回 None
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();

        while inner.items.is_empty() && !inner.closed {
            self.not_empty.wait(&mut inner);
        }

        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// 非阻塞出队（音频回调专用）
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// 关闭队列并唤醒所有阻塞在 push/pop 上的线程
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// 丢弃队列中全部数据，返回丢弃数量
    ///
    /// 数据在锁外释放，避免持锁执行大块内存的 drop
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = {
            let mut inner = self.inner.lock();
            let drained = inner.items.drain(..).collect();
            self.not_full.notify_all();
            drained
        };
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// 已关闭且没有剩余数据
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed && inner.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        for capacity in [1usize, 2, 5, 16] {
            let queue = Arc::new(BoundedQueue::new(capacity));
            let producer = {
                let queue = queue.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        queue.push(i).unwrap();
                    }
                })
            };
            let popped: Vec<i32> = (0..50).map(|_| queue.pop().unwrap()).collect();
            producer.join().unwrap();
            assert_eq!(popped, (0..50).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_push_blocks_when_full() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        let (tx, rx) = mpsc::channel();
        let blocked = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.push(3).unwrap();
                tx.send(()).unwrap();
            })
        };

        // 第三次 push 必须阻塞
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(queue.len(), 2);

        // 一次 pop 之后阻塞的 push 完成
        assert_eq!(queue.pop(), Some(1));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        blocked.join().unwrap();

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_close_unblocks_pop() {
        let queue: Arc<BoundedQueue<u8>> = Arc::new(BoundedQueue::new(1));
        let (tx, rx) = mpsc::channel();
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || {
                tx.send(queue.pop()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), None);
        waiter.join().unwrap();
    }

    #[test]
    fn test_close_unblocks_push_and_returns_item() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(String::from("a")).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || {
                let result = queue.push(String::from("b"));
                tx.send(result.err().map(|Closed(item)| item)).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Some(String::from("b"))
        );
        waiter.join().unwrap();
    }

    #[test]
    fn test_closed_queue_drains_remaining_items() {
        let queue = BoundedQueue::new(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.close();

        assert!(queue.push(3).is_err());
        assert!(!queue.is_drained());
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_try_pop_never_blocks() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(3);
        assert_eq!(queue.try_pop(), None);
        queue.push(7).unwrap();
        assert_eq!(queue.try_pop(), Some(7));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn test_clear_discards_and_wakes_producer() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        let (tx, rx) = mpsc::channel();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.push(3).unwrap();
                tx.send(()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.clear(), 2);
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        producer.join().unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_rejected() {
        let _queue: BoundedQueue<u8> = BoundedQueue::new(0);
    }
}
