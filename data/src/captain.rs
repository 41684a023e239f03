use crate::sqlite::Storage;
use bililivedata_common::data::CaptainEvent;
use tokio::sync::mpsc::{self, error::TrySendError};

/// 有界的舰长事件队列，满了直接丢弃
#[derive(Clone, Debug)]
pub struct CaptainQueue {
    tx: mpsc::Sender<CaptainEvent>,
}

impl CaptainQueue {
    #[inline]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CaptainEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// 不会阻塞，成功放入队列时返回 `true`
    pub fn enqueue(&self, event: CaptainEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::error!(
                    "captain queue is full, drop uid={} level={}",
                    event.uid,
                    event.level
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                log::error!(
                    "captain writer is gone, drop uid={} level={}",
                    event.uid,
                    event.level
                );
                false
            }
        }
    }
}

/// 唯一的写入任务，按入队顺序写入，失败的事件直接丢弃
pub async fn writer(mut rx: mpsc::Receiver<CaptainEvent>, storage: Storage) {
    log::info!("start captain writer");
    while let Some(event) = rx.recv().await {
        match storage.insert_captain(&event).await {
            Ok(()) => log::info!(
                "saved captain uid={} name={} level={} count={} red_packet={}",
                event.uid,
                event.username,
                event.level,
                event.ship_count,
                event.is_red_packet
            ),
            Err(e) => log::error!(
                "failed to save captain uid={} level={}: {}",
                event.uid,
                event.level,
                e
            ),
        }
    }
    log::info!("captain writer stopped");
}
