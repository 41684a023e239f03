use crate::{session::Session, status::LiveStatusTable};
use ahash::AHashMap;
use bililivedata_common::danmaku::{DanmakuClient, DanmakuError, DanmakuHandler};
use chrono::{DateTime, Local};
use futures::{future::join_all, StreamExt};
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};

const START_STAGGER: Duration = Duration::from_secs(3);
const RECONNECT_PAUSE: Duration = Duration::from_secs(3);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// 超过这个时间没有收到任何消息就重连
const SILENCE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug)]
struct Timing {
    heartbeat: Duration,
    silence: Duration,
    retry: Duration,
}

const TIMING: Timing = Timing {
    heartbeat: HEARTBEAT_INTERVAL,
    silence: SILENCE_TIMEOUT,
    retry: RETRY_INTERVAL,
};

#[derive(Debug)]
struct Connection {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Connection {
    async fn close(self, room_id: i64) {
        let Self { shutdown, mut task } = self;
        let _ = shutdown.send(());
        match time::timeout(CLOSE_TIMEOUT, &mut task).await {
            Ok(Ok(())) => log::info!("[{}] connection closed", room_id),
            Ok(Err(e)) if e.is_cancelled() => {
                log::debug!("[{}] connection task was cancelled while closing", room_id)
            }
            Ok(Err(e)) => log::warn!("[{}] connection task failed: {}", room_id, e),
            Err(_) => {
                log::warn!("[{}] timeout while closing connection, abort it", room_id);
                task.abort();
            }
        }
    }
}

/// 每个直播间一个弹幕连接
pub struct RoomManager {
    session: Arc<Session>,
    handler: Arc<dyn DanmakuHandler>,
    status: Arc<LiveStatusTable>,
    /// 整个 stop -> start 过程中都持有这个锁
    connections: Mutex<AHashMap<i64, Connection>>,
    last_reconnect: RwLock<AHashMap<i64, DateTime<Local>>>,
}

impl RoomManager {
    #[inline]
    pub fn new(
        session: Arc<Session>,
        handler: Arc<dyn DanmakuHandler>,
        status: Arc<LiveStatusTable>,
    ) -> Self {
        Self {
            session,
            handler,
            status,
            connections: Mutex::new(AHashMap::new()),
            last_reconnect: RwLock::new(AHashMap::new()),
        }
    }

    #[inline]
    pub fn last_reconnect(&self, room_id: i64) -> Option<DateTime<Local>> {
        self.last_reconnect.read().get(&room_id).copied()
    }

    #[inline]
    pub async fn is_connected(&self, room_id: i64) -> bool {
        self.connections.lock().await.contains_key(&room_id)
    }

    fn spawn(&self, room_id: i64) -> Connection {
        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(run_room(
            self.session.clone(),
            self.handler.clone(),
            room_id,
            rx,
            TIMING,
        ));
        Connection { shutdown, task }
    }

    /// 建立新连接，已有的连接会先关闭
    pub async fn start(&self, room_id: i64) {
        let mut connections = self.connections.lock().await;
        if let Some(old) = connections.remove(&room_id) {
            old.close(room_id).await;
        }
        let _ = connections.insert(room_id, self.spawn(room_id));
        log::info!("[{}] started danmaku connection", room_id);
    }

    pub async fn stop(&self, room_id: i64) {
        let old = self.connections.lock().await.remove(&room_id);
        if let Some(old) = old {
            old.close(room_id).await;
        }
    }

    /// 关闭旧连接，3 秒后重新连接，直播中的直播间不会重连
    pub async fn reconnect_one(&self, room_id: i64) -> bool {
        if self.status.is_live(room_id) {
            log::info!("[{}] is live, skip reconnecting", room_id);
            return false;
        }

        let mut connections = self.connections.lock().await;
        if let Some(old) = connections.remove(&room_id) {
            old.close(room_id).await;
        }
        time::sleep(RECONNECT_PAUSE).await;
        let _ = connections.insert(room_id, self.spawn(room_id));
        drop(connections);

        let _ = self.last_reconnect.write().insert(room_id, Local::now());
        log::info!("[{}] reconnected", room_id);
        true
    }

    /// 依次连接所有直播间，每个间隔 3 秒
    pub async fn start_all(&self) {
        for (i, room) in self.session.rooms().iter().enumerate() {
            if i > 0 {
                time::sleep(START_STAGGER).await;
            }
            self.start(room.room_id).await;
        }
    }

    pub async fn close_all(&self) {
        let connections: Vec<_> = self.connections.lock().await.drain().collect();
        let _ = join_all(
            connections
                .into_iter()
                .map(|(room_id, conn)| conn.close(room_id)),
        )
        .await;
    }
}

async fn run_room(
    session: Arc<Session>,
    handler: Arc<dyn DanmakuHandler>,
    room_id: i64,
    mut shutdown: oneshot::Receiver<()>,
    timing: Timing,
) {
    loop {
        let connect = DanmakuClient::connect(
            session.client(),
            room_id,
            session.cookies(),
            session.danmaku_url(),
        );
        let result = tokio::select! {
            _ = &mut shutdown => return,
            result = connect => result,
        };
        let mut client = match result {
            Ok(client) => client,
            Err(e) => {
                log::warn!("[{}] failed to connect danmaku server: {}", room_id, e);
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = time::sleep(timing.retry) => continue,
                }
            }
        };

        let mut heartbeat = time::interval(timing.heartbeat);
        let silence = time::sleep(timing.silence);
        tokio::pin!(silence);
        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    if let Err(e) = client.close().await {
                        log::debug!("[{}] error while closing websocket: {}", room_id, e);
                    }
                    return;
                }
                _ = &mut silence => {
                    break format!("no message in {:?}", timing.silence);
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = client.heartbeat().await {
                        break e.to_string();
                    }
                }
                item = client.next() => match item {
                    Some(Ok(danmaku)) => {
                        silence.as_mut().reset(Instant::now() + timing.silence);
                        handler.handle(room_id, danmaku);
                    }
                    Some(Err(e @ DanmakuError::WebSocket(_))) => break e.to_string(),
                    Some(Err(e)) => log::warn!("[{}] failed to decode danmaku: {}", room_id, e),
                    None => break DanmakuError::Closed.to_string(),
                }
            }
        };

        log::warn!("[{}] danmaku connection lost: {}, retry later", room_id, reason);
        tokio::select! {
            _ = &mut shutdown => return,
            _ = time::sleep(timing.retry) => {}
        }
    }
}
