use ahash::AHashMap;
use anyhow::Result;
use bililivedata_common::{
    api, client::build_client, config::Cookies, danmaku::DEFAULT_DANMAKU_URL, data::RoomConfig,
};
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;
use tokio::time;

const RESOLVE_ROUNDS: usize = 5;
const RESOLVE_INTERVAL: Duration = Duration::from_millis(300);

/// 全局共享的 HTTP client 和直播间信息
#[derive(Debug)]
pub struct Session {
    client: Client,
    cookies: Cookies,
    rooms: Vec<RoomConfig>,
    /// 获取不到弹幕服务器地址时连接这个
    danmaku_url: String,
    /// room id -> 主播 uid，只有 `resolve_uids` 会写
    uids: RwLock<AHashMap<i64, i64>>,
}

impl Session {
    pub fn new(cookies: Cookies, rooms: Vec<RoomConfig>) -> Result<Self> {
        let names = cookies.names();
        if names.is_empty() {
            log::warn!("no bilibili cookies configured, uid in danmaku may be hidden");
        } else {
            log::info!("use cookies: {}", names.join(", "));
        }

        Ok(Self {
            client: build_client(&cookies)?,
            cookies,
            rooms,
            danmaku_url: DEFAULT_DANMAKU_URL.to_string(),
            uids: RwLock::new(AHashMap::new()),
        })
    }

    /// 所有请求都会被本地拒绝，uid 已经填好
    #[cfg(test)]
    pub(crate) fn offline(rooms: Vec<RoomConfig>) -> Result<Self> {
        let client = Client::builder()
            .proxy(reqwest::Proxy::all(tests::REFUSED_PROXY)?)
            .build()?;
        let session = Self {
            client,
            cookies: Cookies::default(),
            rooms,
            danmaku_url: tests::REFUSED_DANMAKU_URL.to_string(),
            uids: RwLock::new(AHashMap::new()),
        };
        for (i, room) in session.rooms.iter().enumerate() {
            session.set_uid(room.room_id, i as i64 + 1);
        }

        Ok(session)
    }

    #[cfg(test)]
    pub(crate) fn with_danmaku_url(mut self, url: impl Into<String>) -> Self {
        self.danmaku_url = url.into();
        self
    }

    #[inline]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[inline]
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    #[inline]
    pub fn danmaku_url(&self) -> &str {
        &self.danmaku_url
    }

    #[inline]
    pub fn rooms(&self) -> &[RoomConfig] {
        &self.rooms
    }

    #[inline]
    pub fn primary_room(&self) -> Option<&RoomConfig> {
        self.rooms.first()
    }

    #[inline]
    pub fn uid(&self, room_id: i64) -> Option<i64> {
        self.uids.read().get(&room_id).copied()
    }

    #[inline]
    pub(crate) fn set_uid(&self, room_id: i64, uid: i64) {
        let _ = self.uids.write().insert(room_id, uid);
    }

    /// 已经获取到 uid 的直播间，按配置顺序
    pub fn resolved(&self) -> Vec<(i64, i64)> {
        let uids = self.uids.read();
        self.rooms
            .iter()
            .filter_map(|r| uids.get(&r.room_id).map(|uid| (r.room_id, *uid)))
            .collect()
    }

    #[inline]
    fn missing(&self) -> Vec<i64> {
        let uids = self.uids.read();
        self.rooms
            .iter()
            .map(|r| r.room_id)
            .filter(|id| !uids.contains_key(id))
            .collect()
    }

    /// 获取所有直播间的主播 uid，最多尝试 5 轮
    pub async fn resolve_uids(&self) {
        for round in 1..=RESOLVE_ROUNDS {
            let missing = self.missing();
            if missing.is_empty() {
                log::info!("all room uids are resolved");
                return;
            }
            log::info!(
                "resolving room uids, round {}/{}, {} rooms left",
                round,
                RESOLVE_ROUNDS,
                missing.len()
            );
            for room_id in missing {
                match api::room_uid(&self.client, room_id).await {
                    Ok(Some(uid)) => self.set_uid(room_id, uid),
                    Ok(None) => {}
                    Err(e) => log::warn!("[{}] failed to get room info: {}", room_id, e),
                }
                time::sleep(RESOLVE_INTERVAL).await;
            }
        }

        let missing = self.missing();
        if missing.is_empty() {
            log::info!("all room uids are resolved");
        } else {
            log::error!(
                "failed to resolve uids after {} rounds, these rooms are skipped by the status poller: {:?}",
                RESOLVE_ROUNDS,
                missing
            );
        }
    }
}
