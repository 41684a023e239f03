use crate::session::Session;
use ahash::AHashMap;
use bililivedata_common::{
    api::{self, as_i64, LiveStatusInfo},
    data::{format_time, LiveStatusSnapshot, LIVE_TIME_SENTINEL},
};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::RwLock;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const WAIT_UID_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoomLiveState {
    /// 0 未开播，1 直播中
    pub status: u8,
    pub live_time: String,
    pub title: String,
}

impl Default for RoomLiveState {
    #[inline]
    fn default() -> Self {
        Self {
            status: 0,
            live_time: LIVE_TIME_SENTINEL.to_string(),
            title: String::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

/// 轮播（2）当作未开播
#[inline]
pub fn normalize_status(raw: i64) -> u8 {
    if raw == 1 {
        1
    } else {
        0
    }
}

/// 开播时间是秒级时间戳，解析不了就用当前时间
pub fn parse_live_time(raw: Option<&Value>, now: &DateTime<Local>) -> String {
    raw.and_then(as_i64)
        .filter(|secs| *secs > 0)
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|t| format_time(&t))
        .unwrap_or_else(|| format_time(now))
}

/// 直播间的直播状态，只有轮询任务会写
#[derive(Debug, Default)]
pub struct LiveStatusTable {
    states: RwLock<AHashMap<i64, RoomLiveState>>,
}

impl LiveStatusTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&self, room_ids: impl IntoIterator<Item = i64>) {
        let mut states = self.states.write();
        for room_id in room_ids {
            let _ = states.entry(room_id).or_default();
        }
    }

    #[inline]
    pub fn is_live(&self, room_id: i64) -> bool {
        self.states
            .read()
            .get(&room_id)
            .map(|s| s.status == 1)
            .unwrap_or(false)
    }

    #[inline]
    pub fn get(&self, room_id: i64) -> RoomLiveState {
        self.states.read().get(&room_id).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn snapshot(&self, room_id: i64) -> LiveStatusSnapshot {
        let state = self.get(room_id);
        LiveStatusSnapshot {
            status: state.status,
            live_time: state.live_time,
            title: state.title,
        }
    }

    #[cfg(test)]
    pub(crate) fn set(&self, room_id: i64, state: RoomLiveState) {
        let _ = self.states.write().insert(room_id, state);
    }

    /// 用一个直播间的轮询结果更新状态，没有 `live_status` 时保留上一次的状态
    pub fn apply(
        &self,
        room_id: i64,
        info: Option<&LiveStatusInfo>,
        now: &DateTime<Local>,
    ) -> Option<Transition> {
        let info = info?;
        let status = normalize_status(info.live_status?);
        let mut states = self.states.write();
        let state = states.entry(room_id).or_default();
        let prev = state.status;
        state.status = status;

        match (prev, status) {
            (0, 1) => {
                state.live_time = parse_live_time(info.live_time.as_ref(), now);
                state.title = info.title.clone().unwrap_or_default();
                log::info!("[{}] live started at {}: {}", room_id, state.live_time, state.title);
                Some(Transition::Started)
            }
            (1, 0) => {
                state.live_time = LIVE_TIME_SENTINEL.to_string();
                state.title.clear();
                log::info!("[{}] live stopped", room_id);
                Some(Transition::Stopped)
            }
            _ => {
                if status == 1 {
                    state.title = info.title.clone().unwrap_or_default();
                }
                Some(Transition::Unchanged)
            }
        }
    }
}

/// 每 3 秒批量查询一次所有直播间的状态
pub async fn poll(session: Arc<Session>, table: Arc<LiveStatusTable>) {
    while session.resolved().is_empty() {
        log::debug!("waiting for room uids");
        time::sleep(WAIT_UID_INTERVAL).await;
    }
    table.ensure(session.rooms().iter().map(|r| r.room_id));
    log::info!(
        "start polling live status of {} rooms",
        session.resolved().len()
    );

    loop {
        let resolved = session.resolved();
        let uids: Vec<i64> = resolved.iter().map(|(_, uid)| *uid).collect();
        match api::live_status(session.client(), &uids).await {
            Ok(data) => {
                let now = Local::now();
                for (room_id, uid) in resolved {
                    let _ = table.apply(room_id, data.get(&uid.to_string()), &now);
                }
            }
            Err(e) => log::warn!("failed to poll live status: {}", e),
        }
        time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(status: Option<i64>, live_time: Value, title: &str) -> LiveStatusInfo {
        LiveStatusInfo {
            live_status: status,
            live_time: Some(live_time),
            title: Some(title.to_string()),
        }
    }

    #[test]
    fn test_transitions() {
        let table = LiveStatusTable::new();
        table.ensure([1]);
        let now = Local::now();

        let started = table.apply(1, Some(&info(Some(1), json!(1700000000), "hello")), &now);
        assert_eq!(started, Some(Transition::Started));
        assert!(table.is_live(1));
        let state = table.get(1);
        assert_eq!(
            state.live_time,
            format_time(&Local.timestamp_opt(1700000000, 0).unwrap())
        );
        assert_eq!(state.title, "hello");

        let same = table.apply(1, Some(&info(Some(1), json!(1700000000), "new title")), &now);
        assert_eq!(same, Some(Transition::Unchanged));
        assert_eq!(table.get(1).title, "new title");

        let stopped = table.apply(1, Some(&info(Some(0), json!(0), "whatever")), &now);
        assert_eq!(stopped, Some(Transition::Stopped));
        assert_eq!(table.get(1), RoomLiveState::default());
        assert_eq!(table.snapshot(1), LiveStatusSnapshot::default());
    }

    #[test]
    fn test_offline_title_untouched() {
        let table = LiveStatusTable::new();
        let now = Local::now();
        let _ = table.apply(1, Some(&info(Some(0), json!(0), "offline title")), &now);
        assert_eq!(table.get(1).title, "");
        assert!(!table.is_live(1));
    }

    #[test]
    fn test_round_status_is_offline() {
        let table = LiveStatusTable::new();
        let now = Local::now();
        let _ = table.apply(1, Some(&info(Some(1), json!(1700000000), "a")), &now);
        let t = table.apply(1, Some(&info(Some(2), json!(0), "a")), &now);
        assert_eq!(t, Some(Transition::Stopped));
        assert_eq!(table.get(1).status, 0);
        assert_eq!(normalize_status(2), 0);
        assert_eq!(normalize_status(1), 1);
    }

    #[test]
    fn test_carry_forward() {
        let table = LiveStatusTable::new();
        let now = Local::now();
        let _ = table.apply(1, Some(&info(Some(1), json!("1700000000"), "a")), &now);
        let before = table.get(1);

        assert_eq!(table.apply(1, None, &now), None);
        assert_eq!(table.apply(1, Some(&info(None, json!(0), "b")), &now), None);
        assert_eq!(table.get(1), before);
    }

    #[test]
    fn test_parse_live_time() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        assert_eq!(parse_live_time(Some(&json!("abc")), &now), "2024-05-01 20:00:00");
        assert_eq!(parse_live_time(None, &now), "2024-05-01 20:00:00");
        assert_eq!(parse_live_time(Some(&json!(-1)), &now), "2024-05-01 20:00:00");
        let expect = format_time(&Local.timestamp_opt(1714564800, 0).unwrap());
        assert_eq!(parse_live_time(Some(&json!(1714564800)), &now), expect);
    }
}
