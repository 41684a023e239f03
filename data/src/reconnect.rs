use crate::room::RoomManager;
use bililivedata_common::data::format_time;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::time;

const RECONNECT_HOUR: u32 = 6;
const ROOM_INTERVAL: Duration = Duration::from_secs(3);
const MIN_WAIT: Duration = Duration::from_secs(1);

/// 至少等 1 秒
#[inline]
pub fn wait_time(now: &DateTime<Local>, target: &DateTime<Local>) -> Duration {
    (*target - *now)
        .to_std()
        .unwrap_or_default()
        .max(MIN_WAIT)
}

/// 下一个本地时间 `at`，已经过了就是明天
pub fn next_daily(now: &DateTime<Local>, at: NaiveTime) -> DateTime<Local> {
    let today = now.date_naive().and_time(at);
    let target = if now.naive_local() < today {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    Local
        .from_local_datetime(&target)
        .earliest()
        .unwrap_or_else(|| *now + chrono::Duration::days(1))
}

#[inline]
fn room_delay() -> Duration {
    ROOM_INTERVAL + Duration::from_millis(rand::thread_rng().gen_range(500..=2500))
}

/// 重连所有没在直播的直播间，返回重连的数量
pub async fn sweep(manager: &RoomManager, room_ids: &[i64]) -> usize {
    log::info!("start reconnecting {} rooms", room_ids.len());
    let mut count = 0;
    for room_id in room_ids {
        if manager.reconnect_one(*room_id).await {
            count += 1;
            time::sleep(room_delay()).await;
        }
    }
    log::info!("reconnected {} rooms", count);

    count
}

/// 每天 6 点重连一次
pub async fn scheduler(manager: Arc<RoomManager>, room_ids: Vec<i64>) {
    let at = NaiveTime::from_hms_opt(RECONNECT_HOUR, 0, 0).unwrap_or_default();
    loop {
        let now = Local::now();
        let target = next_daily(&now, at);
        let wait = wait_time(&now, &target);
        log::info!(
            "next reconnection at {}, about {:.1} minutes later",
            format_time(&target),
            wait.as_secs_f64() / 60.0
        );
        time::sleep(wait).await;
        let _ = sweep(&manager, &room_ids).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        session::Session,
        status::{LiveStatusTable, RoomLiveState},
    };
    use bililivedata_common::{
        danmaku::{Danmaku, DanmakuHandler},
        data::RoomConfig,
    };

    fn six() -> NaiveTime {
        NaiveTime::from_hms_opt(6, 0, 0).unwrap()
    }

    #[test]
    fn test_next_daily() {
        let now = Local.with_ymd_and_hms(2024, 3, 10, 5, 59, 59).unwrap();
        assert_eq!(
            next_daily(&now, six()),
            Local.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()
        );

        let now = Local.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        assert_eq!(
            next_daily(&now, six()),
            Local.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap()
        );

        let now = Local.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            next_daily(&now, six()),
            Local.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_wait_time() {
        let now = Local.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap();
        let target = Local.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap();
        assert_eq!(wait_time(&now, &target), Duration::from_secs(3600));
        assert_eq!(wait_time(&target, &now), MIN_WAIT);
    }

    #[test]
    fn test_room_delay() {
        for _ in 0..100 {
            let delay = room_delay();
            assert!(delay >= Duration::from_millis(3500));
            assert!(delay <= Duration::from_millis(5500));
        }
    }

    struct Noop;

    impl DanmakuHandler for Noop {
        fn handle(&self, _room_id: i64, _danmaku: Danmaku) {}
    }

    #[tokio::test]
    async fn test_sweep_skips_live_rooms() -> anyhow::Result<()> {
        let session = Arc::new(Session::offline(vec![
            RoomConfig::new(1, "a"),
            RoomConfig::new(2, "b"),
        ])?);
        let status = Arc::new(LiveStatusTable::new());
        let live = RoomLiveState {
            status: 1,
            ..Default::default()
        };
        status.set(1, live.clone());
        status.set(2, live);
        let manager = RoomManager::new(session, Arc::new(Noop), status);

        assert_eq!(sweep(&manager, &[1, 2]).await, 0);
        assert!(manager.last_reconnect(1).is_none());
        assert!(manager.last_reconnect(2).is_none());
        assert!(!manager.is_connected(1).await);

        Ok(())
    }
}
