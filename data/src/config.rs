use bililivedata_common::{
    config::{ConfigFile, Settings},
    data::RoomConfig,
};
use std::path::Path;

pub type LiveConfig = ConfigFile<&'static Path>;

/// 默认监听的直播间
pub const DEFAULT_ROOMS: &[(i64, &str)] = &[(1820703922, "花礼Harei")];

/// 在舰列表默认使用的主播 uid 和直播间
pub const GUARD_REPORT_RUID: i64 = 1048135385;
pub const GUARD_REPORT_ROOM_ID: i64 = 1820703922;

/// 只统计这个礼物
pub const TRACKED_GIFT: &str = "口水黄豆";
/// 红包舰长的价格
pub const RED_PACKET_PRICE: i64 = 1900;
pub const CAPTAIN_QUEUE_SIZE: usize = 5000;

/// 配置里的 `room_ids` 不为空时覆盖默认直播间
pub fn rooms(settings: &Settings) -> Vec<RoomConfig> {
    let ids = settings.room_ids();
    if ids.is_empty() {
        return DEFAULT_ROOMS
            .iter()
            .map(|(id, name)| RoomConfig::new(*id, *name))
            .collect();
    }

    let mut rooms: Vec<RoomConfig> = Vec::with_capacity(ids.len());
    for id in ids {
        if rooms.iter().any(|r| r.room_id == id) {
            continue;
        }
        let name = DEFAULT_ROOMS
            .iter()
            .find(|(room_id, _)| *room_id == id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| id.to_string());
        rooms.push(RoomConfig::new(id, name));
    }

    rooms
}
