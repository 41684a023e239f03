use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// 未开播时的开播时间
pub const LIVE_TIME_SENTINEL: &str = "0000-00-00 00:00:00";

#[inline]
pub fn month_str(time: &DateTime<Local>) -> String {
    time.format("%Y%m").to_string()
}

#[inline]
pub fn format_time(time: &DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct RoomConfig {
    pub room_id: i64,
    pub name: String,
}

impl RoomConfig {
    #[inline]
    pub fn new(room_id: i64, name: impl Into<String>) -> Self {
        Self {
            room_id,
            name: name.into(),
        }
    }
}

/// 大航海等级
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum GuardLevel {
    /// 舰长
    Captain,
    /// 提督
    Admiral,
    /// 总督
    Governor,
}

impl GuardLevel {
    /// bilibili: 3=舰长, 2=提督, 1=总督
    #[inline]
    pub fn from_tier(tier: i64) -> Option<Self> {
        match tier {
            3 => Some(Self::Captain),
            2 => Some(Self::Admiral),
            1 => Some(Self::Governor),
            _ => None,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Captain => "舰长",
            Self::Admiral => "提督",
            Self::Governor => "总督",
        }
    }
}

impl fmt::Display for GuardLevel {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptainEvent {
    pub uid: String,
    pub username: String,
    pub level: GuardLevel,
    pub ship_count: i64,
    pub is_red_packet: bool,
    pub joined_at: DateTime<Local>,
}

impl CaptainEvent {
    #[inline]
    pub fn joined_month(&self) -> String {
        month_str(&self.joined_at)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GiftRanking {
    pub uid: String,
    pub username: Option<String>,
    pub gift_count: i64,
    pub updated_at: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LiveStatusSnapshot {
    pub status: u8,
    pub live_time: String,
    pub title: String,
}

impl Default for LiveStatusSnapshot {
    #[inline]
    fn default() -> Self {
        Self {
            status: 0,
            live_time: LIVE_TIME_SENTINEL.to_string(),
            title: String::new(),
        }
    }
}

/// 在舰列表中的一行
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuardRow {
    pub uid: String,
    pub name: String,
    pub level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_guard_level() {
        assert_eq!(GuardLevel::from_tier(3), Some(GuardLevel::Captain));
        assert_eq!(GuardLevel::from_tier(2), Some(GuardLevel::Admiral));
        assert_eq!(GuardLevel::from_tier(1), Some(GuardLevel::Governor));
        assert_eq!(GuardLevel::from_tier(0), None);
        assert_eq!(GuardLevel::from_tier(4), None);
        assert_eq!(GuardLevel::Governor.to_string(), "总督");
    }

    #[test]
    fn test_joined_month() {
        let event = CaptainEvent {
            uid: "5".to_string(),
            username: "foo".to_string(),
            level: GuardLevel::Captain,
            ship_count: 1,
            is_red_packet: false,
            joined_at: Local.with_ymd_and_hms(2024, 3, 31, 23, 10, 0).unwrap(),
        };
        assert_eq!(event.joined_month(), "202403");
    }
}
