mod client;
pub mod packet;

pub use client::{DanmakuClient, DEFAULT_DANMAKU_URL};

use crate::api::as_i64;
use byteorder::{BigEndian, ByteOrder};
use packet::{op, Packet};
use serde_json::Value;

pub const SEND_GIFT: &str = "SEND_GIFT";
pub const USER_TOAST_MSG_V2: &str = "USER_TOAST_MSG_V2";

#[derive(Debug, thiserror::Error)]
pub enum DanmakuError {
    #[error("packet is truncated, {0} bytes left")]
    Truncated(usize),
    #[error("failed to decompress packet: {0}")]
    Decompress(String),
    #[error("invalid notification JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid header value: {0}")]
    Header(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("connection is closed")]
    Closed,
}

/// 礼物
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gift {
    pub uid: i64,
    pub uname: String,
    pub gift_name: String,
    pub num: i64,
    pub price: i64,
}

/// 上舰
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserToast {
    pub uid: i64,
    pub username: String,
    pub guard_level: i64,
    pub num: i64,
    pub price: i64,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Danmaku {
    /// 人气值
    Heartbeat(u32),
    Gift(Gift),
    GuardPurchase(UserToast),
    /// 其它命令，只保留命令名
    Other(String),
}

#[inline]
fn pointer_i64(value: &Value, pointer: &str) -> Option<i64> {
    value.pointer(pointer).and_then(as_i64)
}

#[inline]
fn pointer_string(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl Danmaku {
    pub fn from_packet(packet: &Packet) -> Result<Self, DanmakuError> {
        match packet.operation {
            op::HEARTBEAT_REPLY if packet.body.len() >= 4 => {
                Ok(Self::Heartbeat(BigEndian::read_u32(&packet.body[0..4])))
            }
            op::NOTIFICATION => Ok(Self::from_command(&serde_json::from_slice(&packet.body)?)),
            op::AUTH_REPLY => Ok(Self::Other("AUTH_REPLY".to_string())),
            operation => Ok(Self::Other(format!("OP_{}", operation))),
        }
    }

    pub fn from_command(command: &Value) -> Self {
        let cmd = command
            .get("cmd")
            .and_then(Value::as_str)
            .unwrap_or_default();
        // 有些命令会带上后缀，例如 `SEND_GIFT:xxx`
        let name = cmd.split(':').next().unwrap_or_default();
        match name {
            SEND_GIFT => Self::Gift(Gift {
                uid: pointer_i64(command, "/data/uid").unwrap_or(0),
                uname: pointer_string(command, "/data/uname"),
                gift_name: pointer_string(command, "/data/giftName"),
                num: pointer_i64(command, "/data/num").unwrap_or(1),
                price: pointer_i64(command, "/data/price").unwrap_or(0),
            }),
            USER_TOAST_MSG_V2 => Self::GuardPurchase(UserToast {
                uid: pointer_i64(command, "/data/sender_uinfo/uid").unwrap_or(0),
                username: pointer_string(command, "/data/sender_uinfo/base/name"),
                guard_level: pointer_i64(command, "/data/guard_info/guard_level").unwrap_or(0),
                num: pointer_i64(command, "/data/pay_info/num").unwrap_or(1),
                price: pointer_i64(command, "/data/pay_info/price").unwrap_or(0),
                unit: pointer_string(command, "/data/pay_info/unit"),
            }),
            _ => Self::Other(cmd.to_string()),
        }
    }
}

/// 每条弹幕消息的回调，在连接自己的任务里调用，不能阻塞太久
pub trait DanmakuHandler: Send + Sync + 'static {
    fn handle(&self, room_id: i64, danmaku: Danmaku);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gift() {
        let danmaku = Danmaku::from_command(&json!({
            "cmd": "SEND_GIFT",
            "data": {"uid": "5", "uname": "foo", "giftName": "口水黄豆", "num": 3, "price": 100}
        }));
        assert_eq!(
            danmaku,
            Danmaku::Gift(Gift {
                uid: 5,
                uname: "foo".to_string(),
                gift_name: "口水黄豆".to_string(),
                num: 3,
                price: 100,
            })
        );

        match Danmaku::from_command(&json!({"cmd": "SEND_GIFT", "data": {"uid": 0}})) {
            Danmaku::Gift(gift) => {
                assert_eq!(gift.uid, 0);
                assert_eq!(gift.num, 1);
            }
            d => panic!("unexpected {:?}", d),
        }
    }

    #[test]
    fn test_user_toast() {
        let danmaku = Danmaku::from_command(&json!({
            "cmd": "USER_TOAST_MSG_V2",
            "data": {
                "sender_uinfo": {"uid": 42, "base": {"name": "bar"}},
                "guard_info": {"guard_level": 3},
                "pay_info": {"num": 2, "price": 1900, "unit": "月"}
            }
        }));
        assert_eq!(
            danmaku,
            Danmaku::GuardPurchase(UserToast {
                uid: 42,
                username: "bar".to_string(),
                guard_level: 3,
                num: 2,
                price: 1900,
                unit: "月".to_string(),
            })
        );
    }

    #[test]
    fn test_other() -> Result<(), DanmakuError> {
        assert_eq!(
            Danmaku::from_command(&json!({"cmd": "DANMU_MSG", "info": []})),
            Danmaku::Other("DANMU_MSG".to_string())
        );

        let packet = Packet {
            version: packet::version::INT,
            operation: op::HEARTBEAT_REPLY,
            body: vec![0, 0, 1, 0],
        };
        assert_eq!(Danmaku::from_packet(&packet)?, Danmaku::Heartbeat(256));

        let packet = Packet {
            version: packet::version::JSON,
            operation: op::NOTIFICATION,
            body: b"not json".to_vec(),
        };
        assert!(Danmaku::from_packet(&packet).is_err());

        Ok(())
    }
}
