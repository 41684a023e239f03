use crate::{
    alert::CookieAlert,
    captain::CaptainQueue,
    config::{RED_PACKET_PRICE, TRACKED_GIFT},
    gift::GiftRecorder,
};
use bililivedata_common::{
    danmaku::{Danmaku, DanmakuHandler, Gift, UserToast},
    data::{CaptainEvent, GuardLevel},
};
use chrono::Local;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Ignored,
    /// uid 为 0，Cookies 可能失效了
    CookieExpired,
    Gift,
    Captain,
    /// 舰长队列满了
    Dropped,
}

/// 弹幕分类，礼物交给 `GiftRecorder`，上舰放进队列
#[derive(Clone, Debug)]
pub struct Classifier {
    queue: CaptainQueue,
    gifts: GiftRecorder,
    alert: Arc<CookieAlert>,
}

impl Classifier {
    #[inline]
    pub fn new(queue: CaptainQueue, gifts: GiftRecorder, alert: Arc<CookieAlert>) -> Self {
        Self {
            queue,
            gifts,
            alert,
        }
    }

    pub fn classify(&self, room_id: i64, danmaku: Danmaku) -> Outcome {
        match danmaku {
            Danmaku::Heartbeat(_) | Danmaku::Other(_) => Outcome::Ignored,
            Danmaku::Gift(gift) => self.gift(room_id, gift),
            Danmaku::GuardPurchase(toast) => self.user_toast(room_id, toast),
        }
    }

    fn gift(&self, room_id: i64, gift: Gift) -> Outcome {
        if gift.uid == 0 {
            let _ = self.alert.trigger(&format!("[{}] gift uid=0", room_id));
            return Outcome::CookieExpired;
        }
        if gift.gift_name != TRACKED_GIFT {
            return Outcome::Ignored;
        }
        let num = if gift.num > 0 { gift.num } else { 1 };
        log::info!(
            "[{}] gift {} x{} from uid={} name={}",
            room_id,
            gift.gift_name,
            num,
            gift.uid,
            gift.uname
        );
        let _ = self.gifts.record(gift.uid.to_string(), gift.uname, num);

        Outcome::Gift
    }

    fn user_toast(&self, room_id: i64, toast: UserToast) -> Outcome {
        if toast.uid == 0 {
            let _ = self.alert.trigger(&format!("[{}] user_toast uid=0", room_id));
            return Outcome::CookieExpired;
        }
        let level = match GuardLevel::from_tier(toast.guard_level) {
            Some(level) => level,
            None => {
                log::debug!(
                    "[{}] unknown guard level {} from uid={}",
                    room_id,
                    toast.guard_level,
                    toast.uid
                );
                return Outcome::Ignored;
            }
        };
        let event = CaptainEvent {
            uid: toast.uid.to_string(),
            username: toast.username,
            level,
            ship_count: if toast.num > 0 { toast.num } else { 1 },
            is_red_packet: toast.price == RED_PACKET_PRICE,
            joined_at: Local::now(),
        };
        log::info!(
            "[{}] {} uid={} name={} x{}{}",
            room_id,
            event.level,
            event.uid,
            event.username,
            event.ship_count,
            toast.unit
        );

        if self.queue.enqueue(event) {
            Outcome::Captain
        } else {
            Outcome::Dropped
        }
    }
}

impl DanmakuHandler for Classifier {
    fn handle(&self, room_id: i64, danmaku: Danmaku) {
        if catch_unwind(AssertUnwindSafe(|| self.classify(room_id, danmaku))).is_err() {
            log::error!("[{}] panicked while handling danmaku", room_id);
        }
    }
}
