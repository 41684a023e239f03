pub const CREATE_CAPTAINS: &str = r"CREATE TABLE IF NOT EXISTS captains (
id INTEGER PRIMARY KEY AUTOINCREMENT,
user_uid TEXT NOT NULL,
username TEXT NOT NULL,
joined_at TEXT NOT NULL,
joined_month TEXT NOT NULL,
level TEXT NOT NULL CHECK (level IN ('舰长', '提督', '总督')),
ship_count INTEGER NOT NULL DEFAULT 1,
is_red_packet INTEGER NOT NULL DEFAULT 0,
created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS captains_user_uid_index ON captains (user_uid);
CREATE INDEX IF NOT EXISTS captains_month_level_index ON captains (joined_month, level);
CREATE INDEX IF NOT EXISTS captains_joined_at_index ON captains (joined_at);";
pub const INSERT_CAPTAIN: &str = r"INSERT INTO captains
(user_uid, username, joined_at, joined_month, level, ship_count, is_red_packet)
VALUES (:user_uid, :username, :joined_at, :joined_month, :level, :ship_count, :is_red_packet);";

pub const CREATE_GIFT_RANKING: &str = r"CREATE TABLE IF NOT EXISTS gift_ranking (
user_uid TEXT PRIMARY KEY NOT NULL,
username TEXT,
gift_count INTEGER NOT NULL DEFAULT 0,
updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS gift_ranking_gift_count_index ON gift_ranking (gift_count);";
/// 累加礼物数，用户名为空时保留原来的
pub const UPSERT_GIFT_RANKING: &str = r"INSERT INTO gift_ranking
(user_uid, username, gift_count, updated_at)
VALUES (:user_uid, NULLIF(:username, ''), :gift_count, CURRENT_TIMESTAMP)
ON CONFLICT (user_uid) DO UPDATE SET
gift_count = gift_count + excluded.gift_count,
username = COALESCE(excluded.username, username),
updated_at = CURRENT_TIMESTAMP;";

#[cfg(test)]
pub const SELECT_GIFT_RANKING: &str = r"SELECT user_uid, username, gift_count, updated_at
FROM gift_ranking WHERE user_uid = :user_uid;";
#[cfg(test)]
pub const SELECT_CAPTAINS: &str = r"SELECT user_uid, username, joined_at, joined_month, level, ship_count, is_red_packet
FROM captains ORDER BY id;";
