use crate::{
    client::LIVE_REFERER,
    data::{GuardLevel, GuardRow},
};
use ahash::AHashMap;
use anyhow::{bail, Result};
use reqwest::{header::REFERER, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::time::Duration;

pub const ROOM_INFO_API: &str = "https://api.live.bilibili.com/room/v1/Room/get_info";
pub const LIVE_STATUS_API: &str =
    "https://api.live.bilibili.com/room/v1/Room/get_status_info_by_uids";
pub const GUARD_LIST_API: &str =
    "https://api.live.bilibili.com/xlive/app-room/v2/guardTab/topListNew";
pub const DANMU_INFO_API: &str =
    "https://api.live.bilibili.com/xlive/web-room/v1/index/getDanmuInfo";

pub const GUARD_PAGE_SIZE: u32 = 30;

const ROOM_INFO_TIMEOUT: Duration = Duration::from_secs(5);
const TIMEOUT: Duration = Duration::from_secs(10);
const BODY_PREVIEW: usize = 200;

/// 数字或数字字符串
#[inline]
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Clone, Debug, Deserialize)]
struct Response<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<Response<T>> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        bail!("HTTP {}", status);
    }
    let text = resp.text().await?;
    match serde_json::from_str(&text) {
        Ok(payload) => Ok(payload),
        Err(e) => {
            let preview: String = text.chars().take(BODY_PREVIEW).collect();
            bail!("response isn't valid JSON ({}), first 200 chars: {}", e, preview);
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct RoomInfo {
    #[serde(default)]
    uid: Value,
}

/// 获取直播间主播的 uid，获取不到时返回 `None`
pub async fn room_uid(client: &Client, room_id: i64) -> Result<Option<i64>> {
    let resp: Response<RoomInfo> = get_json(
        client
            .get(ROOM_INFO_API)
            .query(&[("room_id", room_id)])
            .timeout(ROOM_INFO_TIMEOUT),
    )
    .await?;
    let uid = resp
        .data
        .as_ref()
        .and_then(|d| as_i64(&d.uid))
        .unwrap_or(0);
    if uid > 0 {
        Ok(Some(uid))
    } else {
        log::warn!(
            "[{}] room info has no uid, code {}: {}",
            room_id,
            resp.code,
            resp.message
        );
        Ok(None)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LiveStatusInfo {
    #[serde(default)]
    pub live_status: Option<i64>,
    #[serde(default)]
    pub live_time: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
}

/// 批量获取直播状态，key 为主播 uid
pub async fn live_status(client: &Client, uids: &[i64]) -> Result<AHashMap<String, LiveStatusInfo>> {
    let params: Vec<(&str, String)> = uids.iter().map(|uid| ("uids[]", uid.to_string())).collect();
    let resp: Response<Value> = get_json(
        client
            .get(LIVE_STATUS_API)
            .query(&params)
            .timeout(TIMEOUT),
    )
    .await?;
    if resp.code != 0 {
        bail!("live status code {}: {}", resp.code, resp.message);
    }

    Ok(parse_live_status(resp.data.unwrap_or(Value::Null)))
}

/// 没有数据时 `data` 可能是空数组
pub fn parse_live_status(data: Value) -> AHashMap<String, LiveStatusInfo> {
    match data {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(uid, info)| serde_json::from_value(info).ok().map(|info| (uid, info)))
            .collect(),
        _ => AHashMap::new(),
    }
}

/// 获取一页在舰列表，返回规范化后的行
pub async fn guard_page(client: &Client, ruid: i64, room_id: i64, page: u32) -> Result<Vec<GuardRow>> {
    let resp: Response<Value> = get_json(
        client
            .get(GUARD_LIST_API)
            .query(&[
                ("ruid", ruid.to_string()),
                ("roomid", room_id.to_string()),
                ("page", page.to_string()),
                ("page_size", GUARD_PAGE_SIZE.to_string()),
                ("typ", "5".to_string()),
            ])
            .header(REFERER, format!("{}/{}", LIVE_REFERER, room_id))
            .timeout(TIMEOUT),
    )
    .await?;

    Ok(resp
        .data
        .as_ref()
        .and_then(|d| d.get("list"))
        .and_then(Value::as_array)
        .map(|list| list.iter().map(normalize_guard_row).collect())
        .unwrap_or_default())
}

pub fn normalize_guard_row(item: &Value) -> GuardRow {
    let uinfo = item.get("uinfo");
    let base = uinfo.and_then(|u| u.get("base"));
    let uid = uinfo
        .and_then(|u| u.get("uid"))
        .filter(|v| as_i64(v).unwrap_or(0) != 0)
        .or_else(|| base.and_then(|b| b.get("uid")))
        .and_then(as_i64)
        .map(|uid| uid.to_string())
        .unwrap_or_default();
    let name = base
        .and_then(|b| b.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let level = uinfo
        .and_then(|u| u.get("guard"))
        .and_then(|g| g.get("level"))
        .and_then(as_i64)
        .and_then(GuardLevel::from_tier)
        .map(|l| l.name().to_string())
        .unwrap_or_default();

    GuardRow { uid, name, level }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct DanmuHost {
    #[serde(default)]
    host: String,
    #[serde(default)]
    wss_port: u16,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct DanmuInfo {
    #[serde(default)]
    token: String,
    #[serde(default)]
    host_list: Vec<DanmuHost>,
}

/// 弹幕服务器地址和 token
pub async fn danmu_info(client: &Client, room_id: i64) -> Result<(String, String)> {
    let resp: Response<DanmuInfo> = get_json(
        client
            .get(DANMU_INFO_API)
            .query(&[("id", room_id.to_string()), ("type", "0".to_string())])
            .timeout(TIMEOUT),
    )
    .await?;
    if resp.code != 0 {
        bail!("danmu info code {}: {}", resp.code, resp.message);
    }
    let info = resp.data.unwrap_or_default();
    match info.host_list.iter().find(|h| !h.host.is_empty()) {
        Some(host) => Ok((
            format!("wss://{}:{}/sub", host.host, host.wss_port),
            info.token,
        )),
        None => bail!("danmu info has no host"),
    }
}
