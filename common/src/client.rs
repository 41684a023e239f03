use crate::config::Cookies;
use anyhow::Result;
use reqwest::{
    header::{HeaderMap, HeaderValue, COOKIE, REFERER, USER_AGENT},
    Client,
};
use std::time::Duration;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
pub const LIVE_REFERER: &str = "https://live.bilibili.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 带上 Cookies 的 HTTP client，整个进程共用一个
pub fn build_client(cookies: &Cookies) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let _ = headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    let _ = headers.insert(REFERER, HeaderValue::from_static(LIVE_REFERER));
    let cookie = cookies.header();
    if !cookie.is_empty() {
        let _ = headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }

    Ok(Client::builder()
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}
