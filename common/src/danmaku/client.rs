use super::{
    packet::{self, op},
    Danmaku, DanmakuError,
};
use crate::{
    api,
    client::{BROWSER_USER_AGENT, LIVE_REFERER},
    config::Cookies,
};
use futures::{ready, SinkExt, Stream, StreamExt};
use reqwest::Client;
use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::header::{HeaderValue, COOKIE, ORIGIN, USER_AGENT},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

pub const DEFAULT_DANMAKU_URL: &str = "wss://broadcastlv.chat.bilibili.com/sub";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// B站弹幕 websocket 连接，以 `Stream` 的形式产出解码后的消息
pub struct DanmakuClient {
    room_id: i64,
    ws: WsStream,
    pending: VecDeque<Result<Danmaku, DanmakuError>>,
}

impl std::fmt::Debug for DanmakuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DanmakuClient")
            .field("room_id", &self.room_id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn auth_body(room_id: i64, token: &str, cookies: &Cookies) -> String {
    serde_json::json!({
        "uid": cookies.uid(),
        "roomid": room_id,
        "protover": 3,
        "platform": "web",
        "type": 2,
        "key": token,
        "buvid": cookies.buvid3.trim(),
    })
    .to_string()
}

impl DanmakuClient {
    /// 连接并发送认证包，获取不到服务器地址时使用 `fallback_url`
    pub async fn connect(
        http: &Client,
        room_id: i64,
        cookies: &Cookies,
        fallback_url: &str,
    ) -> Result<Self, DanmakuError> {
        let (url, token) = match api::danmu_info(http, room_id).await {
            Ok(info) => info,
            Err(e) => {
                log::warn!("[{}] failed to get danmu info, use {}: {}", room_id, fallback_url, e);
                (fallback_url.to_string(), String::new())
            }
        };

        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        let _ = headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let _ = headers.insert(ORIGIN, HeaderValue::from_static(LIVE_REFERER));
        let cookie = cookies.header();
        if !cookie.is_empty() {
            let _ = headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
        }

        let (mut ws, _) = connect_async(request).await?;
        let auth = packet::encode(op::AUTH, auth_body(room_id, &token, cookies).as_bytes());
        ws.send(Message::Binary(auth.into())).await?;
        log::debug!("[{}] connected to {}", room_id, url);

        Ok(Self {
            room_id,
            ws,
            pending: VecDeque::new(),
        })
    }

    #[inline]
    pub fn room_id(&self) -> i64 {
        self.room_id
    }

    #[inline]
    pub async fn heartbeat(&mut self) -> Result<(), DanmakuError> {
        Ok(self.ws.send(Message::Binary(packet::heartbeat().into())).await?)
    }

    #[inline]
    pub async fn close(&mut self) -> Result<(), DanmakuError> {
        Ok(self.ws.close(None).await?)
    }
}

impl Stream for DanmakuClient {
    type Item = Result<Danmaku, DanmakuError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            match ready!(self.ws.poll_next_unpin(cx)) {
                Some(Ok(Message::Binary(data))) => match packet::decode(&data) {
                    Ok(packets) => {
                        let items: Vec<_> = packets.iter().map(Danmaku::from_packet).collect();
                        self.pending.extend(items);
                    }
                    Err(e) => return Poll::Ready(Some(Err(e))),
                },
                Some(Ok(Message::Close(_))) | None => return Poll::Ready(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_body() -> Result<(), serde_json::Error> {
        let cookies = Cookies {
            dedeuserid: "42".to_string(),
            buvid3: "abc".to_string(),
            ..Default::default()
        };
        let body: serde_json::Value = serde_json::from_str(&auth_body(1820703922, "tok", &cookies))?;
        assert_eq!(body["uid"], 42);
        assert_eq!(body["roomid"], 1820703922i64);
        assert_eq!(body["protover"], 3);
        assert_eq!(body["key"], "tok");
        assert_eq!(body["buvid"], "abc");

        let body: serde_json::Value =
            serde_json::from_str(&auth_body(1, "", &Cookies::default()))?;
        assert_eq!(body["uid"], 0);

        Ok(())
    }
}
