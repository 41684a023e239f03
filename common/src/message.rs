use crate::{data::LiveStatusSnapshot, file_exist};
use anyhow::{bail, Result};
use asynchronous_codec::{Framed, LengthCodec};
use encon::Password;
use futures::{SinkExt, StreamExt, TryStreamExt};
use interprocess::nonblocking::local_socket::{LocalSocketListener, LocalSocketStream};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{future::Future, io, marker::PhantomData, time::Duration};
use tokio::{fs, time};

pub const DATA_CENTER_SOCKET: &str = "/tmp/bililivedata.sock";
pub const TOOL_SOCKET: &str = "/tmp/bililivedata_tool.sock";
pub const TOOL_PASSWORD: &str = "bililivedata-tool";

const TIMEOUT: Duration = Duration::from_secs(5);

/// tool 发给数据中心的消息
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum DataCenterMessage {
    /// 查询主直播间的直播状态
    LiveStatus,
}

/// 数据中心回复给 tool 的消息
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ToolMessage {
    LiveStatus(LiveStatusSnapshot),
}

#[inline]
pub async fn send_tool_message(message: &ToolMessage) {
    let client: MessageSocket<ToolMessage> = MessageSocket::new_client(TOOL_SOCKET, TOOL_PASSWORD);
    if let Err(e) = client.send(message).await {
        log::error!("failed to send {:?} to tool: {}", message, e);
    }
}

#[inline]
fn invalid_data<E>(e: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// 本地 socket 上的加密消息，一个连接只传一条消息
#[derive(Clone)]
pub struct MessageSocket<M> {
    path: &'static str,
    is_server: bool,
    password: Password,
    message: PhantomData<M>,
}

impl<M> MessageSocket<M> {
    #[inline]
    pub fn new_server(path: &'static str, password: impl Into<String>) -> Self {
        Self {
            path,
            is_server: true,
            password: Password::new(password),
            message: PhantomData,
        }
    }

    #[inline]
    pub fn new_client(path: &'static str, password: impl Into<String>) -> Self {
        Self {
            path,
            is_server: false,
            password: Password::new(password),
            message: PhantomData,
        }
    }

    #[inline]
    pub fn is_server(&self) -> bool {
        self.is_server
    }
}

impl<M: DeserializeOwned> MessageSocket<M> {
    fn decode(&self, bytes: &[u8]) -> io::Result<M> {
        let plain = self.password.decrypt(bytes).map_err(invalid_data)?;
        bincode::deserialize(&plain).map_err(invalid_data)
    }

    /// 监听 socket，每收到一条消息就调用一次 `f`
    pub async fn listen<F, Fut>(&self, f: F) -> Result<()>
    where
        F: Fn(M) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !self.is_server {
            bail!("not a server");
        }
        if file_exist(self.path).await {
            fs::remove_file(self.path).await?;
        }
        let listener = LocalSocketListener::bind(self.path).await?;
        listener
            .incoming()
            .try_for_each_concurrent(None, |conn| {
                let f = &f;
                async move {
                    let mut framed = Framed::new(conn, LengthCodec);
                    let bytes = match framed.next().await.transpose()? {
                        Some(b) => b,
                        None => return Ok(()),
                    };
                    let msg = self.decode(&bytes)?;
                    f(msg)
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
                }
            })
            .await?;

        Ok(())
    }
}

impl<M: Serialize> MessageSocket<M> {
    async fn write(&self, message: Vec<u8>) -> Result<()> {
        let conn = LocalSocketStream::connect(self.path).await?;
        let mut framed = Framed::new(conn, LengthCodec);
        framed.send(message.into()).await?;
        framed.close().await?;

        Ok(())
    }

    pub async fn send(&self, message: &M) -> Result<()> {
        if self.is_server {
            bail!("not a client");
        }
        let msg = self.password.encrypt(bincode::serialize(message)?)?;
        time::timeout(TIMEOUT, self.write(msg)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::time::sleep;

    const TEST_SOCKET: &str = "/tmp/bililivedata_test.sock";

    #[tokio::test]
    async fn test_message_socket() -> Result<()> {
        let server: MessageSocket<ToolMessage> = MessageSocket::new_server(TEST_SOCKET, "abcd");
        let client: MessageSocket<ToolMessage> = MessageSocket::new_client(TEST_SOCKET, "abcd");
        assert!(server.is_server());

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        let _ = tokio::spawn(async move {
            let _ = server
                .listen(|m| {
                    let counter = counter.clone();
                    async move {
                        assert_eq!(m, ToolMessage::LiveStatus(LiveStatusSnapshot::default()));
                        let _ = counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        });
        sleep(Duration::from_secs(1)).await;
        client
            .send(&ToolMessage::LiveStatus(LiveStatusSnapshot::default()))
            .await?;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);

        Ok(())
    }
}
