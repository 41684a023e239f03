use crate::lifecycle::Monitor;
use bililivedata_common::message::{
    send_tool_message, DataCenterMessage, MessageSocket, ToolMessage, DATA_CENTER_SOCKET,
};
use std::{sync::Arc, time::Duration};
use tokio::time;

const RELISTEN_INTERVAL: Duration = Duration::from_secs(1);

/// 回复 tool 的查询
pub async fn message(password: String, monitor: Arc<Monitor>) {
    let server: MessageSocket<DataCenterMessage> =
        MessageSocket::new_server(DATA_CENTER_SOCKET, password);

    loop {
        if let Err(e) = server
            .listen(|m| {
                let monitor = monitor.clone();
                async move {
                    match m {
                        DataCenterMessage::LiveStatus => {
                            let snapshot = monitor.snapshot();
                            log::debug!("tool asked for live status: {:?}", snapshot);
                            send_tool_message(&ToolMessage::LiveStatus(snapshot)).await;
                        }
                    }
                    Ok(())
                }
            })
            .await
        {
            log::error!("failed to listen socket: {}", e);
        }
        time::sleep(RELISTEN_INTERVAL).await;
    }
}
