mod alert;
mod captain;
mod config;
mod gift;
mod guard;
mod handler;
mod lifecycle;
mod mail;
mod pool;
mod reconnect;
mod room;
mod session;
mod socket;
mod sql;
mod sqlite;
mod status;

use anyhow::{bail, Result};
use bililivedata_common::{config::CONFIG_FILE_PATH, database::BILI_LIVE_DATABASE};
use rpassword::read_password_from_tty;
use std::sync::Arc;

const WORKER_THREAD_NUM: usize = 4;
const MAX_BLOCKING_THREAD: usize = 512;

fn main() -> Result<()> {
    env_logger::builder()
        .filter(Some("bililivedata_common"), log::LevelFilter::Trace)
        .filter(Some("bililivedata"), log::LevelFilter::Trace)
        .init();

    let password = read_password_from_tty(Some("data center password: "))?;
    if password.is_empty() {
        bail!("password is empty");
    }

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(WORKER_THREAD_NUM)
        .thread_name("bililivedata worker")
        .enable_all()
        .max_blocking_threads(MAX_BLOCKING_THREAD)
        .build()?
        .block_on(async {
            let config =
                config::LiveConfig::new_or_load(password.clone(), CONFIG_FILE_PATH.as_path())
                    .await?;
            sqlite::create_db_dir().await?;

            let monitor = Arc::new(lifecycle::Monitor::new(config.settings().clone()));
            monitor.bootstrap(BILI_LIVE_DATABASE.as_path()).await?;

            tokio::select! {
                _ = socket::message(password, monitor.clone()) => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => log::info!("received ctrl-c, shutting down"),
                    Err(e) => log::error!("failed to listen ctrl-c: {}", e),
                },
            }
            monitor.shutdown().await;

            Ok::<_, anyhow::Error>(())
        })
}
