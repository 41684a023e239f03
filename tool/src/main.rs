#![forbid(unsafe_code)]

use anyhow::{bail, Result};
use bililivedata_common::{
    config::{ConfigFile, Settings, CONFIG_FILE_PATH},
    file_exist,
    message::{DataCenterMessage, MessageSocket, ToolMessage, DATA_CENTER_SOCKET, TOOL_PASSWORD, TOOL_SOCKET},
};
use once_cell::sync::Lazy;
use rpassword::read_password_from_tty;
use std::{path::PathBuf, sync::Arc, time::Duration};
use structopt::StructOpt;
use tokio::{fs, sync::Mutex, time};

const SLEEP: Duration = Duration::from_secs(2);
const SERVER_RUN_TIME: Duration = Duration::from_secs(10);
const MASK: &str = "******";

static NUM: Lazy<Arc<Mutex<usize>>> = Lazy::new(|| Arc::new(Mutex::new(0)));

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "bililivedata-tool", about = "A tool for bililivedata.")]
enum Opt {
    /// Encrypt a plain JSON settings file into the config file
    Init {
        #[structopt(parse(from_os_str), value_name("plain settings json"))]
        file: PathBuf,
    },
    /// Print the settings in the config file, secrets are masked
    Show,
    /// Ask the running data center for the live status of the primary room
    Status,
}

#[inline]
fn mask(value: &mut String) {
    if !value.is_empty() {
        *value = MASK.to_string();
    }
}

fn masked(mut settings: Settings) -> Settings {
    let cookies = &mut settings.cookies;
    for value in [
        &mut cookies.sessdata,
        &mut cookies.bili_jct,
        &mut cookies.dedeuserid_ckmd5,
        &mut cookies.sid,
        &mut cookies.device_fingerprint,
    ] {
        mask(value);
    }
    mask(&mut settings.smtp.pass);
    settings
}

fn read_password(prompt: &str) -> Result<String> {
    let password = read_password_from_tty(Some(prompt))?;
    if password.is_empty() {
        bail!("password is empty");
    }
    Ok(password)
}

async fn init(file: PathBuf) -> Result<()> {
    let content = fs::read(&file).await?;
    let settings: Settings = serde_json::from_slice(&content)?;
    let password = read_password("data center password: ")?;
    if read_password("confirm password: ")? != password {
        bail!("passwords don't match");
    }

    let mut config = ConfigFile::new(password, CONFIG_FILE_PATH.as_path());
    config.set_settings(settings);
    config.save().await?;
    println!("saved config in {}", CONFIG_FILE_PATH.display());

    Ok(())
}

async fn show() -> Result<()> {
    if !file_exist(&*CONFIG_FILE_PATH).await {
        bail!("config file {} doesn't exist", CONFIG_FILE_PATH.display());
    }
    let password = read_password("data center password: ")?;
    let config = ConfigFile::new_or_load(password, CONFIG_FILE_PATH.as_path()).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&masked(config.settings().clone()))?
    );

    Ok(())
}

async fn status() -> Result<()> {
    let password = read_password("data center password: ")?;

    let _ = tokio::spawn(async move {
        time::sleep(SLEEP).await;
        let client: MessageSocket<DataCenterMessage> =
            MessageSocket::new_client(DATA_CENTER_SOCKET, password);
        if let Err(e) = client.send(&DataCenterMessage::LiveStatus).await {
            println!("failed to send message to data center: {}", e);
        }
    });

    let server = async {
        let server: MessageSocket<ToolMessage> =
            MessageSocket::new_server(TOOL_SOCKET, TOOL_PASSWORD);
        server
            .listen(|m| async move {
                {
                    let mut num = NUM.lock().await;
                    *num += 1;
                }
                match m {
                    ToolMessage::LiveStatus(snapshot) => {
                        let status = if snapshot.status == 1 { "live" } else { "offline" };
                        println!("status: {} ({})", status, snapshot.status);
                        println!("live time: {}", snapshot.live_time);
                        println!("title: {}", snapshot.title);
                    }
                }
                Ok(())
            })
            .await
    };
    tokio::select! {
        Err(e) = server => {
            println!("server listen error: {}", e);
        }
        _ = time::sleep(SERVER_RUN_TIME) => {}
    }

    if *NUM.lock().await == 0 {
        println!("no reply from data center, maybe the password was wrong or the socket was timeout");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    match Opt::from_args() {
        Opt::Init { file } => init(file).await,
        Opt::Show => show().await,
        Opt::Status => status().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked() {
        let mut settings = Settings::default();
        settings.cookies.sessdata = "secret".to_string();
        settings.cookies.dedeuserid = "42".to_string();
        settings.smtp.pass = "pass".to_string();
        settings.smtp.user = "user".to_string();

        let masked = masked(settings);
        assert_eq!(masked.cookies.sessdata, MASK);
        assert_eq!(masked.cookies.dedeuserid, "42");
        assert_eq!(masked.cookies.bili_jct, "");
        assert_eq!(masked.smtp.pass, MASK);
        assert_eq!(masked.smtp.user, "user");
    }
}
