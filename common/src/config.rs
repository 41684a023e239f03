use crate::{file_exist, DIRECTORY_PATH};
use anyhow::{bail, Result};
use encon::{Encryptable, Map, Password};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fs::Permissions,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tokio::fs;

const CONFIG_FILE: &str = "bililivedata.json";
const CONFIG_KEY: &str = "settings";

pub static CONFIG_FILE_PATH: Lazy<PathBuf> = Lazy::new(|| {
    let mut path = DIRECTORY_PATH.clone();
    path.push(CONFIG_FILE);
    path
});

/// B站登录 Cookies，空字段不会发送
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Cookies {
    pub sessdata: String,
    pub bili_jct: String,
    pub dedeuserid: String,
    pub dedeuserid_ckmd5: String,
    pub sid: String,
    pub buvid3: String,
    pub device_fingerprint: String,
}

impl Cookies {
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("SESSDATA", self.sessdata.as_str()),
            ("bili_jct", self.bili_jct.as_str()),
            ("DedeUserID", self.dedeuserid.as_str()),
            ("DedeUserID__ckMd5", self.dedeuserid_ckmd5.as_str()),
            ("sid", self.sid.as_str()),
            ("buvid3", self.buvid3.as_str()),
            ("deviceFingerprint", self.device_fingerprint.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
    }

    #[inline]
    pub fn names(&self) -> Vec<&'static str> {
        self.pairs().map(|(k, _)| k).collect()
    }

    /// `Cookie` 请求头
    #[inline]
    pub fn header(&self) -> String {
        self.pairs()
            .map(|(k, v)| format!("{}={}", k, v.trim()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// 登录用户的 uid，未登录时为 0
    #[inline]
    pub fn uid(&self) -> u64 {
        self.dedeuserid.trim().parse().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub email_from: String,
    pub email_to: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            user: String::new(),
            pass: String::new(),
            email_from: String::new(),
            email_to: String::new(),
        }
    }
}

impl SmtpSettings {
    #[inline]
    pub fn has_sender(&self) -> bool {
        !self.host.is_empty() && !self.email_from.is_empty()
    }

    #[inline]
    pub fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.pass.is_empty()
    }

    /// 465 端口走 SMTPS，其余端口走 STARTTLS
    #[inline]
    pub fn implicit_tls(&self) -> bool {
        self.port == 465
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    pub monitor_enabled: bool,
    /// 逗号分隔，覆盖默认的直播间列表
    pub room_ids: String,
    pub cookies: Cookies,
    pub smtp: SmtpSettings,
    pub guard_report_receiver: String,
}

impl Settings {
    #[inline]
    pub fn room_ids(&self) -> Vec<i64> {
        parse_room_ids(&self.room_ids)
    }

    #[inline]
    pub fn report_receiver(&self) -> &str {
        if self.guard_report_receiver.is_empty() {
            &self.smtp.email_to
        } else {
            &self.guard_report_receiver
        }
    }
}

pub fn parse_room_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// 用密码加密保存的配置文件
#[derive(Clone)]
pub struct ConfigFile<P> {
    settings: Settings,
    password: Password,
    path: P,
}

impl<P> ConfigFile<P> {
    #[inline]
    pub fn new(password: impl Into<String>, path: P) -> Self {
        Self {
            settings: Settings::default(),
            password: Password::new(password),
            path,
        }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn encrypt(&self) -> Result<String> {
        let mut map = Map::new();
        let _ = map.insert(
            CONFIG_KEY,
            Encryptable::Plain(serde_json::to_value(&self.settings)?).with_intent_encrypted(),
        );
        if let Err(e) = map.apply_all_intents(&self.password) {
            bail!("failed to encrypt config: {}", e);
        }

        Ok(map.to_json_compact()?)
    }

    pub fn decrypt<'a>(&mut self, encrypted: impl Into<Cow<'a, str>>) -> Result<()> {
        let mut map: Map = serde_json::from_str(&encrypted.into())?;
        if let Err(e) = map.decrypt_all_in_place(&self.password) {
            bail!("failed to decrypt config: {}", e);
        }
        match map.remove(CONFIG_KEY).map(|i| i.into_inner()) {
            Some(Encryptable::Plain(value)) => {
                self.settings = serde_json::from_value(value)?;
                Ok(())
            }
            Some(_) => bail!("`{}` in config is not plain", CONFIG_KEY),
            None => bail!("failed to get `{}` field in the config map", CONFIG_KEY),
        }
    }
}

impl<P: AsRef<Path>> ConfigFile<P> {
    #[inline]
    pub async fn save(&self) -> Result<()> {
        let encrypted = self.encrypt()?;
        fs::write(&self.path, encrypted).await?;
        fs::set_permissions(&self.path, Permissions::from_mode(0o600)).await?;

        Ok(())
    }

    /// 配置文件不存在时使用默认配置
    pub async fn new_or_load(password: impl Into<String>, path: P) -> Result<Self> {
        let mut config = Self::new(password, path);
        if file_exist(&config.path).await {
            let content = fs::read(&config.path).await?;
            config.decrypt(String::from_utf8_lossy(&content))?;
        } else {
            log::warn!(
                "config file {} doesn't exist, use default settings",
                config.path.as_ref().display()
            );
        }

        Ok(config)
    }
}
