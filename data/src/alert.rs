use crate::mail::{self, Mailer};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub const ALERT_SUBJECT: &str = "B站直播监听 Cookies 失效告警";

#[inline]
pub fn alert_body(log_line: &str) -> String {
    format!(
        "检测到 B 站直播消息 uid=0，疑似 SESSDATA Cookies 已失效。\n\n原始日志：{}\n请尽快检查并更新配置里的 cookies。",
        log_line
    )
}

/// Cookies 失效告警，整个进程只会触发一次
#[derive(Debug)]
pub struct CookieAlert {
    fired: AtomicBool,
    mailer: Arc<Mailer>,
}

impl CookieAlert {
    #[inline]
    pub fn new(mailer: Arc<Mailer>) -> Self {
        Self {
            fired: AtomicBool::new(false),
            mailer,
        }
    }

    #[inline]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// 第一次调用时返回 `true`，邮件放到发送队列里
    pub fn trigger(&self, log_line: &str) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        log::error!("{}, cookies may be expired", log_line);

        let smtp = self.mailer.settings();
        if !smtp.has_sender() || smtp.email_to.is_empty() {
            log::warn!("smtp host, email_from or email_to isn't configured, skip cookie alert mail");
            return true;
        }
        let result = mail::plain(
            &smtp.email_from,
            &smtp.email_to,
            ALERT_SUBJECT,
            alert_body(log_line),
        )
        .and_then(|message| self.mailer.submit(message));
        if let Err(e) = result {
            log::error!("failed to send cookie alert mail: {}", e);
        }

        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bililivedata_common::config::SmtpSettings;

    pub fn smtp() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".to_string(),
            port: 465,
            email_from: "from@example.com".to_string(),
            email_to: "to@example.com".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fire_once() {
        let (mailer, mut rx) = Mailer::new(smtp());
        let alert = CookieAlert::new(Arc::new(mailer));
        assert!(!alert.fired());
        let fired = (0..100)
            .filter(|_| alert.trigger("[1820703922] gift uid=0"))
            .count();
        assert_eq!(fired, 1);
        assert!(alert.fired());

        let message = rx.try_recv().unwrap();
        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("to@example.com"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fire_once_concurrently() {
        let (mailer, mut rx) = Mailer::new(smtp());
        let alert = Arc::new(CookieAlert::new(Arc::new(mailer)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alert = alert.clone();
                std::thread::spawn(move || alert.trigger("[1] user_toast uid=0"))
            })
            .collect();
        let fired = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|f| *f)
            .count();
        assert_eq!(fired, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_smtp_still_latches() {
        let (mailer, mut rx) = Mailer::new(SmtpSettings::default());
        let alert = CookieAlert::new(Arc::new(mailer));
        assert!(alert.trigger("[1] gift uid=0"));
        assert!(!alert.trigger("[1] gift uid=0"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_alert_body() {
        let body = alert_body("[1] gift uid=0");
        assert!(body.contains("uid=0"));
        assert!(body.contains("SESSDATA"));
        assert!(body.contains("[1] gift uid=0"));
    }
}
