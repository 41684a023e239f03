use anyhow::{bail, Result};
use bililivedata_common::config::SmtpSettings;
use lettre::{
    message::{header::ContentType, Attachment, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

const MAIL_QUEUE_SIZE: usize = 16;
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// 纯文本邮件
pub fn plain(from: &str, to: &str, subject: &str, body: String) -> Result<Message> {
    Ok(Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)?)
}

/// 带一个 xlsx 附件的邮件
pub fn with_xlsx(
    from: &str,
    to: &str,
    subject: &str,
    body: String,
    file_name: String,
    content: Vec<u8>,
) -> Result<Message> {
    Ok(Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body))
                .singlepart(
                    Attachment::new(file_name).body(content, ContentType::parse(XLSX_CONTENT_TYPE)?),
                ),
        )?)
}

#[derive(Debug)]
pub struct Mailer {
    settings: SmtpSettings,
    tx: mpsc::Sender<Message>,
}

impl Mailer {
    #[inline]
    pub fn new(settings: SmtpSettings) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(MAIL_QUEUE_SIZE);
        (Self { settings, tx }, rx)
    }

    #[inline]
    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// 465 端口用 SMTPS，其余用 STARTTLS
    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let settings = &self.settings;
        let builder = if settings.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
        };
        let builder = builder.port(settings.port);
        let builder = if settings.has_credentials() {
            builder.credentials(Credentials::new(
                settings.user.clone(),
                settings.pass.clone(),
            ))
        } else {
            builder
        };

        Ok(builder.build())
    }

    /// 直接发送
    pub async fn deliver(&self, message: Message) -> Result<()> {
        if !self.settings.has_sender() {
            bail!("smtp host or sender isn't configured");
        }
        let _ = self.transport()?.send(message).await?;

        Ok(())
    }

    /// 放到发送队列里，由 `worker` 发送
    pub fn submit(&self, message: Message) -> Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => bail!("mail queue is full"),
            Err(TrySendError::Closed(_)) => bail!("mail worker is gone"),
        }
    }
}

pub async fn worker(mailer: Arc<Mailer>, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        let subject = message
            .headers()
            .get_raw("Subject")
            .unwrap_or_default()
            .to_string();
        match mailer.deliver(message).await {
            Ok(()) => log::info!("sent mail: {}", subject),
            Err(e) => log::error!("failed to send mail {}: {}", subject, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() -> Result<()> {
        let message = plain("a@example.com", "b@example.com", "hello", "body".to_string())?;
        let formatted = String::from_utf8(message.formatted())?;
        assert!(formatted.contains("To: b@example.com"));
        assert!(plain("not an address", "b@example.com", "x", String::new()).is_err());

        Ok(())
    }

    #[test]
    fn test_with_xlsx() -> Result<()> {
        let message = with_xlsx(
            "a@example.com",
            "b@example.com",
            "report",
            "body".to_string(),
            "report.xlsx".to_string(),
            vec![1, 2, 3],
        )?;
        let formatted = String::from_utf8(message.formatted())?;
        assert!(formatted.contains(XLSX_CONTENT_TYPE));
        assert!(formatted.contains("report.xlsx"));

        Ok(())
    }

    #[tokio::test]
    async fn test_submit() -> Result<()> {
        let (mailer, mut rx) = Mailer::new(SmtpSettings::default());
        for _ in 0..MAIL_QUEUE_SIZE {
            mailer.submit(plain("a@example.com", "b@example.com", "x", String::new())?)?;
        }
        assert!(mailer
            .submit(plain("a@example.com", "b@example.com", "x", String::new())?)
            .is_err());
        assert!(rx.recv().await.is_some());

        assert!(mailer
            .deliver(plain("a@example.com", "b@example.com", "x", String::new())?)
            .await
            .is_err());

        Ok(())
    }
}
