use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()>;
}

/// SMTP delivery over STARTTLS, one shared transport for the process.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .context("smtp relay")?
            .port(cfg.smtp_port);
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        let from = cfg.from.parse::<Mailbox>().context("parse MAIL_FROM")?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()> {
        let to = email.to.parse::<Mailbox>().context("parse recipient")?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .context("build email")?;

        match self.transport.send(message).await {
            Ok(res) => {
                info!(to = %email.to, code = %res.code(), "email sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, to = %email.to, "email send failed");
                Err(e).context("smtp send")
            }
        }
    }
}

/// Keeps every message in memory instead of delivering it.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `send` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("mail transport unavailable");
        }
        self.sent.lock().await.push(email);
        Ok(())
    }
}

/// The name and link are user controlled and escaped before templating.
pub fn verification_email(to: &str, full_name: &str, link: &str) -> OutboundEmail {
    let full_name = html_escape::encode_text(full_name);
    let link = html_escape::encode_double_quoted_attribute(link);
    OutboundEmail {
        to: to.to_string(),
        subject: "Verify your email address".into(),
        html: format!(
            "<p>Hi {full_name},</p>\
             <p>Please confirm your email address by clicking the link below:</p>\
             <p><a href=\"{link}\">Verify email</a></p>\
             <p>The link expires in 24 hours.</p>"
        ),
    }
}
