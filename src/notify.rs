use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::MailConfig;

/// Out-of-band delivery of password reset links.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()>;
}

pub fn reset_link(base_url: &str, token: &str) -> String {
    format!(
        "{}/users/reset-password?token={}",
        base_url.trim_end_matches('/'),
        token
    )
}

/// Keeps a short token prefix so log lines can be correlated, never the
/// whole bearer credential.
fn redact_token(link: &str) -> String {
    match link.split_once("token=") {
        Some((head, token)) => {
            let prefix: String = token.chars().take(8).collect();
            format!("{head}token={prefix}...")
        }
        None => link.to_string(),
    }
}

fn reset_text(link: &str) -> String {
    format!(
        "Hello, You requested to reset your password. Click the link below to reset it:\n\n{link}\n\nIf you did not request this, please ignore this email."
    )
}

pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .with_context(|| format!("invalid SMTP host {}", cfg.smtp_host))?
            .port(cfg.smtp_port)
            .credentials(creds)
            .build();
        let from = Mailbox::from_str(&cfg.username).context("EMAIL_USER is not a mailbox")?;
        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()> {
        let to_mailbox = Mailbox::from_str(to).context("invalid recipient email")?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_PLAIN)
            .body(reset_text(link))
            .context("build reset email")?;

        self.mailer.send(email).await.context("smtp send")?;
        info!(to = %to, "reset email sent");
        Ok(())
    }
}

/// Used when no mail credentials are configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()> {
        info!(
            to = %to,
            link = %redact_token(link),
            "mail transport not configured; reset link not delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures every link instead of sending it.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_reset_link(&self, to: &str, link: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("smtp unavailable");
            }
            self.sent.lock().unwrap().push((to.to_string(), link.to_string()));
            Ok(())
        }
    }
}
