use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::debug;

use super::{templates::reset_password_email, ResetMailer};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reset_ttl_minutes: i64,
    /// Bounds the whole send; lettre's own timeout only covers the connect.
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig, from: &str, reset_ttl_minutes: i64) -> anyhow::Result<Self> {
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid EMAIL_FROM address {from:?}"))?;

        let mut builder = if cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
                .context("smtp starttls relay")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host)
        }
        .port(cfg.port)
        .timeout(Some(Duration::from_secs(cfg.timeout_secs)));

        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            reset_ttl_minutes,
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

#[async_trait]
impl ResetMailer for SmtpMailer {
    async fn send_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()> {
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient address {to:?}"))?;
        let rendered = reset_password_email(reset_link, self.reset_ttl_minutes);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(rendered.subject)
            .multipart(MultiPart::alternative_plain_html(rendered.text, rendered.html))
            .context("build reset email")?;

        let response = tokio::time::timeout(self.timeout, self.transport.send(message))
            .await
            .map_err(|_| anyhow::anyhow!("smtp send timed out after {:?}", self.timeout))?
            .context("smtp send")?;
        debug!(code = %response.code(), "reset email accepted by relay");
        Ok(())
    }
}
