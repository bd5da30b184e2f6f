use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::EmailConfig;

pub mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

/// Delivers password-reset links.
#[async_trait]
pub trait ResetMailer: Send + Sync {
    async fn send_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()>;
}

/// Development mailer: writes the link to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl ResetMailer for LogMailer {
    async fn send_reset(&self, to: &str, reset_link: &str) -> anyhow::Result<()> {
        info!(%to, %reset_link, "smtp not configured; password reset link logged");
        Ok(())
    }
}

pub fn mailer_from_config(
    cfg: &EmailConfig,
    reset_ttl_minutes: i64,
) -> anyhow::Result<Arc<dyn ResetMailer>> {
    match &cfg.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp, &cfg.from, reset_ttl_minutes)?;
            info!(host = %smtp.host, port = smtp.port, "smtp mailer configured");
            Ok(Arc::new(mailer))
        }
        None => Ok(Arc::new(LogMailer)),
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;
