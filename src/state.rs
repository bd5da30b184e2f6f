use std::sync::Arc;

use sqlx::PgPool;
use time::Duration;

use crate::auth::clock::SystemClock;
use crate::auth::repo::{CredentialStore, PgCredentialStore};
use crate::auth::{CredentialService, ResetSettings};
use crate::config::AppConfig;
use crate::email::{mailer_from_config, ResetMailer};
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub credentials: CredentialService,
}

fn reset_settings(config: &AppConfig) -> ResetSettings {
    ResetSettings {
        base_url: config.app_base_url.clone(),
        ttl: Duration::seconds(config.reset_token_ttl_secs),
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database_url).await?;

        let store = Arc::new(PgCredentialStore::new(db.clone())) as Arc<dyn CredentialStore>;
        let mailer = mailer_from_config(&config.email, config.reset_token_ttl_secs / 60)?;

        Ok(Self::from_parts(db, config, store, mailer))
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn ResetMailer>,
    ) -> Self {
        let credentials = CredentialService::new(
            store,
            mailer,
            Arc::new(SystemClock),
            reset_settings(&config),
        );
        Self {
            db,
            config,
            credentials,
        }
    }

    /// State over a lazily connecting pool that is never used, with the given
    /// store and mailer doing the real work.
    #[cfg(test)]
    pub fn fake(store: Arc<dyn CredentialStore>, mailer: Arc<dyn ResetMailer>) -> Self {
        let config = Arc::new(AppConfig::test());
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");
        Self::from_parts(db, config, store, mailer)
    }
}
