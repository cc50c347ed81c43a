use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::jwt::TokenService;
use crate::auth::repo::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use crate::auth::services::AuthService;
use crate::config::AppConfig;
use crate::notify::{LogNotifier, Notifier, SmtpNotifier};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgCredentialStore::new(db)) as Arc<dyn CredentialStore>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory credential store");
                Arc::new(MemoryCredentialStore::new()) as Arc<dyn CredentialStore>
            }
        };

        let notifier = match &config.mail {
            Some(mail) => {
                info!(host = %mail.smtp_host, port = mail.smtp_port, "smtp notifier enabled");
                Arc::new(SmtpNotifier::new(mail)?) as Arc<dyn Notifier>
            }
            None => {
                warn!("EMAIL_USER/EMAIL_PASS not set; reset links will only be logged");
                Arc::new(LogNotifier) as Arc<dyn Notifier>
            }
        };

        Self::from_parts(config, store, notifier)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let tokens = TokenService::from_config(&config.jwt).context("token settings")?;
        let auth = AuthService::new(
            store,
            notifier,
            tokens,
            config.app_base_url.clone(),
            config.reset_single_use,
        );
        Ok(Self {
            config,
            auth: Arc::new(auth),
        })
    }

    #[cfg(test)]
    pub fn fake(notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(AppConfig {
            listen_addr: ([127, 0, 0, 1], 0).into(),
            database_url: None,
            max_connections: 1,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                session_ttl_minutes: None,
                reset_ttl_minutes: 60,
            },
            mail: None,
            app_base_url: "http://localhost:8080".into(),
            reset_single_use: true,
            cors_origin: None,
        });
        Self::from_parts(config, Arc::new(MemoryCredentialStore::new()), notifier)
            .expect("test state")
    }
}
