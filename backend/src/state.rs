//! Request-independent state shared by every handler.

use crate::auth::tokens::TokenGenerator;
use crate::config::Config;
use crate::services::email_outbox::EmailOutbox;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub tokens: TokenGenerator,
    pub outbox: EmailOutbox,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, outbox: EmailOutbox) -> anyhow::Result<Self> {
        let tokens = TokenGenerator::from_config(&config)?;
        Ok(Self {
            pool,
            config: Arc::new(config),
            tokens,
            outbox,
        })
    }
}

/// State over a fresh in-memory database, with the outbox receiver handed
/// back so tests can inspect queued mail.
#[cfg(test)]
pub async fn test_state() -> (
    AppState,
    tokio::sync::mpsc::Receiver<crate::services::email_outbox::OutgoingEmail>,
) {
    let config = Config::from_pairs(&[("BCRYPT_COST", "4")]).expect("test config");
    let (outbox, receiver) = EmailOutbox::channel(config.email_queue_capacity);
    let pool = crate::database::test_pool().await;
    let state = AppState::new(pool, config, outbox).expect("test state");
    (state, receiver)
}
