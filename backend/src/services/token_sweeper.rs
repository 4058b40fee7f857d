//! Periodic removal of expired tokens.
//!
//! Validation already rejects expired tokens on its own; this task only keeps
//! the token tables from growing without bound.

use crate::repositories::token_repository::TokenRepository;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub fn spawn_token_sweeper(pool: SqlitePool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            sweep_once(&pool).await;
        }
    })
}

pub async fn sweep_once(pool: &SqlitePool) -> u64 {
    match TokenRepository::new(pool).delete_expired_tokens(Utc::now()).await {
        Ok(removed) => {
            debug!("Token sweep removed {} expired tokens", removed);
            removed
        }
        Err(e) => {
            error!("Token sweep failed: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::CreateUser;
    use crate::database::test_pool;
    use crate::repositories::user_repository::UserRepository;

    #[tokio::test]
    async fn test_sweep_removes_only_expired_tokens() {
        let pool = test_pool().await;
        let user = UserRepository::new(&pool)
            .create_user(CreateUser {
                username: "alice".into(),
                email: "alice@x.com".into(),
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let repo = TokenRepository::new(&pool);
        let now = Utc::now();
        repo.create_access_token(&user.id, "stale", now - chrono::Duration::hours(1))
            .await
            .unwrap();
        repo.create_access_token(&user.id, "live", now + chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(sweep_once(&pool).await, 1);
        assert!(repo.find_user_id_by_access_token("live", now).await.is_ok());
    }
}
