//! Core business logic for the authentication system.
//!
//! Session state is never held in memory: a user is "logged in" exactly as
//! long as one of their tokens exists in the store and has not expired.

use crate::auth::models::*;
use crate::auth::tokens::TokenGenerator;
use crate::database::models::CreateUser;
use crate::errors::{ServiceError, ServiceResult, StoreError};
use crate::repositories::token_repository::{TokenKind, TokenRepository, insert_token_with};
use crate::repositories::user_repository::UserRepository;
use crate::services::email_outbox::{EmailOutbox, OutgoingEmail};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};
use validator::Validate;

/// A token collision on insert is retried this many times in total.
const TOKEN_INSERT_ATTEMPTS: u32 = 2;

/// Authentication service for signup, login, refresh, logout and token checks
pub struct AuthService<'a> {
    pool: &'a SqlitePool,
    tokens: &'a TokenGenerator,
    outbox: &'a EmailOutbox,
    bcrypt_cost: u32,
}

impl<'a> AuthService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self {
            pool: &state.pool,
            tokens: &state.tokens,
            outbox: &state.outbox,
            bcrypt_cost: state.config.bcrypt_cost,
        }
    }

    /// Registers a new user and queues the welcome email.
    ///
    /// # Errors
    /// - `Validation` for empty fields or a malformed email
    /// - `AlreadyExists` when the username or email is taken
    /// - `InternalError`/`Database` for hashing or store failures
    pub async fn signup(&self, request: SignupRequest) -> ServiceResult<UserInfo> {
        request.validate().map_err(ServiceError::from_validation)?;

        let password_hash = hash_password(request.password, self.bcrypt_cost).await?;

        let user = UserRepository::new(self.pool)
            .create_user(CreateUser {
                username: request.username,
                email: request.email,
                password_hash,
            })
            .await?;

        info!("User {} signed up ({})", user.username, user.id);

        // Delivery problems are the outbox's concern, never the caller's.
        self.outbox.enqueue(OutgoingEmail::welcome(&user.email));

        Ok(UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
        })
    }

    /// Verifies credentials and opens a new session.
    ///
    /// Unknown usernames and wrong passwords produce the same
    /// `Authentication` error.
    pub async fn login(&self, request: LoginRequest) -> ServiceResult<LoginResponse> {
        request.validate().map_err(ServiceError::from_validation)?;

        let Some(user) = UserRepository::new(self.pool)
            .get_user_by_username(&request.username)
            .await?
        else {
            debug!("Login failed: unknown user");
            return Err(ServiceError::Authentication);
        };

        if !verify_password(request.password, user.password_hash).await? {
            warn!("Login failed for user {}: wrong password", user.id);
            return Err(ServiceError::Authentication);
        }

        // Both tokens are stored together or not at all.
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(session_error)?;
        let access_token = self
            .issue_token(&mut tx, TokenKind::Access, &user.id, now)
            .await?;
        let refresh_token = self
            .issue_token(&mut tx, TokenKind::Refresh, &user.id, now)
            .await?;
        tx.commit().await.map_err(session_error)?;

        info!("User {} logged in", user.username);

        Ok(LoginResponse {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.access_ttl_seconds(),
        })
    }

    /// Issues a new access token for the owner of a valid refresh token.
    /// The refresh token itself is neither rotated nor extended.
    pub async fn refresh(
        &self,
        request: RefreshTokenRequest,
    ) -> ServiceResult<RefreshTokenResponse> {
        request.validate().map_err(ServiceError::from_validation)?;

        let now = Utc::now();
        let user_id = TokenRepository::new(self.pool)
            .find_user_id_by_refresh_token(&request.refresh_token, now)
            .await?;

        let mut conn = self.pool.acquire().await.map_err(session_error)?;
        let access_token = self
            .issue_token(&mut conn, TokenKind::Access, &user_id, now)
            .await?;
        info!("Issued refreshed access token for user {}", user_id);

        Ok(RefreshTokenResponse {
            access_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.access_ttl_seconds(),
        })
    }

    /// Revokes every access and refresh token of the account owning
    /// `access_token`.
    pub async fn logout(&self, access_token: &str) -> ServiceResult<()> {
        let user = self.authenticate(access_token).await?;

        let removed = TokenRepository::new(self.pool)
            .delete_all_tokens_for_user(&user.user_id)
            .await?;

        info!("User {} logged out, {} tokens revoked", user.user_id, removed);
        Ok(())
    }

    /// Resolves an access token to its owner without touching token state.
    pub async fn authenticate(&self, access_token: &str) -> ServiceResult<AuthenticatedUser> {
        let user_id = TokenRepository::new(self.pool)
            .find_user_id_by_access_token(access_token, Utc::now())
            .await?;
        Ok(AuthenticatedUser { user_id })
    }

    /// Profile of the authenticated user.
    pub async fn current_user(&self, user: &AuthenticatedUser) -> ServiceResult<UserInfo> {
        let user = UserRepository::new(self.pool)
            .get_user_by_id(&user.user_id)
            .await?
            .ok_or(ServiceError::Authentication)?;

        Ok(UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
        })
    }

    /// Generates and stores one token, regenerating once on collision.
    ///
    /// Called after credentials were already accepted, so every failure here
    /// is reported as `InternalError`.
    async fn issue_token(
        &self,
        conn: &mut SqliteConnection,
        kind: TokenKind,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let expires_at = match kind {
            TokenKind::Access => self.tokens.access_token_expiry(now)?,
            TokenKind::Refresh => self.tokens.refresh_token_expiry(now)?,
        };

        for attempt in 1..=TOKEN_INSERT_ATTEMPTS {
            let token = self.tokens.generate_token()?;
            let result = insert_token_with(&mut *conn, kind, user_id, &token, expires_at).await;

            match result {
                Ok(()) => return Ok(token),
                Err(StoreError::Conflict { .. }) => {
                    warn!("{:?} token collision for user {} (attempt {})", kind, user_id, attempt);
                }
                Err(e) => {
                    error!("Failed to persist {:?} token for user {}: {}", kind, user_id, e);
                    return Err(ServiceError::internal_error("failed to establish session"));
                }
            }
        }

        Err(ServiceError::internal_error("failed to establish session"))
    }
}

fn session_error(e: sqlx::Error) -> ServiceError {
    error!("Session storage unavailable: {}", e);
    ServiceError::internal_error("failed to establish session")
}

/// Hashes a password with bcrypt on the blocking pool.
async fn hash_password(password: String, cost: u32) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::internal_error(format!("Password hashing task failed: {e}")))?
        .map_err(|e| ServiceError::internal_error(format!("Password hashing failed: {e}")))
}

/// Verifies a password against a stored bcrypt hash on the blocking pool.
async fn verify_password(password: String, hash: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            ServiceError::internal_error(format!("Password verification task failed: {e}"))
        })?
        .map_err(|e| ServiceError::internal_error(format!("Password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::TOKEN_BYTES;
    use crate::state::test_state;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn signup_request(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn login_request(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Entropy that fills every token with the next byte of `script`,
    /// repeating the last one once the script runs out.
    fn scripted(script: &[u8]) -> impl Fn(&mut [u8]) -> Result<(), rand::Error> + Send + Sync + 'static {
        let script = script.to_vec();
        let calls = AtomicUsize::new(0);
        move |bytes: &mut [u8]| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            bytes.fill(script[call.min(script.len() - 1)]);
            Ok(())
        }
    }

    fn token_of(byte: u8) -> String {
        hex::encode([byte; TOKEN_BYTES])
    }

    async fn signed_up(state: &AppState) -> UserInfo {
        AuthService::new(state)
            .signup(signup_request("alice", "alice@x.com", "secret123"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        let user = signed_up(&state).await;

        let session = service.login(login_request("alice", "secret123")).await.unwrap();
        assert_ne!(session.access_token, session.refresh_token);
        assert_eq!(session.token_type, "Bearer");
        assert_eq!(session.expires_in, 1800);

        let resolved = service.authenticate(&session.access_token).await.unwrap();
        assert_eq!(resolved.user_id, user.id);
    }

    #[tokio::test]
    async fn test_password_is_stored_hashed() {
        let (state, _mail) = test_state().await;
        signed_up(&state).await;

        let stored = UserRepository::new(&state.pool)
            .get_user_by_username("alice")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash, "secret123");
        assert!(stored.password_hash.starts_with("$2"));
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);

        for request in [
            signup_request("", "alice@x.com", "secret123"),
            signup_request("alice", "", "secret123"),
            signup_request("alice", "alice@x.com", ""),
            signup_request("alice", "not-an-email", "secret123"),
        ] {
            let err = service.signup(request).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation { .. }), "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_signup_conflicts() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        signed_up(&state).await;

        let err = service
            .signup(signup_request("alice", "other@x.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }));

        let err = service
            .signup(signup_request("bob", "alice@x.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_signup_queues_welcome_email() {
        let (state, mut mail) = test_state().await;
        signed_up(&state).await;

        let email = mail.try_recv().unwrap();
        assert_eq!(email, OutgoingEmail::welcome("alice@x.com"));
    }

    #[tokio::test]
    async fn test_signup_succeeds_when_mail_cannot_be_queued() {
        let (state, mail) = test_state().await;
        drop(mail);
        signed_up(&state).await;
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        signed_up(&state).await;

        let wrong_password = service.login(login_request("alice", "nope")).await.unwrap_err();
        let unknown_user = service.login(login_request("mallory", "secret123")).await.unwrap_err();

        assert!(matches!(wrong_password, ServiceError::Authentication));
        assert!(matches!(unknown_user, ServiceError::Authentication));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_login_requires_fields() {
        let (state, _mail) = test_state().await;
        let err = AuthService::new(&state)
            .login(login_request("", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_refresh_round_trip() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        let user = signed_up(&state).await;
        let session = service.login(login_request("alice", "secret123")).await.unwrap();

        let refreshed = service
            .refresh(RefreshTokenRequest {
                refresh_token: session.refresh_token.clone(),
            })
            .await
            .unwrap();
        assert_ne!(refreshed.access_token, session.access_token);

        for token in [&session.access_token, &refreshed.access_token] {
            assert_eq!(service.authenticate(token).await.unwrap().user_id, user.id);
        }

        // The refresh token is not rotated and keeps working.
        service
            .refresh(RefreshTokenRequest {
                refresh_token: session.refresh_token,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rejects_unknown_and_access_tokens() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        signed_up(&state).await;
        let session = service.login(login_request("alice", "secret123")).await.unwrap();

        for refresh_token in ["deadbeef".to_string(), session.access_token] {
            let err = service
                .refresh(RefreshTokenRequest { refresh_token })
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Authentication));
        }
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_rejected() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        let user = signed_up(&state).await;
        TokenRepository::new(&state.pool)
            .create_refresh_token(&user.id, "stale", Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();

        let err = service
            .refresh(RefreshTokenRequest {
                refresh_token: "stale".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication));
    }

    #[tokio::test]
    async fn test_logout_revokes_every_session() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        signed_up(&state).await;
        let first = service.login(login_request("alice", "secret123")).await.unwrap();
        let second = service.login(login_request("alice", "secret123")).await.unwrap();

        service.logout(&first.access_token).await.unwrap();

        for token in [&first.access_token, &second.access_token] {
            assert!(matches!(
                service.authenticate(token).await,
                Err(ServiceError::Authentication)
            ));
        }
        let err = service
            .refresh(RefreshTokenRequest {
                refresh_token: second.refresh_token,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authentication));

        // Logging out again with the revoked token fails cleanly.
        let err = service.logout(&first.access_token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Authentication));
    }

    #[tokio::test]
    async fn test_concurrent_logins_issue_distinct_sessions() {
        let (state, _mail) = test_state().await;
        signed_up(&state).await;
        let service_a = AuthService::new(&state);
        let service_b = AuthService::new(&state);

        let (a, b) = tokio::join!(
            service_a.login(login_request("alice", "secret123")),
            service_b.login(login_request("alice", "secret123")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
        for token in [&a.access_token, &b.access_token] {
            assert!(service_a.authenticate(token).await.is_ok());
        }
        for refresh_token in [a.refresh_token, b.refresh_token] {
            assert!(service_a.refresh(RefreshTokenRequest { refresh_token }).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_current_user() {
        let (state, _mail) = test_state().await;
        let service = AuthService::new(&state);
        let user = signed_up(&state).await;

        let info = service
            .current_user(&AuthenticatedUser {
                user_id: user.id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(info.username, "alice");
        assert_eq!(info.email, "alice@x.com");
    }

    #[tokio::test]
    async fn test_login_regenerates_once_on_collision() {
        let (mut state, _mail) = test_state().await;
        let user = signed_up(&state).await;
        TokenRepository::new(&state.pool)
            .create_access_token(&user.id, &token_of(1), Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        state.tokens = state.tokens.clone().with_entropy(scripted(&[1, 2, 3]));

        let session = AuthService::new(&state)
            .login(login_request("alice", "secret123"))
            .await
            .unwrap();
        assert_eq!(session.access_token, token_of(2));
        assert_eq!(session.refresh_token, token_of(3));
    }

    #[tokio::test]
    async fn test_login_fails_after_second_collision() {
        let (mut state, _mail) = test_state().await;
        let user = signed_up(&state).await;
        TokenRepository::new(&state.pool)
            .create_access_token(&user.id, &token_of(1), Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        state.tokens = state.tokens.clone().with_entropy(scripted(&[1]));

        let err = AuthService::new(&state)
            .login(login_request("alice", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InternalError { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_failed_login_leaves_no_usable_token() {
        let (mut state, _mail) = test_state().await;
        let user = signed_up(&state).await;
        TokenRepository::new(&state.pool)
            .create_refresh_token(&user.id, &token_of(9), Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        // The access token stores fine, then the refresh token collides twice.
        state.tokens = state.tokens.clone().with_entropy(scripted(&[2, 9]));

        let service = AuthService::new(&state);
        let err = service
            .login(login_request("alice", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InternalError { .. }), "{err:?}");

        assert!(matches!(
            service.authenticate(&token_of(2)).await,
            Err(ServiceError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_refresh_fails_when_every_token_collides() {
        let (mut state, _mail) = test_state().await;
        signed_up(&state).await;
        let session = AuthService::new(&state)
            .login(login_request("alice", "secret123"))
            .await
            .unwrap();
        let taken = hex::decode(&session.access_token).unwrap();
        state.tokens = state.tokens.clone().with_entropy(move |bytes: &mut [u8]| {
            bytes.copy_from_slice(&taken);
            Ok(())
        });

        // Every candidate collides with the existing access token.
        let err = AuthService::new(&state)
            .refresh(RefreshTokenRequest {
                refresh_token: session.refresh_token,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InternalError { .. }), "{err:?}");
    }
}
