//! Opaque token generation and expiry policy.

use crate::config::Config;
use crate::errors::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;

/// Number of random bytes behind every token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Fills a buffer with random bytes.
pub type EntropySource = dyn Fn(&mut [u8]) -> Result<(), rand::Error> + Send + Sync;

/// Issues random tokens and computes their expiry instants.
///
/// TTLs are captured when the generator is built, so later configuration
/// changes never affect tokens that were already issued.
#[derive(Clone)]
pub struct TokenGenerator {
    access_ttl: Duration,
    refresh_ttl: Duration,
    entropy: Arc<EntropySource>,
}

impl TokenGenerator {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access_ttl,
            refresh_ttl,
            entropy: Arc::new(|bytes: &mut [u8]| OsRng.try_fill_bytes(bytes)),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let access_ttl = Duration::try_minutes(config.access_token_ttl_minutes)
            .context("ACCESS_TOKEN_EXPIRY_MINUTES is out of range")?;
        let refresh_ttl = Duration::try_days(config.refresh_token_ttl_days)
            .context("REFRESH_TOKEN_EXPIRY_DAYS is out of range")?;
        Ok(Self::new(access_ttl, refresh_ttl))
    }

    /// Replaces the random source, letting tests pick the next token.
    #[cfg(test)]
    pub fn with_entropy<F>(mut self, entropy: F) -> Self
    where
        F: Fn(&mut [u8]) -> Result<(), rand::Error> + Send + Sync + 'static,
    {
        self.entropy = Arc::new(entropy);
        self
    }

    /// Returns a hex-encoded token read from the operating system's CSPRNG.
    ///
    /// # Errors
    /// `InternalError` if the entropy source fails.
    pub fn generate_token(&self) -> ServiceResult<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        (self.entropy)(&mut bytes).map_err(|e| {
            tracing::error!("Entropy source failure: {}", e);
            ServiceError::internal_error("failed to generate token")
        })?;
        Ok(hex::encode(bytes))
    }

    /// Expiry of an access token issued at `now`.
    ///
    /// Expiries are whole seconds so the stored value is exactly the
    /// instant handed out.
    pub fn access_token_expiry(&self, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
        expiry_after(now, self.access_ttl)
    }

    pub fn refresh_token_expiry(&self, now: DateTime<Utc>) -> ServiceResult<DateTime<Utc>> {
        expiry_after(now, self.refresh_ttl)
    }

    /// Access-token lifetime in seconds, as reported to clients.
    pub fn access_ttl_seconds(&self) -> u64 {
        self.access_ttl.num_seconds().max(0) as u64
    }
}

fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> ServiceResult<DateTime<Utc>> {
    now.trunc_subsecs(0)
        .checked_add_signed(ttl)
        .ok_or_else(|| ServiceError::internal_error("token expiry out of range"))
}
