//! Central module for application-wide configuration settings.
//!
//! Every policy parameter (database location, token lifetimes, hashing cost,
//! SMTP settings) is resolved here once at startup and then handed to the
//! components that need it. Business logic never reads the environment.

use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;

/// Upper bound on access-token lifetime (one year).
const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 60 * 24 * 365;
/// Upper bound on refresh-token lifetime (ten years).
const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 365 * 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub server_port: u16,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub token_sweep_interval_seconds: u64,
    pub email_queue_capacity: usize,
    /// `None` when `SMTP_HOST` is not set; welcome mails are then only logged.
    pub email: Option<EmailConfig>,
}

/// SMTP settings for outbound notifications.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

impl Config {
    /// Loads configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };

        let database_url = source.string_or("DATABASE_URL", "sqlite://authgate.db?mode=rwc");
        let max_connections = source.parse_or("DB_MAX_CONNECTIONS", 5u32)?;
        let acquire_timeout_seconds = source.parse_or("DB_ACQUIRE_TIMEOUT_SECONDS", 3u64)?;
        let server_port = source.parse_or("SERVER_PORT", 3000u16)?;

        let access_token_ttl_minutes = source.parse_or("ACCESS_TOKEN_EXPIRY_MINUTES", 30i64)?;
        if !(1..=MAX_ACCESS_TOKEN_EXPIRY_MINUTES).contains(&access_token_ttl_minutes) {
            bail!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be between 1 and {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            );
        }

        let refresh_token_ttl_days = source.parse_or("REFRESH_TOKEN_EXPIRY_DAYS", 30i64)?;
        if !(1..=MAX_REFRESH_TOKEN_EXPIRY_DAYS).contains(&refresh_token_ttl_days) {
            bail!(
                "REFRESH_TOKEN_EXPIRY_DAYS must be between 1 and {}",
                MAX_REFRESH_TOKEN_EXPIRY_DAYS
            );
        }

        let bcrypt_cost = source.parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31");
        }

        let token_sweep_interval_seconds = source.parse_or("TOKEN_SWEEP_INTERVAL_SECONDS", 0u64)?;

        let email_queue_capacity = source.parse_or("EMAIL_QUEUE_CAPACITY", 100usize)?;
        if email_queue_capacity == 0 {
            bail!("EMAIL_QUEUE_CAPACITY must be greater than zero");
        }

        let email = match source.get("SMTP_HOST") {
            Some(smtp_host) => Some(EmailConfig {
                smtp_host,
                smtp_port: source.parse_or("SMTP_PORT", 587u16)?,
                smtp_username: source.string_or("SMTP_USERNAME", ""),
                smtp_password: source.string_or("SMTP_PASSWORD", ""),
                from_email: source
                    .get("SMTP_FROM_EMAIL")
                    .context("SMTP_FROM_EMAIL not set")?,
                from_name: source.string_or("SMTP_FROM_NAME", "GopherIt"),
            }),
            None => None,
        };

        Ok(Config {
            database_url,
            max_connections,
            acquire_timeout_seconds,
            server_port,
            access_token_ttl_minutes,
            refresh_token_ttl_days,
            bcrypt_cost,
            token_sweep_interval_seconds,
            email_queue_capacity,
            email,
        })
    }

    /// Builds a configuration from a fixed set of key/value pairs.
    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_source(|key| map.get(key).cloned())
    }
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a valid number")),
            None => Ok(default),
        }
    }
}
