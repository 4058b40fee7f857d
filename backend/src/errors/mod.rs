//! Global application error types.
//!
//! `StoreError` is what the credential store reports; `ServiceError` is what the
//! session manager and request authenticator hand to the HTTP layer.

use thiserror::Error;
use validator::ValidationErrors;

/// Errors raised by the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (username, email or token string).
    #[error("{field} already exists")]
    Conflict { field: &'static str },

    #[error("Record not found")]
    NotFound,

    /// The token exists but its expiry instant has passed.
    #[error("Token expired")]
    Expired,

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let message = db_err.message();
                let field = if message.contains("users.username") {
                    "username"
                } else if message.contains("users.email") {
                    "email"
                } else {
                    "token"
                };
                return StoreError::Conflict { field };
            }
        }
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }
}

/// Service error surfaced to the boundary dispatcher.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} already exists: {identifier}")]
    AlreadyExists { entity: String, identifier: String },

    /// Bad credentials or an absent/expired token. Deliberately carries no detail.
    #[error("Authentication failed")]
    Authentication,

    #[error("Database error: {source}")]
    Database {
        #[from]
        source: anyhow::Error,
    },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn already_exists(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Flattens `validator` output into a single `Validation` error.
    pub fn from_validation(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();
        messages.sort();
        Self::validation(messages.join(", "))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field } => Self::already_exists("User", field),
            StoreError::NotFound => {
                tracing::debug!("Token rejected: not found");
                Self::Authentication
            }
            StoreError::Expired => {
                tracing::debug!("Token rejected: expired");
                Self::Authentication
            }
            StoreError::Database(source) => Self::Database {
                source: anyhow::Error::new(source),
            },
        }
    }
}
