//! Credential store: persistence for users and their session tokens.

pub mod token_repository;
pub mod user_repository;
