//! Background services running beside the request path.
//!
//! Welcome-mail delivery and expired-token cleanup live here; neither is
//! required for the correctness of authentication itself.

pub mod email_outbox;
pub mod email_service;
pub mod token_sweeper;
