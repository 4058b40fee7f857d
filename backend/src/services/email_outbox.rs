//! Bounded outbox decoupling notification delivery from the request path.
//!
//! Request handlers call [`EmailOutbox::enqueue`], which never waits; a
//! separate worker task drains the queue and talks to the transport.

use crate::services::email_service::EmailTransport;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn welcome(to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Welcome to GopherIt!".to_string(),
            body: "Thanks for signing up!".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailOutbox {
    sender: Sender<OutgoingEmail>,
}

impl EmailOutbox {
    /// Creates an outbox and the receiving end its worker consumes.
    pub fn channel(capacity: usize) -> (Self, Receiver<OutgoingEmail>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Queues a message without blocking. Returns whether it was accepted.
    pub fn enqueue(&self, email: OutgoingEmail) -> bool {
        match self.sender.try_send(email) {
            Ok(()) => true,
            Err(TrySendError::Full(email)) => {
                warn!("Email outbox full, dropping '{}' for {}", email.subject, email.to);
                false
            }
            Err(TrySendError::Closed(email)) => {
                warn!("Email outbox closed, dropping '{}' for {}", email.subject, email.to);
                false
            }
        }
    }
}

/// Spawns the task that delivers queued messages. Delivery failures are
/// logged and the worker moves on to the next message.
pub fn spawn_email_worker(
    mut receiver: Receiver<OutgoingEmail>,
    transport: Arc<dyn EmailTransport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(email) = receiver.recv().await {
            match transport.send(&email.to, &email.subject, &email.body).await {
                Ok(()) => info!("Sent '{}' to {}", email.subject, email.to),
                Err(e) => error!("Failed to send '{}' to {}: {}", email.subject, email.to, e),
            }
        }
        info!("Email worker stopped");
    })
}
