//! Transient user-facing notifications.
//!
//! Components publish success and error notices; whatever renders them
//! subscribes. Notices published with no subscriber are dropped.

use crate::error::MarketError;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_capacity(32)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        let _ = self.tx.send(Notice::Success(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        let _ = self.tx.send(Notice::Error(message.into()));
    }

    /// Publish the notice for an error, if it has one
    pub fn report(&self, err: &MarketError) {
        if let Some(message) = err.user_message() {
            self.error(message);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
