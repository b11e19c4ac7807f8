//! Broker transport primitive: queue senders and peek-lock receivers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

/// Content type attached to every outbound payload.
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Identifies one locked delivery of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub Uuid);

impl LockToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message delivered under a peek-lock. It stays on the queue until
/// completed with its `lock_token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub lock_token: LockToken,
    /// 1 on first delivery, incremented on each redelivery.
    pub delivery_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: String,
    pub content_type: String,
}

impl OutboundMessage {
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: JSON_CONTENT_TYPE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A failure the broker is expected to recover from (timeouts, throttling,
    /// dropped links).
    #[error("transient transport failure: {0}")]
    Transient(String),
    /// A failure that will not go away without operator action (bad
    /// credentials, missing queue).
    #[error("transport failure: {0}")]
    Fatal(String),
    #[error("lock {0} is no longer held")]
    LockLost(LockToken),
    #[error("handle for queue '{queue}' is closed")]
    Closed { queue: String },
    #[error("gave up connecting after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl TransportError {
    /// Whether the operation may succeed if retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::LockLost(_) | Self::Closed { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait QueueSender: Send + Sync {
    fn queue_name(&self) -> &str;

    async fn send(&self, message: OutboundMessage) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait QueueReceiver: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Waits up to `max_wait` for the next message and locks it.
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn receive(&self, max_wait: Duration) -> Result<Option<ReceivedMessage>, TransportError>;

    /// Removes a locked message from the queue.
    async fn complete(&self, lock_token: LockToken) -> Result<(), TransportError>;

    /// Restarts the lock duration of a message that is still locked.
    async fn renew_lock(&self, lock_token: LockToken) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Opens queue handles against a broker namespace.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn open_sender(
        &self,
        connection_string: &str,
        queue: &str,
    ) -> Result<Arc<dyn QueueSender>, TransportError>;

    async fn open_receiver(
        &self,
        connection_string: &str,
        queue: &str,
    ) -> Result<Arc<dyn QueueReceiver>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransportError::Transient("timeout".into()).is_transient());
        assert!(TransportError::LockLost(LockToken::new()).is_transient());
        assert!(TransportError::Closed { queue: "q".into() }.is_transient());
        assert!(!TransportError::Fatal("unauthorized".into()).is_transient());
        assert!(!TransportError::RetriesExhausted {
            attempts: 10,
            last_error: "timeout".into()
        }
        .is_transient());
    }

    #[test]
    fn json_messages_carry_content_type() {
        let msg = OutboundMessage::json("{}");
        assert_eq!(msg.content_type, "application/json");
    }
}
