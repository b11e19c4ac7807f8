//! Broker connection configuration.

use std::fmt;
use std::time::Duration;

/// Reconnect policy for [`BusConnection`](super::BusConnection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Open attempts before giving up.
    pub max_attempts: u32,
    /// Pause after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling pause.
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// Pauses taken between consecutive attempts: one fewer than
    /// `max_attempts`, doubling from `initial_backoff` up to `max_backoff`.
    pub fn backoff_schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        let count = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.initial_backoff.min(self.max_backoff)), |prev| {
            Some(prev.saturating_mul(2).min(self.max_backoff))
        })
        .take(count)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Keeps the lock of the delivery being processed from expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRenewal {
    /// Pause between renewals. Must be shorter than the broker's lock
    /// duration.
    pub interval: Duration,
    /// No renewal is attempted once a delivery has been held this long.
    pub max_duration: Duration,
}

impl Default for LockRenewal {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_duration: Duration::from_secs(60),
        }
    }
}

/// Everything the broker client needs to reach its queue pair.
#[derive(Clone)]
pub struct BusConfig {
    /// Opaque broker endpoint and credentials. Never logged.
    pub connection_string: String,
    /// Queue requests are received from.
    pub inbound_queue: String,
    /// Queue replies are sent to.
    pub outbound_queue: String,
    pub retry: RetryConfig,
    /// Bound on joining the reconnect task during `stop`.
    pub stop_timeout: Duration,
    pub lock_renewal: LockRenewal,
    /// How long an acknowledgment waits for a reconnect to finish.
    pub ack_ready_timeout: Duration,
    /// Consecutive transient receive errors that trigger a reconnect.
    pub receive_error_threshold: u32,
    /// Long-poll duration of a single receive call.
    pub receive_wait: Duration,
    /// Pause after a transient receive error.
    pub receive_error_pause: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            inbound_queue: "inbound".to_string(),
            outbound_queue: "outbound".to_string(),
            retry: RetryConfig::default(),
            stop_timeout: Duration::from_secs(60),
            lock_renewal: LockRenewal::default(),
            ack_ready_timeout: Duration::from_secs(30),
            receive_error_threshold: 5,
            receive_wait: Duration::from_secs(1),
            receive_error_pause: Duration::from_millis(100),
        }
    }
}

impl fmt::Debug for BusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConfig")
            .field("connection_string", &"<redacted>")
            .field("inbound_queue", &self.inbound_queue)
            .field("outbound_queue", &self.outbound_queue)
            .field("retry", &self.retry)
            .field("stop_timeout", &self.stop_timeout)
            .field("lock_renewal", &self.lock_renewal)
            .field("ack_ready_timeout", &self.ack_ready_timeout)
            .field("receive_error_threshold", &self.receive_error_threshold)
            .field("receive_wait", &self.receive_wait)
            .field("receive_error_pause", &self.receive_error_pause)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
    }

    #[test]
    fn bus_config_defaults() {
        let config = BusConfig::default();
        assert!(config.connection_string.is_empty());
        assert_eq!(config.stop_timeout, Duration::from_secs(60));
        assert_eq!(config.lock_renewal.max_duration, Duration::from_secs(60));
        assert!(config.lock_renewal.interval < config.lock_renewal.max_duration);
        assert_eq!(config.receive_error_threshold, 5);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let secs: Vec<u64> = RetryConfig::default()
            .backoff_schedule()
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn single_attempt_has_no_backoff() {
        let config = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        assert_eq!(config.backoff_schedule().count(), 0);
    }

    #[test]
    fn debug_redacts_connection_string() {
        let config = BusConfig {
            connection_string: "Endpoint=sb://x;SharedAccessKey=secret".to_string(),
            ..BusConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
