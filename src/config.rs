//! Server configuration.

use serde::Deserialize;

use crate::error::{EdgeStreamError, Result};
use crate::protocol::{ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::stream::DEFAULT_CHUNK_SIZE;
use crate::writer::WriterConfig;

/// Default number of sessions processed at the same time.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 10;

/// Default number of parts buffered between the reader and one session.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 64;

/// Tunables of a [`Server`](crate::Server).
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Worker pool size. Calls arriving while it is full are rejected.
    pub max_concurrent_sessions: usize,
    /// Maximum size of one outbound data chunk.
    pub chunk_size: usize,
    /// Parts queued per session before the reader waits.
    pub session_queue_capacity: usize,
    /// Largest accepted inbound frame payload.
    pub max_frame_payload: u32,
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            session_queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
            max_frame_payload: DEFAULT_MAX_PAYLOAD_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values a running server relies on.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_sessions == 0 {
            return Err(invalid("max_concurrent_sessions must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be at least 1"));
        }
        if self.session_queue_capacity == 0 {
            return Err(invalid("session_queue_capacity must be at least 1"));
        }
        if self.max_frame_payload > ABSOLUTE_MAX_PAYLOAD_SIZE {
            return Err(invalid(format!(
                "max_frame_payload {} exceeds {}",
                self.max_frame_payload, ABSOLUTE_MAX_PAYLOAD_SIZE
            )));
        }
        if self.writer.max_pending_frames == 0 || self.writer.channel_capacity == 0 {
            return Err(invalid("writer limits must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EdgeStreamError {
    EdgeStreamError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();

        assert_eq!(config.max_concurrent_sessions, 10);
        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.session_queue_capacity, 64);
        assert_eq!(config.max_frame_payload, DEFAULT_MAX_PAYLOAD_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ServerConfig::from_json(
            r#"{"chunk_size": 4096, "writer": {"backpressure_timeout": 100}}"#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.max_concurrent_sessions, 10);
        assert_eq!(
            config.writer.backpressure_timeout,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_zero_values_rejected() {
        let cases = [
            r#"{"chunk_size": 0}"#,
            r#"{"max_concurrent_sessions": 0}"#,
            r#"{"session_queue_capacity": 0}"#,
            r#"{"writer": {"channel_capacity": 0}}"#,
        ];
        for json in cases {
            let err = ServerConfig::from_json(json).unwrap_err();
            assert!(matches!(err, EdgeStreamError::Config(_)), "{json}");
        }
    }

    #[test]
    fn test_frame_payload_limit() {
        let config = ServerConfig {
            max_frame_payload: u32::MAX,
            ..ServerConfig::default()
        };
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("max_frame_payload"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            ServerConfig::from_json("{"),
            Err(EdgeStreamError::Json(_))
        ));
    }
}
