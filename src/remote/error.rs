//! Remote service errors

use thiserror::Error;

/// Failures talking to the home-automation service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: String },

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Connection closed")]
    Closed,
}

impl RemoteError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// True if the failure is a transport problem worth retrying.
    /// Not-found, authentication and service errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Connect { .. } | RemoteError::Timeout { .. } | RemoteError::Closed
        )
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::protocol(format!("invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(RemoteError::Closed.is_retryable());
        assert!(RemoteError::Timeout { millis: 5000 }.is_retryable());
        assert!(!RemoteError::NotFound {
            entity_id: "light.x".to_string()
        }
        .is_retryable());
        assert!(!RemoteError::Auth {
            message: "bad token".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = RemoteError::Service {
            code: "invalid_format".to_string(),
            message: "bad data".to_string(),
        };
        assert_eq!(err.to_string(), "Service error invalid_format: bad data");
    }
}
