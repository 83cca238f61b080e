use thiserror::Error;

/// Errors that can occur when talking to the remote directory.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The operation did not finish within its deadline.
    #[error("Timed out")]
    Timeout,

    /// Connection-level failure (reset, abort, refused).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Name resolution failure.
    #[error("DNS error: {message}")]
    Dns { message: String },

    /// The in-flight request was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// The remote returned a well-formed error response.
    #[error("API error: {message}")]
    Api { message: String },

    /// The response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl RemoteError {
    /// Create a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a DNS error.
    #[inline]
    pub fn dns(message: impl Into<String>) -> Self {
        Self::Dns {
            message: message.into(),
        }
    }

    /// Create an API error.
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether retrying the same request later could plausibly succeed.
    ///
    /// Transport-level failures are transient; a well-formed API rejection
    /// or an undecodable body will not improve on retry.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection { .. } | Self::Dns { .. } | Self::Cancelled
        )
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which is useful for errors
/// that include backtraces or multi-line details.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for remote directory operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
