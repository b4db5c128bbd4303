use std::time::Duration;

use lspwire_frame::{error_codes, FrameError, RequestId, ResponseError};
use serde_json::Value;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A message was rejected locally before reaching the stream.
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    /// The underlying stream failed or was closed by the peer.
    #[error("stream error: {0}")]
    Stream(String),

    /// No response arrived before the request deadline.
    #[error("request {id} timed out after {timeout:?}")]
    Timeout { id: RequestId, timeout: Duration },

    /// The session is not running (never started, shut down, or failed).
    #[error("session closed")]
    SessionClosed,

    /// The caller cancelled the request.
    #[error("request {id} cancelled")]
    Cancelled { id: RequestId },

    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(ResponseError),

    /// The pending table is full.
    #[error("too many pending requests (max {max})")]
    TooManyPending { max: usize },

    /// `start()` was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// The child process was spawned without a piped stdio handle.
    #[error("child process has no piped {0}")]
    MissingStdio(&'static str),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dispatch thread could not be spawned.
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failure returned by a method handler.
///
/// Converted into an `error` response for requests; logged for
/// notifications.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("handler error {code}: {message}")]
pub struct HandlerError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl HandlerError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `INVALID_PARAMS` error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    /// `INTERNAL_ERROR` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<HandlerError> for ResponseError {
    fn from(err: HandlerError) -> Self {
        ResponseError {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::invalid_params(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn handler_error_converts_to_response_error() {
        let err = HandlerError::internal("boom").with_data(json!({"detail": 1}));
        let resp: ResponseError = err.into();
        assert_eq!(resp.code, error_codes::INTERNAL_ERROR);
        assert_eq!(resp.message, "boom");
        assert_eq!(resp.data, Some(json!({"detail": 1})));
    }

    #[test]
    fn json_error_maps_to_invalid_params() {
        let json = serde_json::from_value::<u32>(json!("nope")).unwrap_err();
        let err: HandlerError = json.into();
        assert_eq!(err.code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn timeout_display_names_request() {
        let err = SessionError::Timeout {
            id: RequestId::Number(2),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "request 2 timed out after 5s");
    }
}
