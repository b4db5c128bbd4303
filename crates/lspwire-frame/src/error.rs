use crate::message::RequestId;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a header block or body.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The header block did not contain a `Content-Length` header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The `Content-Length` value is not a decimal byte count.
    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),

    /// A header line is not ASCII or has no `name: value` shape.
    #[error("invalid header line {0:?}")]
    InvalidHeader(String),

    /// No header terminator was found within the configured limit.
    #[error("header block exceeds {max} bytes without terminator")]
    HeaderTooLarge { max: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame body is not valid JSON.
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is JSON but not a JSON-RPC message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A response carried both `result` and `error`, or neither.
    #[error("ambiguous response{}: exactly one of result/error is required", display_id(.id))]
    AmbiguousResponse { id: Option<RequestId> },
}

impl FrameError {
    /// Whether the byte stream can no longer be trusted after this error.
    ///
    /// Body-level errors leave frame boundaries intact, so a reader can
    /// continue with the next frame. Everything else ends the stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            FrameError::Json(_) | FrameError::InvalidMessage(_) | FrameError::AmbiguousResponse { .. }
        )
    }
}

fn display_id(id: &Option<RequestId>) -> String {
    match id {
        Some(id) => format!(" for id {id}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
