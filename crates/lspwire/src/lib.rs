//! Content-Length framed JSON-RPC sessions with long-lived worker processes.
//!
//! lspwire speaks the wire protocol of the Language Server Protocol family
//! over a pair of byte streams, usually a child process's stdin/stdout.
//!
//! # Crate Structure
//!
//! - [`frame`]: message model, Content-Length codec, blocking reader/writer,
//!   and a `tokio_util` codec behind the `async` feature
//! - [`session`]: request/response correlation, handler dispatch, and
//!   session lifecycle
//!
//! The most used types are re-exported at the root.

/// Re-export frame types.
pub mod frame {
    pub use lspwire_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use lspwire_session::*;
}

pub use lspwire_frame::{FrameError, Message, RequestId, ResponseError};
pub use lspwire_session::{
    HandlerError, PendingRequest, Session, SessionConfig, SessionError, SessionState,
};
