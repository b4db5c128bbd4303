//! JSON-RPC session over a pair of Content-Length framed byte streams.
//!
//! A [`Session`] owns the outgoing writer, one dispatch thread reading the
//! incoming stream, a table of requests awaiting responses, and a registry
//! of handlers for requests and notifications initiated by the peer. It
//! does not spawn or supervise processes; callers hand it the two streams
//! (or a [`std::process::Child`] with piped stdio).

pub mod config;
pub mod error;
pub mod handler;
mod pending;
pub mod session;
pub mod state;

pub use config::{SessionConfig, CANCEL_REQUEST_METHOD, DEFAULT_MAX_PENDING, DEFAULT_THREAD_NAME};
pub use error::{HandlerError, Result, SessionError};
pub use handler::{Handler, HandlerResult};
pub use session::{PendingRequest, Session};
pub use state::SessionState;
