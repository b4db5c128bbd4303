//! Content-Length framing and JSON-RPC message model.
//!
//! Every message on the wire is a header block followed by a JSON body:
//!
//! ```text
//! Content-Length: <decimal byte count>\r\n
//! \r\n
//! <body>
//! ```
//!
//! The header name is matched case-insensitively and any other headers are
//! ignored. [`FrameReader`] yields whole, classified [`Message`]s from a
//! blocking stream; [`FrameWriter`] writes each message as one contiguous
//! frame. With the `async` feature, [`LspCodec`] plugs the same framing
//! into `tokio_util::codec`.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use codec::LspCodec;
pub use codec::{
    decode_frame, encode_frame, encode_message, FrameConfig, DEFAULT_MAX_HEADER,
    DEFAULT_MAX_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use message::{
    error_codes, Message, Notification, Request, RequestId, Response, ResponseError,
    JSONRPC_VERSION,
};
pub use reader::{FrameReader, Messages};
pub use writer::FrameWriter;
