use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Header terminator: an empty line after the last header.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Name of the only required header (matched case-insensitively).
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum size of the header block: 8 KiB.
pub const DEFAULT_MAX_HEADER: usize = 8 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum header block size in bytes. Default: 8 KiB.
    pub max_header_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_header_size: DEFAULT_MAX_HEADER,
        }
    }
}

/// Encode a body into the wire format.
///
/// Wire format:
/// ```text
/// Content-Length: <N>\r\n
/// \r\n
/// <N bytes of UTF-8 JSON>
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) {
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
    dst.reserve(header.len() + body.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(body);
}

/// Serialize a message and append its frame to `dst`.
pub fn encode_message(message: &Message, dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let body = message.to_vec()?;
    if body.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: max_payload,
        });
    }
    encode_frame(&body, dst);
    Ok(())
}

/// Decode one frame body from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the header block and body from the buffer. Errors
/// from here are header errors and leave the buffer untouched.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Bytes>> {
    let Some(header_len) = find_terminator(src) else {
        if src.len() > config.max_header_size + HEADER_TERMINATOR.len() {
            return Err(FrameError::HeaderTooLarge {
                max: config.max_header_size,
            });
        }
        return Ok(None);
    };

    if header_len > config.max_header_size {
        return Err(FrameError::HeaderTooLarge {
            max: config.max_header_size,
        });
    }

    let body_len = parse_content_length(&src[..header_len])?;
    if body_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: config.max_payload_size,
        });
    }

    let body_start = header_len + HEADER_TERMINATOR.len();
    if src.len() < body_start + body_len {
        return Ok(None);
    }

    src.advance(body_start);
    Ok(Some(src.split_to(body_len).freeze()))
}

fn find_terminator(src: &[u8]) -> Option<usize> {
    src.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

/// Extract `Content-Length` from a header block (without terminator).
///
/// Unknown headers are ignored. If the header repeats, the last one wins.
pub fn parse_content_length(block: &[u8]) -> Result<usize> {
    let mut content_length = None;

    for line in block.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if !line.is_ascii() {
            return Err(FrameError::InvalidHeader(
                String::from_utf8_lossy(line).into_owned(),
            ));
        }
        // ASCII checked above.
        let line = std::str::from_utf8(line)
            .map_err(|_| FrameError::InvalidHeader(String::from_utf8_lossy(line).into_owned()))?;
        let Some((name, value)) = line.split_once(':') else {
            return Err(FrameError::InvalidHeader(line.to_string()));
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let parsed = value
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
            content_length = Some(parsed);
        }
    }

    content_length.ok_or(FrameError::MissingContentLength)
}

#[cfg(feature = "async")]
pub use self::async_codec::LspCodec;

#[cfg(feature = "async")]
mod async_codec {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{decode_frame, encode_message, FrameConfig};
    use crate::error::{FrameError, Result};
    use crate::message::Message;

    /// `tokio_util` codec for Content-Length framed JSON-RPC.
    ///
    /// Items are `Result<Message>`: a body that fails to parse is yielded as
    /// an `Err` item and the stream continues with the next frame. Only
    /// header and I/O failures end a `FramedRead`.
    #[derive(Debug, Clone, Default)]
    pub struct LspCodec {
        config: FrameConfig,
    }

    impl LspCodec {
        /// Create a codec with default limits.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a codec with explicit limits.
        pub fn with_config(config: FrameConfig) -> Self {
            Self { config }
        }
    }

    impl Decoder for LspCodec {
        type Item = Result<Message>;
        type Error = FrameError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
            Ok(decode_frame(src, &self.config)?.map(|body| Message::from_slice(&body)))
        }

        fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>> {
            match self.decode(buf)? {
                Some(item) => Ok(Some(item)),
                None if buf.is_empty() => Ok(None),
                None => Err(FrameError::ConnectionClosed),
            }
        }
    }

    impl Encoder<Message> for LspCodec {
        type Error = FrameError;

        fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
            encode_message(&item, dst, self.config.max_payload_size)
        }
    }

    impl Encoder<&Message> for LspCodec {
        type Error = FrameError;

        fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<()> {
            encode_message(item, dst, self.config.max_payload_size)
        }
    }
}
