use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads Content-Length framed messages from any `Read` stream.
///
/// Handles partial reads internally, so callers always get complete messages.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next raw frame body (blocking).
    ///
    /// Returns `Ok(None)` when the stream ends on a frame boundary and
    /// `Err(FrameError::ConnectionClosed)` when it ends inside one.
    pub fn read_frame(&mut self) -> Result<Option<bytes::Bytes>> {
        loop {
            if let Some(body) = decode_frame(&mut self.buf, &self.config)? {
                return Ok(Some(body));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read and decode the next message (blocking).
    ///
    /// A body that is not a valid message yields a non-fatal error; the
    /// frame has already been consumed, so the next call starts cleanly on
    /// the following frame.
    pub fn read_message(&mut self) -> Result<Option<Message>> {
        match self.read_frame()? {
            Some(body) => Message::from_slice(&body).map(Some),
            None => Ok(None),
        }
    }

    /// Lazy sequence of decoded messages.
    ///
    /// Ends after a clean end of stream or after the first fatal error.
    /// Non-fatal errors are yielded and iteration continues.
    pub fn messages(&mut self) -> Messages<'_, T> {
        Messages {
            reader: self,
            done: false,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Iterator returned by [`FrameReader::messages`].
pub struct Messages<'a, T> {
    reader: &'a mut FrameReader<T>,
    done: bool,
}

impl<T: Read> Iterator for Messages<'_, T> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                if err.is_fatal() {
                    self.done = true;
                }
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use serde_json::json;

    use super::*;
    use crate::codec::{encode_frame, encode_message, DEFAULT_MAX_PAYLOAD};
    use crate::message::{RequestId, Response};

    fn wire(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for message in messages {
            encode_message(message, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(
            b"Content-Length: 27\r\n\r\n{\"id\":1,\"method\":\"version\"}".to_vec(),
        ));
        let msg = reader.read_message().unwrap().unwrap();
        assert_eq!(msg, Message::request(1, "version", None));
        assert!(reader.read_message().unwrap().is_none());
    }

    #[test]
    fn read_multiple_messages_in_order() {
        let sent = vec![
            Message::request(1, "a", None),
            Message::notification("b", Some(json!([1, 2]))),
            Message::Response(Response::ok(RequestId::Number(9), json!({"major": 1, "minor": 15}))),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire(&sent)));

        let got: Vec<Message> = reader.messages().map(|m| m.unwrap()).collect();
        assert_eq!(got, sent);
    }

    #[test]
    fn partial_read_handling() {
        let bytes = wire(&[Message::notification("slow", Some(json!({"k": "v"})))]);
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        let msg = reader.read_message().unwrap().unwrap();
        assert_eq!(msg.method(), Some("slow"));
    }

    #[test]
    fn clean_eof_ends_sequence() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_message().unwrap().is_none());
        assert_eq!(reader.messages().count(), 0);
    }

    #[test]
    fn eof_mid_body_is_connection_closed() {
        let mut reader = FrameReader::new(Cursor::new(b"Content-Length: 16\r\n\r\n{\"id\":".to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert!(err.is_fatal());
    }

    #[test]
    fn eof_mid_header_is_connection_closed() {
        let mut reader = FrameReader::new(Cursor::new(b"Content-Len".to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn malformed_json_resynchronizes() {
        let mut bytes = BytesMut::new();
        encode_frame(b"{\"id\":1,", &mut bytes);
        bytes.extend_from_slice(&wire(&[Message::request(2, "next", None)]));

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        let items: Vec<Result<Message>> = reader.messages().collect();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(FrameError::Json(_))));
        assert_eq!(
            items[1].as_ref().unwrap(),
            &Message::request(2, "next", None)
        );
    }

    #[test]
    fn ambiguous_response_is_skipped_not_fatal() {
        let mut bytes = BytesMut::new();
        encode_frame(br#"{"id":3}"#, &mut bytes);
        bytes.extend_from_slice(&wire(&[Message::notification("after", None)]));

        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        let first = reader.read_message().unwrap_err();
        assert!(matches!(
            first,
            FrameError::AmbiguousResponse { id: Some(RequestId::Number(3)) }
        ));
        let second = reader.read_message().unwrap().unwrap();
        assert_eq!(second.method(), Some("after"));
    }

    #[test]
    fn missing_content_length_stops_sequence() {
        let mut bytes = b"Content-Type: application/json\r\n\r\n{}".to_vec();
        bytes.extend_from_slice(&wire(&[Message::notification("never", None)]));

        let mut reader = FrameReader::new(Cursor::new(bytes));
        let items: Vec<Result<Message>> = reader.messages().collect();

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(FrameError::MissingContentLength)));
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[Message::notification("ok", None)]);
        let reader = InterruptedThenData {
            state: 0,
            bytes,
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let msg = framed.read_message().unwrap().unwrap();
        assert_eq!(msg.method(), Some("ok"));
    }

    #[test]
    fn io_error_is_fatal() {
        let mut framed = FrameReader::new(BrokenPipe);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::BrokenPipe));
        assert!(err.is_fatal());
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sent = Message::request("abc", "ping", Some(json!(null)));
        writer.write(&sent).unwrap();
        assert_eq!(reader.read_message().unwrap().unwrap(), sent);
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().max_payload_size, DEFAULT_MAX_PAYLOAD);
        let _inner = reader.into_inner();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }
}
