//! JSON-RPC message model.
//!
//! Every frame body is a JSON object. The variant is decided by which keys
//! are present, not by their values:
//!
//! | keys                        | variant        |
//! |-----------------------------|----------------|
//! | `id` + `method`             | Request        |
//! | `method`                    | Notification   |
//! | `id` + one of result/error  | Response       |
//!
//! `"result": null` is a present result. A response with both or neither
//! of `result`/`error` is rejected rather than guessed.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{FrameError, Result};

/// Protocol version tag written on every outgoing message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC and LSP error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// LSP: the request was cancelled by the client.
    pub const REQUEST_CANCELLED: i64 = -32800;
}

/// Request identifier: a small integer or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Create an error object without extra data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The reply sent for a request whose method has no handler.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A request expecting a response with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// A response to an earlier request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: std::result::Result<Value, ResponseError>,
}

impl Response {
    /// Successful response.
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    /// Error response.
    pub fn error(id: RequestId, error: ResponseError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

/// A one-way message; never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// One decoded frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// Build a request message.
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(Request {
            id: id.into(),
            method: method.into(),
            params,
        })
    }

    /// Build a notification message.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(Notification {
            method: method.into(),
            params,
        })
    }

    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(req) => Some(&req.method),
            Message::Notification(notif) => Some(&notif.method),
            Message::Response(_) => None,
        }
    }

    /// Id for requests and responses.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(req) => Some(&req.id),
            Message::Response(resp) => Some(&resp.id),
            Message::Notification(_) => None,
        }
    }

    /// Serialize to a compact JSON body.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and classify a frame body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Classify an already parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(FrameError::InvalidMessage(
                "message body is not a JSON object".to_string(),
            ));
        };

        let id = match obj.remove("id") {
            Some(raw) => Some(parse_id(raw)?),
            None => None,
        };

        let method = match obj.remove("method") {
            Some(Value::String(method)) if !method.is_empty() => Some(method),
            Some(Value::String(_)) => {
                return Err(FrameError::InvalidMessage("method is empty".to_string()))
            }
            Some(other) => {
                return Err(FrameError::InvalidMessage(format!(
                    "method must be a string, got {}",
                    kind(&other)
                )))
            }
            None => None,
        };

        match (id, method) {
            (Some(id), Some(method)) => Ok(Message::Request(Request {
                id,
                method,
                params: obj.remove("params"),
            })),
            (None, Some(method)) => Ok(Message::Notification(Notification {
                method,
                params: obj.remove("params"),
            })),
            (Some(id), None) => parse_response(id, &mut obj),
            (None, None) => Err(FrameError::InvalidMessage(
                "message has neither id nor method".to_string(),
            )),
        }
    }
}

fn parse_id(raw: Value) -> Result<RequestId> {
    match raw {
        Value::String(s) => Ok(RequestId::String(s)),
        Value::Number(n) => n.as_i64().map(RequestId::Number).ok_or_else(|| {
            FrameError::InvalidMessage(format!("id {n} is not an integer"))
        }),
        other => Err(FrameError::InvalidMessage(format!(
            "id must be a number or string, got {}",
            kind(&other)
        ))),
    }
}

fn parse_response(id: RequestId, obj: &mut Map<String, Value>) -> Result<Message> {
    match (obj.remove("result"), obj.remove("error")) {
        (Some(result), None) => Ok(Message::Response(Response::ok(id, result))),
        (None, Some(error)) => {
            let error: ResponseError = serde_json::from_value(error).map_err(|err| {
                FrameError::InvalidMessage(format!("malformed error object for id {id}: {err}"))
            })?;
            Ok(Message::Response(Response::error(id, error)))
        }
        _ => Err(FrameError::AmbiguousResponse { id: Some(id) }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match self {
            Message::Request(req) => {
                map.serialize_entry("id", &req.id)?;
                map.serialize_entry("method", &req.method)?;
                if let Some(params) = &req.params {
                    map.serialize_entry("params", params)?;
                }
            }
            Message::Notification(notif) => {
                map.serialize_entry("method", &notif.method)?;
                if let Some(params) = &notif.params {
                    map.serialize_entry("params", params)?;
                }
            }
            Message::Response(resp) => {
                map.serialize_entry("id", &resp.id)?;
                match &resp.outcome {
                    Ok(result) => map.serialize_entry("result", result)?,
                    Err(error) => map.serialize_entry("error", error)?,
                }
            }
        }
        map.end()
    }
}
