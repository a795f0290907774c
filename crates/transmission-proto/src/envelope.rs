//! Request and response envelopes for the RPC wire format.
//!
//! Every call is a JSON object with a `method` name, an optional `arguments`
//! object and an optional correlation `tag`. Responses mirror the shape with
//! a mandatory `result` string; anything other than [`SUCCESS_RESULT`] is a
//! server-reported failure.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};
use crate::value::Value;

/// The `result` string a healthy server returns.
pub const SUCCESS_RESULT: &str = "success";

/// HTTP header carrying the CSRF session token.
pub const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Correlation tag echoed back by the server.
///
/// The protocol allows both numbers and strings here; real servers echo
/// whichever shape the client sent, so both must decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tag {
    Int(i64),
    Str(String),
}

impl From<i64> for Tag {
    fn from(n: i64) -> Self {
        Tag::Int(n)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag::Str(s.to_owned())
    }
}

/// An outgoing RPC call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

impl Request {
    pub fn new(method: impl Into<String>) -> Self {
        Request {
            method: method.into(),
            arguments: None,
            tag: None,
        }
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// An incoming RPC reply.
///
/// `result` is mandatory; a reply without it does not decode. Unknown extra
/// fields are ignored so newer servers stay readable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.result == SUCCESS_RESULT
    }

    /// The server's failure text, if the reply reports one.
    pub fn error_text(&self) -> Option<&str> {
        if self.is_success() {
            None
        } else {
            Some(&self.result)
        }
    }
}

/// Decodes a reply body into a [`Response`].
///
/// An empty body is reported distinctly; some proxies return 200 with no
/// payload and that must not look like a JSON syntax error at offset 0.
pub fn decode_response(body: &[u8]) -> Result<Response> {
    if body.is_empty() {
        return Err(ProtoError::Decode("empty response body".to_owned()));
    }
    serde_json::from_slice(body).map_err(|err| ProtoError::Decode(err.to_string()))
}
