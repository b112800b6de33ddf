use crate::bounded::BoxError;

use http::StatusCode;
use thiserror::Error;

/// The error returned by [`Request::read`](crate::Request::read) and
/// [`Request::release`](crate::Request::release).
#[derive(Debug, Error)]
pub enum BodyError {
    /// The body reached the configured ceiling.
    #[error("request body of at least {actual} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize, actual: usize },

    /// The transport failed while streaming the body.
    #[error("failed to read request body: {0}")]
    Io(#[source] BoxError),

    /// The request was cancelled while the body was being read.
    #[error("request was cancelled while reading the body")]
    Cancelled,

    /// An earlier read failed after consuming part of the stream.
    #[error("request body was partially consumed by a failed read")]
    Consumed,
}

impl BodyError {
    /// The status a response to this failure should carry.
    pub fn status(&self) -> StatusCode {
        match self {
            BodyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BodyError::Io(_) | BodyError::Consumed => StatusCode::BAD_REQUEST,
            // nginx's "client closed request"
            BodyError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        }
    }
}

/// The error returned by [`Request::text`](crate::Request::text).
#[derive(Debug, Error)]
pub enum TextError {
    #[error(transparent)]
    Body(#[from] BodyError),

    #[error("request body is not valid {charset}")]
    Decode { charset: &'static str },

    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),
}

impl TextError {
    pub fn status(&self) -> StatusCode {
        match self {
            TextError::Body(err) => err.status(),
            TextError::Decode { .. } => StatusCode::BAD_REQUEST,
            TextError::UnsupportedCharset(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

/// The error returned by [`Request::json`](crate::Request::json).
#[cfg(feature = "json")]
#[derive(Debug, Error)]
pub enum JsonError {
    #[error(transparent)]
    Text(#[from] TextError),

    #[error("malformed JSON body: {0}")]
    MalformedBody(#[source] serde_json::Error),
}

#[cfg(feature = "json")]
impl JsonError {
    pub fn status(&self) -> StatusCode {
        match self {
            JsonError::Text(err) => err.status(),
            JsonError::MalformedBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Returned when deleting a request state key that was never set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("request state has no key '{0}'")]
pub struct KeyNotFound(pub String);

/// Errors from the deferred execution registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FutureError {
    #[error("no future named '{name}' registered in scope '{scope}'")]
    NotFound { name: String, scope: String },

    #[error("no async runtime is available to execute futures")]
    NoRuntime,
}

/// Errors from the WebSocket adapter.
#[derive(Debug, Error)]
pub enum WsError {
    /// The transport did not hand this request any socket primitives.
    #[error("request has no websocket transport")]
    Unavailable,

    /// The socket primitives were already claimed by an earlier adapter.
    #[error("websocket transport was already taken")]
    Taken,

    #[error("websocket has not been accepted")]
    NotAccepted,

    #[error("websocket is closed")]
    Closed,

    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] BoxError),

    #[error("websocket transport error: {0}")]
    Transport(#[source] BoxError),
}
