//! A transport-agnostic request core.
//!
//! A transport parses the connection and hands the pieces to a
//! [`RequestBuilder`]. Handlers then work against [`Request`] alone: lazily
//! computed views over the metadata, a size-limited body reader, per-request
//! state, WebSocket access and deferred post-request work.

mod bounded;
mod current;
mod deferred;
mod memo;
mod request;

pub mod config;
pub mod error;
pub mod http;
pub mod ws;

pub use async_trait::async_trait;
pub use bounded::{BoxError, BoxFuture, BoxStream};
pub use config::Config;
pub use current::{current, with_current};
pub use deferred::{
    Execution, ExecutionReport, FailedFuture, FutureInfo, FutureRegistry, DEFAULT_SCOPE,
};
pub use request::{Request, RequestBuilder, StateValue, View};
pub use ws::{WebSocket, WsMessage, WsTransport};
