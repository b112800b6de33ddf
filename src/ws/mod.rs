//! A WebSocket surface that looks the same whatever the transport uses.
//!
//! Transports hand a request one of two kinds of socket primitives, see
//! [`WsTransport`]. [`Request::get_ws`](crate::Request::get_ws) picks the
//! matching [`SocketBackend`] once, and [`WebSocket`] drives it through
//! `created -> accepted -> closed`.

mod channel;
mod stream;

pub use channel::{ChannelBackend, WsEvent, NORMAL_CLOSURE};
pub use stream::StreamBackend;

use crate::error::WsError;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// A bidirectional byte stream a WebSocket can be run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// The socket primitives a transport supplies.
pub enum WsTransport {
    /// A raw upgraded connection. The handshake and framing are done here.
    Stream(Box<dyn Io>),
    /// An event channel to a transport that frames messages itself.
    Channel {
        incoming: mpsc::Receiver<WsEvent>,
        outgoing: mpsc::Sender<WsEvent>,
    },
}

impl WsTransport {
    pub fn stream<S>(io: S) -> Self
    where
        S: Io + 'static,
    {
        WsTransport::Stream(Box::new(io))
    }

    pub fn channel(incoming: mpsc::Receiver<WsEvent>, outgoing: mpsc::Sender<WsEvent>) -> Self {
        WsTransport::Channel { incoming, outgoing }
    }

    fn into_backend(self) -> Box<dyn SocketBackend> {
        match self {
            WsTransport::Stream(io) => Box::new(StreamBackend::new(io)),
            WsTransport::Channel { incoming, outgoing } => {
                Box::new(ChannelBackend::new(incoming, outgoing))
            }
        }
    }
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WsTransport::Stream(_) => f.write_str("WsTransport::Stream"),
            WsTransport::Channel { .. } => f.write_str("WsTransport::Channel"),
        }
    }
}

/// One message received from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Bytes),
}

impl WsMessage {
    /// The message as text, if it is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            WsMessage::Binary(_) => None,
        }
    }
}

/// The operations every socket family supports.
#[async_trait]
pub trait SocketBackend: Send {
    /// Complete the opening handshake.
    async fn accept(&mut self) -> Result<(), WsError>;

    async fn send_text(&mut self, text: &str) -> Result<(), WsError>;

    /// Wait for the next message. `None` means the peer disconnected.
    async fn receive(&mut self) -> Result<Option<WsMessage>, WsError>;

    /// Start or complete the closing handshake.
    async fn close(&mut self) -> Result<(), WsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Created,
    Accepted,
    Closed,
}

/// A server-side WebSocket session.
pub struct WebSocket {
    backend: Box<dyn SocketBackend>,
    state: WsState,
}

impl WebSocket {
    pub(crate) fn new(transport: WsTransport) -> Self {
        WebSocket::from_backend(transport.into_backend())
    }

    /// Run a session over a custom backend.
    pub fn from_backend(backend: Box<dyn SocketBackend>) -> Self {
        WebSocket {
            backend,
            state: WsState::Created,
        }
    }

    pub fn state(&self) -> WsState {
        self.state
    }

    /// Perform the opening handshake.
    ///
    /// Calling this on an accepted socket does nothing.
    pub async fn prepare(&mut self) -> Result<(), WsError> {
        match self.state {
            WsState::Created => {
                if let Err(err) = self.backend.accept().await {
                    self.state = WsState::Closed;
                    return Err(err);
                }

                tracing::debug!("websocket accepted");
                self.state = WsState::Accepted;
                Ok(())
            }
            WsState::Accepted => Ok(()),
            WsState::Closed => Err(WsError::Closed),
        }
    }

    /// Send one text frame.
    pub async fn send_str(&mut self, text: &str) -> Result<(), WsError> {
        self.ensure_accepted()?;
        self.backend.send_text(text).await
    }

    /// Wait for the next message.
    ///
    /// When the peer disconnects the session is closed from this side as
    /// well and `None` is returned. A closed session keeps returning `None`.
    /// Reading a session that was never accepted fails once and closes it.
    pub async fn next(&mut self) -> Option<Result<WsMessage, WsError>> {
        match self.state {
            WsState::Created => {
                self.state = WsState::Closed;
                return Some(Err(WsError::NotAccepted));
            }
            WsState::Closed => return None,
            WsState::Accepted => {}
        }

        match self.backend.receive().await {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                tracing::debug!("websocket peer disconnected");
                if let Err(err) = self.close().await {
                    tracing::debug!(error = %err, "error closing disconnected websocket");
                }
                None
            }
            Err(err) => Some(Err(err)),
        }
    }

    /// Turn the session into a stream of incoming messages.
    pub fn into_stream(self) -> impl Stream<Item = Result<WsMessage, WsError>> + Send {
        futures_util::stream::unfold(self, |mut ws| async move {
            let message = ws.next().await?;
            Some((message, ws))
        })
    }

    /// Close the session from the server side.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), WsError> {
        if self.state == WsState::Closed {
            return Ok(());
        }

        let accepted = self.state == WsState::Accepted;
        self.state = WsState::Closed;

        if accepted {
            self.backend.close().await?;
        }

        Ok(())
    }

    fn ensure_accepted(&self) -> Result<(), WsError> {
        match self.state {
            WsState::Accepted => Ok(()),
            WsState::Created => Err(WsError::NotAccepted),
            WsState::Closed => Err(WsError::Closed),
        }
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("state", &self.state)
            .finish()
    }
}
