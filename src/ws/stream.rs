use super::{Io, SocketBackend, WsMessage};
use crate::error::WsError;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::{Error as WireError, ProtocolError};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Runs the WebSocket protocol over a raw upgraded connection.
pub struct StreamBackend {
    io: Option<Box<dyn Io>>,
    socket: Option<WebSocketStream<Box<dyn Io>>>,
}

impl StreamBackend {
    pub fn new(io: Box<dyn Io>) -> Self {
        StreamBackend {
            io: Some(io),
            socket: None,
        }
    }

    fn socket(&mut self) -> Result<&mut WebSocketStream<Box<dyn Io>>, WsError> {
        self.socket.as_mut().ok_or(WsError::NotAccepted)
    }
}

#[async_trait]
impl SocketBackend for StreamBackend {
    async fn accept(&mut self) -> Result<(), WsError> {
        let io = self.io.take().ok_or(WsError::Closed)?;
        let socket = tokio_tungstenite::accept_async(io)
            .await
            .map_err(|err| WsError::Handshake(Box::new(err)))?;

        self.socket = Some(socket);
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.socket()?
            .send(Message::text(text.to_owned()))
            .await
            .map_err(transport)
    }

    async fn receive(&mut self) -> Result<Option<WsMessage>, WsError> {
        let socket = self.socket()?;

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(WsMessage::Text(text.as_str().to_owned())))
                }
                Some(Ok(Message::Binary(data))) => return Ok(Some(WsMessage::Binary(data))),
                // pings are answered by the protocol layer
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(err)) if is_closed(&err) => return Ok(None),
                Some(Err(err)) => return Err(transport(err)),
            }
        }
    }

    async fn close(&mut self) -> Result<(), WsError> {
        // dropping the socket afterwards lets the peer see end-of-stream
        let mut socket = match self.socket.take() {
            Some(socket) => socket,
            None => return Ok(()),
        };

        // sends our close frame, or flushes the reply to the peer's
        match SinkExt::close(&mut socket).await {
            Ok(()) => Ok(()),
            Err(err) if is_closed(&err) => Ok(()),
            Err(err) => Err(transport(err)),
        }
    }
}

fn is_closed(err: &WireError) -> bool {
    matches!(
        err,
        WireError::ConnectionClosed
            | WireError::AlreadyClosed
            | WireError::Protocol(ProtocolError::SendAfterClosing)
    )
}

fn transport(err: WireError) -> WsError {
    WsError::Transport(Box::new(err))
}
