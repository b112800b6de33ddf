use super::{SocketBackend, WsMessage};
use crate::error::WsError;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Events exchanged with a transport that frames messages itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// The client asked to open a session.
    Connect,
    /// The server accepted the session.
    Accept,
    Text(String),
    Binary(Bytes),
    /// The client went away.
    Disconnect { code: u16 },
    /// The server ended the session.
    Close { code: u16 },
}

/// The normal closure code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Speaks to the transport through a pair of event channels.
pub struct ChannelBackend {
    incoming: mpsc::Receiver<WsEvent>,
    outgoing: mpsc::Sender<WsEvent>,
}

impl ChannelBackend {
    pub fn new(incoming: mpsc::Receiver<WsEvent>, outgoing: mpsc::Sender<WsEvent>) -> Self {
        ChannelBackend { incoming, outgoing }
    }

    async fn emit(&self, event: WsEvent) -> Result<(), WsError> {
        self.outgoing.send(event).await.map_err(|_| WsError::Closed)
    }
}

#[async_trait]
impl SocketBackend for ChannelBackend {
    async fn accept(&mut self) -> Result<(), WsError> {
        match self.incoming.recv().await {
            Some(WsEvent::Connect) => self.emit(WsEvent::Accept).await,
            Some(WsEvent::Disconnect { .. }) | None => Err(WsError::Closed),
            Some(event) => Err(WsError::Handshake(
                format!("expected a connect event, got {:?}", event).into(),
            )),
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.emit(WsEvent::Text(text.to_owned())).await
    }

    async fn receive(&mut self) -> Result<Option<WsMessage>, WsError> {
        loop {
            match self.incoming.recv().await {
                Some(WsEvent::Text(text)) => return Ok(Some(WsMessage::Text(text))),
                Some(WsEvent::Binary(data)) => return Ok(Some(WsMessage::Binary(data))),
                Some(WsEvent::Disconnect { .. }) | None => return Ok(None),
                Some(event) => {
                    tracing::trace!(?event, "ignoring unexpected websocket event");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), WsError> {
        let event = WsEvent::Close {
            code: NORMAL_CLOSURE,
        };

        // the transport may already have dropped its end after a disconnect
        if self.outgoing.send(event).await.is_err() {
            tracing::trace!("websocket channel closed before close event");
        }

        Ok(())
    }
}
