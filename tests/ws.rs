use bramble::error::WsError;
use bramble::ws::{WsEvent, WsState};
use bramble::{Request, WsMessage, WsTransport};

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

fn channel_request() -> (Request, mpsc::Sender<WsEvent>, mpsc::Receiver<WsEvent>) {
    let (client_tx, incoming) = mpsc::channel(8);
    let (outgoing, client_rx) = mpsc::channel(8);

    let request = Request::builder()
        .socket(WsTransport::channel(incoming, outgoing))
        .build();

    (request, client_tx, client_rx)
}

#[test]
fn no_socket_primitives() {
    let request = Request::builder().build();
    assert!(matches!(request.get_ws(), Err(WsError::Unavailable)));
}

#[test]
fn socket_is_claimed_once() {
    let (request, _tx, _rx) = channel_request();

    assert!(request.get_ws().is_ok());
    assert!(matches!(request.get_ws(), Err(WsError::Taken)));
}

#[tokio::test]
async fn channel_session() {
    let (request, client, mut server) = channel_request();
    let mut ws = request.get_ws().unwrap();
    assert_eq!(ws.state(), WsState::Created);

    assert!(matches!(ws.send_str("early").await, Err(WsError::NotAccepted)));
    // constructing the adapter performs no handshake
    assert!(server.try_recv().is_err());

    client.send(WsEvent::Connect).await.unwrap();
    ws.prepare().await.unwrap();
    assert_eq!(ws.state(), WsState::Accepted);
    assert_eq!(server.recv().await, Some(WsEvent::Accept));

    client.send(WsEvent::Text("hi".to_owned())).await.unwrap();
    let message = ws.next().await.unwrap().unwrap();
    assert_eq!(message.as_text(), Some("hi"));

    ws.send_str("echo: hi").await.unwrap();
    assert_eq!(server.recv().await, Some(WsEvent::Text("echo: hi".to_owned())));

    client.send(WsEvent::Disconnect { code: 1001 }).await.unwrap();
    assert!(ws.next().await.is_none());
    assert_eq!(ws.state(), WsState::Closed);
    assert_eq!(server.recv().await, Some(WsEvent::Close { code: 1000 }));

    assert!(ws.next().await.is_none());
    ws.close().await.unwrap();
    assert!(matches!(ws.send_str("late").await, Err(WsError::Closed)));
}

#[tokio::test]
async fn unaccepted_session_ends_after_one_error() {
    let (request, _client, _server) = channel_request();
    let ws = request.get_ws().unwrap();

    let items: Vec<_> = ws.into_stream().collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(WsError::NotAccepted)));
}

#[tokio::test]
async fn server_close_is_idempotent() {
    let (request, client, mut server) = channel_request();
    let mut ws = request.get_ws().unwrap();

    client.send(WsEvent::Connect).await.unwrap();
    ws.prepare().await.unwrap();
    assert_eq!(server.recv().await, Some(WsEvent::Accept));

    ws.close().await.unwrap();
    ws.close().await.unwrap();

    assert_eq!(server.recv().await, Some(WsEvent::Close { code: 1000 }));
    assert!(server.try_recv().is_err());
    assert!(matches!(ws.prepare().await, Err(WsError::Closed)));
}

#[tokio::test]
async fn channel_messages_as_stream() {
    let (request, client, _server) = channel_request();
    let mut ws = request.get_ws().unwrap();

    client.send(WsEvent::Connect).await.unwrap();
    ws.prepare().await.unwrap();

    client.send(WsEvent::Text("a".to_owned())).await.unwrap();
    client.send(WsEvent::Binary("b".into())).await.unwrap();
    client.send(WsEvent::Disconnect { code: 1000 }).await.unwrap();

    let messages: Vec<_> = ws
        .into_stream()
        .map(|message| message.unwrap())
        .collect()
        .await;

    assert_eq!(
        messages,
        [WsMessage::Text("a".to_owned()), WsMessage::Binary("b".into())]
    );
}

#[tokio::test]
async fn stream_session() {
    let (client_io, server_io) = tokio::io::duplex(4096);

    let request = Request::builder()
        .socket(WsTransport::stream(server_io))
        .build();

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::client_async("ws://localhost/chat", client_io)
            .await
            .unwrap();

        ws.send(Message::text("hi".to_owned())).await.unwrap();

        let reply = ws.next().await.unwrap().unwrap();
        ws.close(None).await.unwrap();

        let mut acknowledged = false;
        while let Some(Ok(message)) = ws.next().await {
            acknowledged |= message.is_close();
        }

        (reply, acknowledged)
    });

    let mut ws = request.get_ws().unwrap();
    ws.prepare().await.unwrap();

    let message = ws.next().await.unwrap().unwrap();
    assert_eq!(message, WsMessage::Text("hi".to_owned()));
    ws.send_str("echo: hi").await.unwrap();

    assert!(ws.next().await.is_none());
    assert_eq!(ws.state(), WsState::Closed);

    let (reply, acknowledged) = timeout(Duration::from_secs(5), client)
        .await
        .expect("client never saw the close handshake finish")
        .unwrap();

    assert_eq!(reply.to_text().unwrap(), "echo: hi");
    assert!(acknowledged);
}

#[tokio::test]
async fn stream_server_close() {
    let (client_io, server_io) = tokio::io::duplex(4096);

    let request = Request::builder()
        .socket(WsTransport::stream(server_io))
        .build();

    let client = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            messages.push(message);
        }
        messages
    });

    let mut ws = request.get_ws().unwrap();
    ws.prepare().await.unwrap();
    ws.send_str("bye").await.unwrap();
    ws.close().await.unwrap();
    ws.close().await.unwrap();

    let messages = timeout(Duration::from_secs(5), client)
        .await
        .expect("client never saw the socket close")
        .unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].to_text().unwrap(), "bye");
    assert!(messages[1].is_close());
}

#[tokio::test]
async fn stream_handshake_failure() {
    let (mut client_io, server_io) = tokio::io::duplex(1024);

    let request = Request::builder()
        .socket(WsTransport::stream(server_io))
        .build();

    tokio::io::AsyncWriteExt::write_all(&mut client_io, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();

    let mut ws = request.get_ws().unwrap();
    assert!(matches!(ws.prepare().await, Err(WsError::Handshake(_))));
    assert_eq!(ws.state(), WsState::Closed);
}
