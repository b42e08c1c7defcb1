//! WebSocket transport against a local server

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use comsigns_live::transport::{FrameDelivery, LinkEvent, LinkId, Transport, WsTransport};

const STATUS: &str = r#"{"type":"status","status":"connected","session_id":"abc123"}"#;

/// Accept one client, greet it, and record its text frames until it closes
async fn greeting_server(close_after_greeting: bool) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws/infer", listener.local_addr().unwrap());

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(listener);
        let mut socket = accept_async(stream).await.unwrap();
        socket.send(Message::Text(STATUS.to_string())).await.unwrap();

        if close_after_greeting {
            socket.close(None).await.unwrap();
            return Vec::new();
        }

        let mut received = Vec::new();
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Text(text)) => received.push(text.to_string()),
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        received
    });

    (url, server)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for link event")
        .expect("event channel closed")
}

#[tokio::test]
async fn delivers_messages_and_flushes_before_close() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, server) = greeting_server(false).await;
    let mut transport = WsTransport::new(url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let link = LinkId::new(1);

    transport.connect(link, tx).unwrap();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Opened(link));
    assert_eq!(next_event(&mut rx).await, LinkEvent::Message(link, STATUS.to_string()));

    // the link task has not run yet, so the second frame replaces the first
    let first = transport.send_frame(link, r#"{"type":"frame","data":{"sequence":0}}"#.to_string());
    let second = transport.send_frame(link, r#"{"type":"frame","data":{"sequence":1}}"#.to_string());
    assert_eq!(first.unwrap(), FrameDelivery::Queued);
    assert_eq!(second.unwrap(), FrameDelivery::Replaced);
    transport.send(link, r#"{"type":"control","action":"stop"}"#.to_string()).unwrap();
    transport.close(link);

    assert_eq!(next_event(&mut rx).await, LinkEvent::Closed(link));

    let received = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert_eq!(
        received,
        vec![r#"{"type":"frame","data":{"sequence":1}}"#, r#"{"type":"control","action":"stop"}"#]
    );

    // link is gone
    assert!(transport.send(link, "{}".to_string()).is_err());
}

#[tokio::test]
async fn server_close_is_reported_once() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, server) = greeting_server(true).await;
    let mut transport = WsTransport::new(url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let link = LinkId::new(7);

    transport.connect(link, tx).unwrap();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Opened(link));
    assert!(matches!(next_event(&mut rx).await, LinkEvent::Message(l, _) if l == link));
    assert_eq!(next_event(&mut rx).await, LinkEvent::Closed(link));

    server.await.unwrap();
    // closing an already closed link is harmless
    transport.close(link);
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.unwrap_or(None).is_none());
}

#[tokio::test]
async fn reconnect_replaces_previous_link() {
    let _ = tracing_subscriber::fmt::try_init();
    let (url, _server) = greeting_server(false).await;
    let mut transport = WsTransport::new(url.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = LinkId::new(1);
    let second = LinkId::new(2);

    transport.connect(first, tx.clone()).unwrap();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Opened(first));

    // second connect closes the first link; the listener is gone, so the new
    // link fails
    transport.connect(second, tx).unwrap();

    let mut first_closed = false;
    let mut second_closed = false;
    while !(first_closed && second_closed) {
        match next_event(&mut rx).await {
            LinkEvent::Closed(link) if link == first => first_closed = true,
            LinkEvent::Closed(link) if link == second => second_closed = true,
            event => assert!(event.link() == first || event.link() == second),
        }
    }

    assert!(transport.send(first, "{}".to_string()).is_err());
}

#[tokio::test]
async fn frames_do_not_pile_up_behind_a_peer_that_stops_reading() {
    let _ = tracing_subscriber::fmt::try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws/infer", listener.local_addr().unwrap());

    // completes the handshake, then never reads again
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _socket = accept_async(stream).await.unwrap();
        std::future::pending::<()>().await;
    });

    let mut transport = WsTransport::new(url);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let link = LinkId::new(1);

    transport.connect(link, tx).unwrap();
    assert_eq!(next_event(&mut rx).await, LinkEvent::Opened(link));

    let payload = "x".repeat(256 * 1024);
    let mut queued = 0;
    let mut replaced = 0;
    for sequence in 0..400 {
        let frame =
            format!(r#"{{"type":"frame","data":{{"sequence":{sequence},"frame":"{payload}"}}}}"#);
        match transport.send_frame(link, frame).unwrap() {
            FrameDelivery::Queued => queued += 1,
            FrameDelivery::Replaced => replaced += 1,
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // once the socket buffers are full every new frame replaces the waiting one
    assert!(replaced > 0, "peer never stalled the writer");
    assert!(queued < 200, "{queued} frames were queued behind a stalled write");

    // the link itself is still healthy
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}
