//! WebSocket transport over tokio-tungstenite

use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, trace, warn};

use super::{FrameDelivery, LinkEvent, LinkEventSender, LinkId, Transport};
use crate::{Result, StreamError};

enum LinkCommand {
    Send(String),
    Close,
}

/// Holds the next frame of one link; a newer frame replaces an unsent one
#[derive(Default)]
struct FrameSlot {
    pending: Mutex<Option<String>>,
    ready: Notify,
}

impl FrameSlot {
    fn put(&self, text: String) -> FrameDelivery {
        let replaced = self.pending.lock().replace(text).is_some();
        self.ready.notify_one();
        if replaced { FrameDelivery::Replaced } else { FrameDelivery::Queued }
    }

    fn take(&self) -> Option<String> {
        self.pending.lock().take()
    }
}

struct ActiveLink {
    id: LinkId,
    commands: mpsc::UnboundedSender<LinkCommand>,
    frames: Arc<FrameSlot>,
}

/// WebSocket client transport
///
/// Each link runs in its own task that owns the socket. Control messages and
/// the close request travel through one ordered queue, so a close never
/// overtakes a message queued before it. Frames bypass the queue: while a write
/// is blocked on a slow peer only the newest frame is kept.
pub struct WsTransport {
    url: String,
    active: Option<ActiveLink>,
}

impl WsTransport {
    /// Create a transport for the given `ws://` or `wss://` url
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), active: None }
    }

    /// Endpoint this transport connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    fn active_link(&self, link: LinkId) -> Result<&ActiveLink> {
        match &self.active {
            Some(active) if active.id == link && !active.commands.is_closed() => Ok(active),
            Some(active) if active.id == link => {
                Err(StreamError::transport_failed(format!("{link} has shut down")))
            }
            _ => Err(StreamError::transport_failed(format!("{link} is not the active link"))),
        }
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, link: LinkId, events: LinkEventSender) -> Result<()> {
        if let Some(previous) = self.active.take() {
            debug!(link = %previous.id, "Closing previous link before reconnecting");
            let _ = previous.commands.send(LinkCommand::Close);
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let frames = Arc::new(FrameSlot::default());
        tokio::spawn(run_link(self.url.clone(), link, commands_rx, Arc::clone(&frames), events));
        self.active = Some(ActiveLink { id: link, commands: commands_tx, frames });
        Ok(())
    }

    fn send(&mut self, link: LinkId, text: String) -> Result<()> {
        self.active_link(link)?
            .commands
            .send(LinkCommand::Send(text))
            .map_err(|_| StreamError::transport_failed(format!("{link} has shut down")))
    }

    fn send_frame(&mut self, link: LinkId, text: String) -> Result<FrameDelivery> {
        let delivery = self.active_link(link)?.frames.put(text);
        if delivery == FrameDelivery::Replaced {
            trace!(%link, "Unsent frame replaced by a newer one");
        }
        Ok(delivery)
    }

    fn close(&mut self, link: LinkId) {
        if self.active.as_ref().is_some_and(|active| active.id == link) {
            if let Some(active) = self.active.take() {
                let _ = active.commands.send(LinkCommand::Close);
            }
        }
    }
}

/// Error event for a failed socket operation
fn link_fault(link: LinkId, operation: &str, error: tungstenite::Error) -> LinkEvent {
    let error = StreamError::transport_failed_with_source(
        format!("WebSocket {operation} failed: {error}"),
        Box::new(error),
    );
    warn!(%link, retryable = error.is_retryable(), "{}", error);
    LinkEvent::Error(link, error.to_string())
}

async fn write_text<W>(write: &mut W, link: LinkId, text: String) -> std::result::Result<(), tungstenite::Error>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    trace!(%link, bytes = text.len(), "Sending text frame");
    write.send(Message::Text(text)).await
}

/// Socket task for one link
async fn run_link(
    url: String,
    link: LinkId,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    frames: Arc<FrameSlot>,
    events: LinkEventSender,
) {
    debug!(%link, %url, "Opening WebSocket");

    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let _ = events.send(link_fault(link, "connection", e));
                let _ = events.send(LinkEvent::Closed(link));
                return;
            }
        },
        // Only a close (or the transport going away) can arrive before the link is open
        _ = commands.recv() => {
            debug!(%link, "Link closed during handshake");
            let _ = events.send(LinkEvent::Closed(link));
            return;
        }
    };

    info!(%link, "WebSocket connected");
    let _ = events.send(LinkEvent::Opened(link));

    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    // Keep the order the messages were issued in
                    if let Some(frame) = frames.take() {
                        if let Err(e) = write_text(&mut write, link, frame).await {
                            let _ = events.send(link_fault(link, "send", e));
                            break;
                        }
                    }
                    if let Err(e) = write_text(&mut write, link, text).await {
                        let _ = events.send(link_fault(link, "send", e));
                        break;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    debug!(%link, "Closing WebSocket");
                    let _ = write.close().await;
                    break;
                }
            },
            _ = frames.ready.notified() => {
                if let Some(frame) = frames.take() {
                    if let Err(e) = write_text(&mut write, link, frame).await {
                        let _ = events.send(link_fault(link, "send", e));
                        break;
                    }
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(LinkEvent::Message(link, text));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%link, ?frame, "Server closed WebSocket");
                    break;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(%link, len = bytes.len(), "Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(link_fault(link, "receive", e));
                    break;
                }
                None => {
                    debug!(%link, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    info!(%link, "WebSocket disconnected");
    let _ = events.send(LinkEvent::Closed(link));
}
