//! Duplex transport to the inference service
//!
//! A transport opens one connection ("link") at a time on behalf of the session
//! driver. Every link carries a [`LinkId`] and all of its lifecycle events are
//! tagged with it, so events from a link the session has already abandoned can
//! be recognised and ignored.
//!
//! Event order for a link is always `Opened?`, `Message*`, `Error?`, `Closed`.
//! `Closed` is emitted exactly once, including when the handshake fails or the
//! link is closed locally.
//!
//! Frames and control messages take different paths. A link holds at most one
//! unsent frame; a newer frame replaces it. Control messages are queued in
//! order and write any held frame first.

mod websocket;

pub use websocket::WsTransport;

use std::fmt;
use tokio::sync::mpsc;

use crate::Result;

/// Identity of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Lifecycle and data events reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The connection is open and ready to send
    Opened(LinkId),

    /// One inbound text frame
    Message(LinkId, String),

    /// Connection-level fault; `Closed` follows
    Error(LinkId, String),

    /// The connection is gone
    Closed(LinkId),
}

impl LinkEvent {
    /// Link the event belongs to
    pub fn link(&self) -> LinkId {
        match self {
            LinkEvent::Opened(link)
            | LinkEvent::Message(link, _)
            | LinkEvent::Error(link, _)
            | LinkEvent::Closed(link) => *link,
        }
    }
}

/// Channel the transport reports link events on
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Outcome of handing a frame to a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDelivery {
    /// The frame is the only one waiting to be written
    Queued,

    /// An earlier frame had not been written yet and was discarded
    Replaced,
}

/// Trait for duplex message transports
///
/// All methods return immediately; progress is reported through the
/// [`LinkEventSender`] given to `connect`. The trait carries no protocol
/// knowledge: it moves text frames.
pub trait Transport: Send + 'static {
    /// Start opening `link`, reporting its events on `events`
    ///
    /// An `Err` means the attempt could not even be started; no events will
    /// be emitted for `link` in that case.
    fn connect(&mut self, link: LinkId, events: LinkEventSender) -> Result<()>;

    /// Queue one control message on an open link, in order
    fn send(&mut self, link: LinkId, text: String) -> Result<()>;

    /// Offer one encoded frame to an open link
    ///
    /// Replaces any frame still waiting behind a stalled write.
    fn send_frame(&mut self, link: LinkId, text: String) -> Result<FrameDelivery>;

    /// Close `link` after frames already queued on it are written
    ///
    /// Closing an unknown or already closed link is a no-op.
    fn close(&mut self, link: LinkId);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, link: LinkId, events: LinkEventSender) -> Result<()> {
        (**self).connect(link, events)
    }

    fn send(&mut self, link: LinkId, text: String) -> Result<()> {
        (**self).send(link, text)
    }

    fn send_frame(&mut self, link: LinkId, text: String) -> Result<FrameDelivery> {
        (**self).send_frame(link, text)
    }

    fn close(&mut self, link: LinkId) {
        (**self).close(link)
    }
}
