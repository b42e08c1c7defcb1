//! Scripted test doubles for the frame source and transport
//!
//! Both doubles are cheap to clone and share their state, so a test keeps one
//! clone for inspection while the session task owns the other.

#![cfg(any(test, feature = "test-utils"))]

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::source::FrameSource;
use crate::transport::{FrameDelivery, LinkEvent, LinkEventSender, LinkId, Transport};
use crate::{Result, StreamError};

/// Let spawned tasks drain their queues
///
/// Sleeps one millisecond; under a paused clock this returns once every other
/// task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Debug, Default)]
struct TransportLog {
    connects: Vec<LinkId>,
    sent: Vec<(LinkId, String)>,
    closed: Vec<LinkId>,
    held_frame: Option<(LinkId, String)>,
    events: Option<LinkEventSender>,
}

/// Transport whose links open, talk and drop only when the test says so
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    log: Arc<Mutex<TransportLog>>,
    refuse: bool,
    stalled: bool,
}

impl ScriptedTransport {
    /// Transport that accepts every connection attempt
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose `connect` always fails synchronously
    pub fn refusing() -> Self {
        Self { refuse: true, ..Self::default() }
    }

    /// Transport whose frame writes never complete
    ///
    /// The newest frame waits in the link's slot and replaces the one held
    /// before it. A control message writes the held frame first.
    pub fn stalled() -> Self {
        Self { stalled: true, ..Self::default() }
    }

    /// Every link `connect` was called with, in order
    pub fn connects(&self) -> Vec<LinkId> {
        self.log.lock().connects.clone()
    }

    /// Most recent connection attempt
    pub fn last_connect(&self) -> Option<LinkId> {
        self.log.lock().connects.last().copied()
    }

    /// Sent messages, parsed as JSON
    pub fn sent(&self) -> Vec<(LinkId, Value)> {
        self.log
            .lock()
            .sent
            .iter()
            .map(|(link, text)| (*link, serde_json::from_str(text).unwrap_or(Value::Null)))
            .collect()
    }

    /// Frame waiting behind a stalled write, if any
    pub fn held_frame(&self) -> Option<(LinkId, Value)> {
        self.log
            .lock()
            .held_frame
            .as_ref()
            .map(|(link, text)| (*link, serde_json::from_str(text).unwrap_or(Value::Null)))
    }

    /// Links closed by the session
    pub fn closed(&self) -> Vec<LinkId> {
        self.log.lock().closed.clone()
    }

    /// Inject a raw link event
    pub fn emit(&self, event: LinkEvent) {
        if let Some(events) = &self.log.lock().events {
            let _ = events.send(event);
        }
    }

    /// Complete the handshake of `link`
    pub fn open(&self, link: LinkId) {
        self.emit(LinkEvent::Opened(link));
    }

    /// Deliver an inbound text frame on `link`
    pub fn message(&self, link: LinkId, text: &str) {
        self.emit(LinkEvent::Message(link, text.to_string()));
    }

    /// Remote end goes away
    pub fn drop_link(&self, link: LinkId) {
        self.emit(LinkEvent::Closed(link));
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, link: LinkId, events: LinkEventSender) -> Result<()> {
        let mut log = self.log.lock();
        log.connects.push(link);
        if self.refuse {
            return Err(StreamError::transport_failed("connection refused"));
        }
        log.events = Some(events);
        Ok(())
    }

    fn send(&mut self, link: LinkId, text: String) -> Result<()> {
        let mut log = self.log.lock();
        if log.closed.contains(&link) {
            return Err(StreamError::transport_failed(format!("{link} is closed")));
        }
        if let Some(held) = log.held_frame.take() {
            log.sent.push(held);
        }
        log.sent.push((link, text));
        Ok(())
    }

    fn send_frame(&mut self, link: LinkId, text: String) -> Result<FrameDelivery> {
        let mut log = self.log.lock();
        if log.closed.contains(&link) {
            return Err(StreamError::transport_failed(format!("{link} is closed")));
        }
        if !self.stalled {
            log.sent.push((link, text));
            return Ok(FrameDelivery::Queued);
        }
        match log.held_frame.replace((link, text)) {
            Some(_) => Ok(FrameDelivery::Replaced),
            None => Ok(FrameDelivery::Queued),
        }
    }

    fn close(&mut self, link: LinkId) {
        let events = {
            let mut log = self.log.lock();
            if log.closed.contains(&link) {
                return;
            }
            log.closed.push(link);
            log.held_frame = None;
            log.events.clone()
        };
        if let Some(events) = events {
            let _ = events.send(LinkEvent::Closed(link));
        }
    }
}

#[derive(Debug, Default)]
struct SourceLog {
    acquired: bool,
    acquires: u32,
    releases: u32,
    captures: u64,
}

/// Frame source producing small fake payloads
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    log: Arc<Mutex<SourceLog>>,
    unavailable: Option<String>,
}

impl ScriptedSource {
    /// Source that always acquires
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose `acquire` fails with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self { unavailable: Some(reason.into()), ..Self::default() }
    }

    pub fn acquires(&self) -> u32 {
        self.log.lock().acquires
    }

    pub fn releases(&self) -> u32 {
        self.log.lock().releases
    }

    pub fn captures(&self) -> u64 {
        self.log.lock().captures
    }

    pub fn is_acquired(&self) -> bool {
        self.log.lock().acquired
    }
}

#[async_trait::async_trait]
impl FrameSource for ScriptedSource {
    async fn acquire(&mut self) -> Result<()> {
        let mut log = self.log.lock();
        log.acquires += 1;
        if let Some(reason) = &self.unavailable {
            return Err(StreamError::device_unavailable("scripted", reason.clone()));
        }
        log.acquired = true;
        Ok(())
    }

    async fn capture_frame(&mut self) -> Result<Arc<str>> {
        let mut log = self.log.lock();
        if !log.acquired {
            return Err(StreamError::device_unavailable("scripted", "not acquired"));
        }
        log.captures += 1;
        Ok(Arc::from(format!("data:image/jpeg;base64,ZnJhbWU{}", log.captures)))
    }

    async fn release(&mut self) {
        let mut log = self.log.lock();
        log.releases += 1;
        log.acquired = false;
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
