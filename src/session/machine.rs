//! Session state machine
//!
//! [`SessionMachine`] holds every piece of mutable session state and is only
//! changed through its transition methods. Transitions never perform I/O: each
//! returns the [`Effect`]s the caller must carry out (open a link, send a
//! message, arm a timer, notify observers). This keeps the machine
//! deterministic and lets the driver interleave timer ticks, commands and link
//! events in any order.
//!
//! Every link event is checked against the link the session currently owns.
//! Events from an older link (a late message after a reconnect, the close
//! that follows a local `stop`) are ignored, which makes the transitions
//! order-tolerant.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

use super::Backoff;
use crate::StreamError;
use crate::protocol::{self, ControlAction, Inbound, Outbound, STATUS_CONNECTED};
use crate::transport::LinkId;
use crate::types::{ConnectionState, ErrorKind, Frame, Prediction, SessionEvent, SessionSnapshot};

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new link
    Connect(LinkId),

    /// Send a message on a link
    Send(LinkId, Outbound),

    /// Close a link
    Close(LinkId),

    /// Arm the reconnection timer, replacing any armed one
    ScheduleReconnect(Duration),

    /// Disarm the reconnection timer
    CancelReconnect,

    /// Start the frame-pacing timer
    StartCapture,

    /// Stop the frame-pacing timer
    StopCapture,

    /// Release the frame source
    ReleaseSource,

    /// Publish an event to observers
    Notify(SessionEvent),
}

/// One user-started streaming session
#[derive(Debug, Clone, PartialEq)]
struct Session {
    state: ConnectionState,
    session_id: Option<String>,
    frame_sequence: u64,
    reconnect_attempt: u32,
    link: Option<LinkId>,
    reconnect_pending: bool,
    processing: bool,
    frames_sent: u64,
    frames_dropped: u64,
}

impl Session {
    fn new(link: LinkId) -> Self {
        Self {
            state: ConnectionState::Connecting,
            session_id: None,
            frame_sequence: 0,
            reconnect_attempt: 0,
            link: Some(link),
            reconnect_pending: false,
            processing: false,
            frames_sent: 0,
            frames_dropped: 0,
        }
    }
}

/// Connection state machine for a streaming client
#[derive(Debug)]
pub struct SessionMachine {
    backoff: Backoff,
    session: Option<Session>,
    last_link: u64,
    prediction: Option<Arc<Prediction>>,
    error: Option<String>,
}

impl SessionMachine {
    /// Create an idle machine using the given reconnection policy
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff, session: None, last_link: 0, prediction: None, error: None }
    }

    /// Whether `start()` was accepted and `stop()` has not been called since
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Current connectivity
    pub fn state(&self) -> ConnectionState {
        self.session.as_ref().map_or(ConnectionState::Disconnected, |s| s.state)
    }

    /// Read-only view for observers
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            prediction: self.prediction.clone(),
            error: self.error.clone(),
            ..SessionSnapshot::default()
        };

        if let Some(session) = &self.session {
            snapshot.active = true;
            snapshot.state = session.state;
            snapshot.session_id = session.session_id.clone();
            snapshot.frame_sequence = session.frame_sequence;
            snapshot.reconnect_attempt = session.reconnect_attempt;
            snapshot.processing = session.processing;
            snapshot.frames_sent = session.frames_sent;
            snapshot.frames_dropped = session.frames_dropped;
        }

        snapshot
    }

    /// Begin a session: open a link and start the pacing timer
    ///
    /// The caller must have acquired the frame source first. Ignored while a
    /// session is already active.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.session.is_some() {
            debug!("Start ignored: session already active");
            return Vec::new();
        }

        let link = self.next_link();
        self.session = Some(Session::new(link));
        self.prediction = None;
        self.error = None;

        info!(%link, "Session started");

        vec![
            Effect::StartCapture,
            Effect::Connect(link),
            Effect::Notify(SessionEvent::StatusChanged(ConnectionState::Connecting)),
        ]
    }

    /// The frame source could not be acquired; the start is abandoned
    pub fn device_unavailable(&mut self, error: &StreamError) -> Vec<Effect> {
        let message = error.to_string();
        warn!("Start aborted: {}", message);
        self.error = Some(message.clone());

        vec![Effect::Notify(SessionEvent::Error { kind: ErrorKind::DeviceUnavailable, message })]
    }

    /// End the session from any state
    ///
    /// Cancels both timers, sends a best-effort `control: stop` when the link is
    /// open, closes the link and releases the source. The session is destroyed;
    /// the last prediction and error stay visible.
    pub fn stop(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.take() else {
            debug!("Stop ignored: no active session");
            return Vec::new();
        };

        let mut effects = vec![Effect::StopCapture, Effect::CancelReconnect];

        if let Some(link) = session.link {
            if session.state == ConnectionState::Connected {
                effects.push(Effect::Send(link, Outbound::control(ControlAction::Stop)));
            }
            effects.push(Effect::Close(link));
        }

        effects.push(Effect::ReleaseSource);

        if session.state != ConnectionState::Disconnected {
            effects.push(Effect::Notify(SessionEvent::StatusChanged(
                ConnectionState::Disconnected,
            )));
        }

        info!(
            frames_sent = session.frames_sent,
            frames_dropped = session.frames_dropped,
            "Session stopped"
        );

        effects
    }

    /// Ask the service to reset its sequence state
    ///
    /// Only valid while connected; zeroes the frame sequence.
    pub fn reset(&mut self) -> Vec<Effect> {
        match self.session.as_mut() {
            Some(session) if session.state == ConnectionState::Connected => {
                let Some(link) = session.link else {
                    return Vec::new();
                };
                session.frame_sequence = 0;
                info!(%link, "Session reset");
                vec![Effect::Send(link, Outbound::control(ControlAction::Reset))]
            }
            _ => {
                debug!("Reset ignored: not connected");
                Vec::new()
            }
        }
    }

    /// Clear the displayed error
    pub fn dismiss_error(&mut self) -> Vec<Effect> {
        self.error = None;
        Vec::new()
    }

    /// The pacing timer produced a frame
    ///
    /// The sequence advances for every capture. The frame is sent only while
    /// connected; otherwise it is dropped, never queued.
    pub fn frame_captured(&mut self, payload: Arc<str>, captured_at: SystemTime) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let frame = Frame::new(session.frame_sequence, payload, captured_at);
        session.frame_sequence += 1;

        match (session.state, session.link) {
            (ConnectionState::Connected, Some(link)) => {
                session.frames_sent += 1;
                session.processing = true;
                trace!(%link, sequence = frame.sequence, "Sending frame");
                vec![Effect::Send(link, Outbound::frame(&frame))]
            }
            (state, _) => {
                session.frames_dropped += 1;
                trace!(sequence = frame.sequence, %state, "Dropping frame: link not open");
                Vec::new()
            }
        }
    }

    /// A frame sent on `link` was replaced before it was written
    ///
    /// The transport keeps only the newest frame while a write is blocked, so
    /// the replaced frame counts as dropped rather than sent.
    pub fn frame_superseded(&mut self, link: LinkId) {
        let Some(session) = owned_session(&mut self.session, link) else {
            return;
        };

        session.frames_sent = session.frames_sent.saturating_sub(1);
        session.frames_dropped += 1;
        trace!(%link, "Frame superseded before it was written");
    }

    /// The transport finished the handshake for `link`
    pub fn link_opened(&mut self, link: LinkId) -> Vec<Effect> {
        let Some(session) = owned_session(&mut self.session, link) else {
            debug!(%link, "Ignoring open of stale link");
            return Vec::new();
        };

        if session.state == ConnectionState::Connected {
            return Vec::new();
        }

        session.state = ConnectionState::Connected;
        session.reconnect_attempt = 0;
        self.error = None;

        info!(%link, "Connected to inference service");
        vec![Effect::Notify(SessionEvent::StatusChanged(ConnectionState::Connected))]
    }

    /// One inbound text frame arrived on `link`
    ///
    /// Malformed and unrecognised messages are logged and dropped without
    /// touching any state.
    pub fn link_message(&mut self, link: LinkId, text: &str) -> Vec<Effect> {
        let Some(session) = owned_session(&mut self.session, link) else {
            trace!(%link, "Ignoring message from stale link");
            return Vec::new();
        };

        match protocol::decode_inbound(text) {
            Ok(Some(Inbound::Status { status, session_id })) => {
                if status != STATUS_CONNECTED {
                    debug!(%link, %status, "Ignoring status message");
                    return Vec::new();
                }
                let Some(session_id) = session_id else {
                    debug!(%link, "Connected status without session id");
                    return Vec::new();
                };

                info!(%link, %session_id, "Session established");
                session.session_id = Some(session_id.clone());
                vec![Effect::Notify(SessionEvent::SessionAssigned(session_id))]
            }
            Ok(Some(Inbound::Prediction { data })) => {
                session.processing = false;
                let prediction = Arc::new(data);
                trace!(%link, gloss = ?prediction.gloss(), "Prediction received");
                self.prediction = Some(Arc::clone(&prediction));
                vec![Effect::Notify(SessionEvent::Prediction(prediction))]
            }
            Ok(Some(Inbound::Error { error })) => {
                let rejection = StreamError::remote_rejection(error.as_str());
                warn!(%link, retryable = rejection.is_retryable(), "{}", rejection);
                self.error = Some(error.clone());
                vec![Effect::Notify(SessionEvent::Error {
                    kind: ErrorKind::RemoteRejection,
                    message: error,
                })]
            }
            Ok(None) => {
                debug!(%link, "Ignoring message with unrecognised type");
                Vec::new()
            }
            Err(e) => {
                warn!(%link, "Dropping inbound message: {}", e);
                Vec::new()
            }
        }
    }

    /// The transport reported a fault on `link`
    ///
    /// Moves to `Error` and surfaces the reason; the close that follows drives
    /// reconnection.
    pub fn link_error(&mut self, link: LinkId, reason: String) -> Vec<Effect> {
        let Some(session) = owned_session(&mut self.session, link) else {
            debug!(%link, "Ignoring error from stale link: {}", reason);
            return Vec::new();
        };

        warn!(%link, "Transport error: {}", reason);
        session.state = ConnectionState::Error;
        self.error = Some(reason.clone());

        vec![
            Effect::Notify(SessionEvent::StatusChanged(ConnectionState::Error)),
            Effect::Notify(SessionEvent::Error { kind: ErrorKind::Transport, message: reason }),
        ]
    }

    /// `link` is gone; schedule the next attempt
    pub fn link_closed(&mut self, link: LinkId) -> Vec<Effect> {
        let Some(session) = owned_session(&mut self.session, link) else {
            debug!(%link, "Ignoring close of stale link");
            return Vec::new();
        };

        session.link = None;
        session.session_id = None;
        session.state = ConnectionState::Disconnected;
        session.processing = false;

        let delay = self.backoff.delay(session.reconnect_attempt);
        session.reconnect_attempt = session.reconnect_attempt.saturating_add(1);
        session.reconnect_pending = true;
        let attempt = session.reconnect_attempt;

        info!(%link, attempt, delay_ms = delay.as_millis() as u64, "Disconnected, scheduling reconnect");

        vec![
            Effect::Notify(SessionEvent::StatusChanged(ConnectionState::Disconnected)),
            Effect::ScheduleReconnect(delay),
            Effect::Notify(SessionEvent::ReconnectScheduled { attempt, delay }),
        ]
    }

    /// The reconnection timer elapsed
    pub fn reconnect_due(&mut self) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            debug!("Reconnect timer fired without an active session");
            return Vec::new();
        };

        if !session.reconnect_pending || session.link.is_some() {
            debug!("Reconnect timer fired with nothing to do");
            return Vec::new();
        }

        self.last_link += 1;
        let link = LinkId::new(self.last_link);
        session.reconnect_pending = false;
        session.link = Some(link);
        session.state = ConnectionState::Connecting;

        info!(%link, attempt = session.reconnect_attempt, "Reconnecting");
        vec![
            Effect::Connect(link),
            Effect::Notify(SessionEvent::StatusChanged(ConnectionState::Connecting)),
        ]
    }

    fn next_link(&mut self) -> LinkId {
        self.last_link += 1;
        LinkId::new(self.last_link)
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

/// The active session, if it owns `link`
fn owned_session(session: &mut Option<Session>, link: LinkId) -> Option<&mut Session> {
    session.as_mut().filter(|s| s.link == Some(link))
}
