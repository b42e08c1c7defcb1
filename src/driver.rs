//! Driver spawns and manages the session event loop

use std::collections::VecDeque;
use std::future;
use std::pin::Pin;
use std::time::SystemTime;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::protocol::{self, Outbound};
use crate::session::{Backoff, Effect, SessionMachine};
use crate::source::FrameSource;
use crate::transport::{FrameDelivery, LinkEvent, LinkEventSender, Transport};
use crate::types::{CaptureRate, SessionEvent, SessionSnapshot};

/// Capacity of the event broadcast; slow observers lose the oldest events
pub const EVENT_CAPACITY: usize = 64;

/// User intent forwarded to the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    DismissError,
}

/// Result of spawning the session task
pub struct DriverChannels {
    /// Sender for user commands
    pub commands: mpsc::UnboundedSender<Command>,
    /// Receiver for session snapshots
    pub snapshots: watch::Receiver<SessionSnapshot>,
    /// Event broadcast; call `subscribe()` for a receiver
    pub events: broadcast::Sender<SessionEvent>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Handle of the session task
    pub task: JoinHandle<()>,
}

/// Driver spawns and manages the session task
///
/// The task owns the frame source, the transport and the state machine. It is
/// the only place session state changes, so commands, timer ticks and link
/// events are handled strictly one at a time.
pub struct Driver;

impl Driver {
    /// Spawn the session task
    ///
    /// Returns the command sender, snapshot and event channels, plus a
    /// cancellation token. Cancelling (or dropping every command sender) stops
    /// the session and releases the source.
    pub fn spawn<S, T>(source: S, transport: T, rate: CaptureRate, backoff: Backoff) -> DriverChannels
    where
        S: FrameSource,
        T: Transport,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task = SessionTask {
            machine: SessionMachine::new(backoff),
            source,
            transport,
            rate,
            link_tx,
            reconnect: None,
            capture: None,
            snapshots: snapshot_tx,
            events: event_tx.clone(),
        };

        let cancel_task = cancel.clone();
        let handle = tokio::spawn(task.run(command_rx, link_rx, cancel_task));

        DriverChannels {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_tx,
            cancel,
            task: handle,
        }
    }
}

struct SessionTask<S, T> {
    machine: SessionMachine,
    source: S,
    transport: T,
    rate: CaptureRate,
    link_tx: LinkEventSender,
    reconnect: Option<Pin<Box<Sleep>>>,
    capture: Option<Interval>,
    snapshots: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl<S, T> SessionTask<S, T>
where
    S: FrameSource,
    T: Transport,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut links: mpsc::UnboundedReceiver<LinkEvent>,
        cancel: CancellationToken,
    ) {
        info!(source = %self.source.describe(), fps = self.rate.fps(), "Session task started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Session task cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command senders dropped, shutting down");
                        break;
                    }
                },
                Some(event) = links.recv() => self.handle_link_event(event).await,
                _ = reconnect_elapsed(&mut self.reconnect) => {
                    self.reconnect = None;
                    let effects = self.machine.reconnect_due();
                    self.apply(effects).await;
                }
                _ = next_tick(&mut self.capture) => self.capture_frame().await,
            }

            self.publish();
        }

        let effects = self.machine.stop();
        self.apply(effects).await;
        self.source.release().await;
        self.publish();

        info!("Session task ended");
    }

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, "Handling command");

        let effects = match command {
            Command::Start => {
                if self.machine.is_active() {
                    debug!("Start ignored: session already active");
                    return;
                }

                match self.source.acquire().await {
                    Ok(()) => self.machine.start(),
                    Err(e) => {
                        self.source.release().await;
                        self.machine.device_unavailable(&e)
                    }
                }
            }
            Command::Stop => self.machine.stop(),
            Command::Reset => self.machine.reset(),
            Command::DismissError => self.machine.dismiss_error(),
        };

        self.apply(effects).await;
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        let effects = match event {
            LinkEvent::Opened(link) => self.machine.link_opened(link),
            LinkEvent::Message(link, text) => self.machine.link_message(link, &text),
            LinkEvent::Error(link, reason) => self.machine.link_error(link, reason),
            LinkEvent::Closed(link) => self.machine.link_closed(link),
        };
        self.apply(effects).await;
    }

    async fn capture_frame(&mut self) {
        match self.source.capture_frame().await {
            Ok(payload) => {
                let effects = self.machine.frame_captured(payload, SystemTime::now());
                self.apply(effects).await;
            }
            Err(e) => warn!("Skipping frame from {}: {}", self.source.describe(), e),
        }
    }

    /// Carry out effects in order; failures feed back into the machine
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect(link) => {
                    if let Err(e) = self.transport.connect(link, self.link_tx.clone()) {
                        warn!(%link, "Connection attempt failed to start: {}", e);
                        queue.extend(self.machine.link_error(link, e.to_string()));
                        queue.extend(self.machine.link_closed(link));
                    }
                }
                Effect::Send(link, message) => match protocol::encode_outbound(&message) {
                    Ok(text) if matches!(message, Outbound::Frame { .. }) => {
                        match self.transport.send_frame(link, text) {
                            Ok(FrameDelivery::Queued) => {}
                            Ok(FrameDelivery::Replaced) => self.machine.frame_superseded(link),
                            Err(e) => debug!(%link, "Frame dropped: {}", e),
                        }
                    }
                    Ok(text) => {
                        if let Err(e) = self.transport.send(link, text) {
                            debug!(%link, kind = message.kind(), "Send dropped: {}", e);
                        }
                    }
                    Err(e) => warn!(%link, "Failed to encode {} message: {}", message.kind(), e),
                },
                Effect::Close(link) => self.transport.close(link),
                Effect::ScheduleReconnect(delay) => {
                    self.reconnect = Some(Box::pin(time::sleep(delay)));
                }
                Effect::CancelReconnect => self.reconnect = None,
                Effect::StartCapture => {
                    let mut interval = time::interval(self.rate.interval());
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.capture = Some(interval);
                }
                Effect::StopCapture => self.capture = None,
                Effect::ReleaseSource => self.source.release().await,
                Effect::Notify(event) => {
                    trace!(?event, "Session event");
                    // No subscribers is fine
                    let _ = self.events.send(event);
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn reconnect_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => future::pending().await,
    }
}
