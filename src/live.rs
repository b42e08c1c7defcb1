//! Live streaming session handle

use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::driver::{Command, Driver};
use crate::source::FrameSource;
use crate::transport::{Transport, WsTransport};
use crate::types::{SessionEvent, SessionSnapshot};
use crate::{Result, StreamError};

/// Handle to a camera-to-inference streaming session
///
/// Owns the background session task. Commands return immediately; observe the
/// outcome through [`snapshot`](Self::snapshot), [`snapshots`](Self::snapshots)
/// or [`events`](Self::events). Dropping the handle stops the session.
///
/// ```rust,no_run
/// use comsigns_live::sources::{FrameEncoder, SyntheticSource};
/// use comsigns_live::{ConnectionState, LiveSession, StreamConfig};
///
/// # async fn run() -> comsigns_live::Result<()> {
/// let config = StreamConfig::default();
/// let source = SyntheticSource::new("stub://pattern", FrameEncoder::from_config(&config)?);
/// let session = LiveSession::connect(&config, source)?;
///
/// session.start()?;
/// let snapshot = session.wait_for(|s| s.state == ConnectionState::Connected).await?;
/// println!("session {:?}", snapshot.short_session_id());
/// session.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct LiveSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveSession {
    /// Create a session streaming `source` to the configured WebSocket endpoint
    ///
    /// Nothing is opened until [`start`](Self::start).
    pub fn connect<S>(config: &StreamConfig, source: S) -> Result<Self>
    where
        S: FrameSource,
    {
        config.validate()?;
        let endpoint = config.ws_endpoint()?;
        info!(%endpoint, "Creating live session");
        Self::with_transport(config, source, WsTransport::new(endpoint))
    }

    /// Create a session over a caller-supplied transport
    pub fn with_transport<S, T>(config: &StreamConfig, source: S, transport: T) -> Result<Self>
    where
        S: FrameSource,
        T: Transport,
    {
        config.validate()?;
        let channels = Driver::spawn(source, transport, config.capture_fps, config.backoff());

        Ok(Self {
            commands: channels.commands,
            snapshots: channels.snapshots,
            events: channels.events,
            cancel: channels.cancel,
            task: Some(channels.task),
        })
    }

    /// Acquire the source and begin streaming
    ///
    /// A start while a session is active is ignored. A source that cannot be
    /// acquired is reported as a `DeviceUnavailable` error event.
    pub fn start(&self) -> Result<()> {
        self.send(Command::Start)
    }

    /// End the session and release the source
    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Ask the service to reset its sequence state; only acted on while connected
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Clear the last error
    pub fn dismiss_error(&self) -> Result<()> {
        self.send(Command::DismissError)
    }

    /// Current session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot stream
    ///
    /// Yields the current snapshot immediately, then every change. Intermediate
    /// states may be coalesced.
    pub fn snapshots(&self) -> impl Stream<Item = SessionSnapshot> + 'static {
        WatchStream::new(self.snapshots.clone())
    }

    /// Event stream
    ///
    /// Only events emitted after this call are delivered; subscribe before
    /// issuing the command whose outcome you want to see.
    pub fn events(&self) -> impl Stream<Item = SessionEvent> + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!("Event observer lagged, {} events missed", missed);
                    None
                }
            }
        })
    }

    /// Wait until a snapshot satisfies `predicate`, returning it
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| StreamError::ChannelClosed { channel: "snapshot" })?;
        Ok(snapshot.clone())
    }

    /// Stop the session and wait for the task to release everything
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Session task failed: {}", e);
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| StreamError::ChannelClosed { channel: "command" })
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        debug!("Dropping live session");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedSource, ScriptedTransport, settle};
    use crate::types::{ConnectionState, ErrorKind};
    use std::time::Duration;

    fn session(source: &ScriptedSource, transport: &ScriptedTransport) -> LiveSession {
        LiveSession::with_transport(&StreamConfig::default(), source.clone(), transport.clone())
            .unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = StreamConfig { jpeg_quality: 0, ..StreamConfig::default() };
        let result = LiveSession::connect(&config, ScriptedSource::new());
        assert!(matches!(result, Err(StreamError::Config { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_connection_lifecycle() {
        let _ = tracing_subscriber::fmt::try_init();
        let source = ScriptedSource::new();
        let transport = ScriptedTransport::new();
        let session = session(&source, &transport);
        let mut events = Box::pin(session.events());

        assert_eq!(session.snapshot(), SessionSnapshot::default());

        session.start().unwrap();
        settle().await;
        let link = transport.last_connect().unwrap();
        transport.open(link);
        transport.message(link, r#"{"type":"status","status":"connected","session_id":"3f2a9c1e-77b0"}"#);

        let snapshot = session.wait_for(|s| s.session_id.is_some()).await.unwrap();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert_eq!(snapshot.short_session_id(), Some("3f2a9c1e"));

        assert_eq!(
            events.next().await,
            Some(SessionEvent::StatusChanged(ConnectionState::Connecting))
        );
        assert_eq!(
            events.next().await,
            Some(SessionEvent::StatusChanged(ConnectionState::Connected))
        );
        assert_eq!(
            events.next().await,
            Some(SessionEvent::SessionAssigned("3f2a9c1e-77b0".to_string()))
        );

        session.shutdown().await;
        assert!(!source.is_acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_error_can_be_dismissed() {
        let source = ScriptedSource::new();
        let transport = ScriptedTransport::new();
        let session = session(&source, &transport);
        let mut events = Box::pin(session.events());

        session.start().unwrap();
        settle().await;
        let link = transport.last_connect().unwrap();
        transport.open(link);
        transport.message(link, r#"{"type":"error","error":"model unavailable"}"#);

        let snapshot = session.wait_for(|s| s.error.is_some()).await.unwrap();
        assert_eq!(snapshot.error.as_deref(), Some("model unavailable"));
        assert_eq!(snapshot.state, ConnectionState::Connected);

        let error = loop {
            match events.next().await {
                Some(SessionEvent::Error { kind, message }) => break (kind, message),
                Some(_) => continue,
                None => panic!("event stream ended"),
            }
        };
        assert_eq!(error, (ErrorKind::RemoteRejection, "model unavailable".to_string()));

        session.dismiss_error().unwrap();
        let snapshot = session.wait_for(|s| s.error.is_none()).await.unwrap();
        assert_eq!(snapshot.state, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_stream_starts_with_current_state() {
        let source = ScriptedSource::new();
        let transport = ScriptedTransport::new();
        let session = session(&source, &transport);
        let mut snapshots = Box::pin(session.snapshots());

        let first = snapshots.next().await.unwrap();
        assert!(!first.active);

        session.start().unwrap();
        let next = snapshots.next().await.unwrap();
        assert!(next.active);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_fail_after_shutdown_of_task() {
        let source = ScriptedSource::new();
        let transport = ScriptedTransport::new();
        let session = session(&source, &transport);

        session.cancel.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(session.start(), Err(StreamError::ChannelClosed { channel: "command" })));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_releases_source() {
        let source = ScriptedSource::new();
        let transport = ScriptedTransport::new();
        let session = session(&source, &transport);

        session.start().unwrap();
        settle().await;
        assert!(source.is_acquired());

        drop(session);
        settle().await;
        assert!(!source.is_acquired());
        assert_eq!(transport.closed().len(), 1);
    }
}
