//! Connection manager.
//!
//! Owns the lifecycle of one logical session to the authority. A single actor
//! task holds every piece of mutable state. The transport handshake, the
//! inbound reader and the outbound writer run in their own tasks and report
//! back tagged with the [`SessionId`] they belong to. Reports from anything but the live session
//! are dropped, so a closing old link can never disturb its replacement.
//!
//! Sending is at-most-once: text handed to [`ConnectionHandle::send`] while
//! the session is not connected is discarded, and nothing is acknowledged.

use crate::policy::{Backoff, ReconnectPolicy};
use crate::transport::{BoxSink, BoxStream, Connector, Link};
use crate::{ClientError, TransportError};
use futures_util::{SinkExt, StreamExt};
use gavel_core::ConnectionStatus;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// Identifies one connection attempt. Strictly increasing per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The live session as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub status: ConnectionStatus,
    /// While a retry is pending, how long it was scheduled to wait;
    /// otherwise the delay that will apply if this session is lost.
    pub retry_delay: Duration,
}

/// Delivered to the consumer of a [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Status(ConnectionStatus),
    Message(String),
}

enum Command {
    Connect { reply: oneshot::Sender<SessionId> },
    Send(String),
    Shutdown,
}

enum TransportEvent {
    Opened(Result<Link, TransportError>),
    Message(String),
    Closed(Option<TransportError>),
}

struct Tagged {
    session: SessionId,
    event: TransportEvent,
}

/// Cheap, cloneable access to a running manager.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    session: watch::Receiver<Session>,
}

impl ConnectionHandle {
    /// Start connecting unless a session is already connecting or connected.
    /// A pending reconnect timer is superseded. Returns the live session.
    pub async fn connect(&self) -> Result<SessionId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect { reply })
            .map_err(|_| ClientError::ManagerStopped)?;
        rx.await.map_err(|_| ClientError::ManagerStopped)
    }

    /// Queue `text` for the live session. Dropped unless connected.
    pub fn send(&self, text: String) {
        if self.status() != ConnectionStatus::Connected {
            tracing::debug!("not connected, dropping outbound message");
            return;
        }
        if self.commands.send(Command::Send(text)).is_err() {
            tracing::debug!("manager stopped, dropping outbound message");
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session.borrow().status
    }

    pub fn session(&self) -> Session {
        *self.session.borrow()
    }

    /// Observe session transitions.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.session.clone()
    }

    /// Close the live session and stop retrying.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Spawns the session actor.
pub struct ConnectionManager;

impl ConnectionManager {
    /// Start a manager in the `Disconnected` state. Nothing happens on the
    /// wire until [`ConnectionHandle::connect`] is called; from then on the
    /// manager reconnects forever.
    pub fn spawn<C: Connector>(
        connector: C,
        policy: ReconnectPolicy,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (actor, session_rx, transport_rx) = Actor::new(Arc::new(connector), policy, event_tx);

        tokio::spawn(actor.run(command_rx, transport_rx));

        let handle = ConnectionHandle {
            commands: command_tx,
            session: session_rx,
        };
        (handle, event_rx)
    }
}

struct Actor<C> {
    connector: Arc<C>,
    backoff: Backoff,
    next_id: u64,
    live: SessionId,
    status: ConnectionStatus,
    outbound: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    attempt: Option<JoinHandle<()>>,
    retry_at: Option<Instant>,
    pending_delay: Duration,
    session_tx: watch::Sender<Session>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    transport_tx: mpsc::UnboundedSender<Tagged>,
}

impl<C: Connector> Actor<C> {
    fn new(
        connector: Arc<C>,
        policy: ReconnectPolicy,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> (Self, watch::Receiver<Session>, mpsc::UnboundedReceiver<Tagged>) {
        let backoff = Backoff::new(policy);
        let live = SessionId(0);
        let (session_tx, session_rx) = watch::channel(Session {
            id: live,
            status: ConnectionStatus::Disconnected,
            retry_delay: backoff.current(),
        });
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let actor = Self {
            connector,
            backoff,
            next_id: 0,
            live,
            status: ConnectionStatus::Disconnected,
            outbound: None,
            writer: None,
            reader: None,
            attempt: None,
            retry_at: None,
            pending_delay: Duration::ZERO,
            session_tx,
            events,
            transport_tx,
        };
        (actor, session_rx, transport_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut transport: mpsc::UnboundedReceiver<Tagged>,
    ) {
        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Connect { reply }) => {
                        let id = self.connect();
                        let _ = reply.send(id);
                    }
                    Some(Command::Send(text)) => self.send(text),
                    Some(Command::Shutdown) | None => break,
                },
                Some(tagged) = transport.recv() => self.on_transport(tagged),
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.start_attempt();
                }
            }
        }

        tracing::debug!(session = %self.live, "connection manager stopping");
        self.retry_at = None;
        self.drop_transport();
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn connect(&mut self) -> SessionId {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => self.live,
            ConnectionStatus::Disconnected => {
                self.retry_at = None;
                self.start_attempt()
            }
        }
    }

    fn start_attempt(&mut self) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.drop_transport();
        self.live = id;
        self.set_status(ConnectionStatus::Connecting);
        tracing::debug!(session = %id, "connecting");

        let connector = self.connector.clone();
        let tx = self.transport_tx.clone();
        self.attempt = Some(tokio::spawn(async move {
            let result = connector.connect().await;
            let _ = tx.send(Tagged {
                session: id,
                event: TransportEvent::Opened(result),
            });
        }));
        id
    }

    fn on_transport(&mut self, tagged: Tagged) {
        if tagged.session != self.live {
            tracing::trace!(session = %tagged.session, live = %self.live, "ignoring stale session event");
            return;
        }

        match tagged.event {
            TransportEvent::Opened(_) if self.status != ConnectionStatus::Connecting => {
                tracing::trace!(session = %self.live, "ignoring handshake for a lost session");
            }
            TransportEvent::Closed(_) if self.status != ConnectionStatus::Connected => {
                tracing::trace!(session = %self.live, "session already lost");
            }
            TransportEvent::Opened(Ok(link)) => {
                self.attempt = None;
                let (outbound, queued) = mpsc::unbounded_channel();
                self.outbound = Some(outbound);
                let tx = self.transport_tx.clone();
                self.writer = Some(spawn_writer(self.live, link.sink, queued, tx.clone()));
                self.reader = Some(spawn_reader(self.live, link.stream, tx));
                self.backoff.reset();
                tracing::info!(session = %self.live, "connected");
                self.set_status(ConnectionStatus::Connected);
            }
            TransportEvent::Opened(Err(e)) => {
                self.attempt = None;
                tracing::warn!(session = %self.live, error = %e, "connection attempt failed");
                self.lose_session();
            }
            TransportEvent::Message(text) => {
                if self.status == ConnectionStatus::Connected {
                    let _ = self.events.send(ConnectionEvent::Message(text));
                }
            }
            TransportEvent::Closed(reason) => {
                match reason {
                    Some(e) => tracing::warn!(session = %self.live, error = %e, "connection lost"),
                    None => tracing::info!(session = %self.live, "connection closed"),
                }
                self.lose_session();
            }
        }
    }

    /// Hand `text` to the writer. Never waits on the transport; a failed
    /// write comes back as a closure of the session.
    fn send(&self, text: String) {
        let Some(outbound) = self.outbound.as_ref() else {
            tracing::debug!(session = %self.live, "not connected, dropping outbound message");
            return;
        };
        if outbound.send(text).is_err() {
            tracing::debug!(session = %self.live, "writer gone, dropping outbound message");
        }
    }

    /// Clean and error closes take the same path: drop the link, schedule a retry.
    fn lose_session(&mut self) {
        self.drop_transport();
        let delay = self.backoff.next_delay();
        self.retry_at = Some(Instant::now() + delay);
        self.pending_delay = delay;
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(session = %self.live, delay_ms, "reconnect scheduled");
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn drop_transport(&mut self) {
        self.outbound = None;
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        let changed = self.status != status;
        self.status = status;
        let retry_delay = if self.retry_at.is_some() {
            self.pending_delay
        } else {
            self.backoff.current()
        };
        self.session_tx.send_replace(Session {
            id: self.live,
            status,
            retry_delay,
        });
        if changed {
            let _ = self.events.send(ConnectionEvent::Status(status));
        }
    }
}

fn spawn_writer(
    session: SessionId,
    mut sink: BoxSink,
    mut queued: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<Tagged>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = queued.recv().await {
            if let Err(e) = sink.send(text).await {
                tracing::warn!(session = %session, error = %e, "send failed");
                let _ = tx.send(Tagged {
                    session,
                    event: TransportEvent::Closed(Some(e)),
                });
                return;
            }
        }
    })
}

fn spawn_reader(
    session: SessionId,
    mut stream: BoxStream,
    tx: mpsc::UnboundedSender<Tagged>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let event = match frame {
                Ok(text) => TransportEvent::Message(text),
                Err(e) => {
                    let _ = tx.send(Tagged {
                        session,
                        event: TransportEvent::Closed(Some(e)),
                    });
                    return;
                }
            };
            if tx.send(Tagged { session, event }).is_err() {
                return;
            }
        }
        let _ = tx.send(Tagged {
            session,
            event: TransportEvent::Closed(None),
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{self, MemoryConnector};
    use futures_util::{sink, stream};
    use std::future::{self, Future};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_secs(3);

    async fn next_status(
        events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> ConnectionStatus {
        loop {
            match events.recv().await {
                Some(ConnectionEvent::Status(status)) => return status,
                Some(ConnectionEvent::Message(_)) => continue,
                None => panic!("manager stopped"),
            }
        }
    }

    fn spawn(
        connector: MemoryConnector,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ConnectionEvent>) {
        ConnectionManager::spawn(connector, ReconnectPolicy::fixed(DELAY))
    }

    #[tokio::test(start_paused = true)]
    async fn starts_disconnected_until_connect() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector.clone());
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 0);
        assert!(authority.try_accept().is_none());

        let id = handle.connect().await.unwrap();
        assert_eq!(id.get(), 1);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);
        assert!(authority.accept().await.is_some());
        assert_eq!(handle.session().id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_is_idempotent() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector.clone());

        let first = handle.connect().await.unwrap();
        let second = handle.connect().await.unwrap();
        assert_eq!(first, second);

        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);
        let _peer = authority.accept().await.unwrap();

        assert_eq!(handle.connect().await.unwrap(), first);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_once_per_closure_after_fixed_delay() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector.clone());

        handle.connect().await.unwrap();
        let mut peer = authority.accept().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        const CLOSURES: usize = 4;
        for _ in 0..CLOSURES {
            drop(peer);
            let closed_at = Instant::now();
            assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);
            assert_eq!(handle.status(), ConnectionStatus::Disconnected);

            peer = authority.accept().await.unwrap();
            let waited = closed_at.elapsed();
            assert!(waited >= DELAY, "reconnected after {waited:?}");
            assert!(waited < DELAY + Duration::from_millis(50), "reconnected after {waited:?}");

            assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
            assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);
        }

        assert_eq!(connector.attempts(), 1 + CLOSURES);
        assert_eq!(handle.session().id.get(), 1 + CLOSURES as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_handshakes_back_off() {
        let (connector, authority) = memory::channel();
        drop(authority);
        let policy = ReconnectPolicy::exponential(Duration::from_secs(1), Duration::from_secs(5))
            .with_jitter(0.0);
        let (handle, _events) = ConnectionManager::spawn(connector.clone(), policy);

        let start = Instant::now();
        handle.connect().await.unwrap();

        // Attempts at t = 0, 1, 3, 7, 12.
        for (at, expected) in [(500, 1), (1_500, 2), (3_500, 3), (7_500, 4), (12_500, 5)] {
            tokio::time::sleep_until(start + Duration::from_millis(at)).await;
            assert_eq!(connector.attempts(), expected, "at {at}ms");
            assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_supersedes_pending_retry() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector.clone());

        handle.connect().await.unwrap();
        let peer = authority.accept().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        drop(peer);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);

        let before = Instant::now();
        let id = handle.connect().await.unwrap();
        assert_eq!(id.get(), 2);
        let _peer = authority.accept().await.unwrap();
        assert!(before.elapsed() < DELAY);

        // The superseded timer must not fire a second attempt.
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(handle.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn send_is_dropped_unless_connected() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector);

        handle.send("too early".to_string());

        handle.connect().await.unwrap();
        let mut peer = authority.accept().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        handle.send("hello".to_string());
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));
        assert!(peer.try_recv().is_none());

        peer.send("welcome").unwrap();
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Message("welcome".to_string()))
        );
    }

    #[tokio::test]
    async fn stale_session_events_are_ignored() {
        let (connector, _authority) = memory::channel();
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (mut actor, session, _transport) =
            Actor::new(Arc::new(connector), ReconnectPolicy::fixed(DELAY), events_tx);

        actor.live = SessionId(2);
        actor.status = ConnectionStatus::Connected;

        actor.on_transport(Tagged {
            session: SessionId(1),
            event: TransportEvent::Closed(None),
        });
        actor.on_transport(Tagged {
            session: SessionId(1),
            event: TransportEvent::Message("old".to_string()),
        });
        assert!(events.try_recv().is_err());
        assert!(actor.retry_at.is_none());
        assert_eq!(actor.status, ConnectionStatus::Connected);

        actor.on_transport(Tagged {
            session: SessionId(2),
            event: TransportEvent::Message("new".to_string()),
        });
        assert_eq!(
            events.try_recv().ok(),
            Some(ConnectionEvent::Message("new".to_string()))
        );

        actor.on_transport(Tagged {
            session: SessionId(2),
            event: TransportEvent::Closed(None),
        });
        assert_eq!(
            events.try_recv().ok(),
            Some(ConnectionEvent::Status(ConnectionStatus::Disconnected))
        );
        assert_eq!(session.borrow().status, ConnectionStatus::Disconnected);
        assert!(actor.retry_at.is_some());
    }

    /// A link whose writes never complete and whose peer hangs up after a second.
    #[derive(Default)]
    struct StalledConnector {
        attempts: AtomicUsize,
    }

    impl Connector for StalledConnector {
        fn connect(&self) -> impl Future<Output = Result<Link, TransportError>> + Send {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let sink = sink::unfold((), |(), _text: String| {
                future::pending::<Result<(), TransportError>>()
            });
            let stream = stream::once(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Err(TransportError::Closed)
            });
            future::ready(Ok(Link::new(Box::pin(sink), Box::pin(stream))))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_does_not_block_the_session() {
        let (handle, mut events) = ConnectionManager::spawn(
            StalledConnector::default(),
            ReconnectPolicy::fixed(DELAY),
        );

        handle.connect().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        handle.send("bid".to_string());

        // The peer's hang-up still gets through while the write is stuck.
        let lost = tokio::time::timeout(Duration::from_secs(2), next_status(&mut events)).await;
        assert_eq!(lost, Ok(ConnectionStatus::Disconnected));

        let id = tokio::time::timeout(Duration::from_millis(100), handle.connect()).await;
        assert_eq!(id.unwrap().unwrap().get(), 2);

        handle.shutdown();
        let stopped = tokio::time::timeout(Duration::from_secs(1), async {
            while next_status(&mut events).await != ConnectionStatus::Disconnected {}
        })
        .await;
        assert!(stopped.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_retrying() {
        let (connector, mut authority) = memory::channel();
        let (handle, mut events) = spawn(connector.clone());

        handle.connect().await.unwrap();
        let mut peer = authority.accept().await.unwrap();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connecting);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Connected);

        handle.shutdown();
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);
        assert!(peer.recv().await.is_none());

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(connector.attempts(), 1);
        assert!(handle.connect().await.is_err());
    }
}
