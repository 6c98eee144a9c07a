//! Connection manager: owns the single persistent WebSocket to the arena
//! server, with a bounded, cancellable reconnection policy.
//!
//! ## Design
//! - One background task per `connect()` runs the whole connect → drive →
//!   reconnect loop; at most one task (and therefore one socket) is alive
//!   at a time.
//! - Decoded inbound frames and lifecycle signals flow upward over one
//!   unbounded mpsc channel in exact transport order — never reordered,
//!   coalesced, or dropped once decoded. Undecodable frames are logged and
//!   discarded here.
//! - `disconnect()` flips a watch flag observed by every suspension point
//!   (connect attempt, socket loop, reconnect sleep); it is the only
//!   cancellation primitive and also stops autonomous reconnects. Each
//!   spawned loop owns its own flag, so a later `connect()` can never
//!   un-cancel a loop that is already winding down.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::protocol::{self, ClientCommand, ServerEvent};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Connectivity state, independent of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: the reconnect budget is exhausted. Cleared by a fresh
    /// `connect()`.
    Failed,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Connection knobs. Defaults mirror the arena's reference client:
/// 5 reconnect attempts, 3 s apart.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8000/ws/arena`.
    pub url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ConnectionConfig {
            url: url.into(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
        }
    }
}

/// What the manager surfaces upward, in exact transport order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    /// Terminal failure after the retry budget ran out.
    Failed { reason: String },
    /// One successfully decoded inbound frame.
    Event(ServerEvent),
}

// ---------------------------------------------------------------------------
// Reconnect policy
// ---------------------------------------------------------------------------

/// Bounded retry: a close consumes one attempt while budget remains;
/// a successful open refunds the whole budget.
#[derive(Debug)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        ReconnectPolicy { max_attempts, delay, attempts: 0 }
    }

    /// Called when the transport opens.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Called when the transport closes: `Some(delay)` schedules one
    /// reconnect and increments the counter; `None` means the budget is
    /// exhausted and the manager must settle in Failed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            None
        } else {
            self.attempts += 1;
            Some(self.delay)
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// One spawned connection loop and the shutdown flag that cancels it.
/// The flag is created per loop: once `true` it stays `true`.
struct LoopHandle {
    join: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the one underlying transport handle. No other component reads or
/// writes the socket directly.
pub struct ConnectionManager {
    config: ConnectionConfig,
    status: Arc<Mutex<ConnectionStatus>>,
    last_error: Arc<Mutex<Option<String>>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    /// Present only while a socket is up; dropping it severs `send`.
    outbound: OutboundSlot,
    task: Mutex<Option<LoopHandle>>,
}

impl ConnectionManager {
    /// Create a manager and the ordered channel its events arrive on.
    pub fn new(config: ConnectionConfig) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager {
            config,
            status: Arc::new(Mutex::new(ConnectionStatus::Disconnected)),
            last_error: Arc::new(Mutex::new(None)),
            events_tx,
            outbound: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        };
        (manager, events_rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        *lock(&self.status)
    }

    /// Most recent transport error cause, if any.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Start (or restart after Failed/Disconnected) the connection loop.
    /// Idempotent: a call while a loop is already alive is a no-op, so
    /// concurrent connects never create a second underlying socket.
    pub fn connect(&self) {
        let mut task = lock(&self.task);
        if let Some(handle) = task.as_ref() {
            if !handle.join.is_finished() {
                debug!("connect() while loop alive; ignoring");
                return;
            }
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *lock(&self.status) = ConnectionStatus::Connecting;
        *task = Some(LoopHandle {
            join: tokio::spawn(run_loop(
                self.config.clone(),
                Arc::clone(&self.status),
                Arc::clone(&self.last_error),
                self.events_tx.clone(),
                Arc::clone(&self.outbound),
                shutdown_rx,
            )),
            shutdown_tx,
        });
    }

    /// Send one command to the peer. Valid only while Connected; otherwise
    /// the command is dropped and an error reported — nothing is buffered
    /// across disconnects.
    pub fn send(&self, command: &ClientCommand) -> Result<(), Error> {
        let status = self.status();
        if status != ConnectionStatus::Connected {
            return Err(Error::NotConnected { status: status.to_string() });
        }
        let sent = lock(&self.outbound)
            .as_ref()
            .map(|tx| tx.send(protocol::encode(command)).is_ok())
            .unwrap_or(false);
        if sent {
            Ok(())
        } else {
            Err(Error::NotConnected { status: status.to_string() })
        }
    }

    /// Explicit cancellation path, invokable from any state: stops any
    /// pending reconnect timer, closes the socket if open, and settles in
    /// Disconnected. The manager will not reconnect on its own afterwards.
    pub async fn disconnect(&self) {
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(true);
            let _ = handle.join.await;
        }
        *lock(&self.status) = ConnectionStatus::Disconnected;
    }
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

async fn run_loop(
    config: ConnectionConfig,
    status: Arc<Mutex<ConnectionStatus>>,
    last_error: Arc<Mutex<Option<String>>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: OutboundSlot,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut policy =
        ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_delay);

    loop {
        *lock(&status) = ConnectionStatus::Connecting;

        let attempt = tokio::select! {
            res = connect_async(config.url.as_str()) => res,
            _ = shutdown_requested(&mut shutdown_rx) => {
                *lock(&status) = ConnectionStatus::Disconnected;
                return;
            }
        };

        match attempt {
            Ok((socket, _response)) => {
                info!(url = %config.url, "websocket connected");
                // The outbound lane must exist before Opened is observable,
                // so a send() racing the event cannot miss it.
                let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
                *lock(&outbound) = Some(out_tx);
                *lock(&status) = ConnectionStatus::Connected;
                policy.reset();
                let _ = events_tx.send(ConnectionEvent::Opened);

                let shutdown =
                    drive_socket(socket, out_rx, &events_tx, &last_error, &mut shutdown_rx).await;

                *lock(&outbound) = None;
                *lock(&status) = ConnectionStatus::Disconnected;
                let _ = events_tx.send(ConnectionEvent::Closed);
                if shutdown {
                    return;
                }
            }
            Err(e) => {
                // Failed while Connecting counts as a close for the policy.
                warn!(url = %config.url, error = %e, "websocket connect failed");
                *lock(&last_error) = Some(e.to_string());
                *lock(&status) = ConnectionStatus::Disconnected;
                let _ = events_tx.send(ConnectionEvent::Closed);
            }
        }

        match policy.next_delay() {
            Some(delay) => {
                info!(
                    attempt = policy.attempts(),
                    max = config.max_reconnect_attempts,
                    "reconnecting after {:?}",
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut shutdown_rx) => {
                        *lock(&status) = ConnectionStatus::Disconnected;
                        return;
                    }
                }
            }
            None => {
                let reason = lock(&last_error)
                    .clone()
                    .unwrap_or_else(|| "reconnect budget exhausted".to_string());
                warn!(reason = %reason, "giving up on reconnect");
                *lock(&status) = ConnectionStatus::Failed;
                let _ = events_tx.send(ConnectionEvent::Failed { reason });
                return;
            }
        }
    }
}

/// Pump one live socket until it closes or shutdown is requested.
/// Returns true when the exit was a requested shutdown.
async fn drive_socket(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    events_tx: &mpsc::UnboundedSender<ConnectionEvent>,
    last_error: &Arc<Mutex<Option<String>>>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match protocol::decode(&text) {
                    // Forwarded in arrival order; the channel preserves it.
                    Ok(event) => { let _ = events_tx.send(ConnectionEvent::Event(event)); }
                    Err(e) => warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => return false,
                Some(Ok(_)) => {} // binary / ping / pong
                Some(Err(e)) => {
                    // The error is the cause; the stream ending right after
                    // is what drives the state transition.
                    *lock(last_error) = Some(e.to_string());
                    return false;
                }
            },
            Some(text) = out_rx.recv() => {
                if sink.send(WsMessage::Text(text)).await.is_err() {
                    return false;
                }
            }
            _ = shutdown_requested(shutdown_rx) => {
                // Commands accepted before the flag flipped are still queued
                // here; flush them so an Ok from send() means the frame left.
                while let Ok(text) = out_rx.try_recv() {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        return true;
                    }
                }
                let _ = sink.send(WsMessage::Close(None)).await;
                return true;
            }
        }
    }
}

/// Resolves once the shutdown flag is (or becomes) true.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Manager dropped; stop the loop.
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
