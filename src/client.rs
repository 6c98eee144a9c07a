//! Arena client facade: wires the connection manager to the session store
//! and exposes the read-only snapshot plus the three presentation-layer
//! commands (start, stop/disconnect, send-arbitrary-command).
//!
//! One spawned pump task drains the ordered connection channel and performs
//! every store mutation, making it the store's single writer. Presentation
//! code only ever reads cloned snapshots.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionStatus};
use crate::error::Error;
use crate::protocol::{ClientCommand, RoleAssignment};
use crate::session::{Session, SessionStore};

pub struct ArenaClient {
    manager: Arc<ConnectionManager>,
    store: Arc<SessionStore>,
    pump: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ArenaClient {
    /// Build the client and start its event pump. Must run inside a tokio
    /// runtime.
    pub fn new(config: ConnectionConfig) -> Self {
        let (manager, events_rx) = ConnectionManager::new(config);
        let store = Arc::new(SessionStore::new());
        let pump = tokio::spawn(pump_events(events_rx, Arc::clone(&store)));
        ArenaClient {
            manager: Arc::new(manager),
            store,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Open (or re-open) the connection. Idempotent while a connection
    /// attempt or live socket exists.
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// Tear the connection down and cancel any pending reconnect.
    pub async fn disconnect(&self) {
        self.manager.disconnect().await;
    }

    /// Start a debate: validates the lifecycle (Idle or Completed only),
    /// resets all participant streams, then issues `start_debate` to the
    /// server. Rejected while a debate is already active, and rejected
    /// without state change when the socket is down.
    pub fn start_debate(&self, topic: &str, roles: RoleAssignment) -> Result<(), Error> {
        let status = self.manager.status();
        if status != ConnectionStatus::Connected {
            return Err(Error::NotConnected { status: status.to_string() });
        }
        self.store.begin(topic, roles.clone())?;
        let command = ClientCommand::StartDebate { topic: topic.to_string(), roles };
        if let Err(e) = self.manager.send(&command) {
            // The socket dropped between the check and the send; the fresh
            // Active session cannot proceed.
            self.store.force_idle("connection lost before start");
            return Err(e);
        }
        Ok(())
    }

    /// Stop: asks the server to end the debate if we are connected, then
    /// disconnects. An active session degrades to Idle with its text kept.
    pub async fn stop(&self) {
        if self.manager.status() == ConnectionStatus::Connected {
            let _ = self.manager.send(&ClientCommand::StopDebate);
        }
        self.manager.disconnect().await;
        self.store.force_idle("stopped by user");
    }

    /// Send an arbitrary command. Valid only while Connected.
    pub fn send(&self, command: &ClientCommand) -> Result<(), Error> {
        self.manager.send(command)
    }

    /// Immutable snapshot of the full session state.
    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    /// Most recent transport error, for the status line.
    pub fn connection_error(&self) -> Option<String> {
        self.manager.last_error()
    }
}

impl Drop for ArenaClient {
    fn drop(&mut self) {
        if let Ok(mut pump) = self.pump.lock() {
            if let Some(handle) = pump.take() {
                handle.abort();
            }
        }
    }
}

/// The single writer: serializes every store mutation behind the ordered
/// inbound channel.
async fn pump_events(mut events_rx: mpsc::UnboundedReceiver<ConnectionEvent>, store: Arc<SessionStore>) {
    while let Some(event) = events_rx.recv().await {
        match event {
            ConnectionEvent::Opened => debug!("connection opened"),
            ConnectionEvent::Event(server_event) => store.apply(server_event),
            ConnectionEvent::Closed => store.force_idle("connection closed"),
            ConnectionEvent::Failed { reason } => {
                store.force_idle(&format!("connection failed: {reason}"));
            }
        }
    }
}
