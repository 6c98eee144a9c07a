//! Colosseum: a real-time client for LLM debate arenas.
//!
//! The crate joins a multi-party streaming session over one persistent
//! WebSocket — two generated combatants and a judge — and folds the
//! interleaved token/control stream into a consistent, monotonically
//! growing session view:
//!
//! - [`protocol`] — the pure wire codec (tagged JSON frames both ways).
//! - [`connection`] — the one socket, with bounded cancellable reconnect.
//! - [`session`] — the authoritative state machine and its snapshots.
//! - [`client`] — the facade the presentation layer talks to.
//! - [`catalog`] — the request/response model listing endpoint.

pub mod catalog;
pub mod cli;
pub mod client;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;

pub use client::ArenaClient;
pub use connection::{ConnectionConfig, ConnectionStatus};
pub use error::{Error, Result};
pub use protocol::{ClientCommand, Role, RoleAssignment, ServerEvent};
pub use session::{Lifecycle, Session, SessionStore};
