//! Crate-level error type.

/// Errors surfaced by the arena client.
///
/// None of these abort the process; every failure degrades to a status the
/// presentation layer can display.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A command was issued while the socket was not in the Connected state.
    /// The command is dropped — nothing is buffered across disconnects.
    #[error("not connected to the arena server (status: {status})")]
    NotConnected { status: String },

    /// `start_debate` was called while a debate is already running.
    #[error("a debate is already active on topic '{topic}'")]
    DebateActive { topic: String },

    /// The model catalog endpoint replied with a non-2xx status.
    #[error("catalog request to {url} failed: HTTP {status}")]
    Catalog { status: u16, url: String },

    /// The model catalog endpoint could not be reached or returned bad JSON.
    #[error("catalog request failed: {0}")]
    CatalogTransport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
