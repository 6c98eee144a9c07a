//! Session store: the authoritative state machine for one debate session.
//!
//! ## Design
//! - One `Session` aggregate behind a mutex; `apply` is the sole mutation
//!   entry point for inbound events and holds the lock for the whole event,
//!   so a snapshot never observes a partially-applied mutation.
//! - A single ordered channel feeds `apply` (see `client.rs`), making every
//!   mutation linearizable with respect to the event stream. The store
//!   itself needs no further synchronization.
//! - Readers get cloned snapshots; reads never block the writer mid-update.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::protocol::{DebateSummary, MetricsSnapshot, Role, RoleAssignment, ServerEvent};

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

/// Coarse session status, independent of connectivity.
///
/// Transitions are one-directional per session instance:
/// Idle→Active→Completed, or Idle→Active→Idle on abnormal teardown. Both
/// end states are terminal; a new debate starts a fresh instance via
/// [`SessionStore::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Idle,
    Active,
    Completed,
}

/// Per-role accumulated output, owned exclusively by the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParticipantStream {
    /// Append-only while the role holds the floor; reset exactly at the
    /// role's turn start. Nothing else truncates or edits it mid-turn.
    pub text: String,
    /// Last-known snapshot, replaced wholesale on every metrics update.
    pub metrics: Option<MetricsSnapshot>,
}

/// Immutable snapshot of the full session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub lifecycle: Lifecycle,
    /// Set when a session starts; empty in Idle before the first start.
    pub topic: String,
    /// Model ids per role, as assigned at start (echoed by the server).
    pub roles: Option<RoleAssignment>,
    /// At most one role holds the floor at any instant.
    pub active_speaker: Option<Role>,
    pub current_round: u32,
    /// Label, not an ordinal.
    pub current_phase: String,
    pub combatant_a: ParticipantStream,
    pub combatant_b: ParticipantStream,
    pub judge: ParticipantStream,
    /// Final result; present only after normal completion.
    pub summary: Option<DebateSummary>,
    /// Last server error or teardown reason, for display.
    pub last_error: Option<String>,
    /// Tokens that arrived for a role other than the active speaker. They
    /// are still appended (a phase boundary can race in-flight tokens); the
    /// count makes the reconciliation visible.
    pub out_of_turn_tokens: u64,
}

impl Session {
    fn new() -> Self {
        Session {
            lifecycle: Lifecycle::Idle,
            topic: String::new(),
            roles: None,
            active_speaker: None,
            current_round: 0,
            current_phase: String::new(),
            combatant_a: ParticipantStream::default(),
            combatant_b: ParticipantStream::default(),
            judge: ParticipantStream::default(),
            summary: None,
            last_error: None,
            out_of_turn_tokens: 0,
        }
    }

    pub fn stream(&self, role: Role) -> &ParticipantStream {
        match role {
            Role::CombatantA => &self.combatant_a,
            Role::CombatantB => &self.combatant_b,
            Role::Judge => &self.judge,
        }
    }

    fn stream_mut(&mut self, role: Role) -> &mut ParticipantStream {
        match role {
            Role::CombatantA => &mut self.combatant_a,
            Role::CombatantB => &mut self.combatant_b,
            Role::Judge => &mut self.judge,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The one live session aggregate per client.
pub struct SessionStore {
    state: Mutex<Session>,
}

impl SessionStore {
    /// Create the store in Idle with empty streams.
    pub fn new() -> Self {
        SessionStore { state: Mutex::new(Session::new()) }
    }

    /// Clone the current state. Never blocks on an in-progress `apply`
    /// beyond the per-event critical section.
    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    /// Start a new session: valid from Idle or Completed. Resets every
    /// participant stream and the summary, sets the topic and role
    /// assignment, and moves the lifecycle to Active.
    ///
    /// While a debate is Active this is a conflicting operation — it is
    /// rejected and the running session is untouched.
    pub fn begin(&self, topic: &str, roles: RoleAssignment) -> Result<(), Error> {
        let mut s = self.lock();
        if s.lifecycle == Lifecycle::Active {
            return Err(Error::DebateActive { topic: s.topic.clone() });
        }
        *s = Session::new();
        s.lifecycle = Lifecycle::Active;
        s.topic = topic.to_string();
        s.roles = Some(roles);
        Ok(())
    }

    /// Fold one decoded inbound event into the session. The sole mutation
    /// entry point for server events; events are applied strictly in the
    /// order they arrive on the connection channel.
    pub fn apply(&self, event: ServerEvent) {
        let mut s = self.lock();
        match event {
            ServerEvent::DebateStarted { topic, agents } => {
                // Confirms Active — idempotent when begin() already ran.
                if s.lifecycle == Lifecycle::Completed {
                    warn!(topic = %topic, "debate_started after completion; ignoring");
                    return;
                }
                s.lifecycle = Lifecycle::Active;
                if s.topic.is_empty() {
                    s.topic = topic;
                }
                s.roles = Some(agents);
            }
            ServerEvent::TurnStart { role } => {
                // Exclusive floor: assigning replaces any previous holder.
                // Re-delivery is safe — the reset is indistinguishable from
                // the original one.
                s.active_speaker = Some(role);
                s.stream_mut(role).text.clear();
            }
            ServerEvent::Token { role, token, metrics } => {
                if s.active_speaker != Some(role) {
                    s.out_of_turn_tokens += 1;
                    debug!(%role, "token outside active turn");
                }
                let stream = s.stream_mut(role);
                stream.text.push_str(&token);
                if let Some(m) = metrics {
                    stream.metrics = Some(m);
                }
            }
            ServerEvent::TurnEnd { role } => {
                // Informational only.
                debug!(%role, "turn ended");
            }
            ServerEvent::Progress { round, phase } => {
                if let Some(r) = round {
                    s.current_round = r;
                }
                if let Some(p) = phase {
                    s.current_phase = p;
                }
            }
            ServerEvent::DebateEnded { summary } => {
                s.lifecycle = Lifecycle::Completed;
                s.active_speaker = None;
                s.summary = summary;
            }
            ServerEvent::DebateStopped => {
                if s.lifecycle == Lifecycle::Active {
                    s.lifecycle = Lifecycle::Idle;
                    s.active_speaker = None;
                }
            }
            ServerEvent::ServerError { message } => {
                // Recorded only; lifecycle changes are driven by the
                // subsequent close or debate_ended.
                s.last_error = Some(message);
            }
            ServerEvent::Status { .. } => {}
            ServerEvent::Unrecognized { kind } => {
                debug!(kind = %kind, "ignoring unrecognized frame");
            }
        }
    }

    /// Abnormal teardown: connection lost or explicit stop while Active.
    /// Drops the in-progress speaker and returns to Idle, preserving all
    /// accumulated text and metrics for post-mortem display. Distinguished
    /// from normal completion by the absent summary.
    pub fn force_idle(&self, reason: &str) {
        let mut s = self.lock();
        if s.lifecycle != Lifecycle::Active {
            return;
        }
        s.lifecycle = Lifecycle::Idle;
        s.active_speaker = None;
        s.last_error = Some(reason.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        // apply() never panics while holding the lock, so poisoning can
        // only come from a panicking test; recover the inner state.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
