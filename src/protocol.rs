//! Wire protocol for the arena WebSocket: typed frames in both directions
//! plus the pure decode/encode codec.
//!
//! ## Design
//! - Outbound commands are keyed by an `action` field, inbound events by a
//!   `type` field — both modeled as closed tagged enums, never probed
//!   field-by-field downstream.
//! - `decode` is pure and total over the declared schema: malformed text or
//!   a missing discriminant is a `DecodeError`; an unknown `type` or an
//!   unmapped agent id becomes `ServerEvent::Unrecognized`, which is
//!   forwarded but ignored by the session store (forward compatibility).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Participant roles
// ---------------------------------------------------------------------------

/// One of the three fixed participant slots. The set is closed for the
/// lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    CombatantA,
    CombatantB,
    Judge,
}

impl Role {
    /// All roles, in debate order.
    pub const ALL: [Role; 3] = [Role::CombatantA, Role::CombatantB, Role::Judge];

    /// The identifier this role carries on the wire.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::CombatantA => "combatant_a",
            Role::CombatantB => "combatant_b",
            Role::Judge => "judge",
        }
    }

    /// Map a wire identifier to a role. Anything outside the closed set is
    /// `None` — callers treat those frames as unrecognized, not as errors.
    pub fn from_wire(s: &str) -> Option<Role> {
        match s {
            "combatant_a" => Some(Role::CombatantA),
            "combatant_b" => Some(Role::CombatantB),
            "judge" => Some(Role::Judge),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// Model id assigned to each role when starting a debate, and echoed back
/// in `debate_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub combatant_a: String,
    pub combatant_b: String,
    pub judge: String,
}

impl RoleAssignment {
    pub fn model_for(&self, role: Role) -> &str {
        match role {
            Role::CombatantA => &self.combatant_a,
            Role::CombatantB => &self.combatant_b,
            Role::Judge => &self.judge,
        }
    }
}

/// Last-known generation metrics for one speaker. Replaced wholesale on
/// every update — fields from different turns are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tokens per second over the turn so far.
    #[serde(default)]
    pub tps: f64,
    /// Time to first token, seconds.
    #[serde(default)]
    pub ttft: Option<f64>,
    #[serde(default)]
    pub total_tokens: u64,
    /// Wall-clock seconds elapsed in the turn. Not all peers send it.
    #[serde(default)]
    pub time_elapsed: Option<f64>,
}

/// Final result delivered with `debate_ended`. Only the fields the client
/// displays are typed; the remainder rides along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateSummary {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub state: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Outbound commands (client → peer)
// ---------------------------------------------------------------------------

/// A command sent to the arena server, keyed by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    StartDebate {
        topic: String,
        roles: RoleAssignment,
    },
    GetStatus,
    StopDebate,
}

// ---------------------------------------------------------------------------
// Inbound events (peer → client)
// ---------------------------------------------------------------------------

/// A decoded inbound frame, keyed by `type` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The server accepted `start_debate`; confirms the Active lifecycle.
    DebateStarted { topic: String, agents: RoleAssignment },
    /// `role` now holds the floor; its text buffer resets.
    TurnStart { role: Role },
    /// One streamed fragment, optionally carrying a metrics snapshot.
    Token {
        role: Role,
        token: String,
        metrics: Option<MetricsSnapshot>,
    },
    /// Informational — the store does not mutate on turn end.
    TurnEnd { role: Role },
    /// Normal completion. Absent summary still completes the session.
    DebateEnded { summary: Option<DebateSummary> },
    /// Round/phase markers. Absent fields leave session state unchanged.
    Progress { round: Option<u32>, phase: Option<String> },
    /// Reply to `get_status`; payload shape is server-defined.
    Status { data: serde_json::Value },
    /// The server acknowledged `stop_debate`.
    DebateStopped,
    /// Server-side error report. Does not by itself change lifecycle.
    ServerError { message: String },
    /// Unknown `type` or unmapped agent id — forwarded, then ignored.
    Unrecognized { kind: String },
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Why an inbound frame could not be decoded. These frames are logged and
/// discarded by the connection manager; they never reach the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {detail}")]
    Json { detail: String },
    #[error("frame has no string 'type' discriminant")]
    MissingType,
    #[error("malformed '{kind}' payload: {detail}")]
    Payload { kind: String, detail: String },
}

/// Decode one raw text frame into a typed event.
///
/// Pure: never panics, never mutates state, never rejects a structurally
/// valid frame just because its `type` is unknown.
pub fn decode(raw: &str) -> Result<ServerEvent, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Json { detail: e.to_string() })?;

    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();

    match kind.as_str() {
        "debate_started" => {
            let p: DebateStartedPayload = payload(&kind, value)?;
            Ok(ServerEvent::DebateStarted { topic: p.topic, agents: p.agents })
        }
        "turn_start" => {
            let p: AgentPayload = payload(&kind, value)?;
            Ok(match Role::from_wire(&p.agent) {
                Some(role) => ServerEvent::TurnStart { role },
                None => unmapped_agent(&kind, &p.agent),
            })
        }
        "turn_end" => {
            let p: AgentPayload = payload(&kind, value)?;
            Ok(match Role::from_wire(&p.agent) {
                Some(role) => ServerEvent::TurnEnd { role },
                None => unmapped_agent(&kind, &p.agent),
            })
        }
        "token_stream" => {
            let p: TokenPayload = payload(&kind, value)?;
            Ok(match Role::from_wire(&p.agent) {
                Some(role) => ServerEvent::Token { role, token: p.token, metrics: p.metrics },
                None => unmapped_agent(&kind, &p.agent),
            })
        }
        // Both spellings observed across peer versions.
        "debate_ended" | "debate_end" => {
            let p: DebateEndedPayload = payload(&kind, value)?;
            Ok(ServerEvent::DebateEnded { summary: p.summary })
        }
        "debate_stopped" => Ok(ServerEvent::DebateStopped),
        "progress" => {
            let p: ProgressPayload = payload(&kind, value)?;
            Ok(ServerEvent::Progress { round: p.round, phase: p.phase })
        }
        "status" => {
            let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
            Ok(ServerEvent::Status { data })
        }
        "error" => {
            let p: ErrorPayload = payload(&kind, value)?;
            Ok(ServerEvent::ServerError { message: p.message })
        }
        _ => Ok(ServerEvent::Unrecognized { kind }),
    }
}

/// Encode an outbound command as one JSON text frame.
pub fn encode(command: &ClientCommand) -> String {
    // A closed enum of string/struct fields cannot fail to serialize.
    serde_json::to_string(command).expect("command serialization is infallible")
}

fn payload<T: serde::de::DeserializeOwned>(
    kind: &str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|e| DecodeError::Payload {
        kind: kind.to_string(),
        detail: e.to_string(),
    })
}

fn unmapped_agent(kind: &str, agent: &str) -> ServerEvent {
    ServerEvent::Unrecognized { kind: format!("{kind}[agent={agent}]") }
}

#[derive(Deserialize)]
struct AgentPayload {
    agent: String,
}

#[derive(Deserialize)]
struct TokenPayload {
    agent: String,
    token: String,
    #[serde(default)]
    metrics: Option<MetricsSnapshot>,
}

#[derive(Deserialize)]
struct DebateStartedPayload {
    topic: String,
    agents: RoleAssignment,
}

#[derive(Deserialize)]
struct DebateEndedPayload {
    #[serde(default)]
    summary: Option<DebateSummary>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

#[derive(Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    round: Option<u32>,
    #[serde(default)]
    phase: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn roles() -> RoleAssignment {
        RoleAssignment {
            combatant_a: "m1".to_string(),
            combatant_b: "m2".to_string(),
            judge: "m3".to_string(),
        }
    }

    // -- Role mapping --------------------------------------------------------

    #[rstest]
    #[case("combatant_a", Some(Role::CombatantA))]
    #[case("combatant_b", Some(Role::CombatantB))]
    #[case("judge", Some(Role::Judge))]
    #[case("A", None)]
    #[case("B", None)]
    #[case("moderator", None)]
    #[case("", None)]
    fn test_role_from_wire(#[case] wire: &str, #[case] expected: Option<Role>) {
        assert_eq!(Role::from_wire(wire), expected);
    }

    #[test]
    fn test_role_wire_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::from_wire(role.as_wire()), Some(role));
        }
    }

    #[test]
    fn test_role_serde_uses_wire_ids() {
        let json = serde_json::to_string(&Role::CombatantA).unwrap();
        assert_eq!(json, "\"combatant_a\"");
    }

    // -- decode: happy path --------------------------------------------------

    #[test]
    fn test_decode_debate_started() {
        let raw = r#"{"type":"debate_started","topic":"X","agents":{"combatant_a":"m1","combatant_b":"m2","judge":"m3"}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            ServerEvent::DebateStarted { topic: "X".to_string(), agents: roles() }
        );
    }

    #[test]
    fn test_decode_turn_start() {
        let raw = r#"{"type":"turn_start","agent":"combatant_a"}"#;
        assert_eq!(decode(raw).unwrap(), ServerEvent::TurnStart { role: Role::CombatantA });
    }

    #[test]
    fn test_decode_token_with_metrics() {
        let raw = r#"{"type":"token_stream","agent":"judge","token":"Hi","metrics":{"tps":12.5,"ttft":0.3,"total_tokens":7}}"#;
        match decode(raw).unwrap() {
            ServerEvent::Token { role, token, metrics } => {
                assert_eq!(role, Role::Judge);
                assert_eq!(token, "Hi");
                let m = metrics.unwrap();
                assert_eq!(m.tps, 12.5);
                assert_eq!(m.ttft, Some(0.3));
                assert_eq!(m.total_tokens, 7);
                assert_eq!(m.time_elapsed, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_token_without_metrics() {
        let raw = r#"{"type":"token_stream","agent":"combatant_b","token":" world"}"#;
        assert_eq!(
            decode(raw).unwrap(),
            ServerEvent::Token { role: Role::CombatantB, token: " world".to_string(), metrics: None }
        );
    }

    #[test]
    fn test_decode_turn_end_is_informational_variant() {
        let raw = r#"{"type":"turn_end","agent":"combatant_a"}"#;
        assert_eq!(decode(raw).unwrap(), ServerEvent::TurnEnd { role: Role::CombatantA });
    }

    #[rstest]
    #[case("debate_ended")]
    #[case("debate_end")]
    fn test_decode_debate_ended_both_spellings(#[case] kind: &str) {
        let raw = format!(r#"{{"type":"{kind}","summary":{{"turns":6,"state":"completed"}}}}"#);
        match decode(&raw).unwrap() {
            ServerEvent::DebateEnded { summary: Some(s) } => {
                assert_eq!(s.turns, 6);
                assert_eq!(s.state, "completed");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_debate_ended_without_summary() {
        assert_eq!(
            decode(r#"{"type":"debate_ended"}"#).unwrap(),
            ServerEvent::DebateEnded { summary: None }
        );
    }

    #[test]
    fn test_decode_summary_preserves_extra_fields() {
        let raw = r#"{"type":"debate_ended","summary":{"turns":2,"state":"completed","history":[{"agent":"combatant_a"}]}}"#;
        match decode(raw).unwrap() {
            ServerEvent::DebateEnded { summary: Some(s) } => {
                assert!(s.extra.contains_key("history"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_frame() {
        let raw = r#"{"type":"error","message":"model not found"}"#;
        assert_eq!(
            decode(raw).unwrap(),
            ServerEvent::ServerError { message: "model not found".to_string() }
        );
    }

    #[test]
    fn test_decode_status_and_stopped() {
        assert_eq!(
            decode(r#"{"type":"status","data":{"state":"no_active_debate"}}"#).unwrap(),
            ServerEvent::Status { data: serde_json::json!({"state": "no_active_debate"}) }
        );
        assert_eq!(decode(r#"{"type":"debate_stopped"}"#).unwrap(), ServerEvent::DebateStopped);
    }

    // -- decode: unrecognized, not fatal -------------------------------------

    #[test]
    fn test_decode_progress_partial_fields() {
        assert_eq!(
            decode(r#"{"type":"progress","round":2}"#).unwrap(),
            ServerEvent::Progress { round: Some(2), phase: None }
        );
        assert_eq!(
            decode(r#"{"type":"progress","phase":"closing"}"#).unwrap(),
            ServerEvent::Progress { round: None, phase: Some("closing".to_string()) }
        );
    }

    #[test]
    fn test_decode_unknown_type_is_unrecognized() {
        assert_eq!(
            decode(r#"{"type":"heartbeat","seq":9}"#).unwrap(),
            ServerEvent::Unrecognized { kind: "heartbeat".to_string() }
        );
    }

    #[rstest]
    #[case(r#"{"type":"turn_start","agent":"A"}"#)]
    #[case(r#"{"type":"token_stream","agent":"B","token":"x"}"#)]
    #[case(r#"{"type":"turn_end","agent":"moderator"}"#)]
    fn test_decode_unmapped_agent_is_unrecognized(#[case] raw: &str) {
        match decode(raw).unwrap() {
            ServerEvent::Unrecognized { kind } => assert!(kind.contains("agent=")),
            other => panic!("expected unrecognized, got {:?}", other),
        }
    }

    // -- decode: rejection ---------------------------------------------------

    #[rstest]
    #[case("not json at all")]
    #[case("{truncated")]
    #[case("")]
    fn test_decode_rejects_unparsable_text(#[case] raw: &str) {
        assert!(matches!(decode(raw), Err(DecodeError::Json { .. })));
    }

    #[rstest]
    #[case(r#"{"agent":"judge"}"#)]
    #[case(r#"{"type":42}"#)]
    #[case(r#"[1,2,3]"#)]
    #[case("null")]
    fn test_decode_rejects_missing_discriminant(#[case] raw: &str) {
        assert_eq!(decode(raw), Err(DecodeError::MissingType));
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        // Right discriminant, missing required field.
        let err = decode(r#"{"type":"token_stream","agent":"judge"}"#).unwrap_err();
        match err {
            DecodeError::Payload { kind, .. } => assert_eq!(kind, "token_stream"),
            other => panic!("expected payload error, got {:?}", other),
        }
    }

    // -- encode --------------------------------------------------------------

    #[test]
    fn test_encode_start_debate_shape() {
        let cmd = ClientCommand::StartDebate { topic: "Is Rust fast?".to_string(), roles: roles() };
        let value: serde_json::Value = serde_json::from_str(&encode(&cmd)).unwrap();
        assert_eq!(value["action"], "start_debate");
        assert_eq!(value["topic"], "Is Rust fast?");
        assert_eq!(value["roles"]["combatant_a"], "m1");
        assert_eq!(value["roles"]["judge"], "m3");
    }

    #[test]
    fn test_encode_unit_commands() {
        let value: serde_json::Value = serde_json::from_str(&encode(&ClientCommand::StopDebate)).unwrap();
        assert_eq!(value["action"], "stop_debate");
        let value: serde_json::Value = serde_json::from_str(&encode(&ClientCommand::GetStatus)).unwrap();
        assert_eq!(value["action"], "get_status");
    }

    #[test]
    fn test_metrics_snapshot_defaults() {
        let m: MetricsSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(m.tps, 0.0);
        assert_eq!(m.ttft, None);
        assert_eq!(m.total_tokens, 0);
    }
}
