//! Scenario tests for the session store, driven through the real codec:
//! raw wire frames are decoded and folded into the store exactly as the
//! connection pump would.

use colosseum::protocol::{decode, Role, RoleAssignment, ServerEvent};
use colosseum::session::{Lifecycle, SessionStore};
use proptest::prelude::*;

fn roles() -> RoleAssignment {
    RoleAssignment {
        combatant_a: "m1".to_string(),
        combatant_b: "m2".to_string(),
        judge: "m3".to_string(),
    }
}

fn feed(store: &SessionStore, raw: &str) {
    store.apply(decode(raw).expect("frame must decode"));
}

/// Drive a session from the start command through two streamed fragments.
fn streaming_session() -> SessionStore {
    let store = SessionStore::new();
    store.begin("X", roles()).unwrap();
    feed(&store, r#"{"type":"debate_started","topic":"X","agents":{"combatant_a":"m1","combatant_b":"m2","judge":"m3"}}"#);
    feed(&store, r#"{"type":"turn_start","agent":"combatant_a"}"#);
    feed(&store, r#"{"type":"token_stream","agent":"combatant_a","token":"Hello"}"#);
    feed(&store, r#"{"type":"token_stream","agent":"combatant_a","token":" world"}"#);
    store
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_streamed_turn_accumulates_in_order() {
    let store = streaming_session();
    let snap = store.snapshot();
    assert_eq!(snap.lifecycle, Lifecycle::Active);
    assert_eq!(snap.combatant_a.text, "Hello world");
    assert_eq!(snap.active_speaker, Some(Role::CombatantA));
}

#[test]
fn test_speaker_handoff_without_turn_end() {
    let store = streaming_session();
    feed(&store, r#"{"type":"turn_start","agent":"judge"}"#);
    let snap = store.snapshot();
    assert_eq!(snap.active_speaker, Some(Role::Judge));
    // The previous combatant's buffer is untouched by the handoff.
    assert_eq!(snap.combatant_a.text, "Hello world");
    assert!(snap.judge.text.is_empty());
}

#[test]
fn test_completion_delivers_summary_and_clears_speaker() {
    let store = streaming_session();
    feed(&store, r#"{"type":"debate_ended","summary":{"turns":6,"state":"completed"}}"#);
    let snap = store.snapshot();
    assert_eq!(snap.lifecycle, Lifecycle::Completed);
    assert!(snap.active_speaker.is_none());
    let summary = snap.summary.expect("summary populated");
    assert_eq!(summary.turns, 6);
    assert_eq!(summary.state, "completed");
}

#[test]
fn test_transport_close_mid_turn_keeps_text() {
    let store = streaming_session();
    // What the pump does when the connection drops while Active.
    store.force_idle("connection closed");
    let snap = store.snapshot();
    assert_eq!(snap.lifecycle, Lifecycle::Idle);
    assert_eq!(snap.combatant_a.text, "Hello world");
    assert!(snap.summary.is_none());
    assert!(snap.active_speaker.is_none());
}

// ---------------------------------------------------------------------------
// Frame-level robustness through the codec
// ---------------------------------------------------------------------------

#[test]
fn test_unknown_frame_kinds_are_applied_as_noops() {
    let store = streaming_session();
    let before = store.snapshot();
    feed(&store, r#"{"type":"heartbeat"}"#);
    feed(&store, r#"{"type":"turn_start","agent":"moderator"}"#);
    feed(&store, r#"{"type":"token_stream","agent":"A","token":"lost"}"#);
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_error_frame_keeps_session_active() {
    let store = streaming_session();
    feed(&store, r#"{"type":"error","message":"backend overloaded"}"#);
    let snap = store.snapshot();
    assert_eq!(snap.lifecycle, Lifecycle::Active);
    assert_eq!(snap.last_error.as_deref(), Some("backend overloaded"));
}

#[test]
fn test_restart_after_completion_clears_previous_debate() {
    let store = streaming_session();
    feed(&store, r#"{"type":"debate_ended","summary":{"turns":6,"state":"completed"}}"#);
    store.begin("Y", roles()).unwrap();
    let snap = store.snapshot();
    assert_eq!(snap.topic, "Y");
    assert!(snap.combatant_a.text.is_empty());
    assert!(snap.summary.is_none());
}

#[test]
fn test_full_debate_order_all_three_roles() {
    let store = SessionStore::new();
    store.begin("X", roles()).unwrap();
    feed(&store, r#"{"type":"debate_started","topic":"X","agents":{"combatant_a":"m1","combatant_b":"m2","judge":"m3"}}"#);
    for (agent, word) in [
        ("combatant_a", "first"),
        ("combatant_b", "second"),
        ("judge", "verdict"),
    ] {
        feed(&store, &format!(r#"{{"type":"turn_start","agent":"{agent}"}}"#));
        feed(
            &store,
            &format!(r#"{{"type":"token_stream","agent":"{agent}","token":"{word}","metrics":{{"tps":9.0,"total_tokens":1}}}}"#),
        );
        feed(&store, &format!(r#"{{"type":"turn_end","agent":"{agent}"}}"#));
    }
    feed(&store, r#"{"type":"debate_ended","summary":{"turns":3,"state":"completed"}}"#);

    let snap = store.snapshot();
    assert_eq!(snap.combatant_a.text, "first");
    assert_eq!(snap.combatant_b.text, "second");
    assert_eq!(snap.judge.text, "verdict");
    assert_eq!(snap.judge.metrics.as_ref().unwrap().tps, 9.0);
    assert_eq!(snap.lifecycle, Lifecycle::Completed);
}

// ---------------------------------------------------------------------------
// Append monotonicity (property)
// ---------------------------------------------------------------------------

proptest! {
    /// Within one turn, text equals the concatenation of fragments in
    /// arrival order, and its length never decreases.
    #[test]
    fn prop_text_is_ordered_concatenation(fragments in proptest::collection::vec(".{0,8}", 0..24)) {
        let store = SessionStore::new();
        store.begin("t", roles()).unwrap();
        store.apply(ServerEvent::TurnStart { role: Role::Judge });

        let mut expected = String::new();
        let mut last_len = 0;
        for fragment in &fragments {
            store.apply(ServerEvent::Token {
                role: Role::Judge,
                token: fragment.clone(),
                metrics: None,
            });
            expected.push_str(fragment);
            let len = store.snapshot().judge.text.len();
            prop_assert!(len >= last_len);
            last_len = len;
        }
        prop_assert_eq!(store.snapshot().judge.text, expected);
    }
}
