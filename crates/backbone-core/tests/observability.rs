//! Observability tests for memory lifecycle tracing.
//!
//! These exercise the emitting paths under a captured subscriber; the
//! events themselves are asserted in the crate's unit tests.

use backbone_core::metrics::Metrics;
use backbone_core::obs::{
    emit_access_denied, emit_agent_query, emit_decision_recorded, emit_lock_timeout, StoreSpan,
};
use backbone_core::{
    init_tracing, AccessContext, AccessPurpose, ActorKind, AgentQuery, DecisionTrace,
    LoggingConfig, MemoryContent, MemoryLayer, MemoryManager, NewEntry,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_agent_query() {
    emit_agent_query("planner", AccessPurpose::Analysis, 2, 1, 3);
}

#[traced_test]
#[test]
fn test_emit_access_denied_logs_warning() {
    let reason = "requester not permitted on private entry";
    emit_access_denied("u2", "sphere_local-1-abc", &reason);
}

#[traced_test]
#[test]
fn test_emit_decision_and_lock_timeout() {
    emit_decision_recorded("trace-1", "narrative-1-abc", 0.5);
    emit_lock_timeout("memory", std::time::Duration::from_millis(500));
}

#[traced_test]
#[test]
fn test_store_span_wraps_manager_calls() {
    let _span = StoreSpan::enter("lifecycle");
    let mut mgr = MemoryManager::new();
    let e = mgr
        .add_entry(NewEntry::new(
            MemoryLayer::SphereLocal,
            ActorKind::User,
            "u1",
            MemoryContent::text("x"),
        ))
        .unwrap();
    mgr.add_decision_trace(DecisionTrace::new("d", "r", 0.4)).unwrap();
    let agent = AccessContext::agent("bot", AccessPurpose::Display);
    assert!(mgr.read_entry(&agent, &e.id).is_err());
    mgr.query_for_agent(&AgentQuery::scoped(&MemoryLayer::ALL), &agent);
    mgr.run_cleanup();
}

#[test]
fn test_metrics_flush_does_not_panic() {
    let m = Metrics::new();
    m.inc_agent_queries();
    m.flush();
    assert_eq!(m.agent_queries(), 1);
}

#[test]
fn test_init_tracing_json() {
    let config = LoggingConfig {
        json: true,
        level: "debug".into(),
    };
    assert!(init_tracing(&config).is_ok());
}
