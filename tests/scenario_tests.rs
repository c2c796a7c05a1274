//! End-to-end scenario tests
//!
//! Literal walkthroughs that lock expected behavior: primer turns,
//! activation, suppression, caps, supersession, and the action-cleared
//! sweep. A behavior change here signals a contract break, not a tweak.
//!
//! Run with: cargo test --test scenario_tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use continuity::config::ServerConfig;
use continuity::embedding::create_embedder;
use continuity::engine::Engine;
use continuity::lifecycle;
use continuity::store::Store;
use continuity::types::*;

fn make_memory(id: &str, project_id: &str, f: impl FnOnce(&mut Memory)) -> Memory {
    let now = Utc::now();
    let mut m = Memory {
        id: id.into(),
        session_id: "creator".into(),
        project_id: project_id.into(),
        headline: format!("memory {}", id),
        content: String::new(),
        reasoning: String::new(),
        related_files: vec![],
        importance_weight: 0.5,
        confidence_score: 1.0,
        context_type: ContextType::Technical,
        scope: Scope::Project,
        temporal_class: TemporalClass::LongTerm,
        status: MemoryStatus::Active,
        trigger_phrases: vec![],
        semantic_tags: vec![],
        anti_triggers: vec![],
        domain: None,
        feature: None,
        question_types: vec![],
        action_required: false,
        problem_solution_pair: false,
        awaiting_implementation: false,
        awaiting_decision: false,
        exclude_from_retrieval: false,
        session_created: 1,
        session_updated: 1,
        last_surfaced: None,
        sessions_since_surfaced: 0,
        fade_rate: 0.0,
        supersedes: None,
        superseded_by: None,
        resolves: vec![],
        resolved_by: None,
        related_to: vec![],
        blocks: vec![],
        blocked_by: vec![],
        embedding: None,
        embedded_hash: None,
        schema_version: SCHEMA_VERSION,
        created_at: now,
        updated_at: now,
    };
    f(&mut m);
    m
}

fn engine_at(dir: &std::path::Path) -> Arc<Engine> {
    let store = Arc::new(Store::new(ServerConfig {
        central_path: dir.to_path_buf(),
        ..Default::default()
    }));
    Arc::new(Engine::new(store, create_embedder().unwrap(), None, None))
}

/// A memory tuned to surface on "I'm debugging retrieval precision again"
fn debugging_memory(id: &str) -> Memory {
    make_memory(id, "p", |m| {
        m.trigger_phrases = vec!["debugging retrieval".into()];
        m.semantic_tags = vec!["retrieval".into(), "gatekeeper".into(), "precision".into()];
        m.context_type = ContextType::Debug;
        m.importance_weight = 0.8;
        m.content = "Debugging retrieval precision issues with the gatekeeper gate.".into();
    })
}

// Scenario 1: first-turn primer names the previous summary, no retrieval
#[tokio::test]
async fn scenario_first_turn_primer() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let db = engine.store().open("p").unwrap();

    let now = Utc::now();
    db.snapshots
        .insert(ProjectSnapshot {
            id: "snap-1".into(),
            project_id: "p".into(),
            snapshot: "Working on retrieval".into(),
            created_at: now,
            updated_at: now,
        })
        .unwrap();
    db.summaries
        .insert(SessionSummary {
            id: "sum-1".into(),
            session_id: "s0".into(),
            project_id: "p".into(),
            summary: "Fixed dedup bug yesterday".into(),
            created_at: now,
            updated_at: now,
        })
        .unwrap();

    let payload = engine.get_context("s1", "p", "hello").await.unwrap();

    let primer = payload.primer.expect("primer expected on first turn");
    assert!(primer.contains("Fixed dedup bug yesterday"));
    assert!(primer.contains("Working on retrieval"));
    assert!(payload.memories.is_empty());
    assert_eq!(db.sessions.get("s1").unwrap().message_count, 0);
}

// Scenario 2: trigger + tag + content activation surfaces the memory
#[tokio::test]
async fn scenario_trigger_and_tag_activation() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let db = engine.store().open("p").unwrap();
    db.memories.insert(debugging_memory("m-debug")).unwrap();

    engine.get_context("s1", "p", "hello").await.unwrap();
    engine.process_message("s1", "p").unwrap();

    let payload = engine
        .get_context("s1", "p", "I'm debugging retrieval precision again")
        .await
        .unwrap();

    assert_eq!(payload.memories.len(), 1);
    let view = &payload.memories[0];
    assert_eq!(view.id, "m-debug");
    assert!(view.signal_count >= 3);
    assert!(payload.formatted.contains("Recalled memories"));
    assert!(payload.formatted.contains(&view.headline));

    // Surfacing bookkeeping
    let surfaced = db.memories.get("m-debug").unwrap();
    assert_eq!(surfaced.sessions_since_surfaced, 0);
    assert_eq!(surfaced.last_surfaced, Some(1));
}

// Scenario 3: an anti-trigger match excludes the memory outright
#[tokio::test]
async fn scenario_anti_trigger_suppression() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let db = engine.store().open("p").unwrap();

    let mut m = debugging_memory("m-debug");
    m.anti_triggers = vec!["ignore".into()];
    db.memories.insert(m).unwrap();

    engine.get_context("s1", "p", "hello").await.unwrap();
    engine.process_message("s1", "p").unwrap();

    let payload = engine
        .get_context("s1", "p", "ignore the debugging retrieval thing")
        .await
        .unwrap();
    assert!(payload.memories.is_empty());
}

// Scenario 4: five gate-passing globals, cap 2, priority table decides
#[tokio::test]
async fn scenario_global_cap_priority() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let global = engine.store().global().unwrap();

    for (id, context_type) in [
        ("g-personal", ContextType::Personal),
        ("g-technical", ContextType::Technical),
        ("g-philosophy", ContextType::Philosophy),
        ("g-workflow", ContextType::Workflow),
        ("g-architecture", ContextType::Architecture),
    ] {
        global
            .memories
            .insert(make_memory(id, GLOBAL_PROJECT_ID, |m| {
                m.scope = Scope::Global;
                m.context_type = context_type;
                m.domain = Some("retrieval".into());
                m.semantic_tags = vec!["retrieval".into(), "precision".into()];
            }))
            .unwrap();
    }

    engine.get_context("s1", "p", "hello").await.unwrap();
    engine.process_message("s1", "p").unwrap();

    let payload = engine
        .get_context("s1", "p", "retrieval precision question")
        .await
        .unwrap();

    assert_eq!(payload.memories.len(), 2);
    let ids: Vec<&str> = payload.memories.iter().map(|m| m.id.as_str()).collect();
    assert!(ids.contains(&"g-technical"));
    assert!(!ids.contains(&"g-personal"));
}

// Scenario 5: a new state memory supersedes the old one, inverses intact
#[test]
fn scenario_state_supersession() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(ServerConfig {
        central_path: dir.path().to_path_buf(),
        ..Default::default()
    });
    let db = store.open("p").unwrap();

    db.memories
        .insert(make_memory("o", "p", |m| {
            m.context_type = ContextType::State;
            m.domain = Some("retrieval".into());
            m.created_at = Utc::now() - Duration::hours(1);
        }))
        .unwrap();
    db.memories
        .insert(make_memory("n", "p", |m| {
            m.context_type = ContextType::State;
            m.domain = Some("retrieval".into());
        }))
        .unwrap();

    lifecycle::reconcile::reconcile_memory(&db, "n").unwrap();

    let old = db.memories.get("o").unwrap();
    let new = db.memories.get("n").unwrap();
    assert_eq!(old.status, MemoryStatus::Superseded);
    assert_eq!(old.superseded_by.as_deref(), Some("n"));
    assert_eq!(new.supersedes.as_deref(), Some("o"));
    assert!(!old.is_retrieval_candidate());
}

// Scenario 6: session evidence clears action_required, memory stays active
#[test]
fn scenario_action_cleared_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(ServerConfig {
        central_path: dir.path().to_path_buf(),
        ..Default::default()
    });
    let db = store.open("p").unwrap();
    let global = store.global().unwrap();

    db.memories
        .insert(make_memory("d", "p", |m| {
            m.context_type = ContextType::Debug;
            m.action_required = true;
            m.content = "Need to fix stale embeddings in the store.".into();
        }))
        .unwrap();

    let input = lifecycle::ManagementInput {
        project_id: "p".into(),
        session_id: "s9".into(),
        session_number: 9,
        new_memory_ids: vec![],
        session_summary: Some("Ran migration and regenerated all embeddings.".into()),
        project_snapshot: None,
        personal_enabled: false,
    };
    let log = lifecycle::run_management_pass(&db, &global, &input).unwrap();

    assert_eq!(log.action_cleared, 1);
    let d = db.memories.get("d").unwrap();
    assert!(!d.action_required);
    assert_eq!(d.status, MemoryStatus::Active);
}

// Dedup across turns: a surfaced memory never comes back in-session
#[tokio::test]
async fn scenario_per_session_dedup() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_at(dir.path());
    let db = engine.store().open("p").unwrap();
    db.memories.insert(debugging_memory("m-debug")).unwrap();

    engine.get_context("s1", "p", "hello").await.unwrap();
    engine.process_message("s1", "p").unwrap();

    let first = engine
        .get_context("s1", "p", "I'm debugging retrieval precision again")
        .await
        .unwrap();
    assert_eq!(first.memories.len(), 1);

    let second = engine
        .get_context("s1", "p", "still debugging retrieval precision here")
        .await
        .unwrap();
    assert!(second.memories.is_empty());

    // A different session sees it again
    engine.get_context("s2", "p", "hello").await.unwrap();
    engine.process_message("s2", "p").unwrap();
    let other = engine
        .get_context("s2", "p", "I'm debugging retrieval precision again")
        .await
        .unwrap();
    assert_eq!(other.memories.len(), 1);
}
