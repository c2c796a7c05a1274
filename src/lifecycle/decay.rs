//! Temporal decay
//!
//! Runs at session start, before the first retrieval of a session.
//! Fading memories advance their unsurfaced counter (the effective
//! retrieval weight is derived from it); expired ephemerals are archived.
//! Surfacing resets the counter, restoring the full importance weight.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lifecycle::transitions::validate_transition;
use crate::store::ProjectDb;
use crate::types::{MemoryId, MemoryStatus, TemporalClass, EPHEMERAL_EXPIRY_SESSIONS};

/// Counters from one decay sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecaySweep {
    pub processed: u64,
    pub faded: u64,
    pub archived: u64,
}

/// Advance decay for every active memory in the project database
pub fn apply_session_decay(db: &ProjectDb) -> Result<DecaySweep> {
    let mut sweep = DecaySweep::default();

    for memory in db.memories.all() {
        if memory.status != MemoryStatus::Active {
            continue;
        }
        let fades = memory.fade_rate > 0.0 || memory.temporal_class == TemporalClass::Ephemeral;
        if !fades {
            continue;
        }
        sweep.processed += 1;

        let next_count = memory.sessions_since_surfaced + 1;
        let expired = memory.temporal_class == TemporalClass::Ephemeral
            && next_count > EPHEMERAL_EXPIRY_SESSIONS;

        if expired {
            validate_transition(memory.status, MemoryStatus::Archived)?;
            db.memories.update(&memory.id, |m| {
                m.sessions_since_surfaced = next_count;
                m.status = MemoryStatus::Archived;
            })?;
            sweep.archived += 1;
        } else {
            db.memories.update(&memory.id, |m| {
                m.sessions_since_surfaced = next_count;
            })?;
            sweep.faded += 1;
        }
    }

    tracing::debug!(
        project = %db.project_id,
        processed = sweep.processed,
        faded = sweep.faded,
        archived = sweep.archived,
        "decay sweep"
    );
    Ok(sweep)
}

/// Record a surfacing: the counter resets, which restores the derived
/// retrieval weight to `importance_weight`.
pub fn mark_surfaced(db: &ProjectDb, ids: &[MemoryId], session_number: u64) -> Result<()> {
    for id in ids {
        if !db.memories.contains(id) {
            continue;
        }
        db.memories.update(id, |m| {
            m.sessions_since_surfaced = 0;
            m.last_surfaced = Some(session_number);
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::store::Store;
    use crate::types::*;
    use chrono::Utc;

    fn make_memory(id: &str, f: impl FnOnce(&mut Memory)) -> Memory {
        let now = Utc::now();
        let mut m = Memory {
            id: id.into(),
            session_id: "s".into(),
            project_id: "p".into(),
            headline: id.into(),
            content: String::new(),
            reasoning: String::new(),
            related_files: vec![],
            importance_weight: 0.5,
            confidence_score: 1.0,
            context_type: ContextType::State,
            scope: Scope::Project,
            temporal_class: TemporalClass::ShortTerm,
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
            fade_rate: 0.1,
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

    fn open_db(dir: &std::path::Path) -> std::sync::Arc<crate::store::ProjectDb> {
        let store = Store::new(ServerConfig {
            central_path: dir.to_path_buf(),
            ..Default::default()
        });
        store.open("p").unwrap()
    }

    #[test]
    fn test_fading_memory_advances() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        db.memories.insert(make_memory("fades", |_| {})).unwrap();
        db.memories
            .insert(make_memory("steady", |m| {
                m.fade_rate = 0.0;
                m.temporal_class = TemporalClass::LongTerm;
            }))
            .unwrap();

        let sweep = apply_session_decay(&db).unwrap();
        assert_eq!(sweep.faded, 1);
        assert_eq!(db.memories.get("fades").unwrap().sessions_since_surfaced, 1);
        assert_eq!(db.memories.get("steady").unwrap().sessions_since_surfaced, 0);
    }

    #[test]
    fn test_ephemeral_expires_into_archived() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        db.memories
            .insert(make_memory("old", |m| {
                m.temporal_class = TemporalClass::Ephemeral;
                m.fade_rate = 0.0;
                m.sessions_since_surfaced = EPHEMERAL_EXPIRY_SESSIONS;
            }))
            .unwrap();

        let sweep = apply_session_decay(&db).unwrap();
        assert_eq!(sweep.archived, 1);
        assert_eq!(db.memories.get("old").unwrap().status, MemoryStatus::Archived);
    }

    #[test]
    fn test_archived_memories_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        db.memories
            .insert(make_memory("gone", |m| {
                m.status = MemoryStatus::Archived;
                m.sessions_since_surfaced = 5;
            }))
            .unwrap();

        let sweep = apply_session_decay(&db).unwrap();
        assert_eq!(sweep.processed, 0);
        assert_eq!(db.memories.get("gone").unwrap().sessions_since_surfaced, 5);
    }

    #[test]
    fn test_surfacing_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(dir.path());
        db.memories
            .insert(make_memory("seen", |m| m.sessions_since_surfaced = 4))
            .unwrap();

        mark_surfaced(&db, &["seen".into(), "missing".into()], 9).unwrap();
        let m = db.memories.get("seen").unwrap();
        assert_eq!(m.sessions_since_surfaced, 0);
        assert_eq!(m.last_surfaced, Some(9));
        assert!((m.retrieval_weight() - m.importance_weight).abs() < 1e-6);
    }
}
