//! Lifecycle management
//!
//! The manager runs after each curation pass: it reconciles the new batch
//! against the existing corpus, applies implicit transitions from session
//! evidence, maintains the personal primer, and appends a management log.
//! A broken single memory never fails the whole pass.

pub mod decay;
pub mod primer;
pub mod reconcile;
pub mod transitions;

pub use decay::{apply_session_decay, mark_surfaced, DecaySweep};
pub use transitions::{can_transition, validate_transition};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::error::Result;
use crate::store::ProjectDb;
use crate::types::{ContextType, ManagementLog, Memory, MemoryId};

/// Inputs for one management pass
#[derive(Debug, Clone)]
pub struct ManagementInput {
    pub project_id: String,
    pub session_id: String,
    pub session_number: u64,
    /// Ids of memories the curator just created (project or global)
    pub new_memory_ids: Vec<MemoryId>,
    pub session_summary: Option<String>,
    pub project_snapshot: Option<String>,
    pub personal_enabled: bool,
}

/// Run the full management pass and append its log to the project db
pub fn run_management_pass(
    project_db: &Arc<ProjectDb>,
    global_db: &Arc<ProjectDb>,
    input: &ManagementInput,
) -> Result<ManagementLog> {
    let started = Instant::now();
    let now = Utc::now();

    let mut processed = 0_u64;
    let mut superseded = 0_u64;
    let mut resolved = 0_u64;
    let mut linked = 0_u64;
    let mut action_cleared = 0_u64;
    let mut files_touched: Vec<String> = Vec::new();
    let mut notes: Vec<String> = Vec::new();

    // 1. Relationship reconciliation per new memory, in its own db
    for id in &input.new_memory_ids {
        let db = if project_db.memories.contains(id) {
            project_db
        } else if global_db.memories.contains(id) {
            global_db
        } else {
            notes.push(format!("new memory not found: {}", id));
            continue;
        };
        processed += 1;
        match reconcile::reconcile_memory(db, id) {
            Ok(outcome) => {
                superseded += outcome.superseded;
                resolved += outcome.resolved;
                linked += outcome.linked;
                notes.extend(outcome.notes);
                files_touched.extend(outcome.touched);
            }
            Err(err) => notes.push(format!("reconcile {}: {}", id, err)),
        }
    }

    // 2. Implicit transitions from session evidence
    let evidence = evidence_text(project_db, global_db, input);
    match reconcile::apply_session_evidence(project_db, &evidence, input.session_number) {
        Ok(outcome) => {
            action_cleared += outcome.action_cleared;
            files_touched.extend(outcome.touched);
        }
        Err(err) => notes.push(format!("evidence pass: {}", err)),
    }

    // 3. Personal primer
    if input.personal_enabled {
        let new_globals: Vec<Memory> = input
            .new_memory_ids
            .iter()
            .filter_map(|id| global_db.memories.get(id))
            .collect();
        match primer::update_primer(global_db, &new_globals) {
            Ok(added) if added > 0 => {
                files_touched.push(format!("primer/{}.md", crate::types::PRIMER_ID));
            }
            Ok(_) => {}
            Err(err) => notes.push(format!("primer: {}", err)),
        }
    }

    files_touched.sort();
    files_touched.dedup();

    let log = ManagementLog {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: input.project_id.clone(),
        session_id: input.session_id.clone(),
        processed,
        superseded,
        resolved,
        action_cleared,
        linked,
        files_touched,
        success: true,
        duration_ms: started.elapsed().as_millis() as u64,
        notes,
        created_at: now,
        updated_at: now,
    };
    project_db.management_logs.insert(log.clone())?;

    tracing::info!(
        project = %input.project_id,
        processed,
        superseded,
        resolved,
        action_cleared,
        linked,
        duration_ms = log.duration_ms,
        "management pass complete"
    );
    Ok(log)
}

/// Append a failure log after a curator or manager error
pub fn log_failed_pass(
    project_db: &Arc<ProjectDb>,
    project_id: &str,
    session_id: &str,
    reason: &str,
) -> Result<ManagementLog> {
    let now = Utc::now();
    let log = ManagementLog {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        session_id: session_id.to_string(),
        processed: 0,
        superseded: 0,
        resolved: 0,
        action_cleared: 0,
        linked: 0,
        files_touched: vec![],
        success: false,
        duration_ms: 0,
        notes: vec![reason.to_string()],
        created_at: now,
        updated_at: now,
    };
    project_db.management_logs.insert(log.clone())?;
    Ok(log)
}

/// Session evidence the implicit-transition pass scans: summary, snapshot,
/// and the headlines of new solved/milestone memories.
fn evidence_text(
    project_db: &Arc<ProjectDb>,
    global_db: &Arc<ProjectDb>,
    input: &ManagementInput,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(summary) = &input.session_summary {
        parts.push(summary.clone());
    }
    if let Some(snapshot) = &input.project_snapshot {
        parts.push(snapshot.clone());
    }
    for id in &input.new_memory_ids {
        let memory = project_db
            .memories
            .get(id)
            .or_else(|| global_db.memories.get(id));
        if let Some(m) = memory {
            if m.context_type == ContextType::Milestone
                || m.problem_solution_pair
                || !m.resolves.is_empty()
            {
                parts.push(m.headline.clone());
            }
        }
    }
    parts.join("\n")
}
