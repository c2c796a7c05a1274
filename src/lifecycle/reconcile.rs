//! Relationship reconciliation and implicit transitions
//!
//! After each curation, new memories are reconciled against the existing
//! corpus: state memories are latest-wins per domain, conflicting
//! architecture/decision memories are superseded on explicit reversal
//! language, `resolves` references close their targets, and session
//! evidence clears stale flags. Inverse links are never omitted.

use std::collections::HashSet;

use crate::error::Result;
use crate::lifecycle::transitions::validate_transition;
use crate::retrieval::signals::significant_tokens;
use crate::store::ProjectDb;
use crate::types::{ContextType, Memory, MemoryStatus};

/// Phrases marking an explicit reversal of an earlier decision
const REVERSAL_PHRASES: &[&str] = &[
    "instead of",
    "rather than",
    "no longer",
    "replaces",
    "replaced",
    "reverted",
    "reversing",
    "switched from",
    "switched to",
    "changed from",
    "supersedes",
    "abandoned",
];

/// Verb stems that signal completed work in session evidence
const COMPLETION_STEMS: &[&str] = &[
    "implement", "finish", "complet", "fix", "ship", "done", "resolv", "merg", "deploy",
    "regenerat", "migrat", "solved", "landed", "closed", "ran",
];

/// Outcome counters for one memory's reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub superseded: u64,
    pub resolved: u64,
    pub linked: u64,
    pub notes: Vec<String>,
    /// Memory files written during this reconciliation
    pub touched: Vec<String>,
}

/// Outcome counters for the evidence pass
#[derive(Debug, Clone, Default)]
pub struct EvidenceOutcome {
    pub action_cleared: u64,
    pub implementation_cleared: u64,
    pub blockers_cleared: u64,
    /// Memory files written during this pass
    pub touched: Vec<String>,
}

fn memory_file(id: &str) -> String {
    format!("memories/{}.md", id)
}

/// Bound on vector-discovered candidates per new memory
const DISCOVERY_TOP_K: usize = 10;

/// Reconcile one newly-created memory against its database
pub fn reconcile_memory(db: &ProjectDb, new_id: &str) -> Result<ReconcileOutcome> {
    let mut outcome = ReconcileOutcome::default();
    let new = match db.memories.get(new_id) {
        Some(m) => m,
        None => {
            outcome.notes.push(format!("new memory missing: {}", new_id));
            return Ok(outcome);
        }
    };

    let candidates = discover_candidates(db, &new);

    // Supersession trigger matrix
    if let Some(old) = supersession_target(&new, &candidates) {
        match apply_supersession(db, &old, &new) {
            Ok(()) => {
                outcome.superseded += 1;
                outcome.touched.push(memory_file(&old.id));
                outcome.touched.push(memory_file(&new.id));
            }
            Err(err) => outcome
                .notes
                .push(format!("supersession {} -> {}: {}", new.id, old.id, err)),
        }
    }

    // Resolution of referenced unresolved/debug/todo memories
    for target_id in &new.resolves {
        match resolve_target(db, target_id, &new.id) {
            Ok(true) => {
                outcome.resolved += 1;
                outcome.touched.push(memory_file(target_id));
            }
            Ok(false) => outcome
                .notes
                .push(format!("resolve target missing: {}", target_id)),
            Err(err) => outcome
                .notes
                .push(format!("resolution {} -> {}: {}", new.id, target_id, err)),
        }
    }

    // Symmetric relations for remaining close candidates
    let new = db.memories.get(new_id).unwrap_or(new);
    for candidate in &candidates {
        if candidate.id == new.id {
            continue;
        }
        if new.supersedes.as_deref() == Some(candidate.id.as_str()) {
            continue;
        }
        if new.resolves.contains(&candidate.id) {
            continue;
        }
        if should_relate(&new, candidate) && !new.related_to.contains(&candidate.id) {
            link_related(db, &new.id, &candidate.id)?;
            outcome.linked += 1;
            outcome.touched.push(memory_file(&new.id));
            outcome.touched.push(memory_file(&candidate.id));
        }
    }

    Ok(outcome)
}

/// Cheap metadata filters first, bounded vector search as a fallback
fn discover_candidates(db: &ProjectDb, new: &Memory) -> Vec<Memory> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Memory> = Vec::new();

    for memory in db.memories.all() {
        if memory.id == new.id || memory.status != MemoryStatus::Active {
            continue;
        }
        let same_domain = matches_field(&memory.domain, &new.domain);
        let same_feature = matches_field(&memory.feature, &new.feature);
        let same_type = memory.context_type == new.context_type;
        let shared_files = memory
            .related_files
            .iter()
            .any(|f| new.related_files.contains(f));

        if same_domain || same_feature || (same_type && shared_files) {
            seen.insert(memory.id.clone());
            candidates.push(memory);
        }
    }

    if candidates.is_empty() {
        if let Some(embedding) = &new.embedding {
            for hit in db.memories.search(embedding, DISCOVERY_TOP_K, |m| {
                m.id != new.id && m.status == MemoryStatus::Active
            }) {
                if hit.similarity >= 0.6 && seen.insert(hit.memory.id.clone()) {
                    candidates.push(hit.memory);
                }
            }
        }
    }

    candidates
}

fn matches_field(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => !x.is_empty() && x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Pick the single older memory the new one supersedes, if any.
///
/// State is latest-wins per domain; architecture/decision need the same
/// domain + feature and explicit reversal language. `supersedes` is 1:1,
/// so the most recent match wins when several qualify.
fn supersession_target(new: &Memory, candidates: &[Memory]) -> Option<Memory> {
    let matches: Vec<&Memory> = match new.context_type {
        ContextType::State => candidates
            .iter()
            .filter(|c| c.context_type == ContextType::State)
            .filter(|c| matches_field(&c.domain, &new.domain))
            .collect(),
        ContextType::Architecture | ContextType::Decision => {
            if !has_reversal_language(new) {
                return None;
            }
            candidates
                .iter()
                .filter(|c| c.context_type == new.context_type)
                .filter(|c| {
                    matches_field(&c.domain, &new.domain)
                        && matches_field(&c.feature, &new.feature)
                })
                .collect()
        }
        _ => return None,
    };

    matches
        .into_iter()
        .max_by_key(|c| c.created_at)
        .cloned()
}

fn has_reversal_language(memory: &Memory) -> bool {
    let text = format!("{} {}", memory.content, memory.reasoning).to_lowercase();
    REVERSAL_PHRASES.iter().any(|p| text.contains(p))
}

/// Supersede `old` by `new`, maintaining the inverse on both records
fn apply_supersession(db: &ProjectDb, old: &Memory, new: &Memory) -> Result<()> {
    validate_transition(old.status, MemoryStatus::Superseded)?;
    db.memories.update(&old.id, |m| {
        m.status = MemoryStatus::Superseded;
        m.superseded_by = Some(new.id.clone());
    })?;
    db.memories.update(&new.id, |m| {
        m.supersedes = Some(old.id.clone());
    })?;
    Ok(())
}

/// Close one `resolves` target; returns false when the target is missing
fn resolve_target(db: &ProjectDb, target_id: &str, new_id: &str) -> Result<bool> {
    let target = match db.memories.get(target_id) {
        Some(t) => t,
        None => return Ok(false),
    };
    validate_transition(target.status, MemoryStatus::Superseded)?;
    db.memories.update(target_id, |m| {
        m.status = MemoryStatus::Superseded;
        m.resolved_by = Some(new_id.to_string());
    })?;
    Ok(true)
}

fn should_relate(new: &Memory, candidate: &Memory) -> bool {
    (matches_field(&new.domain, &candidate.domain)
        && matches_field(&new.feature, &candidate.feature))
        || candidate
            .related_files
            .iter()
            .filter(|f| new.related_files.contains(*f))
            .count()
            >= 2
}

/// Append the relation on both sides (related_to is symmetric)
pub fn link_related(db: &ProjectDb, a: &str, b: &str) -> Result<()> {
    db.memories.update(a, |m| {
        if !m.related_to.contains(&b.to_string()) {
            m.related_to.push(b.to_string());
        }
    })?;
    db.memories.update(b, |m| {
        if !m.related_to.contains(&a.to_string()) {
            m.related_to.push(a.to_string());
        }
    })?;
    Ok(())
}

/// Apply implicit transitions derived from session evidence (summary,
/// snapshot, and solved/milestone headlines of the new batch).
pub fn apply_session_evidence(
    db: &ProjectDb,
    evidence: &str,
    session_number: u64,
) -> Result<EvidenceOutcome> {
    let mut outcome = EvidenceOutcome::default();
    if evidence.trim().is_empty() {
        return Ok(outcome);
    }

    let evidence_tokens = significant_tokens(evidence);
    let completion_seen = evidence_tokens
        .iter()
        .any(|t| COMPLETION_STEMS.iter().any(|stem| t.starts_with(stem)));

    for memory in db.memories.all() {
        if memory.status != MemoryStatus::Active {
            continue;
        }

        // Blockers that are now superseded/archived no longer block
        if !memory.blocked_by.is_empty() {
            let gone: Vec<String> = memory
                .blocked_by
                .iter()
                .filter(|id| {
                    db.memories
                        .get(id)
                        .map(|b| b.status.is_terminal() || b.status == MemoryStatus::Deprecated)
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            if !gone.is_empty() {
                outcome.blockers_cleared += gone.len() as u64;
                outcome.touched.push(memory_file(&memory.id));
                db.memories.update(&memory.id, |m| {
                    m.blocked_by.retain(|id| !gone.contains(id));
                })?;
            }
        }

        if !completion_seen {
            continue;
        }
        let mentioned = identity_tokens(&memory)
            .intersection(&evidence_tokens)
            .next()
            .is_some();
        if !mentioned {
            continue;
        }

        // Action-cleared sweep. False negatives are worse than false
        // positives here: a missed clear keeps a dead reminder surfacing.
        if memory.action_required {
            db.memories.update(&memory.id, |m| {
                m.action_required = false;
                m.session_updated = session_number;
            })?;
            outcome.action_cleared += 1;
            outcome.touched.push(memory_file(&memory.id));
        }

        if memory.awaiting_implementation {
            db.memories.update(&memory.id, |m| {
                m.awaiting_implementation = false;
                m.session_updated = session_number;
            })?;
            outcome.implementation_cleared += 1;
            outcome.touched.push(memory_file(&memory.id));
        }
    }

    Ok(outcome)
}

/// Tokens that identify what a memory is about
fn identity_tokens(memory: &Memory) -> HashSet<String> {
    let head: String = memory.content.chars().take(200).collect();
    let mut text = format!("{} {}", memory.headline, head);
    if let Some(domain) = &memory.domain {
        text.push(' ');
        text.push_str(domain);
    }
    if let Some(feature) = &memory.feature {
        text.push(' ');
        text.push_str(feature);
    }
    for file in &memory.related_files {
        text.push(' ');
        text.push_str(file);
    }
    significant_tokens(&text)
}
