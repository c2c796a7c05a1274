//! Personal primer maintenance
//!
//! The primer is a singleton markdown document (scope = global) injected
//! at every session start. The lifecycle manager merges primer-worthy
//! personal facts into it; it is the only file the manager may create.

use chrono::Utc;

use crate::error::Result;
use crate::store::ProjectDb;
use crate::types::{ContextType, Memory, PersonalPrimer, Scope, PRIMER_ID};

/// Words marking core identity, family, or relationship milestones
const PRIMER_WORTHY: &[&str] = &[
    "name",
    "family",
    "wife",
    "husband",
    "partner",
    "daughter",
    "son",
    "kid",
    "child",
    "children",
    "birthday",
    "anniversary",
    "married",
    "engaged",
    "identity",
    "values",
    "believes",
    "call me",
    "prefers to be",
];

/// A personal global memory worth carrying across every session
pub fn is_primer_worthy(memory: &Memory) -> bool {
    if memory.context_type != ContextType::Personal || memory.scope != Scope::Global {
        return false;
    }
    let text = format!("{} {}", memory.headline, memory.content).to_lowercase();
    PRIMER_WORTHY.iter().any(|w| text.contains(w))
}

/// Merge primer-worthy facts from the new batch into the primer document.
/// Returns how many facts were added. The primer collection's write lock
/// covers the read-modify-write.
pub fn update_primer(global_db: &ProjectDb, new_memories: &[Memory]) -> Result<u64> {
    let worthy: Vec<&Memory> = new_memories
        .iter()
        .filter(|m| is_primer_worthy(m))
        .collect();
    if worthy.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut primer = global_db.primer.get(PRIMER_ID).unwrap_or(PersonalPrimer {
        id: PRIMER_ID.to_string(),
        content: "# Personal Primer\n".to_string(),
        created_at: now,
        updated_at: now,
    });

    let mut added = 0_u64;
    for memory in worthy {
        let fact = memory.headline.trim();
        if fact.is_empty() || primer.content.contains(fact) {
            continue;
        }
        merge_fact(&mut primer.content, fact);
        added += 1;
    }

    if added > 0 {
        primer.updated_at = now;
        global_db.primer.upsert(primer)?;
        tracing::info!(added, "personal primer updated");
    }
    Ok(added)
}

/// Append a fact bullet, respecting the document's existing structure:
/// facts accumulate under the trailing "## About" section, which is
/// created on first use.
fn merge_fact(content: &mut String, fact: &str) {
    const SECTION: &str = "## About";
    if !content.contains(SECTION) {
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');
        content.push_str(SECTION);
        content.push('\n');
    }
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("- {}\n", fact));
}
