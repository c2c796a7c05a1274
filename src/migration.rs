//! Schema migration
//!
//! Idempotent upgrader for memory files: consolidates legacy free-form
//! `context_type` values onto the canonical closed set (built-in table,
//! fuzzy keyword fallback, optional custom overlay), maps the old
//! `temporal_relevance` field to `temporal_class`, deletes obsolete
//! fields, and regenerates missing or wrong-length embeddings. Files are
//! rewritten only when their canonical form differs, so a second run is
//! a no-op.

use std::collections::HashMap;
use std::path::Path;

use serde_yaml::Value;

use crate::embedding::{content_hash, Embedder};
use crate::error::{ContinuityError, Result};
use crate::store::{serialize_document, split_frontmatter};
use crate::types::{type_defaults, ContextType, Memory, EMBEDDING_DIM, SCHEMA_VERSION};

/// Fields removed from the current schema
const OBSOLETE_FIELDS: &[&str] = &[
    "emotional_resonance",
    "knowledge_domain",
    "component",
    "retrieval_weight",
    "parent_id",
    "child_ids",
    "expires_after_sessions",
    "temporal_relevance",
    "prerequisite",
    "follow_up",
    "dependency",
];

/// Built-in consolidation of fragmented legacy context types
fn builtin_context_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("bug", "debug"),
        ("bugfix", "debug"),
        ("debugging", "debug"),
        ("error", "debug"),
        ("troubleshooting", "debug"),
        ("design", "architecture"),
        ("arch", "architecture"),
        ("architectural", "architecture"),
        ("structure", "architecture"),
        ("choice", "decision"),
        ("tradeoff", "decision"),
        ("decided", "decision"),
        ("preference", "personal"),
        ("pref", "personal"),
        ("identity", "personal"),
        ("relationship", "personal"),
        ("principle", "philosophy"),
        ("belief", "philosophy"),
        ("values", "philosophy"),
        ("process", "workflow"),
        ("habit", "workflow"),
        ("pipeline", "workflow"),
        ("achievement", "milestone"),
        ("shipped", "milestone"),
        ("release", "milestone"),
        ("insight", "breakthrough"),
        ("discovery", "breakthrough"),
        ("aha", "breakthrough"),
        ("todo", "unresolved"),
        ("open", "unresolved"),
        ("open_question", "unresolved"),
        ("blocker", "unresolved"),
        ("question", "unresolved"),
        ("status", "state"),
        ("progress", "state"),
        ("wip", "state"),
        ("current", "state"),
        ("code", "technical"),
        ("implementation", "technical"),
        ("api", "technical"),
        ("tech", "technical"),
        ("learning", "technical"),
    ])
}

/// Fuzzy fallback: substring keywords, checked in order
const FUZZY_KEYWORDS: &[(&str, &str)] = &[
    ("debug", "debug"),
    ("bug", "debug"),
    ("error", "debug"),
    ("fix", "debug"),
    ("architect", "architecture"),
    ("design", "architecture"),
    ("decision", "decision"),
    ("decide", "decision"),
    ("choice", "decision"),
    ("personal", "personal"),
    ("prefer", "personal"),
    ("philosoph", "philosophy"),
    ("principle", "philosophy"),
    ("workflow", "workflow"),
    ("process", "workflow"),
    ("milestone", "milestone"),
    ("achiev", "milestone"),
    ("breakthrough", "breakthrough"),
    ("insight", "breakthrough"),
    ("unresolved", "unresolved"),
    ("todo", "unresolved"),
    ("state", "state"),
    ("status", "state"),
    ("progress", "state"),
];

/// Legacy temporal_relevance values onto temporal_class
const TEMPORAL_RELEVANCE_MAP: &[(&str, &str)] = &[
    ("permanent", "eternal"),
    ("eternal", "eternal"),
    ("long", "long_term"),
    ("long_term", "long_term"),
    ("medium", "medium_term"),
    ("medium_term", "medium_term"),
    ("short", "short_term"),
    ("short_term", "short_term"),
    ("session", "short_term"),
    ("ephemeral", "ephemeral"),
    ("fleeting", "ephemeral"),
    ("temporary", "ephemeral"),
];

/// Knobs for one migration run
#[derive(Default)]
pub struct MigrationOptions {
    /// Regenerate missing or wrong-length embeddings
    pub reembed: bool,
    /// Overlays the built-in context-type table (wins on conflict)
    pub custom_context_map: HashMap<String, String>,
}

/// Counters from one migration run
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub scanned: usize,
    pub migrated: usize,
    pub reembedded: usize,
    pub unchanged: usize,
    pub errors: Vec<String>,
}

/// Consolidate one raw context-type value onto the canonical set
pub fn canonical_context_type(raw: &str, custom: &HashMap<String, String>) -> ContextType {
    let normalized = raw.trim().to_lowercase();

    if let Ok(ct) = normalized.parse::<ContextType>() {
        return ct;
    }
    if let Some(mapped) = custom.get(&normalized) {
        if let Ok(ct) = mapped.parse::<ContextType>() {
            return ct;
        }
    }
    if let Some(mapped) = builtin_context_map().get(normalized.as_str()) {
        if let Ok(ct) = mapped.parse::<ContextType>() {
            return ct;
        }
    }
    for (keyword, target) in FUZZY_KEYWORDS {
        if normalized.contains(keyword) {
            if let Ok(ct) = target.parse::<ContextType>() {
                return ct;
            }
        }
    }
    ContextType::Technical
}

fn map_temporal_relevance(raw: &str) -> Option<&'static str> {
    let normalized = raw.trim().to_lowercase();
    TEMPORAL_RELEVANCE_MAP
        .iter()
        .find(|(legacy, _)| *legacy == normalized)
        .map(|(_, class)| *class)
}

/// Migrate every memory file in one project's memories directory
pub fn migrate_memories_dir(
    dir: &Path,
    embedder: Option<&dyn Embedder>,
    options: &MigrationOptions,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();
    if !dir.is_dir() {
        return Ok(report);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        report.scanned += 1;

        let original = std::fs::read_to_string(&path)?;
        match migrate_file(&original, embedder, options) {
            Ok(MigrationStep {
                text,
                reembedded,
            }) => {
                if text == original {
                    report.unchanged += 1;
                } else {
                    std::fs::write(&path, text)?;
                    report.migrated += 1;
                }
                if reembedded {
                    report.reembedded += 1;
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "migration skipped file");
                report.errors.push(format!("{}: {}", path.display(), err));
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        migrated = report.migrated,
        reembedded = report.reembedded,
        unchanged = report.unchanged,
        errors = report.errors.len(),
        "migration run complete"
    );
    Ok(report)
}

struct MigrationStep {
    text: String,
    reembedded: bool,
}

/// Upgrade one memory file to its canonical current-schema form
fn migrate_file(
    original: &str,
    embedder: Option<&dyn Embedder>,
    options: &MigrationOptions,
) -> Result<MigrationStep> {
    let (frontmatter, body) = split_frontmatter(original)
        .ok_or_else(|| ContinuityError::Schema("missing frontmatter delimiters".into()))?;
    let mut value: Value = serde_yaml::from_str(frontmatter)?;
    let mapping = value
        .as_mapping_mut()
        .ok_or_else(|| ContinuityError::Schema("frontmatter is not a mapping".into()))?;

    let version = mapping
        .get(Value::from("schema_version"))
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version < SCHEMA_VERSION {
        // Canonicalize context_type
        let raw_type = mapping
            .get(Value::from("context_type"))
            .and_then(Value::as_str)
            .unwrap_or("technical")
            .to_string();
        let context_type = canonical_context_type(&raw_type, &options.custom_context_map);
        mapping.insert(
            Value::from("context_type"),
            Value::from(context_type.as_str()),
        );

        // Legacy temporal_relevance wins only when temporal_class is absent
        if mapping.get(Value::from("temporal_class")).is_none() {
            let class = mapping
                .get(Value::from("temporal_relevance"))
                .and_then(Value::as_str)
                .and_then(map_temporal_relevance)
                .unwrap_or(type_defaults(context_type).temporal_class.as_str());
            mapping.insert(Value::from("temporal_class"), Value::from(class));
        }

        for field in OBSOLETE_FIELDS {
            mapping.remove(Value::from(*field));
        }
        mapping.insert(
            Value::from("schema_version"),
            Value::from(SCHEMA_VERSION as u64),
        );
    }

    // Reattach body, deserialize into the typed record (defaults fill the
    // gaps), then re-serialize into the canonical layout.
    mapping.insert(Value::from("content"), Value::from(body.trim().to_string()));
    let mut memory: Memory = serde_yaml::from_value(value)?;

    let mut reembedded = false;
    let embedding_ok = memory
        .embedding
        .as_ref()
        .map(|e| e.len() == EMBEDDING_DIM)
        .unwrap_or(false);
    if !embedding_ok {
        memory.embedding = None;
        memory.embedded_hash = None;
        if options.reembed {
            if let Some(embedder) = embedder {
                let text = memory.embeddable_text();
                match embedder.embed(&text) {
                    Ok(vector) if vector.len() == EMBEDDING_DIM => {
                        memory.embedded_hash = Some(content_hash(&text));
                        memory.embedding = Some(vector);
                        reembedded = true;
                    }
                    Ok(_) | Err(_) => {
                        tracing::warn!(id = %memory.id, "re-embedding failed, left stale");
                    }
                }
            }
        }
    }

    Ok(MigrationStep {
        text: serialize_document(&memory)?,
        reembedded,
    })
}
