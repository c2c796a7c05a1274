//! Markdown document codec
//!
//! Every collection record is one UTF-8 markdown file: YAML frontmatter
//! between `---` delimiters carries the structured fields (including the
//! 384-element embedding), the body below the second `---` is the
//! record's human-readable text field. Serialization is deterministic so
//! an unchanged record round-trips byte-identically.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ContinuityError, Result};
use crate::types::{
    ManagementLog, Memory, PersonalPrimer, ProjectSnapshot, Session, SessionSummary,
};

/// A record that can live in a markdown collection
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Struct field rendered as the markdown body instead of frontmatter
    const BODY_FIELD: Option<&'static str>;

    fn id(&self) -> &str;

    /// Bump the modification timestamp
    fn touch(&mut self, now: DateTime<Utc>);
}

impl Document for Memory {
    const BODY_FIELD: Option<&'static str> = Some("content");

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Document for Session {
    const BODY_FIELD: Option<&'static str> = None;

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Document for SessionSummary {
    const BODY_FIELD: Option<&'static str> = Some("summary");

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Document for ProjectSnapshot {
    const BODY_FIELD: Option<&'static str> = Some("snapshot");

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Document for ManagementLog {
    const BODY_FIELD: Option<&'static str> = None;

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

impl Document for PersonalPrimer {
    const BODY_FIELD: Option<&'static str> = Some("content");

    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Render a record to its on-disk markdown form
pub fn serialize_document<T: Document>(record: &T) -> Result<String> {
    let mut value = serde_yaml::to_value(record)?;

    let body = match T::BODY_FIELD {
        Some(field) => {
            let mapping = value.as_mapping_mut().ok_or_else(|| {
                ContinuityError::Schema("document did not serialize to a mapping".into())
            })?;
            match mapping.remove(serde_yaml::Value::from(field)) {
                Some(serde_yaml::Value::String(s)) => s,
                Some(serde_yaml::Value::Null) | None => String::new(),
                Some(other) => {
                    return Err(ContinuityError::Schema(format!(
                        "body field '{}' is not a string: {:?}",
                        field, other
                    )))
                }
            }
        }
        None => String::new(),
    };

    let frontmatter = serde_yaml::to_string(&value)?;
    if body.is_empty() {
        Ok(format!("---\n{}---\n", frontmatter))
    } else {
        Ok(format!("---\n{}---\n\n{}\n", frontmatter, body.trim_end()))
    }
}

/// Parse a record back from its on-disk markdown form
pub fn parse_document<T: Document>(text: &str) -> Result<T> {
    let (frontmatter, body) = split_frontmatter(text)
        .ok_or_else(|| ContinuityError::Schema("missing frontmatter delimiters".into()))?;

    let mut value: serde_yaml::Value = serde_yaml::from_str(frontmatter)?;

    if let Some(field) = T::BODY_FIELD {
        let mapping = value.as_mapping_mut().ok_or_else(|| {
            ContinuityError::Schema("frontmatter is not a mapping".into())
        })?;
        mapping.insert(
            serde_yaml::Value::from(field),
            serde_yaml::Value::from(body.trim().to_string()),
        );
    }

    Ok(serde_yaml::from_value(value)?)
}

/// Split `---\n<yaml>\n---\n<body>` into (yaml, body)
pub fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("---\n").or_else(|| {
        text.strip_prefix("---\r\n")
    })?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end + 1];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);
    Some((frontmatter, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContextType, MemoryStatus, Scope, TemporalClass, SCHEMA_VERSION};

    fn sample_memory() -> Memory {
        let now = "2026-01-10T10:00:00Z".parse().unwrap();
        Memory {
            id: "abc-123".into(),
            session_id: "s1".into(),
            project_id: "p1".into(),
            headline: "Retrieval gate needs two signals".into(),
            content: "The gate rejects single-signal candidates.\n\nSee selection.".into(),
            reasoning: "core behavior".into(),
            related_files: vec!["src/retrieval/mod.rs".into()],
            importance_weight: 0.8,
            confidence_score: 0.9,
            context_type: ContextType::Architecture,
            scope: Scope::Project,
            temporal_class: TemporalClass::LongTerm,
            status: MemoryStatus::Active,
            trigger_phrases: vec!["debugging retrieval".into()],
            semantic_tags: vec!["retrieval".into(), "gate".into()],
            anti_triggers: vec![],
            domain: Some("retrieval".into()),
            feature: Some("gating".into()),
            question_types: vec!["how".into()],
            action_required: false,
            problem_solution_pair: false,
            awaiting_implementation: false,
            awaiting_decision: false,
            exclude_from_retrieval: false,
            session_created: 4,
            session_updated: 4,
            last_surfaced: Some(3),
            sessions_since_surfaced: 1,
            fade_rate: 0.0,
            supersedes: None,
            superseded_by: None,
            resolves: vec![],
            resolved_by: None,
            related_to: vec!["def-456".into()],
            blocks: vec![],
            blocked_by: vec![],
            embedding: Some(vec![0.25; 384]),
            embedded_hash: Some("deadbeef".into()),
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_memory_roundtrip() {
        let memory = sample_memory();
        let text = serialize_document(&memory).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("headline: Retrieval gate needs two signals"));
        assert!(text.contains("The gate rejects single-signal candidates."));

        let parsed: Memory = parse_document(&text).unwrap();
        assert_eq!(parsed.id, memory.id);
        assert_eq!(parsed.content, memory.content);
        assert_eq!(parsed.embedding.as_ref().map(|e| e.len()), Some(384));
        assert_eq!(parsed.related_to, memory.related_to);
        assert_eq!(parsed.status, MemoryStatus::Active);
    }

    #[test]
    fn test_serialization_deterministic() {
        let memory = sample_memory();
        let a = serialize_document(&memory).unwrap();
        let b = serialize_document(&memory).unwrap();
        assert_eq!(a, b);

        let reparsed: Memory = parse_document(&a).unwrap();
        let c = serialize_document(&reparsed).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_bodyless_document() {
        let now = chrono::Utc::now();
        let session = Session {
            id: "s1".into(),
            project_id: "p1".into(),
            session_number: 7,
            message_count: 3,
            first_session_completed: true,
            last_active: now,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };
        let text = serialize_document(&session).unwrap();
        let parsed: Session = parse_document(&text).unwrap();
        assert_eq!(parsed.session_number, 7);
        assert_eq!(parsed.message_count, 3);
    }

    #[test]
    fn test_missing_frontmatter_rejected() {
        let result: Result<Memory> = parse_document("# just markdown\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_split_frontmatter() {
        let (fm, body) = split_frontmatter("---\nid: x\n---\n\nbody here\n").unwrap();
        assert_eq!(fm, "id: x\n");
        assert_eq!(body.trim(), "body here");
    }
}
