//! Curator output validation
//!
//! The curator returns loosely-typed drafts. The core trusts the shape
//! but not the values: enums are re-validated against the closed sets,
//! type defaults fill omitted fields, and the scope/project invariant is
//! enforced before anything reaches the store. Unknown context types fall
//! back losslessly to `technical`.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{
    type_defaults, ContextType, Memory, MemoryStatus, Scope, TemporalClass, GLOBAL_PROJECT_ID,
    SCHEMA_VERSION,
};

/// What prompted a curation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationTrigger {
    PreCompact,
    SessionEnd,
    Manual,
}

impl std::str::FromStr for CurationTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pre_compact" | "precompact" => Ok(CurationTrigger::PreCompact),
            "session_end" => Ok(CurationTrigger::SessionEnd),
            "manual" => Ok(CurationTrigger::Manual),
            _ => Err(format!("Unknown curation trigger: {}", s)),
        }
    }
}

/// Request handed to the external curator. The curator locates the
/// conversation transcript from the assistant session id and cwd.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationRequest {
    pub session_id: String,
    pub project_id: String,
    pub trigger: CurationTrigger,
    pub claude_session_id: Option<String>,
    pub cwd: Option<String>,
}

/// Curator output as received, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurationResult {
    #[serde(default)]
    pub memories: Vec<MemoryDraft>,
    pub session_summary: Option<String>,
    pub project_snapshot: Option<String>,
}

/// One loosely-typed memory draft from the curator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDraft {
    pub headline: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reasoning: String,
    /// Free-form on the wire; validated against the closed enum
    pub context_type: Option<String>,
    pub scope: Option<String>,
    pub temporal_class: Option<String>,
    pub importance_weight: Option<f32>,
    pub confidence_score: Option<f32>,
    pub fade_rate: Option<f32>,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    #[serde(default)]
    pub anti_triggers: Vec<String>,
    pub domain: Option<String>,
    pub feature: Option<String>,
    #[serde(default)]
    pub question_types: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default)]
    pub problem_solution_pair: bool,
    #[serde(default)]
    pub awaiting_implementation: bool,
    #[serde(default)]
    pub awaiting_decision: bool,
    #[serde(default)]
    pub resolves: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl MemoryDraft {
    /// Turn a draft into a store-ready memory for the given session.
    ///
    /// The returned record carries the project id its scope demands:
    /// global-scope memories always land in the global database.
    pub fn materialize(
        &self,
        session_id: &str,
        project_id: &str,
        session_number: u64,
    ) -> Memory {
        let now = Utc::now();

        let mut reasoning = self.reasoning.clone();
        let context_type = match &self.context_type {
            Some(raw) => match raw.parse::<ContextType>() {
                Ok(ct) => ct,
                Err(_) => {
                    // Lossless fallback: keep the raw value in reasoning
                    if !reasoning.is_empty() {
                        reasoning.push(' ');
                    }
                    reasoning.push_str(&format!("[curator context_type: {}]", raw));
                    ContextType::Technical
                }
            },
            None => ContextType::Technical,
        };

        let defaults = type_defaults(context_type);
        let scope = self
            .scope
            .as_deref()
            .and_then(|s| s.parse::<Scope>().ok())
            .unwrap_or(defaults.scope);
        let temporal_class = self
            .temporal_class
            .as_deref()
            .and_then(|s| s.parse::<TemporalClass>().ok())
            .unwrap_or(defaults.temporal_class);
        let fade_rate = self.fade_rate.unwrap_or(defaults.fade_rate).max(0.0);

        let project_id = match scope {
            Scope::Global => GLOBAL_PROJECT_ID.to_string(),
            Scope::Project => project_id.to_string(),
        };

        Memory {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            project_id,
            headline: self.headline.trim().to_string(),
            content: self.content.clone(),
            reasoning,
            related_files: self.related_files.clone(),
            importance_weight: self.importance_weight.unwrap_or(0.5).clamp(0.0, 1.0),
            confidence_score: self.confidence_score.unwrap_or(1.0).clamp(0.0, 1.0),
            context_type,
            scope,
            temporal_class,
            status: MemoryStatus::Active,
            trigger_phrases: self.trigger_phrases.clone(),
            semantic_tags: self.semantic_tags.clone(),
            anti_triggers: self.anti_triggers.clone(),
            domain: self.domain.clone(),
            feature: self.feature.clone(),
            question_types: self.question_types.clone(),
            action_required: self.action_required,
            problem_solution_pair: self.problem_solution_pair,
            awaiting_implementation: self.awaiting_implementation,
            awaiting_decision: self.awaiting_decision,
            exclude_from_retrieval: false,
            session_created: session_number,
            session_updated: session_number,
            last_surfaced: None,
            sessions_since_surfaced: 0,
            fade_rate,
            supersedes: None,
            superseded_by: None,
            resolves: self.resolves.clone(),
            resolved_by: None,
            related_to: vec![],
            blocks: self.blocks.clone(),
            blocked_by: self.blocked_by.clone(),
            embedding: None,
            embedded_hash: None,
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_context_type_falls_back_losslessly() {
        let draft = MemoryDraft {
            headline: "h".into(),
            context_type: Some("quantum-vibes".into()),
            ..Default::default()
        };
        let memory = draft.materialize("s", "p", 1);
        assert_eq!(memory.context_type, ContextType::Technical);
        assert!(memory.reasoning.contains("quantum-vibes"));
    }

    #[test]
    fn test_type_defaults_applied() {
        let draft = MemoryDraft {
            headline: "h".into(),
            context_type: Some("state".into()),
            ..Default::default()
        };
        let memory = draft.materialize("s", "p", 1);
        assert_eq!(memory.temporal_class, TemporalClass::ShortTerm);
        assert!(memory.fade_rate > 0.0);
        assert_eq!(memory.scope, Scope::Project);
        assert_eq!(memory.project_id, "p");
    }

    #[test]
    fn test_global_scope_forces_global_project() {
        let draft = MemoryDraft {
            headline: "h".into(),
            context_type: Some("personal".into()),
            ..Default::default()
        };
        let memory = draft.materialize("s", "p", 1);
        assert_eq!(memory.scope, Scope::Global);
        assert_eq!(memory.project_id, GLOBAL_PROJECT_ID);
        assert!(memory.scope_consistent());
    }

    #[test]
    fn test_explicit_fields_win_over_defaults() {
        let draft = MemoryDraft {
            headline: "h".into(),
            context_type: Some("debug".into()),
            temporal_class: Some("eternal".into()),
            scope: Some("global".into()),
            importance_weight: Some(2.5),
            confidence_score: Some(-1.0),
            fade_rate: Some(0.2),
            ..Default::default()
        };
        let memory = draft.materialize("s", "p", 3);
        assert_eq!(memory.temporal_class, TemporalClass::Eternal);
        assert_eq!(memory.scope, Scope::Global);
        assert_eq!(memory.importance_weight, 1.0);
        assert_eq!(memory.confidence_score, 0.0);
        assert_eq!(memory.fade_rate, 0.2);
        assert_eq!(memory.session_created, 3);
    }

    #[test]
    fn test_trigger_parse() {
        assert_eq!(
            "pre_compact".parse::<CurationTrigger>().unwrap(),
            CurationTrigger::PreCompact
        );
        assert!("mystery".parse::<CurationTrigger>().is_err());
    }
}
