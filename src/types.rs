//! Core types for continuity
//!
//! The `Memory` record is the central entity. Classification fields are
//! closed enums; legacy free-form values are consolidated by the migration
//! module, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory (opaque, uuid v4 text)
pub type MemoryId = String;

/// Sentinel project id for installation-wide memories
pub const GLOBAL_PROJECT_ID: &str = "global";

/// Fixed embedding dimensionality; vectors of any other length are rejected
pub const EMBEDDING_DIM: usize = 384;

/// Current record schema version
pub const SCHEMA_VERSION: u32 = 3;

/// Sessions an ephemeral memory may go unsurfaced before archival
pub const EPHEMERAL_EXPIRY_SESSIONS: u32 = 3;

/// Floor for the derived retrieval weight
pub const RETRIEVAL_WEIGHT_FLOOR: f32 = 0.1;

/// A durable knowledge artifact extracted from conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Stable opaque identifier
    pub id: MemoryId,
    /// Session that created this memory
    pub session_id: String,
    /// Owning project, or "global"
    pub project_id: String,
    /// One-to-two line summary, always shown at retrieval
    pub headline: String,
    /// Structured body, expandable on demand
    pub content: String,
    /// Curator's stated reason for keeping this
    #[serde(default)]
    pub reasoning: String,
    /// Files this memory is about
    #[serde(default)]
    pub related_files: Vec<String>,

    /// Curator judgement of importance (0.0 - 1.0)
    #[serde(default = "default_importance")]
    pub importance_weight: f32,
    /// Confidence in the content (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence_score: f32,

    /// Category of knowledge
    #[serde(default)]
    pub context_type: ContextType,
    /// Global or project-bound
    #[serde(default)]
    pub scope: Scope,
    /// Persistence category governing decay
    #[serde(default)]
    pub temporal_class: TemporalClass,
    /// Lifecycle status; only `active` memories are retrieval candidates
    #[serde(default)]
    pub status: MemoryStatus,

    /// Situational activation patterns ("when debugging X")
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    /// User-typeable concepts
    #[serde(default)]
    pub semantic_tags: Vec<String>,
    /// Phrases that suppress this memory (substring, case-insensitive)
    #[serde(default)]
    pub anti_triggers: Vec<String>,
    /// Broad subject area (e.g. "retrieval")
    pub domain: Option<String>,
    /// Narrower feature within the domain
    pub feature: Option<String>,
    /// Kinds of question this memory answers
    #[serde(default)]
    pub question_types: Vec<String>,

    /// An action is still pending on this memory
    #[serde(default)]
    pub action_required: bool,
    /// Records both a problem and its solution
    #[serde(default)]
    pub problem_solution_pair: bool,
    /// Decided but not yet implemented
    #[serde(default)]
    pub awaiting_implementation: bool,
    /// Blocked on a decision
    #[serde(default)]
    pub awaiting_decision: bool,
    /// Never surface through retrieval
    #[serde(default)]
    pub exclude_from_retrieval: bool,

    /// Project session number at creation
    #[serde(default)]
    pub session_created: u64,
    /// Project session number at last update
    #[serde(default)]
    pub session_updated: u64,
    /// Session number this memory last surfaced in
    pub last_surfaced: Option<u64>,
    /// Sessions elapsed since last surfacing
    #[serde(default)]
    pub sessions_since_surfaced: u32,
    /// Per-session weight decay; 0.0 means no fade
    #[serde(default)]
    pub fade_rate: f32,

    /// Older memory this one replaces (inverse of superseded_by)
    pub supersedes: Option<MemoryId>,
    /// Newer memory that replaced this one
    pub superseded_by: Option<MemoryId>,
    /// Unresolved/debug memories this one closes
    #[serde(default)]
    pub resolves: Vec<MemoryId>,
    /// Memory that closed this one
    pub resolved_by: Option<MemoryId>,
    /// Symmetric association set
    #[serde(default)]
    pub related_to: Vec<MemoryId>,
    /// Memories this one blocks
    #[serde(default)]
    pub blocks: Vec<MemoryId>,
    /// Memories blocking this one
    #[serde(default)]
    pub blocked_by: Vec<MemoryId>,

    /// 384-dim embedding of headline + content
    pub embedding: Option<Vec<f32>>,
    /// SHA-256 of the text that was embedded; staleness is derived from it
    pub embedded_hash: Option<String>,

    /// Record schema version for migration
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last written
    pub updated_at: DateTime<Utc>,
}

fn default_importance() -> f32 {
    0.5
}

fn default_confidence() -> f32 {
    1.0
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Memory {
    /// Text fed to the embedder for this record
    pub fn embeddable_text(&self) -> String {
        if self.content.is_empty() {
            self.headline.clone()
        } else {
            format!("{}\n{}", self.headline, self.content)
        }
    }

    /// Effective ranking weight after fade decay.
    ///
    /// Derived, never persisted: a surfacing reset of
    /// `sessions_since_surfaced` restores exactly `importance_weight`.
    pub fn retrieval_weight(&self) -> f32 {
        let faded =
            self.importance_weight - self.fade_rate * self.sessions_since_surfaced as f32;
        faded.max(RETRIEVAL_WEIGHT_FLOOR)
    }

    /// Whether this memory can ever appear in retrieval output
    pub fn is_retrieval_candidate(&self) -> bool {
        self.status == MemoryStatus::Active
            && !self.exclude_from_retrieval
            && self.superseded_by.is_none()
    }

    /// Invariant: scope and project_id must agree
    pub fn scope_consistent(&self) -> bool {
        match self.scope {
            Scope::Global => self.project_id == GLOBAL_PROJECT_ID,
            Scope::Project => self.project_id != GLOBAL_PROJECT_ID,
        }
    }
}

/// Category of knowledge a memory carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    #[default]
    Technical,
    Debug,
    Architecture,
    Decision,
    Personal,
    Philosophy,
    Workflow,
    Milestone,
    Breakthrough,
    Unresolved,
    State,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Technical => "technical",
            ContextType::Debug => "debug",
            ContextType::Architecture => "architecture",
            ContextType::Decision => "decision",
            ContextType::Personal => "personal",
            ContextType::Philosophy => "philosophy",
            ContextType::Workflow => "workflow",
            ContextType::Milestone => "milestone",
            ContextType::Breakthrough => "breakthrough",
            ContextType::Unresolved => "unresolved",
            ContextType::State => "state",
        }
    }

    pub fn all() -> &'static [ContextType] {
        &[
            ContextType::Technical,
            ContextType::Debug,
            ContextType::Architecture,
            ContextType::Decision,
            ContextType::Personal,
            ContextType::Philosophy,
            ContextType::Workflow,
            ContextType::Milestone,
            ContextType::Breakthrough,
            ContextType::Unresolved,
            ContextType::State,
        ]
    }

    /// Rank used when selecting global memories (lower surfaces first).
    /// Unlisted types are project-shaped and rank last.
    pub fn global_priority(&self) -> u8 {
        match self {
            ContextType::Technical => 1,
            ContextType::Architecture => 3,
            ContextType::Workflow => 4,
            ContextType::Decision => 5,
            ContextType::Breakthrough => 6,
            ContextType::Philosophy => 7,
            ContextType::Personal => 8,
            _ => 9,
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "technical" => Ok(ContextType::Technical),
            "debug" => Ok(ContextType::Debug),
            "architecture" => Ok(ContextType::Architecture),
            "decision" => Ok(ContextType::Decision),
            "personal" => Ok(ContextType::Personal),
            "philosophy" => Ok(ContextType::Philosophy),
            "workflow" => Ok(ContextType::Workflow),
            "milestone" => Ok(ContextType::Milestone),
            "breakthrough" => Ok(ContextType::Breakthrough),
            "unresolved" => Ok(ContextType::Unresolved),
            "state" => Ok(ContextType::State),
            _ => Err(format!("Unknown context type: {}", s)),
        }
    }
}

/// Whether a memory is shared across projects or bound to one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    #[default]
    Project,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "global" => Ok(Scope::Global),
            "project" => Ok(Scope::Project),
            _ => Err(format!("Unknown scope: {}", s)),
        }
    }
}

/// Persistence category governing decay behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemporalClass {
    Eternal,
    #[default]
    LongTerm,
    MediumTerm,
    ShortTerm,
    Ephemeral,
}

impl TemporalClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalClass::Eternal => "eternal",
            TemporalClass::LongTerm => "long_term",
            TemporalClass::MediumTerm => "medium_term",
            TemporalClass::ShortTerm => "short_term",
            TemporalClass::Ephemeral => "ephemeral",
        }
    }
}

impl std::str::FromStr for TemporalClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eternal" => Ok(TemporalClass::Eternal),
            "long_term" | "long-term" => Ok(TemporalClass::LongTerm),
            "medium_term" | "medium-term" => Ok(TemporalClass::MediumTerm),
            "short_term" | "short-term" => Ok(TemporalClass::ShortTerm),
            "ephemeral" => Ok(TemporalClass::Ephemeral),
            _ => Err(format!("Unknown temporal class: {}", s)),
        }
    }
}

/// Lifecycle status of a memory
///
/// Transitions are driven exclusively by the lifecycle manager;
/// `superseded` and `archived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    #[default]
    Active,
    Pending,
    Superseded,
    Deprecated,
    Archived,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Pending => "pending",
            MemoryStatus::Superseded => "superseded",
            MemoryStatus::Deprecated => "deprecated",
            MemoryStatus::Archived => "archived",
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoryStatus::Superseded | MemoryStatus::Archived)
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(MemoryStatus::Active),
            "pending" => Ok(MemoryStatus::Pending),
            "superseded" => Ok(MemoryStatus::Superseded),
            "deprecated" => Ok(MemoryStatus::Deprecated),
            "archived" => Ok(MemoryStatus::Archived),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Per-type defaults applied when the curator omits a field
#[derive(Debug, Clone, Copy)]
pub struct TypeDefaults {
    pub temporal_class: TemporalClass,
    pub fade_rate: f32,
    pub scope: Scope,
}

/// The defaults table is a constant part of the design, not scattered
/// conditionals.
pub fn type_defaults(context_type: ContextType) -> TypeDefaults {
    use ContextType::*;
    use TemporalClass::*;
    match context_type {
        Technical => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Debug => TypeDefaults {
            temporal_class: MediumTerm,
            fade_rate: 0.05,
            scope: Scope::Project,
        },
        Architecture => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Decision => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Personal => TypeDefaults {
            temporal_class: Eternal,
            fade_rate: 0.0,
            scope: Scope::Global,
        },
        Philosophy => TypeDefaults {
            temporal_class: Eternal,
            fade_rate: 0.0,
            scope: Scope::Global,
        },
        Workflow => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Milestone => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Breakthrough => TypeDefaults {
            temporal_class: LongTerm,
            fade_rate: 0.0,
            scope: Scope::Project,
        },
        Unresolved => TypeDefaults {
            temporal_class: ShortTerm,
            fade_rate: 0.1,
            scope: Scope::Project,
        },
        State => TypeDefaults {
            temporal_class: ShortTerm,
            fade_rate: 0.15,
            scope: Scope::Project,
        },
    }
}

/// A conversation session for one (session_id, project_id) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// External session identifier
    pub id: String,
    /// Project the session belongs to
    pub project_id: String,
    /// Monotonic per-project session number
    pub session_number: u64,
    /// Messages processed so far
    #[serde(default)]
    pub message_count: u64,
    /// A full first session has been curated for this pair
    #[serde(default)]
    pub first_session_completed: bool,
    /// Last `/process` or `/context` activity
    pub last_active: DateTime<Utc>,
    /// Free-form adapter metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Curator-produced narrative of a finished session (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub session_id: String,
    pub project_id: String,
    /// Prose summary of what happened
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Latest-wins description of project state (append-only, newest read)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: String,
    pub project_id: String,
    /// Where the project stands right now
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome record of one lifecycle management pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementLog {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    /// New memories examined
    #[serde(default)]
    pub processed: u64,
    /// Older memories superseded
    #[serde(default)]
    pub superseded: u64,
    /// Unresolved memories closed
    #[serde(default)]
    pub resolved: u64,
    /// action_required flags cleared by session evidence
    #[serde(default)]
    pub action_cleared: u64,
    /// related_to links added (counting one per pair)
    #[serde(default)]
    pub linked: u64,
    /// Memory files written during the pass
    #[serde(default)]
    pub files_touched: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    /// Non-fatal notes (skipped records, unparsed report lines)
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Singleton personal primer document (scope = global)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalPrimer {
    pub id: String,
    /// Markdown body injected at every session start
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed id of the primer document
pub const PRIMER_ID: &str = "personal-primer";

/// Structured counterpart of one memory in `/memory/context` responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMemoryView {
    pub id: MemoryId,
    pub headline: String,
    pub content: String,
    pub context_type: ContextType,
    pub scope: Scope,
    pub importance_weight: f32,
    pub signal_count: usize,
    pub action_required: bool,
    #[serde(default)]
    pub related_files: Vec<String>,
}

impl StoredMemoryView {
    pub fn from_memory(memory: &Memory, signal_count: usize) -> Self {
        Self {
            id: memory.id.clone(),
            headline: memory.headline.clone(),
            content: memory.content.clone(),
            context_type: memory.context_type,
            scope: memory.scope,
            importance_weight: memory.importance_weight,
            signal_count,
            action_required: memory.action_required,
            related_files: memory.related_files.clone(),
        }
    }
}
