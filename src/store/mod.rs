//! Store facade
//!
//! One `ProjectDb` per project id, each owning six markdown-backed
//! collections. `open` is idempotent and cached: concurrent callers for
//! the same project receive the same instance. Global memories live in a
//! dedicated "global" project database; retrieval reads project ∪ global.

mod collection;
pub mod document;

pub use collection::{Collection, VectorHit};
pub use document::{parse_document, serialize_document, split_frontmatter, Document};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::ServerConfig;
use crate::error::{ContinuityError, Result};
use crate::types::{
    ManagementLog, Memory, PersonalPrimer, ProjectSnapshot, Session, SessionSummary,
    GLOBAL_PROJECT_ID,
};

/// Collections for one project
pub struct ProjectDb {
    pub project_id: String,
    root: PathBuf,
    pub memories: Collection<Memory>,
    pub sessions: Collection<Session>,
    pub summaries: Collection<SessionSummary>,
    pub snapshots: Collection<ProjectSnapshot>,
    pub management_logs: Collection<ManagementLog>,
    pub primer: Collection<PersonalPrimer>,
}

impl ProjectDb {
    fn open(project_id: &str, root: PathBuf) -> Result<Self> {
        Ok(Self {
            project_id: project_id.to_string(),
            memories: Collection::open(root.join("memories"))?,
            sessions: Collection::open(root.join("sessions"))?,
            summaries: Collection::open(root.join("summaries"))?,
            snapshots: Collection::open(root.join("snapshots"))?,
            management_logs: Collection::open(root.join("management-logs"))?,
            primer: Collection::open(root.join("primer"))?,
            root,
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Most recent session summary by creation time
    pub fn latest_summary(&self) -> Option<SessionSummary> {
        self.summaries
            .all()
            .into_iter()
            .max_by_key(|s| s.created_at)
    }

    /// Most recent project snapshot by creation time
    pub fn latest_snapshot(&self) -> Option<ProjectSnapshot> {
        self.snapshots
            .all()
            .into_iter()
            .max_by_key(|s| s.created_at)
    }

    /// Highest session number assigned so far
    pub fn max_session_number(&self) -> u64 {
        self.sessions
            .all()
            .iter()
            .map(|s| s.session_number)
            .max()
            .unwrap_or(0)
    }
}

/// Cached handle over every project database
pub struct Store {
    config: ServerConfig,
    projects: RwLock<HashMap<String, Arc<ProjectDb>>>,
}

impl Store {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            projects: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open (or fetch the cached) database for a project
    pub fn open(&self, project_id: &str) -> Result<Arc<ProjectDb>> {
        if project_id.is_empty() {
            return Err(ContinuityError::Validation("project_id is empty".into()));
        }
        if let Some(db) = self.projects.read().get(project_id) {
            return Ok(db.clone());
        }

        let mut projects = self.projects.write();
        // A racing writer may have opened it while we waited for the lock
        if let Some(db) = projects.get(project_id) {
            return Ok(db.clone());
        }
        let root = self.config.project_root(project_id);
        let db = Arc::new(ProjectDb::open(project_id, root)?);
        projects.insert(project_id.to_string(), db.clone());
        Ok(db)
    }

    /// The dedicated global database
    pub fn global(&self) -> Result<Arc<ProjectDb>> {
        self.open(GLOBAL_PROJECT_ID)
    }
}
