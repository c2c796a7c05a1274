//! External agent contracts
//!
//! The curator and manager are LLM agents living outside this process.
//! The core specifies their I/O only: curator output is validated and
//! re-defaulted at the boundary, the manager's plain-text report is
//! parsed with a strict section grammar. Agent failures never take down
//! retrieval.

pub mod curation;
pub mod report;

pub use curation::{CurationRequest, CurationResult, CurationTrigger, MemoryDraft};
pub use report::{parse_manager_report, ManagerAction, ManagerReport};

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;

/// Extracts durable memories from a conversation transcript
#[async_trait]
pub trait Curator: Send + Sync {
    async fn curate(&self, request: CurationRequest) -> Result<CurationResult>;
}

/// Structured brief handed to the external management agent
#[derive(Debug, Clone)]
pub struct ManagerBrief {
    pub project_id: String,
    pub session_number: u64,
    pub new_memory_ids: Vec<String>,
    pub session_summary: Option<String>,
    pub project_snapshot: Option<String>,
    /// Memory root the agent's file sandbox is scoped to
    pub memory_root: PathBuf,
    pub current_date: NaiveDate,
}

/// Runs the memory-management skill in a sandbox scoped to the memory
/// root and returns its plain-text report
#[async_trait]
pub trait ManagerAgent: Send + Sync {
    async fn manage(&self, brief: ManagerBrief) -> Result<String>;
}
