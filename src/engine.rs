//! Engine (orchestrator)
//!
//! Implements the per-turn contract: a primer on the first turn of a
//! session, signal-gated retrieval on every later turn. Owns the
//! per-session injected-id sets (mutated only after a retrieval is
//! successfully formatted), fires curation in the background, and
//! serializes curation per project.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::agents::{Curator, CurationRequest, CurationTrigger, ManagerAgent, ManagerBrief};
use crate::embedding::{embed_memory, is_embedding_stale, Embedder};
use crate::error::{ContinuityError, Result};
use crate::lifecycle::{self, ManagementInput};
use crate::retrieval::{self, RetrievalQuery, SelectionLimits};
use crate::store::{ProjectDb, Store};
use crate::types::{
    MemoryId, ProjectSnapshot, Scope, Session, SessionSummary, StoredMemoryView,
    GLOBAL_PROJECT_ID, PRIMER_ID,
};

/// Response payload for one `/memory/context` turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primer: Option<String>,
    pub memories: Vec<StoredMemoryView>,
    /// Ready-to-inject markdown block
    pub formatted: String,
}

/// Project statistics for `/memory/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub total_memories: usize,
    pub total_sessions: usize,
    pub stale_memories: usize,
    pub latest_session: u64,
}

/// In-process state for one (session, project) pair
struct SessionState {
    /// Serializes get_context calls for the session
    turn_lock: tokio::sync::Mutex<()>,
    /// Ids already injected into this session's context
    injected: Mutex<HashSet<MemoryId>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            turn_lock: tokio::sync::Mutex::new(()),
            injected: Mutex::new(HashSet::new()),
        }
    }
}

/// The per-turn orchestrator
pub struct Engine {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    curator: Option<Arc<dyn Curator>>,
    manager_agent: Option<Arc<dyn ManagerAgent>>,
    limits: SelectionLimits,
    sessions: Mutex<HashMap<(String, String), Arc<SessionState>>>,
    curation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    background: tokio::sync::Mutex<JoinSet<()>>,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        curator: Option<Arc<dyn Curator>>,
        manager_agent: Option<Arc<dyn ManagerAgent>>,
    ) -> Self {
        Self {
            store,
            embedder,
            curator,
            manager_agent,
            limits: SelectionLimits::default(),
            sessions: Mutex::new(HashMap::new()),
            curation_locks: Mutex::new(HashMap::new()),
            background: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn session_state(&self, session_id: &str, project_id: &str) -> Arc<SessionState> {
        self.sessions
            .lock()
            .entry((session_id.to_string(), project_id.to_string()))
            .or_insert_with(|| Arc::new(SessionState::new()))
            .clone()
    }

    fn curation_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.curation_locks
            .lock()
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Per-turn context: primer on the first turn, retrieval afterwards
    pub async fn get_context(
        &self,
        session_id: &str,
        project_id: &str,
        current_message: &str,
    ) -> Result<ContextPayload> {
        validate_id(session_id, "session_id")?;
        validate_id(project_id, "project_id")?;

        let db = self.store.open(project_id)?;
        let global = self.store.global()?;
        let state = self.session_state(session_id, project_id);
        let _turn = state.turn_lock.lock().await;

        let session = match db.sessions.get(session_id) {
            Some(s) => s,
            None => self.start_session(&db, session_id, project_id)?,
        };

        if session.message_count == 0 {
            return Ok(self.build_primer(&db, &global));
        }

        // Degraded mode: retrieval proceeds without the vector signal
        let query_embedding = match self.embedder.embed(current_message) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(%err, "query embedding failed, vector signal disabled");
                None
            }
        };

        let mut corpus = db.memories.all();
        if project_id != GLOBAL_PROJECT_ID {
            corpus.extend(global.memories.all());
        }

        let query = RetrievalQuery {
            project_id: project_id.to_string(),
            message: current_message.to_string(),
            query_embedding,
            already_injected: state.injected.lock().clone(),
        };
        let outcome = retrieval::retrieve(&corpus, &query, self.limits);

        let memories: Vec<StoredMemoryView> = outcome
            .selected
            .iter()
            .map(|c| StoredMemoryView::from_memory(&c.memory, c.signal_count()))
            .collect();
        let formatted = format_memories(&memories);

        // Mutations happen only after successful formatting, so a
        // cancelled request never leaves the injected set inconsistent.
        let ids: Vec<MemoryId> = memories.iter().map(|m| m.id.clone()).collect();
        if !ids.is_empty() {
            state.injected.lock().extend(ids.iter().cloned());
            let mut project_ids: Vec<MemoryId> = Vec::new();
            let mut global_ids: Vec<MemoryId> = Vec::new();
            for candidate in &outcome.selected {
                match candidate.memory.scope {
                    Scope::Global => global_ids.push(candidate.memory.id.clone()),
                    Scope::Project => project_ids.push(candidate.memory.id.clone()),
                }
            }
            lifecycle::mark_surfaced(&db, &project_ids, session.session_number)?;
            lifecycle::mark_surfaced(&global, &global_ids, session.session_number)?;
        }

        Ok(ContextPayload {
            primer: None,
            memories,
            formatted,
        })
    }

    /// Count a user message for the session
    pub fn process_message(&self, session_id: &str, project_id: &str) -> Result<u64> {
        validate_id(session_id, "session_id")?;
        validate_id(project_id, "project_id")?;

        let db = self.store.open(project_id)?;
        if db.sessions.get(session_id).is_none() {
            self.start_session(&db, session_id, project_id)?;
        }
        let session = db.sessions.update(session_id, |s| {
            s.message_count += 1;
            s.last_active = Utc::now();
        })?;
        Ok(session.message_count)
    }

    /// Project statistics
    pub fn stats(&self, project_id: &str) -> Result<StatsPayload> {
        validate_id(project_id, "project_id")?;
        let db = self.store.open(project_id)?;
        let memories = db.memories.all();
        Ok(StatsPayload {
            total_memories: memories.len(),
            total_sessions: db.sessions.len(),
            stale_memories: memories.iter().filter(|m| is_embedding_stale(m)).count(),
            latest_session: db.max_session_number(),
        })
    }

    /// Fire-and-forget curation: validated here, executed in a background
    /// task serialized per project.
    pub async fn trigger_curation(
        self: &Arc<Self>,
        session_id: &str,
        project_id: &str,
        trigger: CurationTrigger,
        claude_session_id: Option<String>,
        cwd: Option<String>,
    ) -> Result<()> {
        validate_id(session_id, "session_id")?;
        validate_id(project_id, "project_id")?;
        // Open eagerly so a dead store fails the request, not the task
        self.store.open(project_id)?;

        let engine = self.clone();
        let session_id = session_id.to_string();
        let project_id = project_id.to_string();
        let mut background = self.background.lock().await;
        background.spawn(async move {
            let lock = engine.curation_lock(&project_id);
            let _serialized = lock.lock().await;
            if let Err(err) = engine
                .run_curation(&session_id, &project_id, trigger, claude_session_id, cwd)
                .await
            {
                tracing::error!(%err, project = %project_id, "curation pass failed");
            }
        });
        Ok(())
    }

    /// Wait out in-flight background work, dropping whatever exceeds the
    /// grace period.
    pub async fn shutdown(&self, grace: std::time::Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        let mut background = self.background.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, background.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("shutdown grace period expired, dropping pending curation");
                    background.abort_all();
                    break;
                }
            }
        }
    }

    async fn run_curation(
        &self,
        session_id: &str,
        project_id: &str,
        trigger: CurationTrigger,
        claude_session_id: Option<String>,
        cwd: Option<String>,
    ) -> Result<()> {
        let db = self.store.open(project_id)?;
        let global = self.store.global()?;
        let config = self.store.config();

        let curator = match &self.curator {
            Some(c) => c.clone(),
            None => {
                lifecycle::log_failed_pass(&db, project_id, session_id, "no curator configured")?;
                return Ok(());
            }
        };

        let request = CurationRequest {
            session_id: session_id.to_string(),
            project_id: project_id.to_string(),
            trigger,
            claude_session_id,
            cwd,
        };
        let timeout = std::time::Duration::from_secs(config.agent_timeout_secs);
        let result = match tokio::time::timeout(timeout, curator.curate(request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                lifecycle::log_failed_pass(&db, project_id, session_id, &err.to_string())?;
                return Err(err);
            }
            Err(_) => {
                let err = ContinuityError::CuratorTimeout(config.agent_timeout_secs);
                lifecycle::log_failed_pass(&db, project_id, session_id, &err.to_string())?;
                return Err(err);
            }
        };

        let session_number = db
            .sessions
            .get(session_id)
            .map(|s| s.session_number)
            .unwrap_or_else(|| db.max_session_number());

        // Persist curator output: memories first, then narrative records
        let mut new_ids: Vec<MemoryId> = Vec::new();
        for draft in &result.memories {
            if draft.headline.trim().is_empty() {
                tracing::warn!("dropping curator draft with empty headline");
                continue;
            }
            let mut memory = draft.materialize(session_id, project_id, session_number);
            if let Err(err) = embed_memory(self.embedder.as_ref(), &mut memory) {
                tracing::warn!(%err, "embedding failed, memory stored stale");
            }
            let target = if memory.scope == Scope::Global { &global } else { &db };
            new_ids.push(target.memories.insert(memory)?);
        }

        let now = Utc::now();
        if let Some(summary) = &result.session_summary {
            db.summaries.insert(SessionSummary {
                id: uuid::Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                project_id: project_id.to_string(),
                summary: summary.clone(),
                created_at: now,
                updated_at: now,
            })?;
        }
        if let Some(snapshot) = &result.project_snapshot {
            db.snapshots.insert(ProjectSnapshot {
                id: uuid::Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                snapshot: snapshot.clone(),
                created_at: now,
                updated_at: now,
            })?;
        }
        if db.sessions.contains(session_id) {
            db.sessions.update(session_id, |s| {
                s.first_session_completed = true;
            })?;
        }

        // Lifecycle pass over the new batch
        let input = ManagementInput {
            project_id: project_id.to_string(),
            session_id: session_id.to_string(),
            session_number,
            new_memory_ids: new_ids.clone(),
            session_summary: result.session_summary.clone(),
            project_snapshot: result.project_snapshot.clone(),
            personal_enabled: config.personal_enabled,
        };
        let log = lifecycle::run_management_pass(&db, &global, &input)?;

        // Optional external management agent; its report lands in the log
        if config.manager_enabled {
            if let Some(agent) = &self.manager_agent {
                let brief = ManagerBrief {
                    project_id: project_id.to_string(),
                    session_number,
                    new_memory_ids: new_ids,
                    session_summary: result.session_summary.clone(),
                    project_snapshot: result.project_snapshot.clone(),
                    memory_root: config.project_root(project_id),
                    current_date: now.date_naive(),
                };
                match tokio::time::timeout(timeout, agent.manage(brief)).await {
                    Ok(Ok(text)) => match crate::agents::parse_manager_report(&text) {
                        Ok(report) => {
                            db.management_logs.update(&log.id, |l| {
                                l.notes.push(format!("manager: {}", report.summary));
                                for line in &report.unrecognized {
                                    l.notes.push(format!("manager unparsed: {}", line));
                                }
                            })?;
                        }
                        Err(err) => {
                            db.management_logs.update(&log.id, |l| {
                                l.notes.push(format!("manager report invalid: {}", err));
                            })?;
                        }
                    },
                    Ok(Err(err)) => {
                        db.management_logs.update(&log.id, |l| {
                            l.notes.push(format!("manager failed: {}", err));
                        })?;
                    }
                    Err(_) => {
                        db.management_logs.update(&log.id, |l| {
                            l.notes
                                .push(format!("manager timed out after {}s", timeout.as_secs()));
                        })?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Create the session record and run the session-start decay sweep
    fn start_session(
        &self,
        db: &Arc<ProjectDb>,
        session_id: &str,
        project_id: &str,
    ) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: session_id.to_string(),
            project_id: project_id.to_string(),
            session_number: db.max_session_number() + 1,
            message_count: 0,
            first_session_completed: false,
            last_active: now,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        db.sessions.insert(session.clone())?;
        lifecycle::apply_session_decay(db)?;
        Ok(session)
    }

    /// First-turn primer: temporal context, personal primer, last session
    /// summary, latest snapshot. No retrieval happens on this path.
    fn build_primer(&self, db: &Arc<ProjectDb>, global: &Arc<ProjectDb>) -> ContextPayload {
        let mut block = String::from("## Session primer\n\n");
        block.push_str(&format!(
            "**Now**: {}\n",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        ));

        if self.store.config().personal_enabled {
            if let Some(primer) = global.primer.get(PRIMER_ID) {
                block.push_str("\n### Personal primer\n\n");
                block.push_str(primer.content.trim());
                block.push('\n');
            }
        }
        if let Some(summary) = db.latest_summary() {
            block.push_str("\n### Last session\n\n");
            block.push_str(summary.summary.trim());
            block.push('\n');
        }
        if let Some(snapshot) = db.latest_snapshot() {
            block.push_str("\n### Project snapshot\n\n");
            block.push_str(snapshot.snapshot.trim());
            block.push('\n');
        }

        ContextPayload {
            primer: Some(block.clone()),
            memories: vec![],
            formatted: block,
        }
    }
}

/// Render the recalled-memories block injected into the assistant
fn format_memories(memories: &[StoredMemoryView]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let mut block = String::from("## Recalled memories\n");
    for memory in memories {
        block.push_str(&format!(
            "\n### {}\n- {} · {}{}\n",
            memory.headline,
            memory.context_type,
            memory.scope.as_str(),
            if memory.action_required {
                " · action required"
            } else {
                ""
            }
        ));
        if !memory.content.trim().is_empty() {
            block.push_str(memory.content.trim());
            block.push('\n');
        }
    }
    block
}

fn validate_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ContinuityError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CurationResult;
    use crate::config::ServerConfig;
    use crate::embedding::create_embedder;

    struct StubCurator {
        result: CurationResult,
    }

    #[async_trait::async_trait]
    impl Curator for StubCurator {
        async fn curate(&self, _request: CurationRequest) -> Result<CurationResult> {
            Ok(self.result.clone())
        }
    }

    fn engine_with(
        dir: &std::path::Path,
        curator: Option<Arc<dyn Curator>>,
    ) -> Arc<Engine> {
        let store = Arc::new(Store::new(ServerConfig {
            central_path: dir.to_path_buf(),
            ..Default::default()
        }));
        Arc::new(Engine::new(store, create_embedder().unwrap(), curator, None))
    }

    #[tokio::test]
    async fn test_first_turn_gets_primer() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), None);

        let payload = engine.get_context("s1", "p", "hello").await.unwrap();
        assert!(payload.primer.is_some());
        assert!(payload.memories.is_empty());
        assert!(payload.formatted.contains("Session primer"));

        // The first turn does not change the message count
        let db = engine.store().open("p").unwrap();
        assert_eq!(db.sessions.get("s1").unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_second_turn_retrieves() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), None);

        engine.get_context("s1", "p", "hello").await.unwrap();
        engine.process_message("s1", "p").unwrap();

        let payload = engine
            .get_context("s1", "p", "anything at all")
            .await
            .unwrap();
        assert!(payload.primer.is_none());
        assert!(payload.memories.is_empty());
    }

    #[tokio::test]
    async fn test_curation_persists_and_reconciles() {
        let dir = tempfile::tempdir().unwrap();
        let result = CurationResult {
            memories: vec![crate::agents::MemoryDraft {
                headline: "Dedup cache fixed".into(),
                content: "The dedup cache no longer drops entries.".into(),
                context_type: Some("debug".into()),
                domain: Some("dedup".into()),
                ..Default::default()
            }],
            session_summary: Some("Fixed the dedup cache.".into()),
            project_snapshot: Some("Working on retrieval.".into()),
        };
        let engine = engine_with(dir.path(), Some(Arc::new(StubCurator { result })));

        engine.get_context("s1", "p", "hello").await.unwrap();
        engine.process_message("s1", "p").unwrap();
        engine
            .trigger_curation(
                "s1",
                "p",
                CurationTrigger::SessionEnd,
                Some("claude-abc".into()),
                None,
            )
            .await
            .unwrap();
        engine.shutdown(std::time::Duration::from_secs(5)).await;

        let db = engine.store().open("p").unwrap();
        assert_eq!(db.memories.len(), 1);
        assert_eq!(db.summaries.len(), 1);
        assert_eq!(db.snapshots.len(), 1);
        assert_eq!(db.management_logs.len(), 1);
        assert!(db.management_logs.all()[0].success);

        let memory = &db.memories.all()[0];
        assert_eq!(memory.embedding.as_ref().map(|e| e.len()), Some(384));
        assert!(db.sessions.get("s1").unwrap().first_session_completed);
    }

    #[tokio::test]
    async fn test_missing_curator_logs_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), None);

        engine.get_context("s1", "p", "hello").await.unwrap();
        engine
            .trigger_curation("s1", "p", CurationTrigger::Manual, None, None)
            .await
            .unwrap();
        engine.shutdown(std::time::Duration::from_secs(5)).await;

        let db = engine.store().open("p").unwrap();
        let logs = db.management_logs.all();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), None);
        let err = engine.get_context("", "p", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "bad_request");
        let err = engine.process_message("s", " ").unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), None);
        engine.get_context("s1", "p", "hello").await.unwrap();

        let stats = engine.stats("p").unwrap();
        assert_eq!(stats.total_memories, 0);
        assert_eq!(stats.total_sessions, 1);
        assert_eq!(stats.latest_session, 1);
    }
}
