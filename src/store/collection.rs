//! On-disk collection with an in-memory index
//!
//! One directory of `<id>.md` files per collection. The full set is loaded
//! at open into a map guarded by a `parking_lot::RwLock`: reads are
//! lock-free snapshots, writes hold the exclusive lock for the file write
//! so later reads from the same process always observe them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::embedding::{cosine_similarity, is_embedding_stale};
use crate::error::{ContinuityError, Result};
use crate::store::document::{parse_document, serialize_document, Document};
use crate::types::Memory;

/// A directory-backed record collection
pub struct Collection<T: Document> {
    dir: PathBuf,
    records: RwLock<HashMap<String, T>>,
}

impl<T: Document> Collection<T> {
    /// Open (and create if absent) the collection directory, loading every
    /// parseable record. Files that fail to parse are skipped with a
    /// warning; migration is the tool that repairs them.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut records = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            match parse_document::<T>(&text) {
                Ok(record) => {
                    records.insert(record.id().to_string(), record);
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unparseable record");
                }
            }
        }

        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    /// Directory this collection persists to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", id))
    }

    /// Insert a record, persisting before it becomes visible
    pub fn insert(&self, record: T) -> Result<String> {
        let id = record.id().to_string();
        if id.is_empty() {
            return Err(ContinuityError::Validation("record id is empty".into()));
        }
        let text = serialize_document(&record)?;
        let mut records = self.records.write();
        if records.contains_key(&id) {
            return Err(ContinuityError::Conflict(format!(
                "record already exists: {}",
                id
            )));
        }
        std::fs::write(self.path_for(&id), text)?;
        records.insert(id.clone(), record);
        Ok(id)
    }

    /// Apply a patch closure to a record, persist, and return the result
    pub fn update<F>(&self, id: &str, patch: F) -> Result<T>
    where
        F: FnOnce(&mut T),
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| ContinuityError::NotFound(id.to_string()))?;
        patch(record);
        record.touch(chrono::Utc::now());
        let text = serialize_document(record)?;
        std::fs::write(self.path_for(id), text)?;
        Ok(record.clone())
    }

    /// Persist a record whether or not it already exists
    pub fn upsert(&self, record: T) -> Result<String> {
        let id = record.id().to_string();
        if id.is_empty() {
            return Err(ContinuityError::Validation("record id is empty".into()));
        }
        let text = serialize_document(&record)?;
        let mut records = self.records.write();
        std::fs::write(self.path_for(&id), text)?;
        records.insert(id.clone(), record);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.records.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<T> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }
}

/// One vector-search hit
pub struct VectorHit {
    pub memory: Memory,
    pub similarity: f32,
    pub stale: bool,
}

impl Collection<Memory> {
    /// Cosine top-k over embedded records. The filter runs before top-k
    /// selection, so filtered-out records never displace survivors.
    pub fn search<F>(&self, query: &[f32], top_k: usize, filter: F) -> Vec<VectorHit>
    where
        F: Fn(&Memory) -> bool,
    {
        let records = self.records.read();
        let mut hits: Vec<VectorHit> = records
            .values()
            .filter(|m| filter(m))
            .filter_map(|m| {
                let embedding = m.embedding.as_ref()?;
                let similarity = cosine_similarity(query, embedding);
                Some(VectorHit {
                    stale: is_embedding_stale(m),
                    memory: m.clone(),
                    similarity,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;

    fn make_memory(id: &str, project_id: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.into(),
            session_id: "s1".into(),
            project_id: project_id.into(),
            headline: format!("memory {}", id),
            content: "body".into(),
            reasoning: String::new(),
            related_files: vec![],
            importance_weight: 0.5,
            confidence_score: 1.0,
            context_type: ContextType::Technical,
            scope: Scope::Project,
            temporal_class: TemporalClass::LongTerm,
            status: MemoryStatus::Active,
            trigger_phrases: vec![],
            semantic_tags: vec![],
            anti_triggers: vec![],
            domain: None,
            feature: None,
            question_types: vec![],
            action_required: false,
            problem_solution_pair: false,
            awaiting_implementation: false,
            awaiting_decision: false,
            exclude_from_retrieval: false,
            session_created: 1,
            session_updated: 1,
            last_surfaced: None,
            sessions_since_surfaced: 0,
            fade_rate: 0.0,
            supersedes: None,
            superseded_by: None,
            resolves: vec![],
            resolved_by: None,
            related_to: vec![],
            blocks: vec![],
            blocked_by: vec![],
            embedding: None,
            embedded_hash: None,
            schema_version: SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Memory> = Collection::open(dir.path()).unwrap();

        collection.insert(make_memory("a", "p")).unwrap();
        assert!(collection.contains("a"));
        assert_eq!(collection.get("a").unwrap().headline, "memory a");
        assert!(dir.path().join("a.md").exists());
    }

    #[test]
    fn test_duplicate_insert_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Memory> = Collection::open(dir.path()).unwrap();
        collection.insert(make_memory("a", "p")).unwrap();
        assert!(collection.insert(make_memory("a", "p")).is_err());
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let collection: Collection<Memory> = Collection::open(dir.path()).unwrap();
            collection.insert(make_memory("a", "p")).unwrap();
            collection
                .update("a", |m| m.headline = "patched".into())
                .unwrap();
        }
        let reopened: Collection<Memory> = Collection::open(dir.path()).unwrap();
        assert_eq!(reopened.get("a").unwrap().headline, "patched");
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Memory> = Collection::open(dir.path()).unwrap();
        let err = collection.update("nope", |_| {}).unwrap_err();
        assert_eq!(err.kind(), "store_not_found");
    }

    #[test]
    fn test_search_filters_before_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection<Memory> = Collection::open(dir.path()).unwrap();

        let mut close = make_memory("close", "p");
        let mut axis = vec![0.0_f32; 384];
        axis[0] = 1.0;
        close.embedding = Some(axis.clone());

        let mut excluded = make_memory("excluded", "p");
        excluded.embedding = Some(axis.clone());
        excluded.status = MemoryStatus::Archived;

        let mut far = make_memory("far", "p");
        let mut other = vec![0.0_f32; 384];
        other[1] = 1.0;
        far.embedding = Some(other);

        collection.insert(close).unwrap();
        collection.insert(excluded).unwrap();
        collection.insert(far).unwrap();

        let hits = collection.search(&axis, 1, |m| m.status == MemoryStatus::Active);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, "close");
        assert!(hits[0].similarity > 0.99);
    }
}
