//! Embedding support
//!
//! The core consumes a fixed 384-dimension text embedder as an opaque
//! dependency. Staleness is derived from a content hash recorded at embed
//! time: when the embeddable text no longer matches the hash, the stored
//! vector is stale.

mod hashed;

pub use hashed::HashedEmbedder;

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{ContinuityError, Result};
use crate::types::{Memory, EMBEDDING_DIM};

/// Trait for embedding generators. Implementations must be safe to call
/// from concurrent tasks.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimensionality (must be 384 for this system)
    fn dimensions(&self) -> usize;

    /// Model name for diagnostics
    fn model_name(&self) -> &str;
}

/// Build the default embedder, verifying the dimension contract
pub fn create_embedder() -> Result<Arc<dyn Embedder>> {
    let embedder = HashedEmbedder::default();
    if embedder.dimensions() != EMBEDDING_DIM {
        return Err(ContinuityError::EmbedderInit(format!(
            "embedder reports {} dimensions, need {}",
            embedder.dimensions(),
            EMBEDDING_DIM
        )));
    }
    Ok(Arc::new(embedder))
}

/// SHA-256 hex digest of the text an embedding was computed from
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A memory's embedding is stale when the body changed without a re-embed
pub fn is_embedding_stale(memory: &Memory) -> bool {
    match (&memory.embedding, &memory.embedded_hash) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(_), Some(hash)) => *hash != content_hash(&memory.embeddable_text()),
    }
}

/// Embed a memory's text and stamp the vector + hash onto the record
pub fn embed_memory(embedder: &dyn Embedder, memory: &mut Memory) -> Result<()> {
    let text = memory.embeddable_text();
    let vector = embedder.embed(&text)?;
    if vector.len() != EMBEDDING_DIM {
        return Err(ContinuityError::EmbedderInference(format!(
            "embedder returned {} dimensions, need {}",
            vector.len(),
            EMBEDDING_DIM
        )));
    }
    memory.embedded_hash = Some(content_hash(&text));
    memory.embedding = Some(vector);
    Ok(())
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
