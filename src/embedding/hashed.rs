//! Feature-hashed embedding backend
//!
//! Deterministic, dependency-free 384-dim vectors via the hashing trick:
//! signed unigram and bigram lanes, tf-weighted, L2-normalized. Not a
//! substitute for a learned model, but it keeps the vector signal
//! meaningful offline and makes tests reproducible.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::embedding::Embedder;
use crate::error::Result;
use crate::types::EMBEDDING_DIM;

/// Hashed bag-of-words embedder
pub struct HashedEmbedder {
    dimensions: usize,
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn terms(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '-'))
            .filter(|t| t.len() >= 2)
            .map(String::from)
            .collect()
    }

    /// Hash a term (optionally salted) into (lane index, sign)
    fn lane(&self, parts: &[&str], salt: &str) -> (usize, f32) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for part in parts {
            part.hash(&mut hasher);
            '\u{1f}'.hash(&mut hasher);
        }
        salt.hash(&mut hasher);
        let h = hasher.finish();
        let index = (h >> 1) as usize % self.dimensions;
        let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let terms = Self::terms(text);
        let mut vector = vec![0.0_f32; self.dimensions];
        if terms.is_empty() {
            return Ok(vector);
        }

        let total = terms.len() as f32;

        // Bigram lanes first, at half weight
        for pair in terms.windows(2) {
            let (index, sign) = self.lane(&[&pair[0], &pair[1]], "bigram");
            vector[index] += 0.5 * sign;
        }

        let mut counts: HashMap<String, f32> = HashMap::new();
        for term in terms {
            *counts.entry(term).or_insert(0.0) += 1.0;
        }

        for (term, count) in counts {
            // Sub-linear tf; longer terms get a mild rarity boost
            let tf = (1.0 + count / total).ln();
            let rarity = 1.0 + term.len() as f32 * 0.1;
            let (index, sign) = self.lane(&[&term], "unigram");
            vector[index] += tf * rarity * sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashed-bow"
    }
}
