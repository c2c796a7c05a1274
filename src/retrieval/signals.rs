//! Activation signals
//!
//! Six boolean indicators computed per candidate against the current user
//! message. Signals are independent on purpose: a memory surfaces only
//! when at least two of them agree.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::embedding::cosine_similarity;
use crate::types::Memory;

/// Similarity floor for the vector signal
pub const VECTOR_SIGNAL_THRESHOLD: f32 = 0.40;

/// Trigger-phrase match ratio needed for the trigger signal
pub const TRIGGER_PHRASE_THRESHOLD: f32 = 0.5;

/// Token overlap with the content head needed for the content signal
pub const CONTENT_OVERLAP_THRESHOLD: usize = 3;

/// Content prefix length considered by the content signal
pub const CONTENT_HEAD_CHARS: usize = 200;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "may", "might", "can",
        "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "what",
        "which", "who", "when", "where", "why", "how", "all", "each", "every", "both", "few",
        "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same",
        "so", "than", "too", "very", "just", "and", "but", "or", "if", "because", "as",
        "until", "while", "of", "at", "by", "for", "with", "about", "against", "between",
        "into", "through", "during", "before", "after", "above", "below", "to", "from", "up",
        "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
        "here", "there", "any", "your", "my", "his", "her", "its", "our", "their", "need",
        "want", "like", "know", "think", "make",
    ]
    .iter()
    .copied()
    .collect()
});

/// Significant tokens of a text: lowercased, non-stopword, length >= 3,
/// split on anything that is not alphanumeric or a dash.
pub fn significant_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

/// Which signals fired for one candidate, with their strengths
#[derive(Debug, Clone, Default)]
pub struct SignalSet {
    pub trigger: bool,
    pub tags: bool,
    pub domain: bool,
    pub feature: bool,
    pub content: bool,
    pub vector: bool,
    /// Best trigger-phrase match ratio observed
    pub trigger_strength: f32,
    /// Number of matching semantic tags
    pub tag_count: usize,
    /// Cosine similarity against the query embedding
    pub vector_similarity: f32,
}

impl SignalSet {
    pub fn count(&self) -> usize {
        [
            self.trigger,
            self.tags,
            self.domain,
            self.feature,
            self.content,
            self.vector,
        ]
        .iter()
        .filter(|&&fired| fired)
        .count()
    }
}

/// The tokenized view of the current user message, computed once per turn
pub struct MessageContext {
    /// Lowercased raw message
    pub lower: String,
    /// Significant tokens of the message
    pub tokens: HashSet<String>,
    /// Query embedding, if the embedder produced one
    pub embedding: Option<Vec<f32>>,
}

impl MessageContext {
    pub fn new(message: &str, embedding: Option<Vec<f32>>) -> Self {
        Self {
            lower: message.to_lowercase(),
            tokens: significant_tokens(message),
            embedding,
        }
    }

    /// A word appears in the token set, or the raw phrase appears as a
    /// case-insensitive substring of the message.
    fn mentions(&self, value: &str) -> bool {
        let lower = value.to_lowercase();
        self.tokens.contains(lower.as_str()) || self.lower.contains(&lower)
    }
}

/// Any anti-trigger phrase appears in the message (substring,
/// case-insensitive). Anti-triggers win over every other signal.
pub fn anti_trigger_hit(memory: &Memory, message: &MessageContext) -> bool {
    memory
        .anti_triggers
        .iter()
        .filter(|p| !p.trim().is_empty())
        .any(|p| message.lower.contains(&p.to_lowercase()))
}

/// Evaluate all six signals for one candidate
pub fn evaluate(memory: &Memory, message: &MessageContext) -> SignalSet {
    let mut signals = SignalSet::default();

    // 1. Trigger phrases
    for phrase in &memory.trigger_phrases {
        let score = phrase_match_score(phrase, &message.tokens);
        if score > signals.trigger_strength {
            signals.trigger_strength = score;
        }
    }
    signals.trigger = signals.trigger_strength >= TRIGGER_PHRASE_THRESHOLD;

    // 2. Semantic tags
    signals.tag_count = memory
        .semantic_tags
        .iter()
        .filter(|tag| message.mentions(tag))
        .count();
    signals.tags = if memory.semantic_tags.len() <= 2 {
        signals.tag_count >= 1
    } else {
        signals.tag_count >= 2
    };

    // 3. Domain
    if let Some(domain) = &memory.domain {
        signals.domain = !domain.is_empty() && message.mentions(domain);
    }

    // 4. Feature
    if let Some(feature) = &memory.feature {
        signals.feature = !feature.is_empty() && message.mentions(feature);
    }

    // 5. Content-head overlap
    let head: String = memory.content.chars().take(CONTENT_HEAD_CHARS).collect();
    let overlap = significant_tokens(&head)
        .intersection(&message.tokens)
        .count();
    signals.content = overlap >= CONTENT_OVERLAP_THRESHOLD;

    // 6. Vector similarity
    if let (Some(query), Some(embedding)) = (&message.embedding, &memory.embedding) {
        signals.vector_similarity = cosine_similarity(query, embedding);
        signals.vector = signals.vector_similarity >= VECTOR_SIGNAL_THRESHOLD;
    }

    signals
}

/// Match ratio of one trigger phrase against the message tokens:
/// exact word hits count 1.0, singular/plural variants 0.8, divided by
/// the phrase's significant word count.
fn phrase_match_score(phrase: &str, tokens: &HashSet<String>) -> f32 {
    let words = significant_tokens(phrase);
    if words.is_empty() {
        return 0.0;
    }

    let mut score = 0.0_f32;
    for word in &words {
        if tokens.contains(word.as_str()) {
            score += 1.0;
        } else if plural_variant_present(word, tokens) {
            score += 0.8;
        }
    }
    score / words.len() as f32
}

fn plural_variant_present(word: &str, tokens: &HashSet<String>) -> bool {
    let plural = format!("{}s", word);
    if tokens.contains(plural.as_str()) {
        return true;
    }
    if let Some(singular) = word.strip_suffix('s') {
        if singular.len() >= 3 && tokens.contains(singular) {
            return true;
        }
    }
    false
}
