//! Retrieval engine
//!
//! Silence over noise: a memory surfaces only when at least two
//! independent activation signals agree. Retrieval is a pure function
//! over (corpus, query, session context) and is total: every failure
//! mode degrades to a smaller (possibly empty) result, never an error.

pub mod scoring;
pub mod selection;
pub mod signals;

pub use selection::{ScoredCandidate, SelectionLimits};
pub use signals::{MessageContext, SignalSet};

use std::collections::HashSet;

use crate::types::{Memory, MemoryId, Scope};

/// Minimum fired signals for a candidate to pass the gate
pub const SIGNAL_GATE: usize = 2;

/// One retrieval request
pub struct RetrievalQuery {
    /// Project the session runs in
    pub project_id: String,
    /// Current user message
    pub message: String,
    /// Embedding of the message, when available
    pub query_embedding: Option<Vec<f32>>,
    /// Ids already injected earlier in this session
    pub already_injected: HashSet<MemoryId>,
}

/// Per-retrieval counters surfaced through the logger
#[derive(Debug, Clone, Default)]
pub struct RetrievalDiagnostics {
    pub candidates: usize,
    pub prefiltered: usize,
    pub anti_triggered: usize,
    pub gate_passed: usize,
    pub trigger_fired: usize,
    pub tags_fired: usize,
    pub domain_fired: usize,
    pub feature_fired: usize,
    pub content_fired: usize,
    pub vector_fired: usize,
    pub selected: usize,
}

/// Result of one retrieval pass
pub struct RetrievalOutcome {
    pub selected: Vec<ScoredCandidate>,
    pub diagnostics: RetrievalDiagnostics,
}

/// Score and select memories for the current turn.
///
/// `corpus` is the project ∪ global candidate set. Anything that fails
/// the binary pre-filter is never scored; anything below the signal gate
/// is never ranked.
pub fn retrieve(
    corpus: &[Memory],
    query: &RetrievalQuery,
    limits: SelectionLimits,
) -> RetrievalOutcome {
    let mut diagnostics = RetrievalDiagnostics {
        candidates: corpus.len(),
        ..Default::default()
    };

    let message = MessageContext::new(&query.message, query.query_embedding.clone());

    let mut activated: Vec<ScoredCandidate> = Vec::new();
    for memory in corpus {
        if !passes_prefilter(memory, query) {
            diagnostics.prefiltered += 1;
            continue;
        }
        if signals::anti_trigger_hit(memory, &message) {
            diagnostics.anti_triggered += 1;
            continue;
        }

        let fired = signals::evaluate(memory, &message);
        if fired.trigger {
            diagnostics.trigger_fired += 1;
        }
        if fired.tags {
            diagnostics.tags_fired += 1;
        }
        if fired.domain {
            diagnostics.domain_fired += 1;
        }
        if fired.feature {
            diagnostics.feature_fired += 1;
        }
        if fired.content {
            diagnostics.content_fired += 1;
        }
        if fired.vector {
            diagnostics.vector_fired += 1;
        }

        if fired.count() < SIGNAL_GATE {
            continue;
        }
        diagnostics.gate_passed += 1;

        let importance = scoring::importance_score(memory, &fired, &message);
        activated.push(ScoredCandidate {
            memory: memory.clone(),
            signals: fired,
            importance,
        });
    }

    let selected = selection::select(activated, limits);
    diagnostics.selected = selected.len();

    tracing::debug!(
        candidates = diagnostics.candidates,
        prefiltered = diagnostics.prefiltered,
        anti_triggered = diagnostics.anti_triggered,
        gate_passed = diagnostics.gate_passed,
        selected = diagnostics.selected,
        trigger = diagnostics.trigger_fired,
        tags = diagnostics.tags_fired,
        domain = diagnostics.domain_fired,
        feature = diagnostics.feature_fired,
        content = diagnostics.content_fired,
        vector = diagnostics.vector_fired,
        "retrieval pass"
    );

    RetrievalOutcome {
        selected,
        diagnostics,
    }
}

/// Binary exclusions applied before any scoring
fn passes_prefilter(memory: &Memory, query: &RetrievalQuery) -> bool {
    if !memory.is_retrieval_candidate() {
        return false;
    }
    if memory.scope == Scope::Project && memory.project_id != query.project_id {
        return false;
    }
    if query.already_injected.contains(&memory.id) {
        return false;
    }
    true
}
