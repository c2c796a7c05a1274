//! Importance ranking
//!
//! Among gate-passing candidates, importance is an additive score: bonuses
//! stack, nothing is averaged or compressed. The base is the decayed
//! retrieval weight, so fading memories sink without extra machinery.

use crate::retrieval::signals::{MessageContext, SignalSet};
use crate::types::{ContextType, Memory, TemporalClass};

/// Words that, together with `problem_solution_pair`, mark a help-seeking
/// message.
const PROBLEM_WORDS: &[&str] = &[
    "error", "bug", "issue", "problem", "wrong", "fail", "broken", "help", "stuck",
];

/// Per-type keywords granting the context-type bonus (at most one per
/// candidate).
pub fn context_type_keywords(context_type: ContextType) -> &'static [&'static str] {
    match context_type {
        ContextType::Debug => &["debug", "bug", "error", "fix", "issue", "problem", "broken"],
        ContextType::Decision => &["decide", "decision", "choose", "choice", "option", "should"],
        ContextType::Architecture => &["architect", "design", "structure", "pattern", "how"],
        ContextType::Breakthrough => &["insight", "realize", "understand", "discover", "why"],
        ContextType::Technical => &["implement", "code", "function", "method", "api"],
        ContextType::Workflow => &["process", "workflow", "step", "flow", "pipeline"],
        ContextType::Philosophy => &["philosophy", "principle", "belief", "approach", "think"],
        _ => &[],
    }
}

/// Additive importance score for one gate-passing candidate
pub fn importance_score(memory: &Memory, signals: &SignalSet, message: &MessageContext) -> f32 {
    let mut score = memory.retrieval_weight();

    let signal_count = signals.count();
    if signal_count >= 4 {
        score += 0.20;
    } else if signal_count >= 3 {
        score += 0.10;
    }

    if memory.awaiting_implementation {
        score += 0.15;
    }
    if memory.awaiting_decision {
        score += 0.10;
    }

    if context_type_keywords(memory.context_type)
        .iter()
        .any(|kw| message.lower.contains(kw))
    {
        score += 0.10;
    }

    if memory.problem_solution_pair
        && PROBLEM_WORDS.iter().any(|w| message.lower.contains(w))
    {
        score += 0.10;
    }

    match memory.temporal_class {
        TemporalClass::Eternal => score += 0.10,
        TemporalClass::LongTerm => score += 0.05,
        TemporalClass::Ephemeral if memory.sessions_since_surfaced <= 1 => score += 0.10,
        _ => {}
    }

    if memory.confidence_score < 0.5 {
        score -= 0.10;
    }

    score
}
