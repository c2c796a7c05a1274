//! Two-tier selection
//!
//! Gate-passing candidates are partitioned into global and project sets.
//! Globals fill a small dedicated quota ordered by the type priority
//! table; project memories fill the remaining slots with action-required
//! ones first. Leftover slots are backfilled with memories related to the
//! already-selected ones.

use std::collections::HashSet;

use crate::retrieval::signals::SignalSet;
use crate::types::{Memory, MemoryId, Scope};

/// A candidate that passed the relevance gate
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub memory: Memory,
    pub signals: SignalSet,
    pub importance: f32,
}

impl ScoredCandidate {
    pub fn signal_count(&self) -> usize {
        self.signals.count()
    }
}

/// Selection caps. Defaults give the canonical 5-project + 2-global
/// result when both tiers are saturated.
#[derive(Debug, Clone, Copy)]
pub struct SelectionLimits {
    /// Whole-result cap, globals included
    pub max_total: usize,
    /// Global-subset cap
    pub max_global: usize,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_total: 7,
            max_global: 2,
        }
    }
}

fn by_signals_then_importance(a: &ScoredCandidate, b: &ScoredCandidate) -> std::cmp::Ordering {
    b.signal_count()
        .cmp(&a.signal_count())
        .then_with(|| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Pick the final result set from gate-passing candidates
pub fn select(mut activated: Vec<ScoredCandidate>, limits: SelectionLimits) -> Vec<ScoredCandidate> {
    if activated.is_empty() || limits.max_total == 0 {
        return Vec::new();
    }

    activated.sort_by(by_signals_then_importance);

    let (mut globals, mut projects): (Vec<_>, Vec<_>) = activated
        .iter()
        .cloned()
        .partition(|c| c.memory.scope == Scope::Global);

    // Global quota: priority table first, then signals, then importance
    globals.sort_by(|a, b| {
        a.memory
            .context_type
            .global_priority()
            .cmp(&b.memory.context_type.global_priority())
            .then_with(|| by_signals_then_importance(a, b))
    });
    globals.truncate(limits.max_global.min(limits.max_total));

    let mut selected: Vec<ScoredCandidate> = globals;
    let mut selected_ids: HashSet<MemoryId> =
        selected.iter().map(|c| c.memory.id.clone()).collect();

    // Project fill: action-required first, then signals, then importance
    projects.sort_by(|a, b| {
        b.memory
            .action_required
            .cmp(&a.memory.action_required)
            .then_with(|| by_signals_then_importance(a, b))
    });
    for candidate in projects {
        if selected.len() >= limits.max_total {
            break;
        }
        if selected_ids.insert(candidate.memory.id.clone()) {
            selected.push(candidate);
        }
    }

    // Related backfill: promote activated-but-unselected memories that the
    // selected ones point at, while slots remain. The global quota still
    // binds here.
    if selected.len() < limits.max_total {
        let related_ids: HashSet<MemoryId> = selected
            .iter()
            .flat_map(|c| c.memory.related_to.iter().cloned())
            .collect();
        let mut global_count = selected
            .iter()
            .filter(|c| c.memory.scope == Scope::Global)
            .count();

        for candidate in &activated {
            if selected.len() >= limits.max_total {
                break;
            }
            if selected_ids.contains(&candidate.memory.id) {
                continue;
            }
            if !related_ids.contains(&candidate.memory.id) {
                continue;
            }
            if candidate.memory.scope == Scope::Global {
                if global_count >= limits.max_global {
                    continue;
                }
                global_count += 1;
            }
            selected_ids.insert(candidate.memory.id.clone());
            selected.push(candidate.clone());
        }
    }

    selected
}
