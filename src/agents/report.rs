//! Manager report parser
//!
//! The external management agent emits a plain-text report. The core
//! parses it with a strict grammar: a `=== MANAGEMENT ACTIONS ===`
//! section of one-action-per-line entries followed by a
//! `=== SUMMARY ===` section of prose. Missing sections are a parse
//! error; unrecognized action lines are logged and kept, never fatal.

use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, Result};

const ACTIONS_HEADER: &str = "=== MANAGEMENT ACTIONS ===";
const SUMMARY_HEADER: &str = "=== SUMMARY ===";

/// One recognized action line from the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManagerAction {
    Superseded { old_id: String, new_id: String },
    Resolved { target_id: String, by_id: String },
    Linked { a: String, b: String },
    ActionCleared { id: String },
    Archived { id: String },
    Skipped { reason: String },
}

/// Parsed manager report
#[derive(Debug, Clone, Default)]
pub struct ManagerReport {
    pub actions: Vec<ManagerAction>,
    /// Lines in the actions section that matched no known verb
    pub unrecognized: Vec<String>,
    pub summary: String,
}

/// Parse the agent's plain-text report
pub fn parse_manager_report(text: &str) -> Result<ManagerReport> {
    let actions_start = text.find(ACTIONS_HEADER).ok_or_else(|| {
        ContinuityError::ManagerParse(format!("missing {} section", ACTIONS_HEADER))
    })?;
    let summary_start = text.find(SUMMARY_HEADER).ok_or_else(|| {
        ContinuityError::ManagerParse(format!("missing {} section", SUMMARY_HEADER))
    })?;
    if summary_start < actions_start {
        return Err(ContinuityError::ManagerParse(
            "summary section precedes actions section".into(),
        ));
    }

    let actions_body = &text[actions_start + ACTIONS_HEADER.len()..summary_start];
    let summary = text[summary_start + SUMMARY_HEADER.len()..].trim().to_string();

    let mut report = ManagerReport {
        summary,
        ..Default::default()
    };

    for line in actions_body.lines() {
        let line = line.trim();
        if line.is_empty() || line == "(none)" {
            continue;
        }
        match parse_action_line(line) {
            Some(action) => report.actions.push(action),
            None => {
                tracing::warn!(line, "unrecognized manager action line");
                report.unrecognized.push(line.to_string());
            }
        }
    }

    Ok(report)
}

fn parse_action_line(line: &str) -> Option<ManagerAction> {
    let (verb, rest) = line.split_once(':')?;
    let rest = rest.trim();
    match verb.trim() {
        "SUPERSEDED" => {
            let (old_id, new_id) = split_pair(rest, " by ")?;
            Some(ManagerAction::Superseded { old_id, new_id })
        }
        "RESOLVED" => {
            let (target_id, by_id) = split_pair(rest, " by ")?;
            Some(ManagerAction::Resolved { target_id, by_id })
        }
        "LINKED" => {
            let (a, b) = split_pair(rest, " <-> ")?;
            Some(ManagerAction::Linked { a, b })
        }
        "ACTION_CLEARED" => single_id(rest).map(|id| ManagerAction::ActionCleared { id }),
        "ARCHIVED" => single_id(rest).map(|id| ManagerAction::Archived { id }),
        "SKIPPED" => Some(ManagerAction::Skipped {
            reason: rest.to_string(),
        }),
        _ => None,
    }
}

fn split_pair(rest: &str, separator: &str) -> Option<(String, String)> {
    let (left, right) = rest.split_once(separator)?;
    let left = left.trim();
    let right = right.trim();
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left.to_string(), right.to_string()))
}

fn single_id(rest: &str) -> Option<String> {
    let id = rest.trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Some preamble the agent printed.

=== MANAGEMENT ACTIONS ===
SUPERSEDED: mem-a by mem-b
RESOLVED: bug-1 by fix-1
LINKED: mem-a <-> mem-c
ACTION_CLEARED: todo-9
ARCHIVED: stale-3
SKIPPED: mem-d looked unrelated
this line is not an action

=== SUMMARY ===
Reconciled 5 memories, one left alone.
";

    #[test]
    fn test_parse_full_report() {
        let report = parse_manager_report(REPORT).unwrap();
        assert_eq!(report.actions.len(), 6);
        assert_eq!(
            report.actions[0],
            ManagerAction::Superseded {
                old_id: "mem-a".into(),
                new_id: "mem-b".into()
            }
        );
        assert_eq!(
            report.actions[2],
            ManagerAction::Linked {
                a: "mem-a".into(),
                b: "mem-c".into()
            }
        );
        assert_eq!(report.unrecognized, vec!["this line is not an action"]);
        assert!(report.summary.starts_with("Reconciled 5 memories"));
    }

    #[test]
    fn test_missing_sections_fail() {
        let err = parse_manager_report("no sections here").unwrap_err();
        assert_eq!(err.kind(), "manager_parse");

        let err =
            parse_manager_report("=== MANAGEMENT ACTIONS ===\nSKIPPED: x\n").unwrap_err();
        assert_eq!(err.kind(), "manager_parse");
    }

    #[test]
    fn test_sections_out_of_order_fail() {
        let text = "=== SUMMARY ===\nok\n=== MANAGEMENT ACTIONS ===\n";
        assert!(parse_manager_report(text).is_err());
    }

    #[test]
    fn test_empty_actions_section_ok() {
        let text = "=== MANAGEMENT ACTIONS ===\n(none)\n=== SUMMARY ===\nNothing to do.";
        let report = parse_manager_report(text).unwrap();
        assert!(report.actions.is_empty());
        assert_eq!(report.summary, "Nothing to do.");
    }

    #[test]
    fn test_malformed_ids_unrecognized() {
        let text = "=== MANAGEMENT ACTIONS ===\nACTION_CLEARED: two words\n=== SUMMARY ===\nx";
        let report = parse_manager_report(text).unwrap();
        assert!(report.actions.is_empty());
        assert_eq!(report.unrecognized.len(), 1);
    }
}
