//! Tolerant decision parser.
//!
//! Model responses are interpreted as `Key: value` pairs, one per top-level
//! line. The contract is tolerant-but-strict: unknown keys and malformed
//! lines are ignored without error, but a decision missing Action or
//! Reasoning is rejected before any side effect — free-form model output is
//! unreliable, and downstream mutation must never proceed on an
//! underspecified instruction.

use oxpilot_core::decision::{Change, Decision, DecisionPhase};
use oxpilot_core::error::EngineError;
use std::str::FromStr;

/// The keys recognized on top-level lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Phase,
    Action,
    Reasoning,
    Context,
    Tools,
    Changes,
}

impl Key {
    fn parse(s: &str) -> Option<Key> {
        match s.trim() {
            "Phase" => Some(Key::Phase),
            "Action" => Some(Key::Action),
            "Reasoning" => Some(Key::Reasoning),
            "Context" => Some(Key::Context),
            "Tools" => Some(Key::Tools),
            "Changes" => Some(Key::Changes),
            _ => None,
        }
    }
}

fn is_blank(value: &str) -> bool {
    value.is_empty() || value == "N/A"
}

/// Split a comma-separated list, trimming entries and filtering empties and
/// "N/A" placeholders.
fn split_and_trim(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !is_blank(part))
        .map(String::from)
        .collect()
}

/// Parse one `path|description` change line. Lines not matching the sub-form
/// are silently ignored.
fn parse_change_line(line: &str) -> Option<Change> {
    let mut parts = line.splitn(2, '|');
    let path = parts.next()?.trim();
    let description = parts.next()?.trim();
    if path.is_empty() || description.is_empty() {
        return None;
    }
    Some(Change::new(path, description))
}

/// Parse a model response into a [`Decision`].
///
/// Returns [`EngineError::Validation`] if Action or Reasoning is missing
/// after parsing; an unrecognized phase value defaults to analysis.
pub fn parse_decision(text: &str) -> Result<Decision, EngineError> {
    let mut decision = Decision::empty();
    let mut current_key: Option<Key> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let keyed = line
            .split_once(':')
            .and_then(|(key, value)| Key::parse(key).map(|k| (k, value.trim())));

        let Some((key, value)) = keyed else {
            // Not a recognized key line. Inside a Changes block, accept
            // `path|description` continuation lines; everything else is
            // ignored.
            if current_key == Some(Key::Changes)
                && let Some(change) = parse_change_line(line)
            {
                decision.changes.push(change);
            }
            continue;
        };

        current_key = Some(key);

        match key {
            Key::Phase => {
                if let Ok(phase) = DecisionPhase::from_str(value) {
                    decision.phase = phase;
                }
            }
            Key::Action => {
                if !is_blank(value) {
                    decision.action = value.to_string();
                }
            }
            Key::Reasoning => {
                if !is_blank(value) {
                    decision.reasoning = value.to_string();
                }
            }
            Key::Context => {
                if !is_blank(value) {
                    decision.context = split_and_trim(value);
                }
            }
            Key::Tools => {
                if !is_blank(value) {
                    decision.tools = split_and_trim(value);
                }
            }
            Key::Changes => {
                if !is_blank(value)
                    && let Some(change) = parse_change_line(value)
                {
                    decision.changes.push(change);
                }
            }
        }
    }

    validate_decision(&decision)?;
    Ok(decision)
}

fn validate_decision(decision: &Decision) -> Result<(), EngineError> {
    if decision.action.is_empty() {
        return Err(EngineError::Validation("action is required".into()));
    }
    if decision.reasoning.is_empty() {
        return Err(EngineError::Validation("reasoning is required".into()));
    }
    Ok(())
}
