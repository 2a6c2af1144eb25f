//! Reconciles the three output conventions into one [`AgentResult`].

use crate::agents::{AgentProfile, Collect, EventRule, ResponseRules, UsagePointers, UsageRules};
use crate::parse::ParsedOutput;
use crate::types::{AgentResult, Artifacts, RawExecution, Structured, Usage};
use crate::workspace::WorkspaceSnapshot;
use serde_json::Value;
use std::path::Path;

/// Folds one raw execution and its parsed output into the canonical result.
///
/// `ok` is `exit_code == 0 && !timed_out`, and a timed-out run reports no
/// exit code. Captured text and timing are copied from `raw` untouched.
#[must_use]
pub fn normalize(
    profile: &AgentProfile,
    cwd: &Path,
    raw: RawExecution,
    parsed: ParsedOutput,
    workspace: WorkspaceSnapshot,
) -> AgentResult {
    let response = extract_response(&profile.response, &parsed, &raw.stdout);
    let usage = extract_usage(&profile.usage, &parsed);

    let events = match parsed {
        ParsedOutput::Events { events, .. } => events,
        ParsedOutput::Document(_) | ParsedOutput::Text(_) => Vec::new(),
    };

    AgentResult::from_parts(
        profile.kind,
        cwd.to_path_buf(),
        raw,
        Structured { response, events },
        Artifacts {
            files_written: workspace.files_written,
            git_diff: workspace.git_diff,
        },
        usage,
    )
}

/// Finds the primary answer, falling back to the full raw stdout.
///
/// A document that is itself a JSON string answers with its unquoted value.
#[must_use]
pub fn extract_response(rules: &ResponseRules, parsed: &ParsedOutput, raw_stdout: &str) -> String {
    let found = match parsed {
        ParsedOutput::Document(doc) => rules
            .document
            .iter()
            .find_map(|pointer| doc.pointer(pointer).and_then(Value::as_str))
            .or_else(|| doc.as_str())
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string),
        ParsedOutput::Events { events, .. } => rules
            .events
            .iter()
            .find_map(|rule| response_from_events(rule, events)),
        ParsedOutput::Text(_) => None,
    };

    found.unwrap_or_else(|| raw_stdout.to_string())
}

fn response_from_events(rule: &EventRule, events: &[Value]) -> Option<String> {
    let texts = events
        .iter()
        .filter(|event| event_matches(rule, event))
        .filter_map(|event| event.pointer(rule.text).and_then(Value::as_str));

    let text = match rule.collect {
        Collect::Last => texts.last().map(str::to_string),
        Collect::Concat => {
            let joined: String = texts.collect();
            Some(joined)
        }
    }?;

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn event_matches(rule: &EventRule, event: &Value) -> bool {
    event.get("type").and_then(Value::as_str) == Some(rule.event_type)
        && rule
            .when
            .iter()
            .all(|(pointer, expected)| event.pointer(pointer).and_then(Value::as_str) == Some(*expected))
}

/// Pulls token counts out of the parsed output. Counts that are not
/// reported stay `None`.
#[must_use]
pub fn extract_usage(rules: &UsageRules, parsed: &ParsedOutput) -> Usage {
    match parsed {
        ParsedOutput::Document(doc) => usage_from(&rules.document, doc),
        ParsedOutput::Events { events, .. } => events
            .iter()
            .rev()
            .map(|event| usage_from(&rules.events, event))
            .find(|usage| !usage.is_empty())
            .unwrap_or_default(),
        ParsedOutput::Text(_) => Usage::default(),
    }
}

fn usage_from(pointers: &UsagePointers, value: &Value) -> Usage {
    let first = |candidates: &[&str]| candidates.iter().find_map(|path| lookup_count(value, path));
    Usage {
        input_tokens: first(pointers.input),
        output_tokens: first(pointers.output),
        cached_input_tokens: first(pointers.cached),
    }
}

/// Resolves a `/`-separated path to a non-negative integer.
///
/// A `*` segment sums the rest of the path over every child of the current
/// node; the sum is `None` if no child resolves.
#[must_use]
pub fn lookup_count(value: &Value, path: &str) -> Option<u64> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    count_at(value, &segments)
}

fn count_at(value: &Value, segments: &[&str]) -> Option<u64> {
    let Some((head, rest)) = segments.split_first() else {
        return value.as_u64();
    };

    if *head == "*" {
        let children: Vec<&Value> = match value {
            Value::Object(map) => map.values().collect(),
            Value::Array(items) => items.iter().collect(),
            _ => return None,
        };
        return children
            .into_iter()
            .filter_map(|child| count_at(child, rest))
            .reduce(u64::saturating_add);
    }

    let next = match value {
        Value::Object(map) => map.get(*head),
        Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }?;
    count_at(next, rest)
}
