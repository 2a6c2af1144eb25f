//! Pure parsers turning captured stdout into an intermediate form.
//!
//! None of these functions can fail: text that does not have the expected
//! shape degrades to [`ParsedOutput::Text`].

use serde_json::Value;

/// How the external program formats its stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    /// One JSON document.
    SingleJson,
    /// One JSON document per line.
    JsonLines,
    /// Free-form text.
    PlainText,
}

impl OutputStyle {
    /// Runs the parser for this style.
    #[must_use]
    pub fn parse(self, stdout: &str) -> ParsedOutput {
        match self {
            Self::SingleJson => parse_single_json(stdout),
            Self::JsonLines => parse_json_lines(stdout),
            Self::PlainText => parse_plain_text(stdout),
        }
    }
}

/// Semi-structured view of captured stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// A single parsed JSON document.
    Document(Value),
    /// Parsed events in emission order.
    Events {
        /// Successfully parsed lines.
        events: Vec<Value>,
        /// Non-empty lines that were not valid JSON.
        skipped: usize,
    },
    /// Raw text, either requested or as a fallback.
    Text(String),
}

impl ParsedOutput {
    /// Parsed events, empty unless this is [`ParsedOutput::Events`].
    #[must_use]
    pub fn events(&self) -> &[Value] {
        match self {
            Self::Events { events, .. } => events,
            Self::Document(_) | Self::Text(_) => &[],
        }
    }
}

/// Parses stdout as one JSON value, falling back to the raw text.
#[must_use]
pub fn parse_single_json(stdout: &str) -> ParsedOutput {
    serde_json::from_str::<Value>(stdout).map_or_else(
        |_| ParsedOutput::Text(stdout.to_string()),
        ParsedOutput::Document,
    )
}

/// Parses each non-empty line as a JSON value, preserving line order.
///
/// Lines that fail to parse are skipped and counted. If every non-empty
/// line failed, the whole output falls back to raw text.
#[must_use]
pub fn parse_json_lines(stdout: &str) -> ParsedOutput {
    let mut events = Vec::new();
    let mut skipped = 0usize;

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => events.push(value),
            Err(_) => skipped += 1,
        }
    }

    if events.is_empty() && skipped > 0 {
        return ParsedOutput::Text(stdout.to_string());
    }

    ParsedOutput::Events { events, skipped }
}

/// Returns stdout verbatim.
#[must_use]
pub fn parse_plain_text(stdout: &str) -> ParsedOutput {
    ParsedOutput::Text(stdout.to_string())
}
