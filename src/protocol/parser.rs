//! Response parser - turns one raw model reply into a validated [`Action`]
//!
//! A reply is a JSON header, optionally followed by one fenced code block:
//!
//! ```text
//! {"action": "editFile", "path": "src/lib.rs", "start": 10, "end": 12}
//! `​``
//! 10: pub fn answer() -> u32 {
//! 11:     42
//! 12: }
//! `​``
//! ```
//!
//! Models often echo line numbers back or include context lines before the
//! requested range. Numbered payload lines below `start` are dropped and the
//! `<n>: ` prefix is removed from the rest.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::schema::{fields_for, Action, ActionKind, PAYLOAD_FIELDS};

const FENCE: &str = "```";

lazy_static! {
    /// A fence followed by a language hint, e.g. "```python"
    static ref FENCE_WITH_LANGUAGE: Regex =
        Regex::new(r"```[A-Za-z0-9_+#.\-]+").expect("fence regex is valid");
}

/// Error type for response parsing
#[derive(Debug)]
pub enum ParseError {
    /// No JSON object could be located in the reply
    NoJsonHeader,
    /// Something that looked like a header failed to parse
    InvalidJson(serde_json::Error),
    /// The header is not an object with a string `action` field
    MissingAction,
    /// `action` names no known kind
    UnknownAction(String),
    /// The header's fields do not match the schema exactly
    FieldMismatch {
        action: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    /// A field is present but has the wrong type
    InvalidField { field: String, reason: String },
    /// `editFile` came without replacement text
    MissingPayload(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::NoJsonHeader => write!(f, "no JSON action header found"),
            ParseError::InvalidJson(e) => write!(f, "invalid JSON header: {}", e),
            ParseError::MissingAction => {
                write!(f, "header must be a JSON object with a string \"action\" field")
            }
            ParseError::UnknownAction(name) => write!(f, "unknown action \"{}\"", name),
            ParseError::FieldMismatch {
                action,
                missing,
                unexpected,
            } => {
                write!(f, "fields do not match the schema for \"{}\"", action)?;
                if !missing.is_empty() {
                    write!(f, "; missing: {}", missing.join(", "))?;
                }
                if !unexpected.is_empty() {
                    write!(f, "; unexpected: {}", unexpected.join(", "))?;
                }
                Ok(())
            }
            ParseError::InvalidField { field, reason } => {
                write!(f, "invalid field \"{}\": {}", field, reason)
            }
            ParseError::MissingPayload(action) => write!(
                f,
                "\"{}\" must be followed by a fenced code block with the new code",
                action
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError::InvalidJson(e)
    }
}

/// Parse one raw model reply into an [`Action`]
pub fn parse(raw: &str) -> Result<Action, ParseError> {
    let normalized = strip_fence_languages(raw);
    let (header_text, payload) = split_fenced(&normalized);

    let header = parse_header(header_text)?;
    let fields = header.as_object().ok_or(ParseError::MissingAction)?;
    let name = fields
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingAction)?;
    let kind = ActionKind::from_name(name).ok_or_else(|| ParseError::UnknownAction(name.to_string()))?;

    validate_fields(kind, fields)?;
    build_action(kind, fields, payload)
}

/// Replace "```lang" with a bare "```" so only plain fences remain
pub fn strip_fence_languages(raw: &str) -> String {
    FENCE_WITH_LANGUAGE.replace_all(raw, FENCE).into_owned()
}

/// Split into (header, payload). The payload sits between the first and
/// second fence, or runs to the end if the closing fence is missing.
fn split_fenced(text: &str) -> (&str, Option<&str>) {
    let Some(open) = text.find(FENCE) else {
        return (text, None);
    };
    let header = &text[..open];
    let rest = &text[open + FENCE.len()..];
    let body = match rest.find(FENCE) {
        Some(close) => &rest[..close],
        None => rest,
    };
    let body = body.strip_prefix('\n').unwrap_or(body);
    let body = body.strip_suffix('\n').unwrap_or(body);
    (header, Some(body))
}

/// Parse the header as JSON, falling back to the first balanced object
/// embedded in surrounding prose.
fn parse_header(text: &str) -> Result<Value, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::NoJsonHeader);
    }

    let first_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let candidates = balanced_objects(text);
    if candidates.is_empty() {
        return Err(ParseError::NoJsonHeader);
    }
    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }
    Err(ParseError::InvalidJson(first_error))
}

/// Top-level `{...}` spans, skipping braces inside JSON strings
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        spans.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

fn validate_fields(kind: ActionKind, fields: &Map<String, Value>) -> Result<(), ParseError> {
    let expected = fields_for(kind);
    let present: Vec<&str> = fields
        .keys()
        .map(String::as_str)
        .filter(|k| *k != "action" && !PAYLOAD_FIELDS.contains(k))
        .collect();

    let mut missing: Vec<String> = expected
        .iter()
        .filter(|f| !present.contains(f))
        .map(|f| f.to_string())
        .collect();
    let mut unexpected: Vec<String> = present
        .iter()
        .filter(|f| !expected.contains(f))
        .map(|f| f.to_string())
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    missing.sort();
    unexpected.sort();
    Err(ParseError::FieldMismatch {
        action: kind.name().to_string(),
        missing,
        unexpected,
    })
}

fn build_action(
    kind: ActionKind,
    fields: &Map<String, Value>,
    payload: Option<&str>,
) -> Result<Action, ParseError> {
    let action = match kind {
        ActionKind::ShowFileSummary => Action::ShowFileSummary {
            path: string_field(fields, "path")?,
        },
        ActionKind::ViewSection => Action::ViewSection {
            path: string_field(fields, "path")?,
            start: line_field(fields, "start")?,
            end: line_field(fields, "end")?,
        },
        ActionKind::RunCommand => Action::RunCommand {
            command: string_field(fields, "command")?,
        },
        ActionKind::EditFile => {
            let start = line_field(fields, "start")?;
            let raw_content = match payload {
                Some(p) => p.to_string(),
                None => fields
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ParseError::MissingPayload(kind.name().to_string()))?,
            };
            Action::EditFile {
                path: string_field(fields, "path")?,
                start,
                end: line_field(fields, "end")?,
                content: strip_line_numbers(&raw_content, start),
            }
        }
        ActionKind::ValidateEdit => Action::ValidateEdit,
        ActionKind::ValidateAndApply => Action::ValidateAndApply,
        ActionKind::TaskCompleted => Action::TaskCompleted {
            final_message: string_field(fields, "finalMessage")?,
        },
    };
    Ok(action)
}

fn string_field(fields: &Map<String, Value>, name: &str) -> Result<String, ParseError> {
    match fields.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ParseError::InvalidField {
            field: name.to_string(),
            reason: format!("expected a string, got {}", other),
        }),
        None => Err(ParseError::InvalidField {
            field: name.to_string(),
            reason: "missing".to_string(),
        }),
    }
}

/// Line numbers arrive as integers or, from sloppier models, numeric strings
fn line_field(fields: &Map<String, Value>, name: &str) -> Result<usize, ParseError> {
    let invalid = |reason: String| ParseError::InvalidField {
        field: name.to_string(),
        reason,
    };
    match fields.get(name) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid(format!("expected a non-negative integer, got {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| invalid(format!("expected a line number, got \"{}\"", s))),
        Some(other) => Err(invalid(format!("expected a line number, got {}", other))),
        None => Err(invalid("missing".to_string())),
    }
}

/// Split "<n>: <content>" into (n, content)
fn numbered_line(line: &str) -> Option<(usize, &str)> {
    let (number, rest) = line.split_once(':')?;
    let number = number.trim().parse::<usize>().ok()?;
    if rest.is_empty() {
        return Some((number, rest));
    }
    rest.strip_prefix(' ').map(|content| (number, content))
}

/// Drop numbered lines below `start` and remove the number prefixes.
/// Unnumbered lines are kept verbatim.
pub fn strip_line_numbers(payload: &str, start: usize) -> String {
    payload
        .split('\n')
        .filter_map(|line| match numbered_line(line) {
            Some((n, _)) if n < start => None,
            Some((_, content)) => Some(content),
            None => Some(line),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json_actions() {
        let action = parse(r#"{"action": "showFileSummary", "path": "src/lib.rs"}"#).unwrap();
        assert_eq!(action, Action::ShowFileSummary { path: "src/lib.rs".to_string() });

        let action = parse(r#"{"action": "viewSection", "path": "a.py", "start": 3, "end": 9}"#).unwrap();
        assert_eq!(
            action,
            Action::ViewSection { path: "a.py".to_string(), start: 3, end: 9 }
        );

        let action = parse(r#"{"action": "validateAndApply"}"#).unwrap();
        assert_eq!(action, Action::ValidateAndApply);
    }

    #[test]
    fn test_parse_edit_with_language_fence() {
        let raw = "{\"action\": \"editFile\", \"path\": \"fib.py\", \"start\": 2, \"end\": 3}\n```python\ndef fib(n):\n    return n\n```\nsome trailing prose";
        let action = parse(raw).unwrap();
        assert_eq!(
            action,
            Action::EditFile {
                path: "fib.py".to_string(),
                start: 2,
                end: 3,
                content: "def fib(n):\n    return n".to_string(),
            }
        );
    }

    #[test]
    fn test_numbered_lines_below_start_are_dropped() {
        let raw = "{\"action\": \"editFile\", \"path\": \"m.py\", \"start\": 10, \"end\": 11}\n```\n8: import os\n9: \n10: x = 1\n11:     y = 2\n# unnumbered comment\n```";
        match parse(raw).unwrap() {
            Action::EditFile { content, .. } => {
                assert_eq!(content, "x = 1\n    y = 2\n# unnumbered comment");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_header_inside_prose() {
        let raw = "Sure, let me look first.\n{\"action\": \"runCommand\", \"command\": \"ls {}\"}\nthanks";
        assert_eq!(
            parse(raw).unwrap(),
            Action::RunCommand { command: "ls {}".to_string() }
        );
    }

    #[test]
    fn test_rejects_extra_field() {
        let err = parse(r#"{"action": "showFileSummary", "path": "a", "start": 1}"#).unwrap_err();
        match err {
            ParseError::FieldMismatch { unexpected, missing, .. } => {
                assert_eq!(unexpected, vec!["start".to_string()]);
                assert!(missing.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_rejects_missing_field() {
        let err = parse(r#"{"action": "viewSection", "path": "a", "start": 1}"#).unwrap_err();
        match err {
            ParseError::FieldMismatch { missing, .. } => assert_eq!(missing, vec!["end".to_string()]),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_payload_fields_are_not_schema_fields() {
        let raw = r#"{"action": "runCommand", "command": "pwd", "output": "/work"}"#;
        assert_eq!(parse(raw).unwrap(), Action::RunCommand { command: "pwd".to_string() });
    }

    #[test]
    fn test_rejects_unknown_and_garbage() {
        assert!(matches!(
            parse(r#"{"action": "formatDisk"}"#),
            Err(ParseError::UnknownAction(name)) if name == "formatDisk"
        ));
        assert!(matches!(parse("I think we are done here."), Err(ParseError::NoJsonHeader)));
        assert!(matches!(parse("{\"action\": \"validateEdit\""), Err(ParseError::NoJsonHeader)));
        assert!(matches!(parse("{\"action\": oops}"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(parse("[1, 2]"), Err(ParseError::MissingAction)));
    }

    #[test]
    fn test_edit_without_payload_is_rejected() {
        let err = parse(r#"{"action": "editFile", "path": "a", "start": 1, "end": 1}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingPayload(_)));
    }

    #[test]
    fn test_string_line_numbers_are_accepted() {
        let action = parse(r#"{"action": "viewSection", "path": "a", "start": "4", "end": " 6"}"#).unwrap();
        assert_eq!(action, Action::ViewSection { path: "a".to_string(), start: 4, end: 6 });

        let err = parse(r#"{"action": "viewSection", "path": "a", "start": -4, "end": 6}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field, .. } if field == "start"));
    }

    #[test]
    fn test_wire_round_trip() {
        let actions = vec![
            Action::ShowFileSummary { path: "src/main.rs".to_string() },
            Action::ViewSection { path: "a b.txt".to_string(), start: 1, end: 40 },
            Action::RunCommand { command: "cargo test -- --nocapture".to_string() },
            Action::EditFile {
                path: "lib.py".to_string(),
                start: 7,
                end: 9,
                content: "def f():\n    return \"{}\"\n".to_string(),
            },
            Action::EditFile {
                path: "empty.txt".to_string(),
                start: 1,
                end: 3,
                content: String::new(),
            },
            Action::ValidateEdit,
            Action::ValidateAndApply,
            Action::TaskCompleted { final_message: "Done: added fib()".to_string() },
        ];
        for action in actions {
            assert_eq!(parse(&action.to_wire()).unwrap(), action);
        }
    }

    #[test]
    fn test_strip_line_numbers_keeps_colon_text() {
        let payload = "12:30 is lunch\n3: a\nkey: value";
        assert_eq!(strip_line_numbers(payload, 1), "12:30 is lunch\na\nkey: value");
    }
}
