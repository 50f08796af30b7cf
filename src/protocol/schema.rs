//! Action schema - the closed set of actions the model may request
//!
//! Each action travels as a single JSON object whose `action` field names the
//! kind. The remaining fields must match the table below exactly. Two
//! pseudo-fields, `content` and `output`, carry payloads (new code, command
//! output) and are never part of the schema.

use serde_json::{json, Map, Value};

/// Payload-carrying pseudo-fields, stripped before schema validation
pub const PAYLOAD_FIELDS: &[&str] = &["content", "output"];

/// The discriminant of an [`Action`], with its wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ShowFileSummary,
    ViewSection,
    RunCommand,
    EditFile,
    ValidateEdit,
    ValidateAndApply,
    TaskCompleted,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::ShowFileSummary,
        ActionKind::ViewSection,
        ActionKind::RunCommand,
        ActionKind::EditFile,
        ActionKind::ValidateEdit,
        ActionKind::ValidateAndApply,
        ActionKind::TaskCompleted,
    ];

    /// Name used in the `action` field on the wire
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::ShowFileSummary => "showFileSummary",
            ActionKind::ViewSection => "viewSection",
            ActionKind::RunCommand => "runCommand",
            ActionKind::EditFile => "editFile",
            ActionKind::ValidateEdit => "validateEdit",
            ActionKind::ValidateAndApply => "validateAndApply",
            ActionKind::TaskCompleted => "taskCompleted",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Required header fields for this kind (excluding `action`)
    pub fn fields(self) -> &'static [&'static str] {
        fields_for(self)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Required fields per action kind
pub const ACTION_SCHEMA: &[(ActionKind, &[&str])] = &[
    (ActionKind::ShowFileSummary, &["path"]),
    (ActionKind::ViewSection, &["path", "start", "end"]),
    (ActionKind::RunCommand, &["command"]),
    (ActionKind::EditFile, &["path", "start", "end"]),
    (ActionKind::ValidateEdit, &[]),
    (ActionKind::ValidateAndApply, &[]),
    (ActionKind::TaskCompleted, &["finalMessage"]),
];

/// Look up the required fields for a kind
pub fn fields_for(kind: ActionKind) -> &'static [&'static str] {
    ACTION_SCHEMA
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// One structured request from the model
///
/// Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ShowFileSummary {
        path: String,
    },
    ViewSection {
        path: String,
        start: usize,
        end: usize,
    },
    RunCommand {
        command: String,
    },
    /// Replace lines `start..=end` of `path` with `content`
    EditFile {
        path: String,
        start: usize,
        end: usize,
        content: String,
    },
    ValidateEdit,
    ValidateAndApply,
    TaskCompleted {
        final_message: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ShowFileSummary { .. } => ActionKind::ShowFileSummary,
            Action::ViewSection { .. } => ActionKind::ViewSection,
            Action::RunCommand { .. } => ActionKind::RunCommand,
            Action::EditFile { .. } => ActionKind::EditFile,
            Action::ValidateEdit => ActionKind::ValidateEdit,
            Action::ValidateAndApply => ActionKind::ValidateAndApply,
            Action::TaskCompleted { .. } => ActionKind::TaskCompleted,
        }
    }

    /// The JSON header for this action, without payload
    pub fn header(&self) -> Value {
        let mut map = Map::new();
        map.insert("action".to_string(), json!(self.kind().name()));
        match self {
            Action::ShowFileSummary { path } => {
                map.insert("path".to_string(), json!(path));
            }
            Action::ViewSection { path, start, end } | Action::EditFile { path, start, end, .. } => {
                map.insert("path".to_string(), json!(path));
                map.insert("start".to_string(), json!(start));
                map.insert("end".to_string(), json!(end));
            }
            Action::RunCommand { command } => {
                map.insert("command".to_string(), json!(command));
            }
            Action::TaskCompleted { final_message } => {
                map.insert("finalMessage".to_string(), json!(final_message));
            }
            Action::ValidateEdit | Action::ValidateAndApply => {}
        }
        Value::Object(map)
    }

    /// The fenced payload carried after the header, if any
    pub fn payload(&self) -> Option<&str> {
        match self {
            Action::EditFile { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Serialize to the wire shape the parser accepts
    pub fn to_wire(&self) -> String {
        let header = self.header().to_string();
        match self.payload() {
            Some(payload) => format!("{}\n```\n{}\n```", header, payload),
            None => header,
        }
    }
}

/// Semantic checks run before dispatch, on top of the parser's shape checks
pub fn check_semantics(action: &Action) -> Result<(), String> {
    match action {
        Action::ShowFileSummary { path } => check_path(path),
        Action::ViewSection { path, start, end } | Action::EditFile { path, start, end, .. } => {
            check_path(path)?;
            if *start == 0 {
                return Err("line numbers start at 1".to_string());
            }
            // end == start - 1 is a pure insertion before `start`
            if *end + 1 < *start {
                return Err(format!("end line {} is before start line {}", end, start));
            }
            Ok(())
        }
        Action::RunCommand { command } => {
            if command.trim().is_empty() {
                Err("command is empty".to_string())
            } else {
                Ok(())
            }
        }
        Action::ValidateEdit | Action::ValidateAndApply | Action::TaskCompleted { .. } => Ok(()),
    }
}

fn check_path(path: &str) -> Result<(), String> {
    if path.trim().is_empty() {
        Err("path is empty".to_string())
    } else {
        Ok(())
    }
}

/// Render the schema as one example header per line, for the system prompt
pub fn describe() -> String {
    ACTION_SCHEMA
        .iter()
        .map(|(kind, fields)| {
            let mut parts = vec![format!("\"action\": \"{}\"", kind.name())];
            for field in fields.iter() {
                let placeholder = match *field {
                    "start" | "end" => "<line number>",
                    _ => "<string>",
                };
                parts.push(format!("\"{}\": {}", field, placeholder));
            }
            format!("{{{}}}", parts.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_schema_entry() {
        for kind in ActionKind::ALL {
            assert!(ACTION_SCHEMA.iter().any(|(k, _)| *k == kind), "{} missing", kind);
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("deleteEverything"), None);
    }

    #[test]
    fn test_header_matches_schema_fields() {
        let action = Action::EditFile {
            path: "src/main.rs".to_string(),
            start: 3,
            end: 5,
            content: "fn main() {}".to_string(),
        };
        let header = action.header();
        let obj = header.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).filter(|k| *k != "action").collect();
        keys.sort();
        let mut expected = fields_for(ActionKind::EditFile).to_vec();
        expected.sort();
        assert_eq!(keys, expected);
        assert!(!obj.contains_key("content"));
    }

    #[test]
    fn test_check_semantics() {
        let insertion = Action::EditFile {
            path: "a.py".to_string(),
            start: 4,
            end: 3,
            content: "x = 1".to_string(),
        };
        assert!(check_semantics(&insertion).is_ok());

        let backwards = Action::ViewSection { path: "a.py".to_string(), start: 9, end: 2 };
        assert!(check_semantics(&backwards).is_err());

        let zero = Action::ViewSection { path: "a.py".to_string(), start: 0, end: 2 };
        assert!(check_semantics(&zero).is_err());

        let blank = Action::RunCommand { command: "   ".to_string() };
        assert!(check_semantics(&blank).is_err());
    }

    #[test]
    fn test_describe_lists_all_actions() {
        let text = describe();
        assert_eq!(text.lines().count(), ACTION_SCHEMA.len());
        assert!(text.contains("\"action\": \"taskCompleted\", \"finalMessage\": <string>"));
        assert!(text.contains("{\"action\": \"validateEdit\"}"));
    }
}
