//! Prompt text sent to the model

use crate::protocol::schema::describe;

/// How a reply must be shaped
pub fn response_format() -> String {
    format!(
        r#"You respond with exactly one JSON object naming one action, for example
{{"action": "viewSection", "path": "src/app.py", "start": 10, "end": 40}}

The available actions and their fields are:
{}

editFile replaces lines start..end (inclusive) of a file. The new code follows the JSON object
in a single fenced block, without line numbers:
{{"action": "editFile", "path": "src/app.py", "start": 12, "end": 14}}
```
def greet(name):
    return f"Hello, {{name}}!"
```
Use "end": start - 1 to insert before line start without replacing anything.
Every editFile is previewed first. Confirm it with validateEdit, or with validateAndApply to
also write every confirmed edit to disk. Line numbers always refer to the files as they were
before any of your edits.

runCommand runs shell commands in a sandbox container that has the workspace mounted at the
same path; one command per line. The output is sent back to you.

When the task is done, respond with taskCompleted and a short finalMessage for the user."#,
        describe()
    )
}

/// System prompt opening every task
pub fn system_prompt() -> String {
    format!(
        "You are a coding assistant working on a repository on behalf of a user.\n\
         You gather the context you need by requesting file summaries and line ranges, \
         run commands to inspect or test the code, and propose edits.\n\
         Your replies are read by a program, not a human, so follow the protocol exactly.\n\n{}",
        response_format()
    )
}

/// Answer to a reply the parser rejected
pub fn parse_retry_message(error: &str) -> String {
    format!(
        "Dear assistant, your response could not be parsed: ({})\n{}",
        error,
        response_format()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ActionKind;

    #[test]
    fn test_system_prompt_lists_every_action() {
        let prompt = system_prompt();
        for kind in ActionKind::ALL {
            assert!(prompt.contains(kind.name()), "{} missing", kind);
        }
        assert!(prompt.contains("\"finalMessage\""));
    }

    #[test]
    fn test_parse_retry_message_quotes_error() {
        let msg = parse_retry_message("unknown action \"foo\"");
        assert!(msg.starts_with("Dear assistant, your response could not be parsed: (unknown action \"foo\")"));
    }
}
