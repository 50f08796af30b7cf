//! File summaries and line-numbered sections
//!
//! A summary keeps only the outline of a file: lines at or below an
//! indentation threshold survive, everything else collapses into `...`.
//! The threshold steps down from [`MAX_INDENT`] until the summary fits in
//! [`MAX_SUMMARY_LINES`] lines.

/// Indentation threshold the summary starts from
pub const MAX_INDENT: usize = 16;

/// Upper bound on non-elided lines in a summary
pub const MAX_SUMMARY_LINES: usize = 20;

const TAB_WIDTH: usize = 4;
const ELIDED: &str = "...";

/// Split text into lines; a trailing newline does not start an extra line
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}

/// Prefix each line with "<n>: ", numbering from `first`
pub fn add_line_numbers<'a>(lines: impl IntoIterator<Item = &'a str>, first: usize) -> String {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", first + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leading whitespace width, tabs counted as four columns
pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

/// Outline of one file, as sent back to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    pub path: String,
    pub line_count: usize,
    /// Numbered outline lines and `...` markers
    pub outline: String,
}

impl std::fmt::Display for FileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} lines)\n```\n{}\n```\nTo see the full code, request a viewSection of {} with a line range.",
            self.path, self.line_count, self.outline, self.path
        )
    }
}

/// Summarize `content` so that at most [`MAX_SUMMARY_LINES`] lines remain
pub fn summarize(path: &str, content: &str) -> FileSummary {
    let lines = split_lines(content);
    let visible = |line: &str, threshold: usize| !line.trim().is_empty() && indent_width(line) <= threshold;

    let threshold = (0..=MAX_INDENT)
        .rev()
        .find(|&t| lines.iter().filter(|l| visible(**l, t)).count() <= MAX_SUMMARY_LINES)
        .unwrap_or(0);

    let mut outline: Vec<String> = Vec::new();
    let mut kept = 0;
    for (i, line) in lines.iter().enumerate() {
        if visible(*line, threshold) && kept < MAX_SUMMARY_LINES {
            kept += 1;
            outline.push(format!("{}: {}", i + 1, line));
        } else if outline.last().map(String::as_str) != Some(ELIDED) {
            outline.push(ELIDED.to_string());
        }
    }

    FileSummary {
        path: path.to_string(),
        line_count: lines.len(),
        outline: outline.join("\n"),
    }
}

/// Lines `start..=end` of `content`, numbered, clamped to the file
pub fn view_section(path: &str, content: &str, start: usize, end: usize) -> String {
    let lines = split_lines(content);
    let start = start.max(1);
    let end = end.min(lines.len());
    if start > end {
        return format!(
            "{}:{}-{}\n```\n```\n(the file has {} lines)",
            path,
            start,
            end,
            lines.len()
        );
    }
    let numbered = add_line_numbers(lines[start - 1..end].iter().copied(), start);
    format!("{}:{}-{}\n```\n{}\n```", path, start, end, numbered)
}
