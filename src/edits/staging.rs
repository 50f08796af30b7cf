//! Edit staging - preview, validate, then apply file edits
//!
//! The model proposes an edit, sees a preview of the result, and confirms it.
//! Nothing reaches disk before confirmation. Confirmed edits all reference
//! line numbers of the files as they were when the task started, so they are
//! applied bottom-to-top: an edit only shifts the lines below it, which have
//! already been handled.
//!
//! ```text
//! editFile ──► pending ──validateEdit──► validated[] ──validateAndApply──► disk
//!                 │                                       (descending start)
//!                 └── replaced by the next editFile if never validated
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::metrics::EDITS_APPLIED;
use crate::workspace::{add_line_numbers, split_lines, summarize, FileStore, FileSummary};

/// Context lines shown on each side of the new content in a preview
pub const DEFAULT_PREVIEW_CONTEXT: usize = 4;

/// One proposed edit: replace lines `start..=end` of `path` with `content`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEditRecord {
    pub path: String,
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub validated: bool,
}

/// What the model sees after proposing an edit
#[derive(Debug, Clone)]
pub struct EditPreview {
    pub record: FileEditRecord,
    /// Numbered lines around the new content
    pub window: String,
    /// Window plus instructions to confirm or discard
    pub text: String,
}

/// Error type for staging operations
#[derive(Debug)]
pub enum EditError {
    /// validateEdit arrived with no edit awaiting confirmation
    NothingToValidate,
    /// Reading or writing a file failed
    Io { path: String, source: std::io::Error },
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::NothingToValidate => {
                write!(f, "There is no previewed edit to validate. Send an editFile first.")
            }
            EditError::Io { path, source } => write!(f, "{}: {}", path, source),
        }
    }
}

impl std::error::Error for EditError {}

/// Result of replacing a line range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub text: String,
    /// 1-based line where the replacement begins
    pub first_line: usize,
    /// Number of lines the replacement occupies
    pub inserted: usize,
}

/// Replace lines `start..=end` (1-based, inclusive) of `original`
///
/// `start` past the end appends, `end` is clamped to the file, and
/// `end == start - 1` inserts without removing anything. A trailing newline
/// on the original is preserved; new files get one.
pub fn splice(original: &str, start: usize, end: usize, replacement: &str) -> Splice {
    let keep_trailing_newline = original.is_empty() || original.ends_with('\n');
    let mut lines = split_lines(original);
    let new_lines = split_lines(replacement);

    let from = start.saturating_sub(1).min(lines.len());
    let to = end.min(lines.len()).max(from);
    let inserted = new_lines.len();
    lines.splice(from..to, new_lines);

    let mut text = lines.join("\n");
    if keep_trailing_newline && !text.is_empty() {
        text.push('\n');
    }
    Splice {
        text,
        first_line: from + 1,
        inserted,
    }
}

async fn read_or_empty(files: &dyn FileStore, path: &str) -> Result<String, EditError> {
    match files.read(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(EditError::Io {
            path: path.to_string(),
            source,
        }),
    }
}

/// Apply the validated records in descending `start` order
///
/// Unvalidated records are skipped. With `save`, each record is written as
/// soon as it is applied. Returns the final content of every touched file.
pub async fn apply_all(
    files: &dyn FileStore,
    records: &[FileEditRecord],
    save: bool,
) -> Result<BTreeMap<String, String>, EditError> {
    let mut ordered: Vec<&FileEditRecord> = records.iter().filter(|r| r.validated).collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut overlay: BTreeMap<String, String> = BTreeMap::new();
    for record in ordered {
        let current = match overlay.get(&record.path) {
            Some(text) => text.clone(),
            None => read_or_empty(files, &record.path).await?,
        };
        let result = splice(&current, record.start, record.end, &record.content);
        if save {
            files
                .write(&record.path, &result.text)
                .await
                .map_err(|source| EditError::Io {
                    path: record.path.clone(),
                    source,
                })?;
            EDITS_APPLIED.inc();
            debug!(path = %record.path, start = record.start, end = record.end, "Edit written");
        }
        overlay.insert(record.path.clone(), result.text);
    }
    Ok(overlay)
}

/// Per-task staging area
#[derive(Debug)]
pub struct EditStaging {
    pending: Option<FileEditRecord>,
    validated: Vec<FileEditRecord>,
    context_lines: usize,
}

impl Default for EditStaging {
    fn default() -> Self {
        Self::new(DEFAULT_PREVIEW_CONTEXT)
    }
}

impl EditStaging {
    pub fn new(context_lines: usize) -> Self {
        Self {
            pending: None,
            validated: Vec::new(),
            context_lines,
        }
    }

    /// The previewed edit awaiting confirmation, if any
    pub fn pending(&self) -> Option<&FileEditRecord> {
        self.pending.as_ref()
    }

    pub fn validated(&self) -> &[FileEditRecord] {
        &self.validated
    }

    /// Stage an edit and show what the file would look like. Never writes.
    pub async fn preview_edit(
        &mut self,
        files: &dyn FileStore,
        path: &str,
        start: usize,
        end: usize,
        content: &str,
    ) -> Result<EditPreview, EditError> {
        let current = read_or_empty(files, path).await?;
        let result = splice(&current, start, end, content);
        let lines = split_lines(&result.text);

        let window_start = result.first_line.saturating_sub(self.context_lines).max(1);
        let window_end = (result.first_line + result.inserted)
            .saturating_sub(1)
            .max(result.first_line)
            .saturating_add(self.context_lines)
            .min(lines.len());
        let window = if window_start <= window_end {
            add_line_numbers(lines[window_start - 1..window_end].iter().copied(), window_start)
        } else {
            String::new()
        };

        let record = FileEditRecord {
            path: path.to_string(),
            start,
            end,
            content: content.to_string(),
            validated: false,
        };
        if let Some(previous) = self.pending.replace(record.clone()) {
            debug!(path = %previous.path, start = previous.start, "Discarding unvalidated edit");
        }

        let text = format!(
            "Preview of {} after the edit (lines {}-{}):\n```\n{}\n```\n\
             If this looks right, respond with {{\"action\": \"validateEdit\"}} to keep it, \
             or {{\"action\": \"validateAndApply\"}} to keep it and write all kept edits to disk. \
             Otherwise send a corrected editFile; this preview will be discarded.\n\
             Line numbers of further edits refer to the files as they were before any edit.",
            path, window_start, window_end, window
        );

        Ok(EditPreview {
            record,
            window,
            text,
        })
    }

    /// Confirm the pending edit. Does not touch disk.
    pub fn validate(&mut self) -> Result<String, EditError> {
        let mut record = self.pending.take().ok_or(EditError::NothingToValidate)?;
        record.validated = true;
        let ack = format!(
            "Edit of {}:{}-{} kept ({} edit(s) waiting to be applied).",
            record.path,
            record.start,
            record.end,
            self.validated.len() + 1
        );
        self.validated.push(record);
        Ok(ack)
    }

    /// Confirm the pending edit (if any) and write every kept edit to disk
    pub async fn validate_and_apply(
        &mut self,
        files: &dyn FileStore,
    ) -> Result<Vec<FileSummary>, EditError> {
        if self.pending.is_some() {
            self.validate()?;
        } else if self.validated.is_empty() {
            return Err(EditError::NothingToValidate);
        }
        self.commit(files).await
    }

    /// Write every kept edit to disk, drop the pending one, clear staging
    pub async fn commit(&mut self, files: &dyn FileStore) -> Result<Vec<FileSummary>, EditError> {
        self.pending = None;
        let records = std::mem::take(&mut self.validated);
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let written = apply_all(files, &records, true).await?;
        info!(edits = records.len(), files = written.len(), "Applied staged edits");
        Ok(written
            .iter()
            .map(|(path, content)| summarize(path, content))
            .collect())
    }

    /// Forget every staged edit
    pub fn discard(&mut self) {
        self.pending = None;
        self.validated.clear();
    }
}
