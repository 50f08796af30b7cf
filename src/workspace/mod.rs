//! Workspace access: files, summaries, and repository context

pub mod context;
pub mod files;
pub mod summary;

pub use context::{context_listing, list_context_files};
pub use files::{FileStore, LocalFiles, MemoryFiles};
pub use summary::{add_line_numbers, split_lines, summarize, view_section, FileSummary};
