//! Staged file edits
//!
//! Edits proposed by the model are previewed and confirmed before anything
//! is written; see [`EditStaging`].

pub mod staging;

pub use staging::{
    apply_all, splice, EditError, EditPreview, EditStaging, FileEditRecord, Splice,
    DEFAULT_PREVIEW_CONTEXT,
};
