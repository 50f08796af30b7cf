//! Repository context - the list of files the model may ask about
//!
//! Walks the workspace honouring `.gitignore` plus a `.sandpiperignore` file
//! and keeps source-like files only. Paths matched by `.sandpiperinclude`
//! are listed even when an ignore file excludes them.

use std::collections::BTreeSet;
use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::{Walk, WalkBuilder};
use tracing::warn;

/// Per-workspace ignore file, same syntax as `.gitignore`
pub const IGNORE_FILENAME: &str = ".sandpiperignore";

/// Per-workspace whitelist, same syntax as `.gitignore`; wins over every ignore file
pub const INCLUDE_FILENAME: &str = ".sandpiperinclude";

const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cs", "css", "go", "h", "hpp", "html", "java", "js", "json", "jsx", "kt",
    "md", "php", "py", "rb", "rs", "scss", "sh", "sql", "swift", "toml", "ts", "tsx", "txt",
    "yaml", "yml",
];

const ALWAYS_SKIPPED: &[&str] = &["node_modules", "target", ".git"];

/// Relative paths of context files under `root`, sorted, at most `limit`
pub fn list_context_files(root: &Path, limit: usize) -> Vec<String> {
    let mut files = BTreeSet::new();

    let walk = walker(root)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILENAME)
        .build();
    collect(root, walk, |_| true, &mut files);

    // Ignored directories are pruned by the walk above, so whitelisted
    // files need a second walk with no ignore rules at all
    if let Some(include) = include_matcher(root) {
        let unfiltered = walker(root).standard_filters(false).build();
        collect(
            root,
            unfiltered,
            |relative| include.matched_path_or_any_parents(relative, false).is_ignore(),
            &mut files,
        );
    }

    files.into_iter().take(limit).collect()
}

fn walker(root: &Path) -> WalkBuilder {
    let mut builder = WalkBuilder::new(root);
    builder.filter_entry(|entry| {
        let name = entry.file_name().to_string_lossy();
        !ALWAYS_SKIPPED.contains(&name.as_ref())
    });
    builder
}

fn include_matcher(root: &Path) -> Option<Gitignore> {
    let path = root.join(INCLUDE_FILENAME);
    if !path.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(&path) {
        warn!(error = %e, "Problem reading {}", INCLUDE_FILENAME);
    }
    match builder.build() {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            warn!(error = %e, "Ignoring invalid {}", INCLUDE_FILENAME);
            None
        }
    }
}

fn collect(root: &Path, walk: Walk, keep: impl Fn(&Path) -> bool, files: &mut BTreeSet<String>) {
    for entry in walk {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable workspace entry");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SOURCE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if !is_source {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(root) {
            if keep(relative) {
                files.insert(relative.to_string_lossy().into_owned());
            }
        }
    }
}

/// [`list_context_files`] off the async runtime
pub async fn context_listing(root: &Path, limit: usize) -> Vec<String> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || list_context_files(&root, limit))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Context listing task failed");
            Vec::new()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_honours_ignore_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/left-pad")).unwrap();
        std::fs::create_dir_all(root.join("build")).unwrap();
        std::fs::write(root.join("src/app.py"), "print(1)\n").unwrap();
        std::fs::write(root.join("src/secret.py"), "KEY = 1\n").unwrap();
        std::fs::write(root.join("README.md"), "# app\n").unwrap();
        std::fs::write(root.join("logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join("node_modules/left-pad/index.js"), "").unwrap();
        std::fs::write(root.join("build/out.js"), "").unwrap();
        std::fs::write(root.join(".gitignore"), "build/\n").unwrap();
        std::fs::write(root.join(IGNORE_FILENAME), "src/secret.py\n").unwrap();

        let files = list_context_files(root, 100);
        assert_eq!(files, vec!["README.md".to_string(), "src/app.py".to_string()]);
    }

    #[test]
    fn test_include_file_overrides_ignores() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("build")).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("build/keep.py"), "").unwrap();
        std::fs::write(root.join("build/drop.py"), "").unwrap();
        std::fs::write(root.join("src/main.py"), "").unwrap();
        std::fs::write(root.join("src/vendored.py"), "").unwrap();
        std::fs::write(root.join(".gitignore"), "build/\n").unwrap();
        std::fs::write(root.join(IGNORE_FILENAME), "src/vendored.py\n").unwrap();
        std::fs::write(root.join(INCLUDE_FILENAME), "# wanted anyway\nbuild/keep.py\nsrc/vendored.py\n").unwrap();

        let files = list_context_files(root, 100);
        assert_eq!(files, vec!["build/keep.py", "src/main.py", "src/vendored.py"]);
    }

    #[test]
    fn test_listing_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{}.rs", i)), "").unwrap();
        }
        assert_eq!(list_context_files(dir.path(), 3), vec!["f0.rs", "f1.rs", "f2.rs"]);
    }
}
