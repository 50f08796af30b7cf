//! File collaborator - reading and writing workspace files
//!
//! The agent never touches `std::fs` directly; it goes through [`FileStore`]
//! so edits can be exercised against [`MemoryFiles`] in tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::summary::split_lines;

/// Read/write access to the files of one workspace
///
/// Relative paths resolve against the workspace root.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &str) -> std::io::Result<String>;

    async fn write(&self, path: &str, content: &str) -> std::io::Result<()>;

    async fn exists(&self, path: &str) -> bool;

    /// Number of lines, not counting a trailing newline as an extra line
    async fn line_count(&self, path: &str) -> std::io::Result<usize> {
        let content = self.read(path).await?;
        Ok(split_lines(&content).len())
    }
}

/// Files on the local disk under a workspace root
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait]
impl FileStore for LocalFiles {
    async fn read(&self, path: &str) -> std::io::Result<String> {
        tokio::fs::read_to_string(self.resolve(path)).await
    }

    async fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(target, content).await
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }
}

/// In-memory files, with a log of every write
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), content.into());
        }
        self
    }

    /// Current content of a file, if present
    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().ok()?.get(path).cloned()
    }

    /// Paths written so far, in order, one entry per write
    pub fn write_log(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

fn poisoned() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "file store lock poisoned")
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn read(&self, path: &str) -> std::io::Result<String> {
        let files = self.files.lock().map_err(|_| poisoned())?;
        files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}: no such file", path))
        })
    }

    async fn write(&self, path: &str, content: &str) -> std::io::Result<()> {
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .insert(path.to_string(), content.to_string());
        self.writes.lock().map_err(|_| poisoned())?.push(path.to_string());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.lock().map(|f| f.contains_key(path)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_files_resolve_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFiles::new(dir.path());

        assert!(!files.exists("pkg/mod.py").await);
        files.write("pkg/mod.py", "a = 1\nb = 2\n").await.unwrap();
        assert!(files.exists("pkg/mod.py").await);
        assert_eq!(files.line_count("pkg/mod.py").await.unwrap(), 2);

        let absolute = dir.path().join("pkg/mod.py");
        let content = files.read(absolute.to_str().unwrap()).await.unwrap();
        assert_eq!(content, "a = 1\nb = 2\n");
    }

    #[tokio::test]
    async fn test_memory_files_log_writes() {
        let files = MemoryFiles::new().with_file("a.txt", "one");
        assert_eq!(files.read("a.txt").await.unwrap(), "one");
        assert!(files.read("missing.txt").await.is_err());

        files.write("a.txt", "two").await.unwrap();
        files.write("b.txt", "").await.unwrap();
        assert_eq!(files.get("a.txt").as_deref(), Some("two"));
        assert_eq!(files.write_log(), vec!["a.txt".to_string(), "b.txt".to_string()]);
        assert_eq!(files.line_count("b.txt").await.unwrap(), 0);
    }
}
