//! Content source collaborators: where raw template text comes from.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::FetchError;

/// Produces raw template text for a document path.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<String, FetchError>;
}

#[async_trait]
impl<T: ContentSource + ?Sized> ContentSource for std::sync::Arc<T> {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        (**self).fetch(path).await
    }
}

/// Canonical spelling of a document path: no leading `/`, no `.` or empty
/// segments. `..` is kept for the source to refuse.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads documents from a directory tree.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a document path under the root. Leading `/` is ignored and
    /// parent components are refused.
    fn resolve(&self, path: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(FetchError::OutsideRoot(path.to_string())),
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ContentSource for FsSource {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let file = self.resolve(path)?;
        tracing::debug!(path, file = %file.display(), "reading document");
        tokio::fs::read_to_string(&file).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.to_string())
            } else {
                FetchError::Io {
                    path: path.to_string(),
                    source: e,
                }
            }
        })
    }
}

/// In-memory documents keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        let path: String = path.into();
        self.documents.insert(normalize_path(&path), text.into());
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        self.documents
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_normalize_to_one_spelling() {
        assert_eq!(normalize_path("/a.html"), "a.html");
        assert_eq!(normalize_path("./parts//nav.html"), "parts/nav.html");
        assert_eq!(normalize_path("parts/./nav.html"), "parts/nav.html");
        assert_eq!(normalize_path("../secret"), "../secret");
    }

    #[tokio::test]
    async fn memory_source_accepts_any_spelling() {
        let source = MemorySource::new().with("parts/nav.html", "<nav/>");
        assert_eq!(source.fetch("/parts/nav.html").await.unwrap(), "<nav/>");
        assert_eq!(source.fetch("./parts/nav.html").await.unwrap(), "<nav/>");
    }

    #[tokio::test]
    async fn fs_source_reads_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("parts")).unwrap();
        std::fs::write(dir.path().join("parts/nav.html"), "<nav/>").unwrap();

        let source = FsSource::new(dir.path());
        assert_eq!(source.fetch("/parts/nav.html").await.unwrap(), "<nav/>");
        assert!(matches!(
            source.fetch("parts/missing.html").await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fs_source_refuses_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsSource::new(dir.path());
        assert!(matches!(
            source.fetch("../etc/passwd").await,
            Err(FetchError::OutsideRoot(_))
        ));
    }

    #[tokio::test]
    async fn memory_source_lookup() {
        let source = MemorySource::new().with("a.html", "A");
        assert_eq!(source.fetch("/a.html").await.unwrap(), "A");
        assert!(source.fetch("b.html").await.is_err());
    }
}
