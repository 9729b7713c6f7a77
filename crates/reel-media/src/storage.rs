//! Media path resolution.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Resolves a requested media reference to a readable local file.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn resolve(&self, reference: &str) -> MediaResult<PathBuf>;
}

/// Local filesystem store.
///
/// With a root configured, relative references resolve under it and
/// nothing outside the root is accepted.
#[derive(Debug, Clone, Default)]
pub struct LocalMediaStore {
    root: Option<PathBuf>,
}

impl LocalMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn resolve(&self, reference: &str) -> MediaResult<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(MediaError::FileNotFound(PathBuf::new()));
        }
        let requested = Path::new(reference);

        let candidate = match &self.root {
            Some(root) => {
                if requested
                    .components()
                    .any(|c| matches!(c, Component::ParentDir))
                {
                    return Err(MediaError::SecurityViolation(format!(
                        "path traversal in '{}'",
                        reference
                    )));
                }
                if requested.is_absolute() {
                    requested.to_path_buf()
                } else {
                    root.join(requested)
                }
            }
            None => requested.to_path_buf(),
        };

        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::FileNotFound(candidate));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(root) = &self.root {
            let root = tokio::fs::canonicalize(root).await?;
            if !resolved.starts_with(&root) {
                return Err(MediaError::SecurityViolation(format!(
                    "'{}' is outside the media root",
                    reference
                )));
            }
        }

        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(MediaError::FileNotFound(resolved));
        }
        if tokio::fs::File::open(&resolved).await.is_err() {
            return Err(MediaError::NotReadable(resolved));
        }

        Ok(resolved)
    }
}
