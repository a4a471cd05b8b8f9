//! On-disk storage for vehicle documents.
//!
//! Paths stored in the database are relative to the upload root
//! (`vehicles/<id>/<uuid>-<name>`) so the root can move between deployments.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::AppError;

const MAX_NAME_LEN: usize = 120;

/// Keep letters, digits, `.`, `-` and `_`; everything else becomes `_`.
/// Leading dots are dropped so a name can never be `..` or hidden.
pub fn sanitize_file_name(name: &str) -> String {
    // browsers on Windows may send the full client path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let truncated: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    if truncated.is_empty() {
        "file".to_string()
    } else {
        truncated
    }
}

/// A file written by [`DocumentStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the storage root, with `/` separators.
    pub relative_path: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a stored relative path, refusing anything that would escape the root.
    fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let path = Path::new(relative);
        if path.components().all(|c| matches!(c, Component::Normal(_))) {
            Ok(self.root.join(path))
        } else {
            Err(AppError::invalid("Invalid stored file path"))
        }
    }

    pub async fn store(
        &self,
        vehicle_id: i64,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, AppError> {
        let relative_path = format!(
            "vehicles/{vehicle_id}/{}-{}",
            Uuid::new_v4(),
            sanitize_file_name(original_name)
        );
        let path = self.resolve(&relative_path)?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "document stored");
        Ok(StoredFile {
            relative_path,
            size_bytes: bytes.len() as i64,
        })
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "document row points to a missing file");
                Err(AppError::NotFound("File"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<(), AppError> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_file_name("libretto.pdf"), "libretto.pdf");
        assert_eq!(sanitize_file_name("polizza 2024 (RCA).pdf"), "polizza_2024__RCA_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(r"C:\Users\mario\bollo.jpg"), "bollo.jpg");
        assert_eq!(sanitize_file_name(".."), "file");
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name(&"a".repeat(300)).len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn store_read_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DocumentStorage::new(dir.path());

        let stored = storage.store(7, "revisione.pdf", b"%PDF-1.4").await.unwrap();
        assert!(stored.relative_path.starts_with("vehicles/7/"));
        assert!(stored.relative_path.ends_with("-revisione.pdf"));
        assert_eq!(stored.size_bytes, 8);

        assert_eq!(storage.read(&stored.relative_path).await.unwrap(), b"%PDF-1.4");

        storage.remove(&stored.relative_path).await.unwrap();
        assert!(matches!(
            storage.read(&stored.relative_path).await,
            Err(AppError::NotFound(_))
        ));
        // removing twice is fine
        storage.remove(&stored.relative_path).await.unwrap();
    }

    #[tokio::test]
    async fn paths_outside_the_root_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DocumentStorage::new(dir.path());

        assert!(matches!(
            storage.read("../secret.txt").await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            storage.remove("/etc/hosts").await,
            Err(AppError::InvalidRequest(_))
        ));
    }
}
