use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use super::error::RenderError;
use super::traits::ArtifactStore;
use super::types::{ArtifactRef, RenderedArtifact};

/// Writes artifacts to `<root>/<batch_id>/<name>.<ext>`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keep path components to a safe character set.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(
        &self,
        batch_id: &str,
        name: &str,
        artifact: &RenderedArtifact,
    ) -> Result<ArtifactRef, RenderError> {
        let dir = self.root.join(sanitize_component(batch_id));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| RenderError::Write {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(format!(
            "{}.{}",
            sanitize_component(name),
            artifact.extension
        ));
        fs::write(&path, &artifact.bytes)
            .await
            .map_err(|source| RenderError::Write {
                path: path.clone(),
                source,
            })?;

        let sha256 = hex::encode(Sha256::digest(&artifact.bytes));
        debug!(path = %path.display(), bytes = artifact.bytes.len(), "Stored artifact");

        Ok(ArtifactRef {
            kind: artifact.kind,
            uri: format!("file://{}", path.display()),
            content_type: artifact.content_type.clone(),
            size_bytes: artifact.bytes.len() as u64,
            sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ArtifactKind;
    use tempfile::TempDir;

    fn artifact(bytes: &[u8]) -> RenderedArtifact {
        RenderedArtifact {
            kind: ArtifactKind::Qr,
            content_type: "image/png".to_string(),
            extension: "png".to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_store_writes_file() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());

        let reference = store.store("batch-1", "t1-qr", &artifact(b"png-bytes")).await.unwrap();

        let path = temp.path().join("batch-1").join("t1-qr.png");
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
        assert_eq!(reference.size_bytes, 9);
        assert_eq!(reference.sha256.len(), 64);
        assert!(reference.uri.ends_with("t1-qr.png"));
    }

    #[tokio::test]
    async fn test_store_sanitizes_names() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::new(temp.path());

        store.store("../escape", "a/b", &artifact(b"x")).await.unwrap();

        assert!(temp.path().join("_escape").join("a_b.png").exists());
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("ok-id_1.2"), "ok-id_1.2");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("a b/c"), "a_b_c");
    }
}
