//! The infrastructure template being audited.

use crate::error::{Result, WaReviewError};
use serde::{Deserialize, Serialize};
use std::path::Path;

const ACCEPTED_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    /// Reference handed to the text-generation service
    pub location: String,
    pub contents: String,
}

impl Artifact {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(WaReviewError::Artifact {
                message: format!(
                    "{} is not a template (expected one of: {})",
                    path.display(),
                    ACCEPTED_EXTENSIONS.join(", ")
                ),
            });
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WaReviewError::Artifact {
                message: format!("reading {} failed: {}", path.display(), e),
            })?;
        let location = tokio::fs::canonicalize(path)
            .await
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.clone());

        Ok(Self {
            name,
            location,
            contents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_template_extension() {
        let err = Artifact::from_path("/tmp/whatever.txt").await.unwrap_err();
        assert!(matches!(err, WaReviewError::Artifact { .. }));
    }

    #[tokio::test]
    async fn test_reads_yaml_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.YML");
        std::fs::write(&path, "Resources: {}\n").unwrap();
        let artifact = Artifact::from_path(&path).await.unwrap();
        assert_eq!(artifact.name, "stack.YML");
        assert_eq!(artifact.contents, "Resources: {}\n");
    }
}
