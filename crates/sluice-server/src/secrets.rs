use std::path::PathBuf;

use async_trait::async_trait;
use sluice_core::{Secret, SecretError, SecretSource};

/// Secrets read from a YAML list on every refresh:
///
/// ```yaml
/// - name: github-webhook
///   namespace: ci
///   data:
///     token: s3cr3t
/// ```
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    /// Read secrets from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    async fn list(&self) -> Result<Vec<Secret>, SecretError> {
        let yaml = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SecretError::Source(format!("failed to read {}: {}", self.path.display(), e)))?;
        serde_yaml::from_str(&yaml)
            .map_err(|e| SecretError::Source(format!("failed to parse {}: {}", self.path.display(), e)))
    }
}
