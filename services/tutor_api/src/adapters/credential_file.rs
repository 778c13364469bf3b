//! services/tutor_api/src/adapters/credential_file.rs
//!
//! A single-entry, plain-text credential store backed by one file.
//! It implements the `CredentialStore` port from the `core` crate.

use async_trait::async_trait;
use chain_tutor_core::ports::{CredentialStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::info;

/// Stores the user-supplied credential as the whole content of `path`.
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> PortResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content).filter(|c| !c.trim().is_empty())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::Storage(e.to_string())),
        }
    }

    async fn save(&self, credential: &str) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Storage(e.to_string()))?;
        }
        tokio::fs::write(&self.path, credential)
            .await
            .map_err(|e| PortError::Storage(e.to_string()))?;
        info!(path = %self.path.display(), "User credential saved.");
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "User credential removed.");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Storage(e.to_string())),
        }
    }
}
