use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db;

/// Reference to an uploaded file a user provided as business-context
/// grounding material.
#[derive(Debug, Clone)]
pub struct UserFile {
    pub kind: String,
    pub url: String,
    pub media_type: String,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("file storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserFile>, FileError>;
}

/// File registry backed by the application database.
pub struct PgFileRegistry {
    connection_string: String,
}

impl PgFileRegistry {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[async_trait]
impl FileRegistry for PgFileRegistry {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserFile>, FileError> {
        let client = db::open_client(&self.connection_string)
            .await
            .map_err(|e| FileError::Storage(e.to_string()))?;

        let rows = client
            .query(
                "SELECT type, file_url, media_type FROM user_files WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| FileError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|r| UserFile {
                kind: r.get(0),
                url: r.get(1),
                media_type: r.get(2),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryFileRegistry {
    files: RwLock<HashMap<String, Vec<UserFile>>>,
}

impl MemoryFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user_id: &str, file: UserFile) {
        self.files
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(file);
    }
}

#[async_trait]
impl FileRegistry for MemoryFileRegistry {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserFile>, FileError> {
        Ok(self
            .files
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}
