use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db;

/// A registered target database. The only durable entity the pipeline
/// touches; always referenced by id, never embedded into agent state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    pub connection_string: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub connection_string: String,
    pub source: String,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection {0} not found")]
    NotFound(String),
    #[error("no postgres connection registered for user {0}")]
    NoneForUser(String),
    #[error("connection storage failure: {0}")]
    Storage(String),
}

#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Connection, ConnectionError>;

    /// Postgres-sourced connections of one user. Absence is a hard
    /// failure: workflows that fall back to "the user's first connection"
    /// need at least one to exist.
    async fn list_pg_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, ConnectionError>;

    async fn create(&self, data: NewConnection) -> Result<Connection, ConnectionError>;

    async fn delete(&self, id: &str) -> Result<(), ConnectionError>;
}

/// Registry backed by the application database. Opens a connection per
/// call, consistent with the rest of the pipeline.
pub struct PgConnectionRegistry {
    connection_string: String,
}

impl PgConnectionRegistry {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    async fn client(&self) -> Result<tokio_postgres::Client, ConnectionError> {
        db::open_client(&self.connection_string)
            .await
            .map_err(|e| ConnectionError::Storage(e.to_string()))
    }
}

fn row_to_connection(row: &tokio_postgres::Row) -> Connection {
    Connection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        connection_string: row.get("connection_string"),
        source: row.get("source"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl ConnectionRegistry for PgConnectionRegistry {
    async fn get_by_id(&self, id: &str) -> Result<Connection, ConnectionError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, user_id, connection_string, source, created_at, updated_at
                 FROM connections WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| ConnectionError::Storage(e.to_string()))?;

        row.map(|r| row_to_connection(&r))
            .ok_or_else(|| ConnectionError::NotFound(id.to_string()))
    }

    async fn list_pg_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, ConnectionError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, user_id, connection_string, source, created_at, updated_at
                 FROM connections
                 WHERE user_id = $1 AND source = 'postgres'
                 ORDER BY created_at",
                &[&user_id],
            )
            .await
            .map_err(|e| ConnectionError::Storage(e.to_string()))?;

        let connections: Vec<Connection> = rows.iter().map(row_to_connection).collect();
        if connections.is_empty() {
            return Err(ConnectionError::NoneForUser(user_id.to_string()));
        }
        Ok(connections)
    }

    async fn create(&self, data: NewConnection) -> Result<Connection, ConnectionError> {
        let client = self.client().await?;
        let now = Utc::now();
        let connection = Connection {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: data.user_id,
            connection_string: data.connection_string,
            source: data.source,
            created_at: now,
            updated_at: now,
        };

        client
            .execute(
                "INSERT INTO connections
                   (id, user_id, connection_string, source, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &connection.id,
                    &connection.user_id,
                    &connection.connection_string,
                    &connection.source,
                    &connection.created_at,
                    &connection.updated_at,
                ],
            )
            .await
            .map_err(|e| ConnectionError::Storage(e.to_string()))?;

        Ok(connection)
    }

    async fn delete(&self, id: &str) -> Result<(), ConnectionError> {
        let client = self.client().await?;
        let deleted = client
            .execute("DELETE FROM connections WHERE id = $1", &[&id])
            .await
            .map_err(|e| ConnectionError::Storage(e.to_string()))?;

        if deleted == 0 {
            return Err(ConnectionError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// In-memory registry for tests and local development.
#[derive(Default)]
pub struct MemoryConnectionRegistry {
    connections: RwLock<HashMap<String, Connection>>,
}

impl MemoryConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryConnectionRegistry {
    async fn get_by_id(&self, id: &str) -> Result<Connection, ConnectionError> {
        self.connections
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound(id.to_string()))
    }

    async fn list_pg_connections_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Connection>, ConnectionError> {
        let mut connections: Vec<Connection> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id && c.source == "postgres")
            .cloned()
            .collect();
        connections.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        if connections.is_empty() {
            return Err(ConnectionError::NoneForUser(user_id.to_string()));
        }
        Ok(connections)
    }

    async fn create(&self, data: NewConnection) -> Result<Connection, ConnectionError> {
        let now = Utc::now();
        let connection = Connection {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: data.user_id,
            connection_string: data.connection_string,
            source: data.source,
            created_at: now,
            updated_at: now,
        };
        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection.clone());
        Ok(connection)
    }

    async fn delete(&self, id: &str) -> Result<(), ConnectionError> {
        self.connections
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ConnectionError::NotFound(id.to_string()))
    }
}
