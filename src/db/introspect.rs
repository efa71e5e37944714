use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tokio_postgres::Client;

/// One column of a live table, as discovered from the catalog.
///
/// Derived transiently on every context-gathering pass; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrospectStep {
    Connect,
    Tables,
    Columns,
    PrimaryKeys,
    ForeignKeys,
}

impl fmt::Display for IntrospectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            IntrospectStep::Connect => "connect",
            IntrospectStep::Tables => "tables",
            IntrospectStep::Columns => "columns",
            IntrospectStep::PrimaryKeys => "primary_keys",
            IntrospectStep::ForeignKeys => "foreign_keys",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Error)]
#[error("introspection failed at {step}: {message}")]
pub struct IntrospectionError {
    pub step: IntrospectStep,
    pub message: String,
}

impl IntrospectionError {
    fn at(step: IntrospectStep, message: impl fmt::Display) -> Self {
        Self {
            step,
            message: message.to_string(),
        }
    }
}

/// Raw column row before primary/foreign key information is folded in.
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone)]
pub struct RawForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

/// The catalog sub-queries behind introspection. Production uses the
/// Postgres information_schema; tests inject failures through this seam.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn base_tables(&self) -> Result<Vec<String>, String>;
    async fn table_columns(&self, table: &str) -> Result<Vec<RawColumn>, String>;
    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, String>;
    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>, String>;
}

pub struct PgCatalog {
    client: Client,
}

impl PgCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn base_tables(&self) -> Result<Vec<String>, String> {
        let rows = self
            .client
            .query(
                "SELECT table_name
                 FROM information_schema.tables
                 WHERE table_schema = 'public'
                 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<RawColumn>, String> {
        let rows = self
            .client
            .query(
                "SELECT column_name, data_type, is_nullable
                 FROM information_schema.columns
                 WHERE table_schema = 'public'
                 AND table_name = $1
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(rows
            .iter()
            .map(|r| RawColumn {
                name: r.get(0),
                data_type: r.get(1),
                is_nullable: r.get::<_, String>(2) == "YES",
            })
            .collect())
    }

    async fn primary_keys(&self, table: &str) -> Result<Vec<String>, String> {
        let rows = self
            .client
            .query(
                "SELECT kcu.column_name
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                 WHERE tc.constraint_type = 'PRIMARY KEY'
                 AND tc.table_name = $1",
                &[&table],
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>, String> {
        let rows = self
            .client
            .query(
                "SELECT
                   kcu.column_name,
                   ccu.table_name AS foreign_table_name,
                   ccu.column_name AS foreign_column_name
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                   AND tc.table_schema = kcu.table_schema
                 JOIN information_schema.constraint_column_usage ccu
                   ON ccu.constraint_name = tc.constraint_name
                   AND ccu.table_schema = tc.table_schema
                 WHERE tc.constraint_type = 'FOREIGN KEY'
                 AND tc.table_name = $1",
                &[&table],
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(rows
            .iter()
            .map(|r| RawForeignKey {
                column: r.get(0),
                foreign_table: r.get(1),
                foreign_column: r.get(2),
            })
            .collect())
    }
}

/// Lists base tables of the public schema, alphabetically ordered.
pub async fn list_tables(connection_string: &str) -> Result<Vec<String>, IntrospectionError> {
    let catalog = open_catalog(connection_string).await?;
    catalog
        .base_tables()
        .await
        .map_err(|e| IntrospectionError::at(IntrospectStep::Tables, e))
}

/// Lists columns of one table with nullability, primary key and foreign
/// key metadata folded in.
pub async fn list_columns(
    connection_string: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>, IntrospectionError> {
    let catalog = open_catalog(connection_string).await?;
    list_columns_with(&catalog, table).await
}

/// The catalog-level half of `list_columns`. Three sub-queries, joined in
/// memory by column name; any sub-query failure fails the whole call with
/// no partial result.
pub async fn list_columns_with(
    catalog: &dyn Catalog,
    table: &str,
) -> Result<Vec<ColumnInfo>, IntrospectionError> {
    let columns = catalog
        .table_columns(table)
        .await
        .map_err(|e| IntrospectionError::at(IntrospectStep::Columns, e))?;

    let primary_keys = catalog
        .primary_keys(table)
        .await
        .map_err(|e| IntrospectionError::at(IntrospectStep::PrimaryKeys, e))?;

    let foreign_keys = catalog
        .foreign_keys(table)
        .await
        .map_err(|e| IntrospectionError::at(IntrospectStep::ForeignKeys, e))?;

    Ok(merge_column_info(columns, primary_keys, foreign_keys))
}

async fn open_catalog(connection_string: &str) -> Result<PgCatalog, IntrospectionError> {
    let client = super::open_client(connection_string)
        .await
        .map_err(|e| IntrospectionError::at(IntrospectStep::Connect, e))?;
    Ok(PgCatalog::new(client))
}

fn merge_column_info(
    columns: Vec<RawColumn>,
    primary_keys: Vec<String>,
    foreign_keys: Vec<RawForeignKey>,
) -> Vec<ColumnInfo> {
    let primary: HashSet<String> = primary_keys.into_iter().collect();
    let mut foreign: HashMap<String, ForeignKeyRef> = foreign_keys
        .into_iter()
        .map(|fk| {
            (
                fk.column,
                ForeignKeyRef {
                    table: fk.foreign_table,
                    column: fk.foreign_column,
                },
            )
        })
        .collect();

    columns
        .into_iter()
        .map(|col| {
            let foreign_key = foreign.remove(&col.name);
            ColumnInfo {
                is_primary: primary.contains(&col.name),
                foreign_key,
                name: col.name,
                data_type: col.data_type,
                is_nullable: col.is_nullable,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCatalog {
        fail_step: Option<IntrospectStep>,
    }

    impl FakeCatalog {
        fn ok() -> Self {
            Self { fail_step: None }
        }

        fn failing_at(step: IntrospectStep) -> Self {
            Self {
                fail_step: Some(step),
            }
        }
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn base_tables(&self) -> Result<Vec<String>, String> {
            if self.fail_step == Some(IntrospectStep::Tables) {
                return Err("catalog offline".to_string());
            }
            Ok(vec!["orders".to_string(), "users".to_string()])
        }

        async fn table_columns(&self, _table: &str) -> Result<Vec<RawColumn>, String> {
            if self.fail_step == Some(IntrospectStep::Columns) {
                return Err("catalog offline".to_string());
            }
            Ok(vec![
                RawColumn {
                    name: "id".to_string(),
                    data_type: "uuid".to_string(),
                    is_nullable: false,
                },
                RawColumn {
                    name: "user_id".to_string(),
                    data_type: "uuid".to_string(),
                    is_nullable: true,
                },
            ])
        }

        async fn primary_keys(&self, _table: &str) -> Result<Vec<String>, String> {
            if self.fail_step == Some(IntrospectStep::PrimaryKeys) {
                return Err("catalog offline".to_string());
            }
            Ok(vec!["id".to_string()])
        }

        async fn foreign_keys(&self, _table: &str) -> Result<Vec<RawForeignKey>, String> {
            if self.fail_step == Some(IntrospectStep::ForeignKeys) {
                return Err("catalog offline".to_string());
            }
            Ok(vec![RawForeignKey {
                column: "user_id".to_string(),
                foreign_table: "users".to_string(),
                foreign_column: "id".to_string(),
            }])
        }
    }

    #[tokio::test]
    async fn merges_keys_into_columns() {
        let catalog = FakeCatalog::ok();
        let columns = list_columns_with(&catalog, "orders").await.unwrap();

        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_primary);
        assert!(columns[0].foreign_key.is_none());
        assert!(!columns[1].is_primary);
        assert_eq!(
            columns[1].foreign_key,
            Some(ForeignKeyRef {
                table: "users".to_string(),
                column: "id".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn foreign_key_failure_fails_the_whole_listing() {
        let catalog = FakeCatalog::failing_at(IntrospectStep::ForeignKeys);
        let err = list_columns_with(&catalog, "orders").await.unwrap_err();
        assert_eq!(err.step, IntrospectStep::ForeignKeys);
    }

    #[tokio::test]
    async fn primary_key_failure_fails_the_whole_listing() {
        let catalog = FakeCatalog::failing_at(IntrospectStep::PrimaryKeys);
        let err = list_columns_with(&catalog, "orders").await.unwrap_err();
        assert_eq!(err.step, IntrospectStep::PrimaryKeys);
    }

    #[test]
    fn column_info_serializes_for_the_model() {
        let info = ColumnInfo {
            name: "user_id".to_string(),
            data_type: "uuid".to_string(),
            is_nullable: true,
            is_primary: false,
            foreign_key: Some(ForeignKeyRef {
                table: "users".to_string(),
                column: "id".to_string(),
            }),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "uuid");
        assert_eq!(json["isNullable"], true);
        assert_eq!(json["foreignKey"]["table"], "users");
    }
}
