pub mod executor;
pub mod introspect;
pub mod validate;

use thiserror::Error;
use tokio_postgres::{Client, NoTls};
use tracing::debug;

#[derive(Debug, Error)]
#[error("failed to open database connection: {message}")]
pub struct ConnectError {
    pub message: String,
    #[source]
    pub source: tokio_postgres::Error,
}

/// Opens a client against the target database.
///
/// Connections are opened per call and not pooled: callers must not assume
/// reuse across calls. The background connection task logs and exits on
/// failure; the client surfaces the error on its next use.
pub(crate) async fn open_client(connection_string: &str) -> Result<Client, ConnectError> {
    let (client, connection) =
        tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| ConnectError {
                message: e.to_string(),
                source: e,
            })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!("database connection task ended: {}", e);
        }
    });

    Ok(client)
}
