//! Database sessions
//!
//! The provisioner talks to the server through [`Connector`] and [`Session`]
//! so the step sequence can be exercised without a live server. The
//! production implementation opens one sqlx [`PgConnection`] per session,
//! never a pool: each privilege phase gets its own short-lived connection.

use crate::provision::extensions::CatalogObject;
use crate::provision::sql::CATALOG_OBJECTS;
use crate::secrets::Endpoint;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, PgConnection};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Who connects where.
#[derive(Debug, Clone, Copy)]
pub struct ConnectTarget<'a> {
    pub endpoint: &'a Endpoint,
    pub username: &'a str,
    pub password: &'a str,
    pub database: &'a str,
}

/// An open connection with the handful of operations provisioning needs.
#[async_trait]
pub trait Session: Send {
    /// Run a single-parameter lookup and report whether it returned a row.
    async fn exists(&mut self, query: &str, param: &str) -> Result<bool, sqlx::Error>;

    /// Execute one statement, discarding any rows.
    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error>;

    /// Tables, sequences and views in the given namespaces.
    async fn catalog_objects(&mut self, schemas: &[String])
        -> Result<Vec<CatalogObject>, sqlx::Error>;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), sqlx::Error>;
}

/// Opens sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn Session>, sqlx::Error>;
}

/// Connects over TLS, verifying the server against the configured trust root.
pub struct PgConnector {
    ssl_root_cert: PathBuf,
    connect_timeout: Duration,
}

impl PgConnector {
    pub fn new(ssl_root_cert: impl Into<PathBuf>) -> Self {
        Self {
            ssl_root_cert: ssl_root_cert.into(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    fn options(&self, target: &ConnectTarget<'_>) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&target.endpoint.host)
            .port(target.endpoint.port)
            .username(target.username)
            .password(target.password)
            .database(target.database)
            .ssl_mode(PgSslMode::VerifyFull)
            .ssl_root_cert(&self.ssl_root_cert)
            .application_name("gis-db-provisioner")
            // role creation statements carry passwords
            .disable_statement_logging()
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, target: ConnectTarget<'_>) -> Result<Box<dyn Session>, sqlx::Error> {
        debug!(
            host = %target.endpoint.host,
            port = target.endpoint.port,
            user = %target.username,
            database = %target.database,
            "Connecting"
        );

        let options = self.options(&target);
        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| {
                sqlx::Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no connection within {:?}", self.connect_timeout),
                ))
            })??;

        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl Session for PgSession {
    async fn exists(&mut self, query: &str, param: &str) -> Result<bool, sqlx::Error> {
        let row: Option<i32> = sqlx::query_scalar(query)
            .bind(param)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.is_some())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::Executor::execute(&mut self.conn, statement).await?;
        Ok(())
    }

    async fn catalog_objects(
        &mut self,
        schemas: &[String],
    ) -> Result<Vec<CatalogObject>, sqlx::Error> {
        let rows: Vec<(String, String)> = sqlx::query_as(CATALOG_OBJECTS)
            .bind(schemas.to_vec())
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(schema, name)| CatalogObject::new(schema, name))
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }
}
