//! Connection providers: open a fresh connection on demand.

use crate::LOG_TARGET;
use crate::client::{Connection, PgConnection};
use crate::config::ConnectionConfig;
use crate::error::{FluentError, FluentResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::future::Future;

/// Supplies a new connection per request.
///
/// The request builder takes ownership of each connection it obtains and
/// drops it when the terminal call finishes.
pub trait ConnectionProvider: Send + Sync {
    type Connection: Connection;

    fn connect(&self) -> impl Future<Output = FluentResult<Self::Connection>> + Send;
}

/// Object-safe form of [`ConnectionProvider`], so a builder can hold
/// `&dyn DynConnectionProvider<C>` without naming the provider type.
pub trait DynConnectionProvider<C>: Send + Sync {
    fn connect_boxed(&self) -> BoxFuture<'_, FluentResult<C>>;
}

impl<P> DynConnectionProvider<P::Connection> for P
where
    P: ConnectionProvider,
{
    fn connect_boxed(&self) -> BoxFuture<'_, FluentResult<P::Connection>> {
        self.connect().boxed()
    }
}

/// Opens PostgreSQL connections without TLS.
#[derive(Debug, Clone)]
pub struct PostgresConnectionProvider {
    config: ConnectionConfig,
}

impl PostgresConnectionProvider {
    /// Provider for `postgresql://host:5432/database`.
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::from_config(ConnectionConfig::new(host, database, user).password(password))
    }

    pub fn from_config(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Provider for `DATABASE_URL`.
    pub fn from_env() -> FluentResult<Self> {
        ConnectionConfig::from_env().map(Self::from_config)
    }

    /// Override the port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl ConnectionProvider for PostgresConnectionProvider {
    type Connection = PgConnection;

    async fn connect(&self) -> FluentResult<PgConnection> {
        tracing::debug!(target: LOG_TARGET, dsn = %self.config.dsn(), "opening connection");

        let (client, connection) = self
            .config
            .to_pg_config()
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| FluentError::Connection(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target: LOG_TARGET, error = %e, "connection closed with error");
            }
        });

        Ok(PgConnection::new(client, driver))
    }
}
