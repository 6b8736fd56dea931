//! Connection trait over the driver.
//!
//! The executor only needs two things from a connection: prepare a statement
//! once, then run it with one parameter set at a time. Anything implementing
//! [`Connection`] can be used, which is how `tokio_postgres::Client`,
//! `tokio_postgres::Transaction` and [`PgConnection`] are supported.

use crate::LOG_TARGET;
use crate::arguments::ParamSlots;
use crate::error::{FluentError, FluentResult};
use crate::result_set::ResultSet;
use crate::value::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::task::JoinHandle;
use tokio_postgres::Statement;
use tokio_postgres::types::{ToSql, Type};

/// Outcome of running a statement once.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The statement produced a result set.
    Rows(ResultSet),
    /// The statement produced no result set; carries the affected row count.
    Updated(u64),
}

/// A database connection the executor can prepare and run statements on.
pub trait Connection: Send + Sync {
    /// Prepared statement handle, valid only on this connection.
    type Statement: Send + Sync;

    /// Prepare `sql` on this connection.
    fn prepare(
        &self,
        sql: &str,
    ) -> impl std::future::Future<Output = FluentResult<Self::Statement>> + Send;

    /// Run a prepared statement with one parameter set.
    fn run(
        &self,
        stmt: &Self::Statement,
        params: &ParamSlots,
    ) -> impl std::future::Future<Output = FluentResult<Execution>> + Send;
}

impl Connection for tokio_postgres::Client {
    type Statement = Statement;

    async fn prepare(&self, sql: &str) -> FluentResult<Statement> {
        tokio_postgres::Client::prepare(self, sql)
            .await
            .map_err(FluentError::from_db_error)
    }

    async fn run(&self, stmt: &Statement, params: &ParamSlots) -> FluentResult<Execution> {
        let params = driver_params(stmt, params)?;
        if stmt.columns().is_empty() {
            let count = tokio_postgres::Client::execute(self, stmt, &params)
                .await
                .map_err(FluentError::from_db_error)?;
            return Ok(Execution::Updated(count));
        }
        let rows = tokio_postgres::Client::query(self, stmt, &params)
            .await
            .map_err(FluentError::from_db_error)?;
        build_result_set(stmt, &rows).map(Execution::Rows)
    }
}

impl Connection for tokio_postgres::Transaction<'_> {
    type Statement = Statement;

    async fn prepare(&self, sql: &str) -> FluentResult<Statement> {
        tokio_postgres::Transaction::prepare(self, sql)
            .await
            .map_err(FluentError::from_db_error)
    }

    async fn run(&self, stmt: &Statement, params: &ParamSlots) -> FluentResult<Execution> {
        let params = driver_params(stmt, params)?;
        if stmt.columns().is_empty() {
            let count = tokio_postgres::Transaction::execute(self, stmt, &params)
                .await
                .map_err(FluentError::from_db_error)?;
            return Ok(Execution::Updated(count));
        }
        let rows = tokio_postgres::Transaction::query(self, stmt, &params)
            .await
            .map_err(FluentError::from_db_error)?;
        build_result_set(stmt, &rows).map(Execution::Rows)
    }
}

fn driver_params<'p>(
    stmt: &Statement,
    params: &'p ParamSlots,
) -> FluentResult<Vec<&'p (dyn ToSql + Sync)>> {
    params.check_declared_types(stmt.params())?;
    params.as_params()
}

/// An owned connection: the client plus the task driving its socket.
///
/// Dropping it closes the connection: once the client is gone the driver
/// task sends the terminate message and finishes on its own.
pub struct PgConnection {
    client: tokio_postgres::Client,
    driver: JoinHandle<()>,
}

impl PgConnection {
    pub(crate) fn new(client: tokio_postgres::Client, driver: JoinHandle<()>) -> Self {
        Self { client, driver }
    }

    /// The underlying driver client.
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    /// Whether the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Close the connection and wait until the driver task has finished.
    pub async fn close(self) -> FluentResult<()> {
        let Self { client, driver } = self;
        drop(client);
        driver
            .await
            .map_err(|e| FluentError::Connection(format!("connection task failed: {e}")))?;
        tracing::trace!(target: LOG_TARGET, "connection closed");
        Ok(())
    }
}

impl Connection for PgConnection {
    type Statement = Statement;

    async fn prepare(&self, sql: &str) -> FluentResult<Statement> {
        Connection::prepare(&self.client, sql).await
    }

    async fn run(&self, stmt: &Statement, params: &ParamSlots) -> FluentResult<Execution> {
        Connection::run(&self.client, stmt, params).await
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

/// Materialize driver rows using the statement's column metadata.
pub(crate) fn build_result_set(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> FluentResult<ResultSet> {
    let mut result_set = ResultSet::new(stmt.columns().iter().map(|c| c.name()));
    for row in rows {
        let values = (0..row.len())
            .map(|idx| extract_value(row, idx))
            .collect::<FluentResult<Vec<_>>>()?;
        result_set.push_row(values)?;
    }
    Ok(result_set)
}

/// Decode one cell according to its column type.
fn extract_value(row: &tokio_postgres::Row, idx: usize) -> FluentResult<SqlValue> {
    let column = &row.columns()[idx];
    let decode = |e: tokio_postgres::Error| FluentError::decode(column.name(), e.to_string());

    let value = match *column.type_() {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(SqlValue::Bool)),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(SqlValue::Short)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(SqlValue::Int)),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(SqlValue::Long)),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)
            .map(|v| v.map(|oid| SqlValue::Long(i64::from(oid)))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(SqlValue::Float)),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(SqlValue::Double)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::Timestamp)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(SqlValue::TimestampTz)),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map(|v| v.map(SqlValue::Json)),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .map(|v| v.map(SqlValue::Uuid)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(SqlValue::Bytes)),
        ref other => {
            return Err(FluentError::decode(
                column.name(),
                format!("unsupported column type {other}; cast it in SQL"),
            ));
        }
    };

    Ok(value.map_err(decode)?.unwrap_or(SqlValue::Null))
}
