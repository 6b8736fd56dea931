//! Fluent, immutable request builder.
//!
//! Every `with_*` / `add_*` call borrows the builder and returns a new one, so
//! a partially configured builder can be shared and branched freely:
//!
//! ```ignore
//! use pgfluent::{PostgresConnectionProvider, RequestBuilder};
//!
//! let provider = PostgresConnectionProvider::new("localhost", "shop", "app", "secret");
//!
//! let count = RequestBuilder::returning_long()
//!     .with_connection_provider(&provider)
//!     .with_sql("SELECT count(*) FROM orders WHERE customer_id = $1")
//!     .add_param(42_i64)
//!     .execute()
//!     .await;
//! ```
//!
//! Terminal calls never return an error. Failures are logged and, when an
//! [`ErrorCollector`] is attached, recorded there.

use crate::arguments::{ArgumentSetter, ArgumentSetterBuilder, SqlParam};
use crate::client::{Connection, PgConnection};
use crate::error::{ErrorCollector, FluentError, FluentResult};
use crate::executor::SqlExecutor;
use crate::provider::{ConnectionProvider, DynConnectionProvider};
use crate::reader::{ConnectionReader, Reader, ResultReader};
use crate::result_set::ResultSet;
use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use tokio_postgres::types::{ToSql, Type};
use tracing::Span;

/// Builds and runs one SQL request returning `T`.
///
/// `C` is the connection type; it is fixed by
/// [`with_connection`](Self::with_connection) or
/// [`with_connection_provider`](Self::with_connection_provider).
pub struct RequestBuilder<'a, T, C = PgConnection> {
    span: Span,
    current: Option<ArgumentSetterBuilder>,
    setters: Vec<ArgumentSetter>,
    reader: Option<Reader<T, C>>,
    provider: Option<&'a dyn DynConnectionProvider<C>>,
    connection: Option<&'a C>,
    sql: Option<String>,
    errors: Option<ErrorCollector>,
}

impl<T, C> Clone for RequestBuilder<'_, T, C> {
    fn clone(&self) -> Self {
        Self {
            span: self.span.clone(),
            current: self.current.clone(),
            setters: self.setters.clone(),
            reader: self.reader.clone(),
            provider: self.provider,
            connection: self.connection,
            sql: self.sql.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<T, C> fmt::Debug for RequestBuilder<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("sql", &self.sql)
            .field("setters", &self.setters.len())
            .field("pending_params", &self.current.as_ref().map(ArgumentSetterBuilder::len))
            .field("reader", &self.reader)
            .field("has_provider", &self.provider.is_some())
            .field("has_connection", &self.connection.is_some())
            .finish()
    }
}

impl<'a, T, C> RequestBuilder<'a, T, C> {
    /// Builder for a request returning `T`; install a reader to produce it.
    pub fn returning() -> Self {
        Self {
            span: Span::current(),
            current: None,
            setters: Vec::new(),
            reader: None,
            provider: None,
            connection: None,
            sql: None,
            errors: None,
        }
    }

    /// Attach events of this request to `span`.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            span,
            ..self.clone()
        }
    }

    pub fn with_sql(&self, sql: impl Into<String>) -> Self {
        Self {
            sql: Some(sql.into()),
            ..self.clone()
        }
    }

    /// Open a fresh connection from `provider` for each terminal call.
    ///
    /// Takes precedence over [`with_connection`](Self::with_connection).
    pub fn with_connection_provider<P>(&self, provider: &'a P) -> Self
    where
        P: ConnectionProvider<Connection = C>,
    {
        Self {
            provider: Some(provider),
            ..self.clone()
        }
    }

    /// Run on a connection the caller owns, such as a transaction.
    pub fn with_connection(&self, connection: &'a C) -> Self {
        Self {
            connection: Some(connection),
            ..self.clone()
        }
    }

    /// Replace the explicit parameter sets.
    ///
    /// Parameters added with `add_param*` are bound as one more set after
    /// these.
    pub fn with_argument_setters(&self, setters: impl IntoIterator<Item = ArgumentSetter>) -> Self {
        Self {
            setters: setters.into_iter().collect(),
            ..self.clone()
        }
    }

    pub fn with_result_reader<F>(&self, read: F) -> Self
    where
        F: Fn(&mut ResultSet) -> FluentResult<Option<T>> + Send + Sync + 'static,
    {
        self.with_reader(ResultReader::new(read))
    }

    /// Reader that also receives the live connection, for follow-up queries.
    pub fn with_connection_reader<F>(&self, read: F) -> Self
    where
        F: for<'c> Fn(ResultSet, &'c C) -> BoxFuture<'c, FluentResult<Option<T>>>
            + Send
            + Sync
            + 'static,
    {
        self.with_reader(ConnectionReader::new(read))
    }

    /// Install a prebuilt reader of either kind, replacing the previous one.
    pub fn with_reader(&self, reader: impl Into<Reader<T, C>>) -> Self {
        Self {
            reader: Some(reader.into()),
            ..self.clone()
        }
    }

    /// Record every error caught by terminal calls into `collector`.
    pub fn with_error_collector(&self, collector: &ErrorCollector) -> Self {
        Self {
            errors: Some(collector.clone()),
            ..self.clone()
        }
    }

    fn with_current(&self, f: impl FnOnce(&ArgumentSetterBuilder) -> ArgumentSetterBuilder) -> Self {
        let current = match &self.current {
            Some(builder) => f(builder),
            None => f(&ArgumentSetterBuilder::new()),
        };
        Self {
            current: Some(current),
            ..self.clone()
        }
    }

    /// Bind the next `$n` placeholder.
    pub fn add_param(&self, value: impl Into<SqlParam>) -> Self {
        self.with_current(|b| b.add(value))
    }

    /// Bind a JSON document given as text.
    pub fn add_pg_json_param(&self, json: &str) -> Self {
        self.with_current(|b| b.add_pg_json(json))
    }

    pub fn add_pg_json_param_opt(&self, json: Option<&str>) -> Self {
        self.with_current(|b| b.add_pg_json_opt(json))
    }

    /// Bind any driver-supported value declared with an explicit type.
    pub fn add_typed_param<V>(&self, value: V, ty: Type) -> Self
    where
        V: ToSql + Send + Sync + 'static,
    {
        self.with_current(|b| b.add_typed(value, ty))
    }

    pub fn add_null_param(&self, ty: Type) -> Self {
        self.with_current(|b| b.add_null(ty))
    }

    /// Close the parameters added so far into one set and start the next.
    pub fn next_param_set(&self) -> Self {
        let mut next = self.clone();
        if let Some(current) = next.current.take() {
            next.setters.push(current.build());
        }
        next
    }

    /// Explicit setters followed by the pending `add_param*` set.
    fn finalized_setters(&self) -> Vec<ArgumentSetter> {
        let mut setters = self.setters.clone();
        if let Some(current) = &self.current {
            setters.push(current.build());
        }
        setters
    }

    fn copy_out_caught_errors(&self, exec: SqlExecutor<T>) {
        if let Some(collector) = &self.errors {
            collector.extend(exec.into_caught_errors());
        }
    }
}

impl<T, C: Connection> RequestBuilder<'_, T, C> {
    /// Run the request with at most one parameter set.
    ///
    /// `None` covers "no result" as well as any failure.
    pub async fn execute(&self) -> Option<T> {
        let mut exec = SqlExecutor::with_span(self.span.clone());
        let value = self.execute_single(&mut exec).await;
        self.copy_out_caught_errors(exec);
        value
    }

    /// Run the request once per parameter set, in order.
    ///
    /// One failing set does not stop the others; see [`SqlExecutor`] for how
    /// failures and partial results are combined.
    pub async fn execute_multiple(&self) -> Vec<Option<T>> {
        let mut exec = SqlExecutor::with_span(self.span.clone());
        let values = self.execute_all(&mut exec).await;
        self.copy_out_caught_errors(exec);
        values
    }

    async fn execute_single(&self, exec: &mut SqlExecutor<T>) -> Option<T> {
        let setters = self.finalized_setters();
        let sql = match self.sql_or_error() {
            Ok(sql) => sql,
            Err(e) => {
                exec.handle_error(e);
                return None;
            }
        };
        if setters.len() > 1 {
            exec.handle_error(FluentError::configuration(format!(
                "{} parameter sets given to execute(), use execute_multiple(): sql={sql}",
                setters.len()
            )));
            return None;
        }

        let setter = setters.first();
        let reader = self.reader.as_ref();
        if let Some(provider) = self.provider {
            return exec.execute(provider, sql, setter, reader).await;
        }
        match self.connection {
            Some(conn) => exec
                .execute_on(conn, sql, setter, reader)
                .await
                .unwrap_or_else(|e| {
                    exec.handle_error(e);
                    None
                }),
            None => {
                exec.handle_error(no_connection(sql));
                None
            }
        }
    }

    async fn execute_all(&self, exec: &mut SqlExecutor<T>) -> Vec<Option<T>> {
        let setters = self.finalized_setters();
        let sql = match self.sql_or_error() {
            Ok(sql) => sql,
            Err(e) => {
                exec.handle_error(e);
                return Vec::new();
            }
        };

        let reader = self.reader.as_ref();
        if let Some(provider) = self.provider {
            return exec.execute_multiple(provider, sql, reader, &setters).await;
        }
        match self.connection {
            Some(conn) => exec
                .execute_multiple_on(conn, sql, reader, &setters)
                .await
                .unwrap_or_else(|e| {
                    exec.handle_error(e);
                    Vec::new()
                }),
            None => {
                exec.handle_error(no_connection(sql));
                Vec::new()
            }
        }
    }

    fn sql_or_error(&self) -> FluentResult<&str> {
        self.sql
            .as_deref()
            .ok_or_else(|| FluentError::configuration("no SQL given to the request"))
    }
}

fn no_connection(sql: &str) -> FluentError {
    FluentError::configuration(format!("no connection provided for request: sql={sql}"))
}

impl<'a, C> RequestBuilder<'a, (), C> {
    /// Builder for statements whose result is not read (insert, update, delete).
    pub fn returning_void() -> Self {
        Self::returning()
    }
}

impl<'a, C> RequestBuilder<'a, i64, C> {
    /// Reads the first column of the first row as `i64`, e.g. a count.
    pub fn returning_long() -> Self {
        Self::returning().with_reader(ResultReader::<i64>::first_column())
    }
}

impl<'a, C> RequestBuilder<'a, i32, C> {
    pub fn returning_int() -> Self {
        Self::returning().with_reader(ResultReader::<i32>::first_column())
    }
}

impl<'a, C> RequestBuilder<'a, String, C> {
    pub fn returning_string() -> Self {
        Self::returning().with_reader(ResultReader::<String>::first_column())
    }
}

impl<'a, U, C> RequestBuilder<'a, Vec<U>, C> {
    /// Builder returning a list; the reader builds it from the result set.
    pub fn returning_list_of() -> Self {
        Self::returning()
    }
}

impl<'a, U, C> RequestBuilder<'a, HashSet<U>, C> {
    pub fn returning_set_of() -> Self {
        Self::returning()
    }
}

#[cfg(test)]
mod tests;
