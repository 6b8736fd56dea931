//! # pgfluent
//!
//! Immutable fluent request builders for PostgreSQL.
//!
//! ## Features
//!
//! - **Immutable builders**: every `with_*` / `add_param` call returns a new builder,
//!   so a configured request can be branched and re-executed
//! - **Positional parameters**: values bound to `$1..$n` in call order, with a
//!   readable log line per parameter set
//! - **Result readers**: map a result set to any type, optionally running
//!   follow-up queries on the same connection
//! - **Multi-execution**: run one prepared statement against many parameter sets,
//!   keeping partial results when some of them fail
//! - **Transaction-friendly**: pass a `Transaction` anywhere a [`Connection`] is expected
//!
//! ## Example
//!
//! ```ignore
//! use pgfluent::{ArgumentSetterBuilder, PostgresConnectionProvider, RequestBuilder};
//!
//! let provider = PostgresConnectionProvider::new("localhost", "shop", "app", "secret");
//!
//! let setters = (1..=3_i64).map(|id| {
//!     ArgumentSetterBuilder::new()
//!         .add(id)
//!         .add(format!("item {id}"))
//!         .build()
//! });
//!
//! RequestBuilder::returning_void()
//!     .with_connection_provider(&provider)
//!     .with_sql("INSERT INTO items (id, name) VALUES ($1, $2)")
//!     .with_argument_setters(setters)
//!     .execute_multiple()
//!     .await;
//!
//! let count = RequestBuilder::returning_long()
//!     .with_connection_provider(&provider)
//!     .with_sql("SELECT count(*) FROM items")
//!     .execute()
//!     .await;
//! ```

pub mod arguments;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod provider;
pub mod reader;
pub mod request;
pub mod result_set;
pub mod value;

#[cfg(test)]
mod test_support;

/// `tracing` target of every event this crate emits.
pub(crate) const LOG_TARGET: &str = "pgfluent::sql";

pub use arguments::{ArgumentSetter, ArgumentSetterBuilder, ParamSlots, SqlParam};
pub use client::{Connection, Execution, PgConnection};
pub use config::ConnectionConfig;
pub use error::{ErrorCollector, FluentError, FluentResult};
pub use executor::SqlExecutor;
pub use provider::{ConnectionProvider, DynConnectionProvider, PostgresConnectionProvider};
pub use reader::{ConnectionReader, Reader, ResultReader};
pub use request::RequestBuilder;
pub use result_set::{FromRow, ResultSet, Row};
pub use value::{FromSqlValue, SqlValue};

// Re-export the driver so callers can name `Type`, `Client` and `Transaction`.
pub use tokio_postgres;
