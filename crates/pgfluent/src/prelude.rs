//! Convenient imports for typical `pgfluent` usage.
//!
//! ```ignore
//! use pgfluent::prelude::*;
//! ```

pub use crate::{
    ArgumentSetter, ArgumentSetterBuilder, ConnectionProvider, ErrorCollector, FluentError,
    FluentResult, FromRow, PostgresConnectionProvider, RequestBuilder, ResultSet, Row,
};
pub use tokio_postgres::types::Type;
