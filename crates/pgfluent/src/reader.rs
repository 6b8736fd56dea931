//! Result readers: turn one result set into a typed value.

use crate::error::FluentResult;
use crate::result_set::ResultSet;
use crate::value::FromSqlValue;
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

type ReadFn<T> = dyn Fn(&mut ResultSet) -> FluentResult<Option<T>> + Send + Sync;
type ReadWithConnectionFn<T, C> =
    dyn for<'c> Fn(ResultSet, &'c C) -> BoxFuture<'c, FluentResult<Option<T>>> + Send + Sync;

/// Maps a result set to a value. `Ok(None)` means "no result".
pub struct ResultReader<T> {
    read: Arc<ReadFn<T>>,
}

impl<T> ResultReader<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut ResultSet) -> FluentResult<Option<T>> + Send + Sync + 'static,
    {
        Self { read: Arc::new(f) }
    }

    pub fn read(&self, rs: &mut ResultSet) -> FluentResult<Option<T>> {
        (self.read)(rs)
    }
}

impl<T: FromSqlValue + 'static> ResultReader<T> {
    /// Reads the first column of the first row; `None` when there is no row.
    pub fn first_column() -> Self {
        Self::new(|rs| rs.next_row().map(|row| row.get::<T>(0)).transpose())
    }
}

impl<T> Clone for ResultReader<T> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
        }
    }
}

/// Maps a result set to a value while borrowing the live connection, so the
/// reader can run follow-up queries on it.
///
/// ```ignore
/// let reader = ConnectionReader::new(|mut rs: ResultSet, conn: &PgConnection| {
///     Box::pin(async move {
///         let Some(row) = rs.next_row() else { return Ok(None) };
///         let id: i64 = row.get(0)?;
///         Ok(RequestBuilder::returning_string()
///             .with_connection(conn)
///             .with_sql("SELECT name FROM users WHERE id = $1")
///             .add_param(id)
///             .execute()
///             .await)
///     })
/// });
/// ```
pub struct ConnectionReader<T, C> {
    read: Arc<ReadWithConnectionFn<T, C>>,
}

impl<T, C> ConnectionReader<T, C> {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'c> Fn(ResultSet, &'c C) -> BoxFuture<'c, FluentResult<Option<T>>>
            + Send
            + Sync
            + 'static,
    {
        Self { read: Arc::new(f) }
    }

    pub fn read<'c>(&self, rs: ResultSet, conn: &'c C) -> BoxFuture<'c, FluentResult<Option<T>>> {
        (self.read)(rs, conn)
    }
}

impl<T, C> Clone for ConnectionReader<T, C> {
    fn clone(&self) -> Self {
        Self {
            read: Arc::clone(&self.read),
        }
    }
}

/// Either kind of reader.
pub enum Reader<T, C> {
    Plain(ResultReader<T>),
    ReusingConnection(ConnectionReader<T, C>),
}

impl<T, C> Reader<T, C> {
    /// Apply the reader to a result set produced on `conn`.
    pub async fn read(&self, mut rs: ResultSet, conn: &C) -> FluentResult<Option<T>> {
        match self {
            Self::Plain(reader) => reader.read(&mut rs),
            Self::ReusingConnection(reader) => reader.read(rs, conn).await,
        }
    }

    pub fn reuses_connection(&self) -> bool {
        matches!(self, Self::ReusingConnection(_))
    }
}

impl<T, C> Clone for Reader<T, C> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(r) => Self::Plain(r.clone()),
            Self::ReusingConnection(r) => Self::ReusingConnection(r.clone()),
        }
    }
}

impl<T, C> From<ResultReader<T>> for Reader<T, C> {
    fn from(reader: ResultReader<T>) -> Self {
        Self::Plain(reader)
    }
}

impl<T, C> From<ConnectionReader<T, C>> for Reader<T, C> {
    fn from(reader: ConnectionReader<T, C>) -> Self {
        Self::ReusingConnection(reader)
    }
}

impl<T, C> fmt::Debug for Reader<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Reader::Plain"),
            Self::ReusingConnection(_) => f.write_str("Reader::ReusingConnection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SqlValue;

    fn counts() -> ResultSet {
        ResultSet::new(["count"])
            .with_row(vec![SqlValue::Long(20)])
            .unwrap()
    }

    #[test]
    fn first_column_reads_first_row() {
        let reader = ResultReader::<i64>::first_column();
        assert_eq!(reader.read(&mut counts()).unwrap(), Some(20));
        assert_eq!(reader.read(&mut ResultSet::new(["count"])).unwrap(), None);
    }

    #[test]
    fn first_column_reports_type_mismatch() {
        let reader = ResultReader::<String>::first_column();
        assert!(reader.read(&mut counts()).is_err());
    }

    #[tokio::test]
    async fn connection_reader_sees_the_connection() {
        let reader: Reader<String, String> =
            ConnectionReader::new(|rs: ResultSet, conn: &String| {
                let rows = rs.len();
                let conn = conn.clone();
                Box::pin(async move { Ok(Some(format!("{conn}:{rows}"))) })
                    as BoxFuture<'_, FluentResult<Option<String>>>
            })
            .into();

        assert!(reader.reuses_connection());
        let out = reader.read(counts(), &"db".to_string()).await.unwrap();
        assert_eq!(out.as_deref(), Some("db:1"));
    }
}
