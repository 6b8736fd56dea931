//! Result sets handed to result readers.
//!
//! A [`ResultSet`] is fully materialized before the reader sees it, which keeps
//! readers synchronous and independent of the driver's row type.

use crate::error::{FluentError, FluentResult};
use crate::value::{FromSqlValue, SqlValue};
use std::sync::Arc;

/// One row of a [`ResultSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Raw cell at a 0-based column index.
    pub fn value(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Typed cell at a 0-based column index.
    pub fn get<V: FromSqlValue>(&self, index: usize) -> FluentResult<V> {
        let column = self
            .columns
            .get(index)
            .map(String::as_str)
            .unwrap_or("?");
        let value = self.values.get(index).ok_or_else(|| {
            FluentError::decode(
                format!("#{index}"),
                format!("column index out of range (row has {})", self.values.len()),
            )
        })?;
        convert(column, value)
    }

    /// Typed cell by column name (first match wins).
    pub fn get_named<V: FromSqlValue>(&self, name: &str) -> FluentResult<V> {
        let index = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FluentError::decode(name, "no such column"))?;
        convert(name, &self.values[index])
    }
}

fn convert<V: FromSqlValue>(column: &str, value: &SqlValue) -> FluentResult<V> {
    V::from_sql_value(value).ok_or_else(|| {
        FluentError::decode(
            column,
            format!("expected {}, found {}", V::TYPE_NAME, value.kind()),
        )
    })
}

/// Trait for converting a result row into a Rust value.
///
/// # Example
///
/// ```ignore
/// use pgfluent::{FluentResult, FromRow, Row};
///
/// struct User {
///     id: i64,
///     name: Option<String>,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> FluentResult<Self> {
///         Ok(Self {
///             id: row.get_named("id")?,
///             name: row.get_named("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a result row into Self
    fn from_row(row: &Row) -> FluentResult<Self>;
}

/// Tabular response of a statement, with a forward-only cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Row>,
    cursor: Option<usize>,
}

impl ResultSet {
    /// Create an empty result set with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            cursor: None,
        }
    }

    /// Append a row; its width must match the column count.
    pub fn push_row(&mut self, values: Vec<SqlValue>) -> FluentResult<()> {
        if values.len() != self.columns.len() {
            return Err(FluentError::Other(format!(
                "row has {} values but the result set has {} columns",
                values.len(),
                self.columns.len()
            )));
        }
        self.rows.push(Row {
            columns: Arc::clone(&self.columns),
            values,
        });
        Ok(())
    }

    /// Builder-style [`ResultSet::push_row`].
    pub fn with_row(mut self, values: Vec<SqlValue>) -> FluentResult<Self> {
        self.push_row(values)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Advance the cursor and return the row it now points at.
    ///
    /// The cursor starts before the first row; `None` means the rows are
    /// exhausted.
    pub fn next_row(&mut self) -> Option<&Row> {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next > self.rows.len() {
            return None;
        }
        self.cursor = Some(next);
        self.rows.get(next)
    }

    /// Row under the cursor, if [`ResultSet::next_row`] has landed on one.
    pub fn current_row(&self) -> Option<&Row> {
        self.cursor.and_then(|c| self.rows.get(c))
    }

    /// Map every row through [`FromRow`], ignoring the cursor.
    pub fn map_rows<U: FromRow>(&self) -> FluentResult<Vec<U>> {
        self.rows.iter().map(U::from_row).collect()
    }
}
