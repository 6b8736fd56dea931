//! Runs one SQL statement against one or more parameter sets.
//!
//! The statement is prepared once per call. Parameter sets run strictly in
//! order on the same connection. When several sets are given, one failure is
//! tolerated and deferred so the remaining sets still run; a second failure
//! stops the loop. Results gathered before a failure are never dropped.

use crate::LOG_TARGET;
use crate::arguments::ArgumentSetter;
use crate::client::{Connection, Execution};
use crate::error::{FluentError, FluentResult};
use crate::provider::DynConnectionProvider;
use crate::reader::Reader;
use std::marker::PhantomData;
use tracing::{Instrument, Span};

/// Outcome of a single run that did not fail.
enum Step<T> {
    /// The statement produced a result set; holds what the reader made of it.
    Value(Option<T>),
    Updated,
}

/// Executes statements and keeps every error it handled or deferred.
pub struct SqlExecutor<T> {
    caught_errors: Vec<FluentError>,
    span: Span,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for SqlExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SqlExecutor<T> {
    /// Executor whose events belong to the current span.
    pub fn new() -> Self {
        Self::with_span(Span::current())
    }

    pub fn with_span(span: Span) -> Self {
        Self {
            caught_errors: Vec::new(),
            span,
            _marker: PhantomData,
        }
    }

    /// Errors handled or deferred so far, in the order they were recorded.
    ///
    /// When partial results are returned, the deferred failure comes before
    /// the one that stopped the loop. An error returned from a `*_on` call is
    /// not recorded here; it goes to the caller instead.
    pub fn caught_errors(&self) -> &[FluentError] {
        &self.caught_errors
    }

    pub fn into_caught_errors(self) -> Vec<FluentError> {
        self.caught_errors
    }

    /// Open a connection from `provider` and run `sql` once.
    ///
    /// Never fails: errors are logged, recorded and turned into `None`.
    pub async fn execute<C: Connection>(
        &mut self,
        provider: &dyn DynConnectionProvider<C>,
        sql: &str,
        setter: Option<&ArgumentSetter>,
        reader: Option<&Reader<T, C>>,
    ) -> Option<T> {
        let setters: Vec<ArgumentSetter> = setter.cloned().into_iter().collect();
        let span = self.span.clone();
        match self
            .with_provider(provider, sql, reader, &setters)
            .instrument(span)
            .await
        {
            Ok(mut values) => values.pop().flatten(),
            Err(e) => {
                self.handle_error(e);
                None
            }
        }
    }

    /// Run `sql` once on a connection the caller owns.
    pub async fn execute_on<C: Connection>(
        &mut self,
        conn: &C,
        sql: &str,
        setter: Option<&ArgumentSetter>,
        reader: Option<&Reader<T, C>>,
    ) -> FluentResult<Option<T>> {
        let setters: Vec<ArgumentSetter> = setter.cloned().into_iter().collect();
        let span = self.span.clone();
        let mut values = self
            .execute_impl(conn, sql, reader, &setters)
            .instrument(span)
            .await?;
        Ok(values.pop().flatten())
    }

    /// Open a connection from `provider` and run `sql` once per setter.
    ///
    /// Returns the partial results when some executions failed, or an empty
    /// list when nothing could be produced.
    pub async fn execute_multiple<C: Connection>(
        &mut self,
        provider: &dyn DynConnectionProvider<C>,
        sql: &str,
        reader: Option<&Reader<T, C>>,
        setters: &[ArgumentSetter],
    ) -> Vec<Option<T>> {
        let span = self.span.clone();
        match self
            .with_provider(provider, sql, reader, setters)
            .instrument(span)
            .await
        {
            Ok(values) => values,
            Err(e) => {
                self.handle_error(e);
                Vec::new()
            }
        }
    }

    /// Run `sql` once per setter on a connection the caller owns.
    pub async fn execute_multiple_on<C: Connection>(
        &mut self,
        conn: &C,
        sql: &str,
        reader: Option<&Reader<T, C>>,
        setters: &[ArgumentSetter],
    ) -> FluentResult<Vec<Option<T>>> {
        let span = self.span.clone();
        self.execute_impl(conn, sql, reader, setters)
            .instrument(span)
            .await
    }

    /// Record an error that ends a request.
    pub(crate) fn handle_error(&mut self, e: FluentError) {
        tracing::error!(target: LOG_TARGET, error = %e, "SQL request failed");
        self.caught_errors.push(e);
    }

    async fn with_provider<C: Connection>(
        &mut self,
        provider: &dyn DynConnectionProvider<C>,
        sql: &str,
        reader: Option<&Reader<T, C>>,
        setters: &[ArgumentSetter],
    ) -> FluentResult<Vec<Option<T>>> {
        let conn = provider.connect_boxed().await?;
        self.execute_impl(&conn, sql, reader, setters).await
    }

    async fn execute_impl<C: Connection>(
        &mut self,
        conn: &C,
        sql: &str,
        reader: Option<&Reader<T, C>>,
        setters: &[ArgumentSetter],
    ) -> FluentResult<Vec<Option<T>>> {
        tracing::info!(target: LOG_TARGET, sql, "about to execute SQL request");
        let stmt = conn.prepare(sql).await?;

        let noop = [ArgumentSetter::noop()];
        let setters = if setters.is_empty() { &noop[..] } else { setters };

        let mut results = Vec::new();
        let mut deferred: Option<FluentError> = None;
        let mut stopped_by: Option<FluentError> = None;

        for (counter, setter) in (1_usize..).zip(setters) {
            match execute_once(conn, &stmt, setter, reader).await {
                Ok(Step::Value(value)) => results.push(value),
                Ok(Step::Updated) => {}
                Err(e) if setters.len() == 1 => return Err(e),
                Err(e) if deferred.is_none() => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        counter,
                        error = %e,
                        "execution failed, continuing with the remaining parameter sets"
                    );
                    deferred = Some(e);
                }
                Err(e) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        counter,
                        error = %e,
                        "execution failed again, stopping"
                    );
                    stopped_by = Some(e);
                    break;
                }
            }
        }

        let Some(first) = deferred else {
            return Ok(results);
        };
        if results.is_empty() {
            self.caught_errors.extend(stopped_by);
            return Err(first);
        }
        tracing::warn!(
            target: LOG_TARGET,
            results = results.len(),
            error = %first,
            "returning partial results"
        );
        self.caught_errors.push(first);
        self.caught_errors.extend(stopped_by);
        Ok(results)
    }
}

async fn execute_once<T, C: Connection>(
    conn: &C,
    stmt: &C::Statement,
    setter: &ArgumentSetter,
    reader: Option<&Reader<T, C>>,
) -> FluentResult<Step<T>> {
    let slots = setter.bind()?;
    match conn.run(stmt, &slots).await? {
        Execution::Rows(rs) => {
            let value = match reader {
                Some(reader) => reader.read(rs, conn).await?,
                None => None,
            };
            if value.is_some() {
                tracing::debug!(target: LOG_TARGET, "query returned a result");
            } else {
                tracing::debug!(target: LOG_TARGET, "query returned no result");
            }
            Ok(Step::Value(value))
        }
        Execution::Updated(count) => {
            tracing::debug!(
                target: LOG_TARGET,
                count,
                "statement executed without a result set"
            );
            Ok(Step::Updated)
        }
    }
}
