use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use tokio_postgres::types::{FromSqlOwned, ToSql};
use tokio_postgres::{Client, GenericClient, Row, RowStream, Transaction};
use tracing::{debug, trace, warn};

use super::compile::{compile_query, CompiledQuery, QueryInput};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::QUERY_LOG_TARGET;

/// A driver handle that can run queries: a client, a transaction or a pooled
/// connection.
pub trait DriverClient {
    type Client: GenericClient + Sync;

    fn as_client(&self) -> &Self::Client;
    fn as_client_mut(&mut self) -> &mut Self::Client;
}

impl DriverClient for Client {
    type Client = Client;

    fn as_client(&self) -> &Client {
        self
    }

    fn as_client_mut(&mut self) -> &mut Client {
        self
    }
}

impl<'a> DriverClient for Transaction<'a> {
    type Client = Transaction<'a>;

    fn as_client(&self) -> &Transaction<'a> {
        self
    }

    fn as_client_mut(&mut self) -> &mut Transaction<'a> {
        self
    }
}

impl DriverClient for deadpool_postgres::Object {
    type Client = Client;

    fn as_client(&self) -> &Client {
        self
    }

    fn as_client_mut(&mut self) -> &mut Client {
        self
    }
}

/// A driver connection whose query entry points accept structured queries.
///
/// Every query goes through [`compile_query`] with the connection's dialect
/// before it reaches the driver. When compilation binds parameters they
/// replace the caller's arguments. Anything not wrapped here is reachable
/// through `Deref` to the underlying client.
pub struct SaConnection<C> {
    inner: C,
    dialect: Arc<Dialect>,
}

impl<C: DriverClient> SaConnection<C> {
    pub fn new(inner: C, dialect: Arc<Dialect>) -> Self {
        Self { inner, dialect }
    }

    pub fn dialect(&self) -> &Arc<Dialect> {
        &self.dialect
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Run a statement and return the number of rows affected.
    pub async fn execute<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let start = Instant::now();
        let affected = self
            .inner
            .as_client()
            .execute(compiled.sql.as_str(), &params)
            .await?;
        trace!(target: QUERY_LOG_TARGET, elapsed = ?start.elapsed(), affected, "execute");
        Ok(affected)
    }

    /// Run a query and collect every row.
    pub async fn fetch<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let start = Instant::now();
        let rows = self
            .inner
            .as_client()
            .query(compiled.sql.as_str(), &params)
            .await?;
        trace!(target: QUERY_LOG_TARGET, elapsed = ?start.elapsed(), rows = rows.len(), "fetch");
        Ok(rows)
    }

    /// Run a query that must return exactly one row.
    pub async fn fetch_one<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<Row> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let row = self
            .inner
            .as_client()
            .query_one(compiled.sql.as_str(), &params)
            .await?;
        Ok(row)
    }

    /// Run a query that returns at most one row.
    pub async fn fetch_optional<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let row = self
            .inner
            .as_client()
            .query_opt(compiled.sql.as_str(), &params)
            .await?;
        Ok(row)
    }

    /// First column of the single row returned by the query.
    pub async fn fetch_value<'a, T: FromSqlOwned>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<T> {
        let row = self.fetch_one(query, args).await?;
        Ok(row.try_get(0)?)
    }

    /// Open a row stream over the query's results.
    pub async fn cursor<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<RowStream> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let stream = self
            .inner
            .as_client()
            .query_raw(compiled.sql.as_str(), params)
            .await?;
        Ok(stream)
    }

    /// Run a script. Without parameters it may hold several statements and
    /// goes over the simple query protocol.
    pub async fn execute_script<'a>(
        &self,
        query: impl Into<QueryInput<'a>>,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<()> {
        let compiled = compile_query(query, &self.dialect)?;
        let params = substitute_args(&compiled, args);
        let client = self.inner.as_client();
        if params.is_empty() {
            client.batch_execute(&compiled.sql).await?;
        } else {
            client.execute(compiled.sql.as_str(), &params).await?;
        }
        Ok(())
    }

    /// Start a transaction sharing this connection's dialect.
    pub async fn transaction(&mut self) -> Result<SaConnection<Transaction<'_>>> {
        let tx = self.inner.as_client_mut().transaction().await?;
        debug!(target: QUERY_LOG_TARGET, "BEGIN");
        Ok(SaConnection::new(tx, Arc::clone(&self.dialect)))
    }
}

impl<'a> SaConnection<Transaction<'a>> {
    pub async fn commit(self) -> Result<()> {
        debug!(target: QUERY_LOG_TARGET, "COMMIT");
        self.inner.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        debug!(target: QUERY_LOG_TARGET, "ROLLBACK");
        self.inner.rollback().await?;
        Ok(())
    }
}

impl<C> Deref for SaConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.inner
    }
}

impl<C> DerefMut for SaConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

/// Pick the parameters sent with `compiled`: its own binds when it has any,
/// the caller's arguments otherwise.
fn substitute_args<'a>(
    compiled: &'a CompiledQuery,
    args: &[&'a (dyn ToSql + Sync)],
) -> Vec<&'a (dyn ToSql + Sync)> {
    if compiled.params.is_empty() {
        trace!(target: QUERY_LOG_TARGET, args = args.len(), "using caller arguments");
        return args.to_vec();
    }
    if !args.is_empty() {
        warn!(
            target: QUERY_LOG_TARGET,
            discarded = args.len(),
            "caller arguments replaced by compiled parameters"
        );
    }
    debug!(target: QUERY_LOG_TARGET, params = ?compiled.params, "bound parameters");
    compiled.params_ref()
}
