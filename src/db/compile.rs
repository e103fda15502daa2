//! Query compilation for the driver.
//!
//! `compile_query` turns a structured query into the SQL text and positional
//! parameter list tokio-postgres expects:
//!
//! 1. the statement compiler renders `:key` placeholders and their binds,
//! 2. column defaults left unset by the statement are materialized,
//! 3. every value goes through the dialect's encoder for its type,
//! 4. placeholders are rewritten into the dialect's style while the
//!    parameter list is assembled in the same pass.
use std::borrow::Cow;
use std::collections::HashMap;

use tokio_postgres::types::ToSql;
use tracing::debug;

use crate::ast::{
    self, Column, ColumnDefault, CompiledStatement, DdlStatement, DeleteQuery, InsertQuery,
    Query, SelectQuery, SqlType, UpdateQuery, Value,
};
use crate::dialect::{Dialect, ParamStyle};
use crate::error::{Error, Result, Unsupported};
use crate::QUERY_LOG_TARGET;

/// SQL text plus the parameters bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledQuery {
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Parameters in the shape the driver's query methods take.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

/// Anything `compile_query` accepts: raw SQL text or a query tree.
#[derive(Debug, Clone)]
pub enum QueryInput<'a> {
    Raw(Cow<'a, str>),
    Query(Cow<'a, Query>),
}

impl<'a> From<&'a str> for QueryInput<'a> {
    fn from(sql: &'a str) -> Self {
        QueryInput::Raw(Cow::Borrowed(sql))
    }
}

impl<'a> From<&'a String> for QueryInput<'a> {
    fn from(sql: &'a String) -> Self {
        QueryInput::Raw(Cow::Borrowed(sql.as_str()))
    }
}

impl From<String> for QueryInput<'static> {
    fn from(sql: String) -> Self {
        QueryInput::Raw(Cow::Owned(sql))
    }
}

impl<'a> From<&'a Query> for QueryInput<'a> {
    fn from(query: &'a Query) -> Self {
        QueryInput::Query(Cow::Borrowed(query))
    }
}

macro_rules! impl_owned_input {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for QueryInput<'static> {
                fn from(query: $ty) -> Self {
                    QueryInput::Query(Cow::Owned(Query::from(query)))
                }
            }
        )*
    };
}

impl_owned_input!(Query, SelectQuery, InsertQuery, UpdateQuery, DeleteQuery, DdlStatement);

/// A bind after default resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Value(Value),
    /// SQL rendered in place of the placeholder, e.g. `nextval('seq')`.
    Inline(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBind {
    pub key: String,
    pub value: BoundValue,
    pub sql_type: Option<SqlType>,
}

/// Compile `query` into driver-ready SQL and parameters.
///
/// Raw text is returned unchanged with no parameters. DDL is returned with
/// no parameters and without touching column defaults.
pub fn compile_query<'a>(query: impl Into<QueryInput<'a>>, dialect: &Dialect) -> Result<CompiledQuery> {
    let query = match query.into() {
        QueryInput::Raw(sql) => return Ok(raw(sql.into_owned())),
        QueryInput::Query(query) => query,
    };
    if let Query::Raw(sql) = query.as_ref() {
        return Ok(raw(sql.clone()));
    }

    let compiled = ast::compile(&query, dialect)?;
    debug!(target: QUERY_LOG_TARGET, "{}", compiled.sql);

    if compiled.is_ddl {
        return Ok(CompiledQuery {
            sql: compiled.sql,
            params: Vec::new(),
        });
    }

    let binds = execute_defaults(&compiled)?;
    let binds = encode_binds(binds, dialect)?;
    let (sql, params) = rewrite_placeholders(&compiled.sql, &binds, dialect)?;
    debug!(
        target: QUERY_LOG_TARGET,
        params = params.len(),
        "rewritten: {}",
        sql
    );

    Ok(CompiledQuery { sql, params })
}

/// Like [`compile_query`], keeping only the SQL text.
pub fn compile_inline<'a>(query: impl Into<QueryInput<'a>>, dialect: &Dialect) -> Result<String> {
    compile_query(query, dialect).map(|compiled| compiled.sql)
}

fn raw(sql: String) -> CompiledQuery {
    debug!(target: QUERY_LOG_TARGET, "{}", sql);
    CompiledQuery {
        sql,
        params: Vec::new(),
    }
}

/// Resolve the statement's prefetch columns on a copy of its binds.
///
/// The result keeps bind order; prefetch slots are filled from the column's
/// default (INSERT) or on-update default (UPDATE).
pub fn execute_defaults(compiled: &CompiledStatement) -> Result<Vec<ResolvedBind>> {
    if compiled.multi_row {
        if let Some(first) = compiled.insert_prefetch.first() {
            return Err(Unsupported::InsertSentinel {
                column: first.column.name.clone(),
            }
            .into());
        }
    }

    let mut resolved: HashMap<&str, BoundValue> = HashMap::new();
    for prefetch in &compiled.insert_prefetch {
        if prefetch.column.insert_sentinel {
            return Err(Unsupported::InsertSentinel {
                column: prefetch.column.name.clone(),
            }
            .into());
        }
        let value = exec_default(prefetch.column.default.as_ref(), &prefetch.column)?;
        resolved.insert(prefetch.key.as_str(), value);
    }
    for prefetch in &compiled.update_prefetch {
        let value = exec_default(prefetch.column.onupdate.as_ref(), &prefetch.column)?;
        resolved.insert(prefetch.key.as_str(), value);
    }

    compiled
        .binds
        .iter()
        .map(|bind| {
            let value = match (&bind.value, resolved.remove(bind.key.as_str())) {
                (_, Some(value)) => value,
                (Some(value), None) => BoundValue::Value(value.clone()),
                (None, None) => return Err(Error::UnboundPlaceholder(bind.key.clone())),
            };
            Ok(ResolvedBind {
                key: bind.key.clone(),
                value,
                sql_type: bind.sql_type.clone(),
            })
        })
        .collect()
}

/// Materialize one default.
///
/// Generators run without an execution context. SQL expression defaults are
/// rejected rather than silently dropped.
pub fn exec_default(default: Option<&ColumnDefault>, column: &Column) -> Result<BoundValue> {
    match default {
        None => Ok(BoundValue::Value(Value::Null)),
        Some(ColumnDefault::Value(value)) => Ok(BoundValue::Value(value.clone())),
        Some(ColumnDefault::Callable(generate)) => {
            generate().map(BoundValue::Value).map_err(Error::DefaultGenerator)
        }
        Some(ColumnDefault::Sequence(sequence)) => Ok(BoundValue::Inline(sequence.nextval_sql())),
        Some(ColumnDefault::Clause(_)) => Err(Unsupported::ClauseDefault {
            column: column.name.clone(),
        }
        .into()),
    }
}

fn encode_binds(binds: Vec<ResolvedBind>, dialect: &Dialect) -> Result<Vec<ResolvedBind>> {
    binds
        .into_iter()
        .map(|mut bind| {
            if let (BoundValue::Value(value), Some(sql_type)) = (&mut bind.value, &bind.sql_type) {
                let taken = std::mem::replace(value, Value::Null);
                *value = dialect
                    .process_value(sql_type, taken)
                    .map_err(|source| Error::Encode {
                        key: bind.key.clone(),
                        source,
                    })?;
            }
            Ok(bind)
        })
        .collect()
}

/// Rewrite `:key` placeholders into the dialect's style.
///
/// Quoted strings, quoted identifiers and `::` casts are left alone.
/// Parameters are collected in placeholder order, so the two never drift.
fn rewrite_placeholders(
    sql: &str,
    binds: &[ResolvedBind],
    dialect: &Dialect,
) -> Result<(String, Vec<Value>)> {
    let by_key: HashMap<&str, &ResolvedBind> = binds.iter().map(|b| (b.key.as_str(), b)).collect();
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + binds.len() * 4);
    let mut params = Vec::with_capacity(binds.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"') => {
                i = skip_quoted(bytes, i, q);
            }
            b':' if bytes.get(i + 1) == Some(&b':') => {
                i += 2;
            }
            b':' if bytes
                .get(i + 1)
                .map_or(false, |b| b.is_ascii_alphabetic() || *b == b'_') =>
            {
                push_text(&mut out, &sql[copied..i], dialect);
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let key = &sql[start..end];
                let bind = by_key
                    .get(key)
                    .ok_or_else(|| Error::UnboundPlaceholder(key.to_string()))?;

                match &bind.value {
                    BoundValue::Inline(expr) => out.push_str(expr),
                    BoundValue::Value(value) => {
                        let position = if dialect.paramstyle.reuses_positions() {
                            *positions.entry(key).or_insert_with(|| {
                                params.push(value.clone());
                                params.len()
                            })
                        } else {
                            params.push(value.clone());
                            params.len()
                        };
                        out.push_str(&dialect.placeholder(position, key));
                        if dialect.render_bind_casts {
                            if let Some(sql_type) = &bind.sql_type {
                                out.push_str("::");
                                out.push_str(&sql_type.cast_name());
                            }
                        }
                    }
                }
                i = end;
                copied = end;
            }
            _ => i += 1,
        }
    }
    push_text(&mut out, &sql[copied..], dialect);

    Ok((out, params))
}

/// Index just past the quoted run starting at `start`. Doubled quotes are
/// escapes; an unterminated run extends to the end.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        if bytes[j] == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn push_text(out: &mut String, text: &str, dialect: &Dialect) {
    if dialect.paramstyle == ParamStyle::Format {
        out.push_str(&text.replace('%', "%%"));
    } else {
        out.push_str(text);
    }
}
