//! Run structured SQL queries, column defaults included, on tokio-postgres.
//!
//! ```no_run
//! use std::sync::Arc;
//! use pgbind::ast::{Column, SqlType, Table};
//! use pgbind::{connect, ConnectionConfig, Dialect};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let users = Table::new(
//!     "users",
//!     vec![
//!         Column::new("id", SqlType::Uuid).primary_key().default_fn(|| Ok(uuid::Uuid::new_v4().into())),
//!         Column::new("name", SqlType::Varchar(None)).default_value("default"),
//!     ],
//! );
//! let conn = connect(&ConnectionConfig::default(), Arc::new(Dialect::default())).await?;
//! conn.execute(users.insert(), &[]).await?;
//! # Ok(())
//! # }
//! ```
pub mod ast;
pub mod config;
pub mod db;
pub mod dialect;
pub mod error;

pub use config::{PoolSettings, Settings};
pub use db::{
    compile_inline, compile_query, connect, CompiledQuery, ConnectionConfig, DriverClient,
    QueryInput, SaConnection, SaPool, SslMode,
};
pub use dialect::{BindProcessor, Dialect, DialectConfig, ParamStyle};
pub use error::{Error, ErrorCategory, Result, Unsupported};

/// Tracing target for every compiled statement.
pub const QUERY_LOG_TARGET: &str = "pgbind::query";
