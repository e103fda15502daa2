use std::fmt;

use thiserror::Error;

use crate::ast::BoxError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Constructs that compile fine upstream but cannot be resolved without an
/// execution context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Unsupported {
    #[error("SQL expression defaults are not supported (column `{column}`)")]
    ClauseDefault { column: String },
    #[error("insert sentinels are not supported (column `{column}`)")]
    InsertSentinel { column: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Unsupported(#[from] Unsupported),

    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },

    #[error("UPDATE on `{0}` has nothing to set")]
    EmptyUpdate(String),

    #[error("placeholder `:{0}` has no bound parameter")]
    UnboundPlaceholder(String),

    /// A default generator failed. Passed through untouched.
    #[error(transparent)]
    DefaultGenerator(BoxError),

    #[error("failed to encode parameter `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Driver(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),
}

impl Error {
    /// Classify a driver error by its SQLSTATE class.
    ///
    /// Errors raised before reaching the server are `Unknown`, except pool
    /// and connection failures which are `Connection`.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Driver(err) => match err.code() {
                Some(state) => categorize_sqlstate(state.code()),
                None if err.is_closed() => ErrorCategory::Connection,
                None => ErrorCategory::Unknown,
            },
            Error::Pool(_) => ErrorCategory::Connection,
            _ => ErrorCategory::Unknown,
        }
    }

    /// The SQLSTATE reported by the server, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Driver(err) => err.code().map(|state| state.code()),
            _ => None,
        }
    }
}

/// Categorized error types for SQL query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Syntax errors (SQLSTATE class 42 - syntax_error, etc.)
    Syntax,
    /// Semantic errors (missing table/column, ambiguous reference)
    Semantic,
    /// Execution/runtime errors (division by zero, constraint violation)
    Execution,
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Syntax => write!(f, "Syntax Error"),
            ErrorCategory::Semantic => write!(f, "Semantic Error"),
            ErrorCategory::Execution => write!(f, "Execution Error"),
            ErrorCategory::Transaction => write!(f, "Transaction Error"),
            ErrorCategory::Connection => write!(f, "Connection Error"),
            ErrorCategory::Unknown => write!(f, "Error"),
        }
    }
}

pub(crate) fn categorize_sqlstate(code: &str) -> ErrorCategory {
    let Some(class) = code.get(..2) else {
        return ErrorCategory::Unknown;
    };
    match class {
        // 42601 = syntax_error; the rest of class 42 is undefined objects,
        // privileges and the like.
        "42" if code == "42601" || code == "42000" => ErrorCategory::Syntax,
        "42" => ErrorCategory::Semantic,
        "22" | "23" | "53" | "54" | "55" | "57" => ErrorCategory::Execution,
        "25" | "40" => ErrorCategory::Transaction,
        "08" => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}
