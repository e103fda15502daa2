//! Structured queries and their compilation.
//!
//! ```text
//! Table / Column metadata   (schema.rs)
//!       ↓
//! Query builders            (builders.rs)
//!       ↓
//! Query tree                (types.rs, value.rs)
//!       ↓
//! SQL compiler              (compiler.rs)  → `:key` placeholders + binds
//!       ↓
//! Adapter                   (db::compile)  → driver placeholders + params
//! ```
pub mod builders;
pub mod compiler;
pub mod schema;
pub mod types;
pub mod value;

pub use builders::{bind, count, count_all, exists, func, literal, select};
pub use compiler::{compile, BindParam, CompiledStatement, Prefetch};
pub use schema::{
    BoxError, Column, ColumnDefault, DefaultFn, EnumMember, EnumType, Sequence, SqlType, Table,
};
pub use types::*;
pub use value::{Interval, Value};
