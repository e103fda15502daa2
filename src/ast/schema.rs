//! Table and column metadata consumed by the statement compiler.
//!
//! A [`Table`] is declared once and shared (`Arc<Table>`) by every query built
//! from it. Columns carry the type used for bind casts and encoders, plus the
//! default specifications that are materialized at compile time.
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use super::types::Expression;
use super::value::Value;

/// Error type returned by default generators.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Zero-argument default generator. Invoked without any execution context.
pub type DefaultFn = Arc<dyn Fn() -> Result<Value, BoxError> + Send + Sync>;

/// Column types known to the compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Boolean,
    Text,
    Varchar(Option<u32>),
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    Jsonb,
    Bytea,
    Array(Box<SqlType>),
    Enum(Arc<EnumType>),
    /// A domain or extension type referenced by name, e.g. `citext`.
    Custom(String),
}

impl SqlType {
    pub fn array_of(inner: SqlType) -> Self {
        SqlType::Array(Box::new(inner))
    }

    /// Type name as written in `CREATE TABLE`.
    pub fn ddl_name(&self) -> String {
        match self {
            SqlType::SmallInt => "SMALLINT".into(),
            SqlType::Integer => "INTEGER".into(),
            SqlType::BigInt => "BIGINT".into(),
            SqlType::Real => "REAL".into(),
            SqlType::Double => "DOUBLE PRECISION".into(),
            SqlType::Boolean => "BOOLEAN".into(),
            SqlType::Text => "TEXT".into(),
            SqlType::Varchar(Some(n)) => format!("VARCHAR({})", n),
            SqlType::Varchar(None) => "VARCHAR".into(),
            SqlType::Uuid => "UUID".into(),
            SqlType::Date => "DATE".into(),
            SqlType::Time => "TIME WITHOUT TIME ZONE".into(),
            SqlType::Timestamp => "TIMESTAMP WITHOUT TIME ZONE".into(),
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE".into(),
            SqlType::Interval => "INTERVAL".into(),
            SqlType::Json => "JSON".into(),
            SqlType::Jsonb => "JSONB".into(),
            SqlType::Bytea => "BYTEA".into(),
            SqlType::Array(inner) => format!("{}[]", inner.ddl_name()),
            SqlType::Enum(e) => e.name.clone(),
            SqlType::Custom(name) => name.clone(),
        }
    }

    /// Type name rendered after a bound placeholder (`$1::VARCHAR`).
    ///
    /// Scalar strings drop their length; arrays keep the full element type.
    pub fn cast_name(&self) -> String {
        match self {
            SqlType::Varchar(_) => "VARCHAR".into(),
            other => other.ddl_name(),
        }
    }

    /// Lowercase name used to look up registered encoders.
    pub fn lookup_name(&self) -> String {
        match self {
            SqlType::SmallInt => "int2".into(),
            SqlType::Integer => "int4".into(),
            SqlType::BigInt => "int8".into(),
            SqlType::Real => "float4".into(),
            SqlType::Double => "float8".into(),
            SqlType::Boolean => "bool".into(),
            SqlType::Text => "text".into(),
            SqlType::Varchar(_) => "varchar".into(),
            SqlType::Uuid => "uuid".into(),
            SqlType::Date => "date".into(),
            SqlType::Time => "time".into(),
            SqlType::Timestamp => "timestamp".into(),
            SqlType::TimestampTz => "timestamptz".into(),
            SqlType::Interval => "interval".into(),
            SqlType::Json => "json".into(),
            SqlType::Jsonb => "jsonb".into(),
            SqlType::Bytea => "bytea".into(),
            SqlType::Array(inner) => format!("_{}", inner.lookup_name()),
            SqlType::Enum(e) => e.name.to_lowercase(),
            SqlType::Custom(name) => name.to_lowercase(),
        }
    }
}

/// A PostgreSQL enum type.
///
/// Members are addressed by `name` in queries and stored under `label` in the
/// database; both are the same unless declared otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumType {
    pub name: String,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub label: String,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, labels: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = labels
            .into_iter()
            .map(|l| {
                let label = l.into();
                EnumMember {
                    name: label.clone(),
                    label,
                }
            })
            .collect();
        Arc::new(Self {
            name: name.into(),
            members,
        })
    }

    /// Declare members as `(name, label)` pairs.
    pub fn with_labels<I, N, L>(name: impl Into<String>, members: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (N, L)>,
        N: Into<String>,
        L: Into<String>,
    {
        let members = members
            .into_iter()
            .map(|(n, l)| EnumMember {
                name: n.into(),
                label: l.into(),
            })
            .collect();
        Arc::new(Self {
            name: name.into(),
            members,
        })
    }

    /// Resolve a member name or a label to the stored label.
    pub fn label_for(&self, name_or_label: &str) -> Option<&str> {
        self.members
            .iter()
            .find(|m| m.name == name_or_label)
            .or_else(|| self.members.iter().find(|m| m.label == name_or_label))
            .map(|m| m.label.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.label.as_str())
    }
}

/// A database sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub schema: Option<String>,
    pub name: String,
    pub start: Option<i64>,
    pub increment: Option<i64>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            start: None,
            increment: None,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn increment(mut self, increment: i64) -> Self {
        self.increment = Some(increment);
        self
    }

    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// The inline expression that draws the next value.
    pub fn nextval_sql(&self) -> String {
        format!("nextval('{}')", self.qualified_name().replace('\'', "''"))
    }
}

/// How a column gets a value when a statement leaves it unset.
#[derive(Clone)]
pub enum ColumnDefault {
    Value(Value),
    Callable(DefaultFn),
    Sequence(Sequence),
    /// A SQL expression. Kept in the model, rejected at compile time.
    Clause(Expression),
}

impl ColumnDefault {
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        ColumnDefault::Callable(Arc::new(f))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, ColumnDefault::Sequence(_))
    }
}

impl fmt::Debug for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            ColumnDefault::Callable(_) => f.write_str("Callable(..)"),
            ColumnDefault::Sequence(s) => f.debug_tuple("Sequence").field(s).finish(),
            ColumnDefault::Clause(e) => f.debug_tuple("Clause").field(e).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub onupdate: Option<ColumnDefault>,
    /// Marks a column used to correlate rows of a multi-row INSERT.
    pub insert_sentinel: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            onupdate: None,
            insert_sentinel: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn insert_sentinel(mut self) -> Self {
        self.insert_sentinel = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn default_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.default = Some(ColumnDefault::callable(f));
        self
    }

    pub fn default_sequence(mut self, sequence: Sequence) -> Self {
        self.default = Some(ColumnDefault::Sequence(sequence));
        self
    }

    pub fn default_clause(mut self, expr: Expression) -> Self {
        self.default = Some(ColumnDefault::Clause(expr));
        self
    }

    pub fn onupdate_value(mut self, value: impl Into<Value>) -> Self {
        self.onupdate = Some(ColumnDefault::Value(value.into()));
        self
    }

    pub fn onupdate_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.onupdate = Some(ColumnDefault::callable(f));
        self
    }

    pub fn onupdate_sequence(mut self, sequence: Sequence) -> Self {
        self.onupdate = Some(ColumnDefault::Sequence(sequence));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Arc<Self> {
        Arc::new(Self {
            schema: None,
            name: name.into(),
            columns,
        })
    }

    pub fn with_schema(
        schema: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<Column>,
    ) -> Arc<Self> {
        Arc::new(Self {
            schema: Some(schema.into()),
            name: name.into(),
            columns,
        })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}
