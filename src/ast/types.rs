//! Query tree types.
//!
//! Everything the statement compiler renders is described here. Trees are
//! plain data: builders in `builders.rs` produce them, `compiler.rs` turns
//! them into SQL text with named placeholders. DML statements hold the
//! `Arc<Table>` they target so column types and defaults stay reachable.
use std::sync::Arc;

use super::schema::{EnumType, Sequence, SqlType, Table};
use super::value::Value;

/// Top-level query representation.
#[derive(Debug, Clone)]
pub enum Query {
    Select(Box<SelectQuery>),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    Ddl(DdlStatement),
    /// Raw SQL passthrough.
    Raw(String),
}

impl Query {
    pub fn is_ddl(&self) -> bool {
        matches!(self, Query::Ddl(_))
    }
}

/// A SELECT query with all standard SQL clauses.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub joins: Vec<Join>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
}

/// A single item in the SELECT projection or RETURNING list.
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `table.*`
    QualifiedWildcard(String),
    /// An expression, optionally aliased: `expr AS alias`.
    Expression {
        expr: Expression,
        alias: Option<String>,
    },
}

impl From<Expression> for SelectItem {
    fn from(expr: Expression) -> Self {
        SelectItem::Expression { expr, alias: None }
    }
}

/// Table reference in FROM clause.
#[derive(Debug, Clone)]
pub enum TableRef {
    /// `schema.table AS alias`
    Table {
        schema: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// `(SELECT ...) AS alias`
    Subquery { query: Box<Query>, alias: String },
}

impl From<&Arc<Table>> for TableRef {
    fn from(table: &Arc<Table>) -> Self {
        TableRef::Table {
            schema: table.schema.clone(),
            name: table.name.clone(),
            alias: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: TableRef,
    pub condition: Option<JoinCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Expression),
    Using(Vec<String>),
}

/// Core expression type.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Column reference: `table.column` or just `column`.
    Column {
        table: Option<String>,
        name: String,
        sql_type: Option<SqlType>,
    },
    /// Literal rendered inline.
    Literal(Literal),
    /// Bound parameter. `name` is a hint for the placeholder key.
    Bind {
        name: String,
        value: Value,
        sql_type: Option<SqlType>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    Function {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },
    /// `(SELECT ...)`
    Subquery(Box<Query>),
    Exists(Box<Query>),
    /// expr IN (values). Each element is rendered on its own.
    InList {
        expr: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expression>,
        subquery: Box<Query>,
        negated: bool,
    },
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expression>,
        negated: bool,
    },
    /// CAST(expr AS type).
    Cast {
        expr: Box<Expression>,
        data_type: SqlType,
    },
    /// `expr::type`
    TypeCast {
        expr: Box<Expression>,
        data_type: SqlType,
    },
    /// Wildcard `*` (used in COUNT(*)).
    Wildcard,
    /// `ARRAY[...]`
    Array(Vec<Expression>),
    Nested(Box<Expression>),
}

/// Literal values rendered inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
    ILike,
    NotLike,
    NotILike,
    Concat,
}

impl BinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::ILike => "ILIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::NotILike => "NOT ILIKE",
            BinaryOperator::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

/// ORDER BY expression.
#[derive(Debug, Clone)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub asc: Option<bool>,
    pub nulls_first: Option<bool>,
}

/// INSERT statement.
///
/// Each row maps column names to value expressions. Columns missing from a
/// row fall back to their declared default; an empty `rows` list inserts a
/// single row made of defaults.
#[derive(Debug, Clone)]
pub struct InsertQuery {
    pub table: Arc<Table>,
    pub rows: Vec<Vec<(String, Expression)>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<SelectItem>,
}

/// `ON CONFLICT` clause of an upsert.
#[derive(Debug, Clone)]
pub struct OnConflict {
    pub target: ConflictTarget,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictTarget {
    Any,
    Columns(Vec<String>),
    Constraint(String),
}

#[derive(Debug, Clone)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate {
        assignments: Vec<Assignment>,
        filter: Option<Expression>,
    },
}

/// UPDATE statement.
#[derive(Debug, Clone)]
pub struct UpdateQuery {
    pub table: Arc<Table>,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Expression>,
    pub returning: Vec<SelectItem>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Expression,
}

/// DELETE statement.
#[derive(Debug, Clone)]
pub struct DeleteQuery {
    pub table: Arc<Table>,
    pub filter: Option<Expression>,
    pub returning: Vec<SelectItem>,
}

/// Schema statements. These never carry bound parameters.
#[derive(Debug, Clone)]
pub enum DdlStatement {
    CreateTable {
        table: Arc<Table>,
        if_not_exists: bool,
    },
    DropTable {
        table: Arc<Table>,
        if_exists: bool,
    },
    CreateSequence {
        sequence: Sequence,
        if_not_exists: bool,
    },
    DropSequence {
        sequence: Sequence,
        if_exists: bool,
    },
    CreateType(Arc<EnumType>),
    DropType {
        enum_type: Arc<EnumType>,
        if_exists: bool,
    },
}

macro_rules! impl_into_query {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Query {
                fn from(q: $ty) -> Self {
                    Query::$variant(q)
                }
            }
        )*
    };
}

impl_into_query! {
    InsertQuery => Insert,
    UpdateQuery => Update,
    DeleteQuery => Delete,
    DdlStatement => Ddl,
}

impl From<SelectQuery> for Query {
    fn from(q: SelectQuery) -> Self {
        Query::Select(Box::new(q))
    }
}
