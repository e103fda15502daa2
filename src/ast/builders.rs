//! Fluent construction of query trees.
//!
//! ```ignore
//! let q = users
//!     .update()
//!     .set("name", "new name")
//!     .filter(users.c("name").eq("old name"));
//! ```
use std::sync::Arc;

use super::schema::{EnumType, Sequence, SqlType, Table};
use super::types::*;
use super::value::Value;

impl Table {
    /// Typed reference to one of this table's columns.
    pub fn c(self: &Arc<Self>, name: &str) -> Expression {
        Expression::Column {
            table: Some(self.name.clone()),
            name: name.to_string(),
            sql_type: self.column(name).map(|c| c.sql_type.clone()),
        }
    }

    /// `excluded.<name>` inside an `ON CONFLICT DO UPDATE`.
    pub fn excluded(self: &Arc<Self>, name: &str) -> Expression {
        Expression::Column {
            table: Some("excluded".to_string()),
            name: name.to_string(),
            sql_type: self.column(name).map(|c| c.sql_type.clone()),
        }
    }

    /// `SELECT <every column> FROM <table>`
    pub fn select(self: &Arc<Self>) -> SelectQuery {
        let projections = self
            .columns
            .iter()
            .map(|c| SelectItem::from(self.c(&c.name)))
            .collect();
        SelectQuery {
            projections,
            from: vec![TableRef::from(self)],
            ..Default::default()
        }
    }

    pub fn insert(self: &Arc<Self>) -> InsertQuery {
        InsertQuery {
            table: Arc::clone(self),
            rows: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    pub fn update(self: &Arc<Self>) -> UpdateQuery {
        UpdateQuery {
            table: Arc::clone(self),
            assignments: Vec::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn delete(self: &Arc<Self>) -> DeleteQuery {
        DeleteQuery {
            table: Arc::clone(self),
            filter: None,
            returning: Vec::new(),
        }
    }

    pub fn create(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::CreateTable {
            table: Arc::clone(self),
            if_not_exists: false,
        }
    }

    pub fn create_if_not_exists(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::CreateTable {
            table: Arc::clone(self),
            if_not_exists: true,
        }
    }

    pub fn drop_table(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::DropTable {
            table: Arc::clone(self),
            if_exists: false,
        }
    }

    pub fn drop_if_exists(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::DropTable {
            table: Arc::clone(self),
            if_exists: true,
        }
    }

    fn bind_for(&self, column: &str, value: Value) -> Expression {
        Expression::Bind {
            name: column.to_string(),
            value,
            sql_type: self.column(column).map(|c| c.sql_type.clone()),
        }
    }
}

impl Sequence {
    pub fn create(&self) -> DdlStatement {
        DdlStatement::CreateSequence {
            sequence: self.clone(),
            if_not_exists: false,
        }
    }

    pub fn drop_sequence(&self) -> DdlStatement {
        DdlStatement::DropSequence {
            sequence: self.clone(),
            if_exists: false,
        }
    }

    /// `nextval('<seq>')` as an expression.
    pub fn next_value(&self) -> Expression {
        func("nextval", [Expression::Literal(Literal::String(self.qualified_name()))])
    }
}

impl EnumType {
    pub fn create(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::CreateType(Arc::clone(self))
    }

    pub fn drop_type(self: &Arc<Self>) -> DdlStatement {
        DdlStatement::DropType {
            enum_type: Arc::clone(self),
            if_exists: false,
        }
    }
}

/// A bound parameter with no column to name it after.
pub fn bind(value: impl Into<Value>) -> Expression {
    Expression::Bind {
        name: "param".to_string(),
        value: value.into(),
        sql_type: None,
    }
}

pub fn literal(lit: Literal) -> Expression {
    Expression::Literal(lit)
}

pub fn func<I>(name: &str, args: I) -> Expression
where
    I: IntoIterator<Item = Expression>,
{
    Expression::Function {
        name: name.to_string(),
        args: args.into_iter().collect(),
        distinct: false,
    }
}

/// `count(*)`
pub fn count_all() -> Expression {
    func("count", [Expression::Wildcard])
}

pub fn count(expr: Expression) -> Expression {
    func("count", [expr])
}

pub fn exists(query: impl Into<Query>) -> Expression {
    Expression::Exists(Box::new(query.into()))
}

/// `SELECT <items>` with no FROM clause yet.
pub fn select<I>(items: I) -> SelectQuery
where
    I: IntoIterator,
    I::Item: Into<SelectItem>,
{
    SelectQuery {
        projections: items.into_iter().map(Into::into).collect(),
        ..Default::default()
    }
}

/// Join two optional predicates with AND.
fn and_filter(current: Option<Expression>, expr: Expression) -> Option<Expression> {
    Some(match current {
        Some(existing) => existing.and(expr),
        None => expr,
    })
}

impl Expression {
    /// A bind compared against this expression, named and typed after it.
    fn bind_like(&self, value: Value) -> Expression {
        let (name, sql_type) = match self {
            Expression::Column { name, sql_type, .. } => (name.clone(), sql_type.clone()),
            _ => ("param".to_string(), None),
        };
        Expression::Bind {
            name,
            value,
            sql_type,
        }
    }

    pub fn op(self, op: BinaryOperator, right: Expression) -> Expression {
        Expression::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    fn op_value(self, op: BinaryOperator, value: impl Into<Value>) -> Expression {
        let right = self.bind_like(value.into());
        self.op(op, right)
    }

    pub fn eq(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::NotEq, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::LtEq, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::GtEq, value)
    }

    pub fn like(self, pattern: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::Like, pattern)
    }

    pub fn ilike(self, pattern: impl Into<Value>) -> Expression {
        self.op_value(BinaryOperator::ILike, pattern)
    }

    pub fn eq_expr(self, other: Expression) -> Expression {
        self.op(BinaryOperator::Eq, other)
    }

    pub fn and(self, other: Expression) -> Expression {
        self.op(BinaryOperator::And, other)
    }

    pub fn or(self, other: Expression) -> Expression {
        self.op(BinaryOperator::Or, other)
    }

    pub fn not(self) -> Expression {
        Expression::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self),
        }
    }

    /// `expr IN (...)`, one bind per element.
    pub fn in_list<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values
            .into_iter()
            .map(|v| self.bind_like(v.into()))
            .collect();
        Expression::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Expression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        match self.in_list(values) {
            Expression::InList { expr, list, .. } => Expression::InList {
                expr,
                list,
                negated: true,
            },
            other => other,
        }
    }

    pub fn in_subquery(self, query: impl Into<Query>) -> Expression {
        Expression::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(query.into()),
            negated: false,
        }
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Expression {
        let low = self.bind_like(low.into());
        let high = self.bind_like(high.into());
        Expression::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    pub fn is_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Expression {
        Expression::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn cast(self, data_type: SqlType) -> Expression {
        Expression::Cast {
            expr: Box::new(self),
            data_type,
        }
    }

    pub fn nested(self) -> Expression {
        Expression::Nested(Box::new(self))
    }

    pub fn alias(self, alias: &str) -> SelectItem {
        SelectItem::Expression {
            expr: self,
            alias: Some(alias.to_string()),
        }
    }

    pub fn asc(self) -> OrderByExpr {
        OrderByExpr {
            expr: self,
            asc: Some(true),
            nulls_first: None,
        }
    }

    pub fn desc(self) -> OrderByExpr {
        OrderByExpr {
            expr: self,
            asc: Some(false),
            nulls_first: None,
        }
    }
}

impl From<Expression> for OrderByExpr {
    fn from(expr: Expression) -> Self {
        OrderByExpr {
            expr,
            asc: None,
            nulls_first: None,
        }
    }
}

impl SelectQuery {
    pub fn select_from(mut self, table: impl Into<TableRef>) -> Self {
        self.from.push(table.into());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Add a WHERE predicate, ANDed with any existing one.
    pub fn filter(mut self, expr: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), expr);
        self
    }

    pub fn join(self, table: impl Into<TableRef>, on: Expression) -> Self {
        self.join_with(JoinType::Inner, table, on)
    }

    pub fn left_join(self, table: impl Into<TableRef>, on: Expression) -> Self {
        self.join_with(JoinType::Left, table, on)
    }

    fn join_with(mut self, join_type: JoinType, table: impl Into<TableRef>, on: Expression) -> Self {
        self.joins.push(Join {
            join_type,
            table: table.into(),
            condition: Some(JoinCondition::On(on)),
        });
        self
    }

    pub fn group_by(mut self, expr: Expression) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn having(mut self, expr: Expression) -> Self {
        self.having = and_filter(self.having.take(), expr);
        self
    }

    pub fn order_by(mut self, order: impl Into<OrderByExpr>) -> Self {
        self.order_by.push(order.into());
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(Expression::Literal(Literal::Integer(n)));
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(Expression::Literal(Literal::Integer(n)));
        self
    }

    /// Use as a scalar subquery expression.
    pub fn scalar(self) -> Expression {
        Expression::Subquery(Box::new(self.into()))
    }

    pub fn subquery(self, alias: &str) -> TableRef {
        TableRef::Subquery {
            query: Box::new(self.into()),
            alias: alias.to_string(),
        }
    }
}

fn returning_items<I>(items: I) -> impl Iterator<Item = SelectItem>
where
    I: IntoIterator,
    I::Item: Into<SelectItem>,
{
    items.into_iter().map(Into::into)
}

impl InsertQuery {
    /// Set values on the (first) row. Later calls override earlier keys.
    pub fn values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in values {
            let key = key.into();
            let bind = self.table.bind_for(&key, value.into());
            self = self.value_expr(key, bind);
        }
        self
    }

    /// Set one column of the first row to an arbitrary expression.
    pub fn value_expr(mut self, key: impl Into<String>, expr: Expression) -> Self {
        if self.rows.is_empty() {
            self.rows.push(Vec::new());
        }
        let key = key.into();
        let row = &mut self.rows[0];
        match row.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = expr,
            None => row.push((key, expr)),
        }
        self
    }

    /// Replace the rows with a multi-row VALUES list.
    pub fn multi_values<R, I, K, V>(mut self, rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let table = Arc::clone(&self.table);
        self.rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(k, v)| {
                        let k = k.into();
                        let bind = table.bind_for(&k, v.into());
                        (k, bind)
                    })
                    .collect()
            })
            .collect();
        self
    }

    pub fn returning<I>(mut self, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SelectItem>,
    {
        self.returning.extend(returning_items(items));
        self
    }

    pub fn on_conflict_do_nothing<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_conflict = Some(OnConflict {
            target: conflict_target(columns),
            action: ConflictAction::DoNothing,
        });
        self
    }

    /// `ON CONFLICT (cols) DO UPDATE SET ...`. Use [`Table::excluded`] to
    /// refer to the proposed row.
    pub fn on_conflict_do_update<I, S, A, K>(mut self, columns: I, set: A) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = (K, Expression)>,
        K: Into<String>,
    {
        let assignments = set
            .into_iter()
            .map(|(column, value)| Assignment {
                column: column.into(),
                value,
            })
            .collect();
        self.on_conflict = Some(OnConflict {
            target: conflict_target(columns),
            action: ConflictAction::DoUpdate {
                assignments,
                filter: None,
            },
        });
        self
    }
}

fn conflict_target<I, S>(columns: I) -> ConflictTarget
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
    if columns.is_empty() {
        ConflictTarget::Any
    } else {
        ConflictTarget::Columns(columns)
    }
}

impl UpdateQuery {
    pub fn set(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let bind = self.table.bind_for(&column, value.into());
        self.set_expr(column, bind)
    }

    pub fn set_expr(mut self, column: impl Into<String>, value: Expression) -> Self {
        let column = column.into();
        match self.assignments.iter_mut().find(|a| a.column == column) {
            Some(existing) => existing.value = value,
            None => self.assignments.push(Assignment { column, value }),
        }
        self
    }

    pub fn values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, value) in values {
            self = self.set(column, value);
        }
        self
    }

    pub fn filter(mut self, expr: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), expr);
        self
    }

    pub fn returning<I>(mut self, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SelectItem>,
    {
        self.returning.extend(returning_items(items));
        self
    }
}

impl DeleteQuery {
    pub fn filter(mut self, expr: Expression) -> Self {
        self.filter = and_filter(self.filter.take(), expr);
        self
    }

    pub fn returning<I>(mut self, items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SelectItem>,
    {
        self.returning.extend(returning_items(items));
        self
    }
}
