//! Query tree → SQL compiler.
//!
//! Renders a [`Query`] into PostgreSQL text with named placeholders
//! (`:key`) and collects, in placeholder order, the values bound to them.
//! INSERT/UPDATE columns whose value must come from a column default are
//! rendered as placeholders too and reported in the prefetch lists; the
//! caller decides how to materialize them.
use std::collections::{HashMap, HashSet};

use super::schema::{Column, EnumType, Sequence, SqlType, Table};
use super::types::*;
use super::value::Value;
use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// A value slot in the compiled text.
#[derive(Debug, Clone)]
pub struct BindParam {
    pub key: String,
    /// `None` for prefetch slots that still await their default.
    pub value: Option<Value>,
    pub sql_type: Option<SqlType>,
}

/// A placeholder whose value comes from a column default.
#[derive(Debug, Clone)]
pub struct Prefetch {
    pub key: String,
    pub column: Column,
}

#[derive(Debug, Clone, Default)]
pub struct CompiledStatement {
    /// SQL text with `:key` placeholders.
    pub sql: String,
    pub binds: Vec<BindParam>,
    pub insert_prefetch: Vec<Prefetch>,
    pub update_prefetch: Vec<Prefetch>,
    pub is_ddl: bool,
    /// Set for INSERT statements with more than one VALUES row.
    pub multi_row: bool,
}

impl CompiledStatement {
    pub fn bind(&self, key: &str) -> Option<&BindParam> {
        self.binds.iter().find(|b| b.key == key)
    }
}

/// Compile a query tree against `dialect`.
pub fn compile(query: &Query, dialect: &Dialect) -> Result<CompiledStatement> {
    let mut compiler = SqlCompiler::new(dialect);
    let sql = compiler.query(query)?;
    Ok(CompiledStatement {
        sql,
        binds: compiler.binds,
        insert_prefetch: compiler.insert_prefetch,
        update_prefetch: compiler.update_prefetch,
        is_ddl: query.is_ddl(),
        multi_row: compiler.multi_row,
    })
}

struct SqlCompiler<'d> {
    dialect: &'d Dialect,
    binds: Vec<BindParam>,
    used_keys: HashSet<String>,
    counters: HashMap<String, usize>,
    insert_prefetch: Vec<Prefetch>,
    update_prefetch: Vec<Prefetch>,
    multi_row: bool,
}

impl<'d> SqlCompiler<'d> {
    fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            binds: Vec::new(),
            used_keys: HashSet::new(),
            counters: HashMap::new(),
            insert_prefetch: Vec::new(),
            update_prefetch: Vec::new(),
            multi_row: false,
        }
    }

    fn query(&mut self, query: &Query) -> Result<String> {
        match query {
            Query::Select(s) => self.select(s),
            Query::Insert(i) => self.insert(i),
            Query::Update(u) => self.update(u),
            Query::Delete(d) => self.delete(d),
            Query::Ddl(ddl) => Ok(self.ddl(ddl)),
            Query::Raw(sql) => Ok(sql.clone()),
        }
    }

    // --- placeholders ---

    /// Use `name` as the key if it is still free, else number it.
    fn claim_key(&mut self, name: &str) -> String {
        let key = sanitize_key(name);
        if self.used_keys.insert(key.clone()) {
            key
        } else {
            self.next_key(&key)
        }
    }

    /// `<name>_<n>` with the lowest unused `n` for that name.
    fn next_key(&mut self, name: &str) -> String {
        let base = sanitize_key(name);
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let key = format!("{}_{}", base, counter);
            if self.used_keys.insert(key.clone()) {
                return key;
            }
        }
    }

    fn push_bind(&mut self, key: String, value: Option<Value>, sql_type: Option<SqlType>) -> String {
        let placeholder = format!(":{}", key);
        self.binds.push(BindParam {
            key,
            value,
            sql_type,
        });
        placeholder
    }

    /// Render a value assigned to `column`. Binds take the column's type.
    fn column_value(
        &mut self,
        column: &Column,
        key_name: &str,
        expr: &Expression,
        exact_key: bool,
    ) -> Result<String> {
        match expr {
            Expression::Bind { value, .. } => {
                let key = if exact_key {
                    self.claim_key(key_name)
                } else {
                    self.next_key(key_name)
                };
                Ok(self.push_bind(key, Some(value.clone()), Some(column.sql_type.clone())))
            }
            other => self.expr(other),
        }
    }

    // --- names ---

    fn ident(&self, name: &str) -> String {
        self.dialect.quote_identifier(name).into_owned()
    }

    fn qualified(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(sc) => format!("{}.{}", self.ident(sc), self.ident(name)),
            None => self.ident(name),
        }
    }

    fn table_name(&self, table: &Table) -> String {
        self.qualified(table.schema.as_deref(), &table.name)
    }

    fn sequence_name(&self, sequence: &Sequence) -> String {
        self.qualified(sequence.schema.as_deref(), &sequence.name)
    }

    fn lookup<'t>(&self, table: &'t Table, column: &str) -> Result<&'t Column> {
        table.column(column).ok_or_else(|| Error::UnknownColumn {
            table: table.name.clone(),
            column: column.to_string(),
        })
    }

    // --- SELECT ---

    fn select(&mut self, select: &SelectQuery) -> Result<String> {
        let mut parts = Vec::new();

        let mut select_clause = String::from("SELECT ");
        if select.distinct {
            select_clause.push_str("DISTINCT ");
        }
        if select.projections.is_empty() {
            select_clause.push('*');
        } else {
            let items = self.select_items(&select.projections)?;
            select_clause.push_str(&items);
        }
        parts.push(select_clause);

        if !select.from.is_empty() {
            let tables = select
                .from
                .iter()
                .map(|t| self.table_ref(t))
                .collect::<Result<Vec<_>>>()?;
            parts.push(format!("FROM {}", tables.join(", ")));
        }

        for join in &select.joins {
            let rendered = self.join(join)?;
            parts.push(rendered);
        }

        if let Some(ref filter) = select.filter {
            parts.push(format!("WHERE {}", self.expr(filter)?));
        }

        if !select.group_by.is_empty() {
            let groups = self.expr_list(&select.group_by)?;
            parts.push(format!("GROUP BY {}", groups));
        }

        if let Some(ref having) = select.having {
            parts.push(format!("HAVING {}", self.expr(having)?));
        }

        if !select.order_by.is_empty() {
            let orders = select
                .order_by
                .iter()
                .map(|o| self.order_by(o))
                .collect::<Result<Vec<_>>>()?;
            parts.push(format!("ORDER BY {}", orders.join(", ")));
        }

        if let Some(ref limit) = select.limit {
            parts.push(format!("LIMIT {}", self.expr(limit)?));
        }

        if let Some(ref offset) = select.offset {
            parts.push(format!("OFFSET {}", self.expr(offset)?));
        }

        Ok(parts.join(" "))
    }

    fn select_items(&mut self, items: &[SelectItem]) -> Result<String> {
        let rendered = items
            .iter()
            .map(|item| self.select_item(item))
            .collect::<Result<Vec<_>>>()?;
        Ok(rendered.join(", "))
    }

    fn select_item(&mut self, item: &SelectItem) -> Result<String> {
        Ok(match item {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::QualifiedWildcard(table) => format!("{}.*", self.ident(table)),
            SelectItem::Expression { expr, alias } => {
                let expr_str = self.expr(expr)?;
                match alias {
                    Some(a) => format!("{} AS {}", expr_str, self.ident(a)),
                    None => expr_str,
                }
            }
        })
    }

    fn returning(&mut self, items: &[SelectItem]) -> Result<String> {
        if items.is_empty() {
            return Ok(String::new());
        }
        Ok(format!(" RETURNING {}", self.select_items(items)?))
    }

    fn table_ref(&mut self, table: &TableRef) -> Result<String> {
        Ok(match table {
            TableRef::Table {
                schema,
                name,
                alias,
            } => {
                let mut s = self.qualified(schema.as_deref(), name);
                if let Some(a) = alias {
                    s.push_str(&format!(" AS {}", self.ident(a)));
                }
                s
            }
            TableRef::Subquery { query, alias } => {
                format!("({}) AS {}", self.query(query)?, self.ident(alias))
            }
        })
    }

    fn join(&mut self, join: &Join) -> Result<String> {
        let type_str = match join.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        };

        let table_str = self.table_ref(&join.table)?;

        let condition_str = match &join.condition {
            Some(JoinCondition::On(expr)) => format!(" ON {}", self.expr(expr)?),
            Some(JoinCondition::Using(cols)) => {
                let cols: Vec<String> = cols.iter().map(|c| self.ident(c)).collect();
                format!(" USING ({})", cols.join(", "))
            }
            None => String::new(),
        };

        Ok(format!("{} {}{}", type_str, table_str, condition_str))
    }

    fn order_by(&mut self, order: &OrderByExpr) -> Result<String> {
        let mut s = self.expr(&order.expr)?;
        match order.asc {
            Some(true) => s.push_str(" ASC"),
            Some(false) => s.push_str(" DESC"),
            None => {}
        }
        match order.nulls_first {
            Some(true) => s.push_str(" NULLS FIRST"),
            Some(false) => s.push_str(" NULLS LAST"),
            None => {}
        }
        Ok(s)
    }

    // --- expressions ---

    fn expr_list(&mut self, exprs: &[Expression]) -> Result<String> {
        let items = exprs
            .iter()
            .map(|e| self.expr(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(items.join(", "))
    }

    /// Render `child` as an operand of `parent`, parenthesized when it binds
    /// more loosely.
    fn operand(&mut self, child: &Expression, parent: BinaryOperator, right: bool) -> Result<String> {
        let rendered = self.expr(child)?;
        if let Expression::BinaryOp { op, .. } = child {
            let (child_prec, parent_prec) = (precedence(*op), precedence(parent));
            if child_prec < parent_prec || (right && child_prec == parent_prec && *op != parent) {
                return Ok(format!("({})", rendered));
            }
        }
        Ok(rendered)
    }

    fn expr(&mut self, expr: &Expression) -> Result<String> {
        Ok(match expr {
            Expression::Column { table, name, .. } => match table {
                Some(t) => format!("{}.{}", self.ident(t), self.ident(name)),
                None => self.ident(name),
            },
            Expression::Literal(lit) => compile_literal(lit),
            Expression::Bind {
                name,
                value,
                sql_type,
            } => {
                let key = self.next_key(name);
                self.push_bind(key, Some(value.clone()), sql_type.clone())
            }
            Expression::BinaryOp { left, op, right } => {
                let l = self.operand(left, *op, false)?;
                let r = self.operand(right, *op, true)?;
                format!("{} {} {}", l, op.as_sql(), r)
            }
            Expression::UnaryOp { op, expr } => {
                let inner = self.expr(expr)?;
                let inner = match **expr {
                    Expression::BinaryOp { .. } => format!("({})", inner),
                    _ => inner,
                };
                match op {
                    UnaryOperator::Not => format!("NOT {}", inner),
                    UnaryOperator::Minus => format!("-{}", inner),
                    UnaryOperator::Plus => format!("+{}", inner),
                }
            }
            Expression::Function {
                name,
                args,
                distinct,
            } => {
                let distinct_str = if *distinct { "DISTINCT " } else { "" };
                format!("{}({}{})", name, distinct_str, self.expr_list(args)?)
            }
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut s = String::from("CASE");
                if let Some(op) = operand {
                    s.push_str(&format!(" {}", self.expr(op)?));
                }
                for (when, then) in when_clauses {
                    let when = self.expr(when)?;
                    let then = self.expr(then)?;
                    s.push_str(&format!(" WHEN {} THEN {}", when, then));
                }
                if let Some(else_expr) = else_clause {
                    s.push_str(&format!(" ELSE {}", self.expr(else_expr)?));
                }
                s.push_str(" END");
                s
            }
            Expression::Subquery(q) => format!("({})", self.query(q)?),
            Expression::Exists(q) => format!("EXISTS ({})", self.query(q)?),
            Expression::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    // `IN ()` is not valid SQL.
                    return Ok(if *negated { "1 = 1" } else { "1 != 1" }.to_string());
                }
                let not_str = if *negated { "NOT " } else { "" };
                let lhs = self.expr(expr)?;
                format!("{} {}IN ({})", lhs, not_str, self.expr_list(list)?)
            }
            Expression::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let lhs = self.expr(expr)?;
                format!("{} {}IN ({})", lhs, not_str, self.query(subquery)?)
            }
            Expression::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not_str = if *negated { "NOT " } else { "" };
                let e = self.expr(expr)?;
                let low = self.expr(low)?;
                let high = self.expr(high)?;
                format!("{} {}BETWEEN {} AND {}", e, not_str, low, high)
            }
            Expression::IsNull { expr, negated } => {
                let e = self.expr(expr)?;
                if *negated {
                    format!("{} IS NOT NULL", e)
                } else {
                    format!("{} IS NULL", e)
                }
            }
            Expression::Cast { expr, data_type } => {
                format!("CAST({} AS {})", self.expr(expr)?, data_type.ddl_name())
            }
            Expression::TypeCast { expr, data_type } => {
                format!("{}::{}", self.expr(expr)?, data_type.ddl_name())
            }
            Expression::Wildcard => "*".to_string(),
            Expression::Array(elems) => format!("ARRAY[{}]", self.expr_list(elems)?),
            Expression::Nested(expr) => format!("({})", self.expr(expr)?),
        })
    }

    // --- DML ---

    fn insert(&mut self, insert: &InsertQuery) -> Result<String> {
        let table = insert.table.as_ref();
        let default_row = Vec::new();
        let rows: Vec<&Vec<(String, Expression)>> = if insert.rows.is_empty() {
            vec![&default_row]
        } else {
            insert.rows.iter().collect()
        };
        for row in &rows {
            for (name, _) in row.iter() {
                self.lookup(table, name)?;
            }
        }
        let multi_row = rows.len() > 1;
        self.multi_row |= multi_row;

        // Declaration order, limited to columns that get a value somewhere.
        let columns: Vec<&Column> = table
            .columns
            .iter()
            .filter(|c| {
                c.default.is_some() || rows.iter().any(|r| r.iter().any(|(n, _)| *n == c.name))
            })
            .collect();

        let target = self.table_name(table);
        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", target)
        } else {
            let names: Vec<String> = columns.iter().map(|c| self.ident(&c.name)).collect();
            let mut row_strs = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                let mut vals = Vec::with_capacity(columns.len());
                for column in &columns {
                    let key_name = if i == 0 {
                        column.name.clone()
                    } else {
                        format!("{}_m{}", column.name, i)
                    };
                    let value = row.iter().find(|(n, _)| *n == column.name).map(|(_, e)| e);
                    let rendered = match value {
                        Some(expr) => self.column_value(column, &key_name, expr, true)?,
                        None if column.default.is_some() => {
                            let key = self.claim_key(&key_name);
                            self.insert_prefetch.push(Prefetch {
                                key: key.clone(),
                                column: (*column).clone(),
                            });
                            self.push_bind(key, None, Some(column.sql_type.clone()))
                        }
                        None => "DEFAULT".to_string(),
                    };
                    vals.push(rendered);
                }
                row_strs.push(format!("({})", vals.join(", ")));
            }
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                names.join(", "),
                row_strs.join(", ")
            )
        };

        if let Some(ref on_conflict) = insert.on_conflict {
            sql.push_str(&self.on_conflict(table, on_conflict)?);
        }
        sql.push_str(&self.returning(&insert.returning)?);
        Ok(sql)
    }

    fn on_conflict(&mut self, table: &Table, on_conflict: &OnConflict) -> Result<String> {
        let mut s = match &on_conflict.target {
            ConflictTarget::Any => " ON CONFLICT".to_string(),
            ConflictTarget::Columns(cols) => {
                let cols: Vec<String> = cols.iter().map(|c| self.ident(c)).collect();
                format!(" ON CONFLICT ({})", cols.join(", "))
            }
            ConflictTarget::Constraint(name) => {
                format!(" ON CONFLICT ON CONSTRAINT {}", self.ident(name))
            }
        };
        match &on_conflict.action {
            ConflictAction::DoNothing => s.push_str(" DO NOTHING"),
            ConflictAction::DoUpdate {
                assignments,
                filter,
            } => {
                let mut sets = Vec::with_capacity(assignments.len());
                for a in assignments {
                    let column = self.lookup(table, &a.column)?;
                    let value = self.column_value(column, &column.name, &a.value, false)?;
                    sets.push(format!("{} = {}", self.ident(&column.name), value));
                }
                s.push_str(&format!(" DO UPDATE SET {}", sets.join(", ")));
                if let Some(f) = filter {
                    s.push_str(&format!(" WHERE {}", self.expr(f)?));
                }
            }
        }
        Ok(s)
    }

    fn update(&mut self, update: &UpdateQuery) -> Result<String> {
        let table = update.table.as_ref();

        let mut sets = Vec::new();
        for a in &update.assignments {
            let column = self.lookup(table, &a.column)?;
            let value = self.column_value(column, &column.name, &a.value, true)?;
            sets.push(format!("{}={}", self.ident(&column.name), value));
        }

        // On-update columns the statement leaves alone, in declaration order.
        for column in &table.columns {
            if column.onupdate.is_none() || update.assignments.iter().any(|a| a.column == column.name)
            {
                continue;
            }
            let key = self.claim_key(&column.name);
            self.update_prefetch.push(Prefetch {
                key: key.clone(),
                column: column.clone(),
            });
            let placeholder = self.push_bind(key, None, Some(column.sql_type.clone()));
            sets.push(format!("{}={}", self.ident(&column.name), placeholder));
        }

        if sets.is_empty() {
            return Err(Error::EmptyUpdate(table.name.clone()));
        }

        let filter = match &update.filter {
            Some(f) => format!(" WHERE {}", self.expr(f)?),
            None => String::new(),
        };

        let returning = self.returning(&update.returning)?;

        Ok(format!(
            "UPDATE {} SET {}{}{}",
            self.table_name(table),
            sets.join(", "),
            filter,
            returning
        ))
    }

    fn delete(&mut self, delete: &DeleteQuery) -> Result<String> {
        let filter = match &delete.filter {
            Some(f) => format!(" WHERE {}", self.expr(f)?),
            None => String::new(),
        };

        let returning = self.returning(&delete.returning)?;

        Ok(format!(
            "DELETE FROM {}{}{}",
            self.table_name(&delete.table),
            filter,
            returning
        ))
    }

    // --- DDL ---

    fn ddl(&self, ddl: &DdlStatement) -> String {
        match ddl {
            DdlStatement::CreateTable {
                table,
                if_not_exists,
            } => self.create_table(table, *if_not_exists),
            DdlStatement::DropTable { table, if_exists } => {
                format!("DROP TABLE {}{}", if_exists_str(*if_exists), self.table_name(table))
            }
            DdlStatement::CreateSequence {
                sequence,
                if_not_exists,
            } => {
                let mut s = format!(
                    "CREATE SEQUENCE {}{}",
                    if_not_exists_str(*if_not_exists),
                    self.sequence_name(sequence)
                );
                if let Some(inc) = sequence.increment {
                    s.push_str(&format!(" INCREMENT BY {}", inc));
                }
                if let Some(start) = sequence.start {
                    s.push_str(&format!(" START WITH {}", start));
                }
                s
            }
            DdlStatement::DropSequence {
                sequence,
                if_exists,
            } => format!(
                "DROP SEQUENCE {}{}",
                if_exists_str(*if_exists),
                self.sequence_name(sequence)
            ),
            DdlStatement::CreateType(enum_type) => self.create_type(enum_type),
            DdlStatement::DropType {
                enum_type,
                if_exists,
            } => format!(
                "DROP TYPE {}{}",
                if_exists_str(*if_exists),
                self.ident(&enum_type.name)
            ),
        }
    }

    fn create_table(&self, table: &Table, if_not_exists: bool) -> String {
        let pk_count = table.columns.iter().filter(|c| c.primary_key).count();
        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", self.ident(&c.name), self.type_name(&c.sql_type));
                if c.primary_key && pk_count == 1 {
                    def.push_str(" PRIMARY KEY");
                } else if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                if c.unique {
                    def.push_str(" UNIQUE");
                }
                def
            })
            .collect();
        if pk_count > 1 {
            let pks: Vec<String> = table
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| self.ident(&c.name))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", pks.join(", ")));
        }
        format!(
            "CREATE TABLE {}{} ({})",
            if_not_exists_str(if_not_exists),
            self.table_name(table),
            defs.join(", ")
        )
    }

    fn create_type(&self, enum_type: &EnumType) -> String {
        let labels: Vec<String> = enum_type
            .labels()
            .map(|l| compile_literal(&Literal::String(l.to_string())))
            .collect();
        format!(
            "CREATE TYPE {} AS ENUM ({})",
            self.ident(&enum_type.name),
            labels.join(", ")
        )
    }

    fn type_name(&self, sql_type: &SqlType) -> String {
        match sql_type {
            SqlType::Enum(e) => self.ident(&e.name),
            SqlType::Array(inner) => format!("{}[]", self.type_name(inner)),
            other => other.ddl_name(),
        }
    }
}

fn if_exists_str(if_exists: bool) -> &'static str {
    if if_exists {
        "IF EXISTS "
    } else {
        ""
    }
}

fn if_not_exists_str(if_not_exists: bool) -> &'static str {
    if if_not_exists {
        "IF NOT EXISTS "
    } else {
        ""
    }
}

fn precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::Or => 1,
        BinaryOperator::And => 2,
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq
        | BinaryOperator::Like
        | BinaryOperator::ILike
        | BinaryOperator::NotLike
        | BinaryOperator::NotILike => 3,
        BinaryOperator::Concat => 4,
        BinaryOperator::Plus | BinaryOperator::Minus => 5,
        BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 6,
    }
}

/// Placeholder keys are restricted to `[A-Za-z0-9_]` and never start with
/// a digit, since `:1` reads as an array slice bound.
fn sanitize_key(name: &str) -> String {
    let key: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    match key.chars().next() {
        None => "param".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", key),
        Some(_) => key,
    }
}

fn compile_literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(b) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) => format!("{}", f),
        Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::builders::{count_all, exists, select};
    use crate::ast::schema::Column;

    fn users() -> Arc<Table> {
        Table::new(
            "users",
            vec![
                Column::new("id", SqlType::Uuid)
                    .primary_key()
                    .default_fn(|| Ok(Value::Uuid(uuid::Uuid::new_v4()))),
                Column::new("name", SqlType::Varchar(Some(60))).default_value("default"),
                Column::new("age", SqlType::Integer),
            ],
        )
    }

    fn compile_default(query: impl Into<Query>) -> CompiledStatement {
        compile(&query.into(), &Dialect::default()).expect("compile")
    }

    fn keys(compiled: &CompiledStatement) -> Vec<&str> {
        compiled.binds.iter().map(|b| b.key.as_str()).collect()
    }

    #[test]
    fn test_compile_simple_select() {
        let users = users();
        let compiled = compile_default(users.select());
        assert_eq!(
            compiled.sql,
            "SELECT users.id, users.name, users.age FROM users"
        );
        assert!(compiled.binds.is_empty());
    }

    #[test]
    fn test_compile_select_with_where() {
        let users = users();
        let compiled = compile_default(
            select([users.c("id")])
                .select_from(&users)
                .filter(users.c("age").gt(18))
                .order_by(users.c("name").asc())
                .limit(10)
                .offset(5),
        );
        assert_eq!(
            compiled.sql,
            "SELECT users.id FROM users WHERE users.age > :age_1 ORDER BY users.name ASC LIMIT 10 OFFSET 5"
        );
        assert_eq!(keys(&compiled), ["age_1"]);
        assert_eq!(compiled.binds[0].value, Some(Value::Int32(18)));
        assert_eq!(compiled.binds[0].sql_type, Some(SqlType::Integer));
    }

    #[test]
    fn test_repeated_column_binds_get_numbered() {
        let users = users();
        let compiled = compile_default(
            select([count_all()])
                .select_from(&users)
                .filter(users.c("name").eq("a").or(users.c("name").eq("b"))),
        );
        assert_eq!(
            compiled.sql,
            "SELECT count(*) FROM users WHERE users.name = :name_1 OR users.name = :name_2"
        );
    }

    #[test]
    fn test_or_inside_and_is_parenthesized() {
        let users = users();
        let cond = users
            .c("age")
            .gt(1)
            .or(users.c("age").lt(0))
            .and(users.c("name").is_not_null());
        let compiled = compile_default(select([users.c("id")]).select_from(&users).filter(cond));
        assert!(compiled.sql.ends_with(
            "WHERE (users.age > :age_1 OR users.age < :age_2) AND users.name IS NOT NULL"
        ));
    }

    #[test]
    fn test_compile_in_list_and_between() {
        let users = users();
        let compiled = compile_default(
            users
                .delete()
                .filter(users.c("age").in_list([1, 2]))
                .filter(users.c("age").between(3, 4)),
        );
        assert_eq!(
            compiled.sql,
            "DELETE FROM users WHERE users.age IN (:age_1, :age_2) AND users.age BETWEEN :age_3 AND :age_4"
        );
    }

    #[test]
    fn test_empty_in_list() {
        let users = users();
        let compiled = compile_default(
            users
                .delete()
                .filter(users.c("age").in_list(Vec::<i32>::new())),
        );
        assert_eq!(compiled.sql, "DELETE FROM users WHERE 1 != 1");
    }

    #[test]
    fn test_compile_insert_with_defaults() {
        let users = users();
        let compiled = compile_default(users.insert());
        assert_eq!(compiled.sql, "INSERT INTO users (id, name) VALUES (:id, :name)");
        let prefetch: Vec<&str> = compiled.insert_prefetch.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(prefetch, ["id", "name"]);
        assert!(compiled.binds.iter().all(|b| b.value.is_none()));
    }

    #[test]
    fn test_compile_insert_explicit_value_skips_prefetch() {
        let users = users();
        let compiled = compile_default(users.insert().values([("name", "x")]));
        assert_eq!(compiled.sql, "INSERT INTO users (id, name) VALUES (:id, :name)");
        assert_eq!(compiled.insert_prefetch.len(), 1);
        assert_eq!(compiled.insert_prefetch[0].key, "id");
        assert_eq!(compiled.bind("name").and_then(|b| b.value.clone()), Some(Value::from("x")));
    }

    #[test]
    fn test_compile_multi_row_insert() {
        let users = users();
        let compiled = compile_default(users.insert().multi_values([
            vec![("id", Value::Uuid(uuid::Uuid::nil())), ("age", Value::Int32(1))],
            vec![("id", Value::Uuid(uuid::Uuid::nil()))],
        ]));
        assert!(compiled.multi_row);
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (id, name, age) VALUES (:id, :name, :age), (:id_m1, :name_m1, DEFAULT)"
        );
        assert_eq!(compiled.insert_prefetch.len(), 2);
    }

    #[test]
    fn test_insert_without_columns_uses_default_values() {
        let plain = Table::new("plain", vec![Column::new("note", SqlType::Text)]);
        let compiled = compile_default(plain.insert());
        assert_eq!(compiled.sql, "INSERT INTO plain DEFAULT VALUES");
    }

    #[test]
    fn test_insert_unknown_column() {
        let users = users();
        let err = compile(&users.insert().values([("email", "x")]).into(), &Dialect::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "email"));
    }

    #[test]
    fn test_compile_upsert() {
        let users = users();
        let compiled = compile_default(
            users
                .insert()
                .values([("id", Value::Uuid(uuid::Uuid::nil())), ("name", Value::from("n"))])
                .on_conflict_do_update(["id"], [("name", users.excluded("name"))])
                .returning([users.c("id")]),
        );
        assert_eq!(
            compiled.sql,
            "INSERT INTO users (id, name) VALUES (:id, :name) ON CONFLICT (id) DO UPDATE SET name = excluded.name RETURNING users.id"
        );
    }

    #[test]
    fn test_compile_update_orders_set_before_where() {
        let users = users();
        let compiled = compile_default(
            users
                .update()
                .set("name", "new")
                .filter(users.c("name").eq("old")),
        );
        assert_eq!(
            compiled.sql,
            "UPDATE users SET name=:name WHERE users.name = :name_1"
        );
        assert_eq!(keys(&compiled), ["name", "name_1"]);
    }

    #[test]
    fn test_update_appends_onupdate_columns() {
        let t = Table::new(
            "docs",
            vec![
                Column::new("title", SqlType::Text),
                Column::new("version", SqlType::Integer).onupdate_value(2),
            ],
        );
        let compiled = compile_default(t.update().set("title", "x"));
        assert_eq!(compiled.sql, "UPDATE docs SET title=:title, version=:version");
        assert_eq!(compiled.update_prefetch.len(), 1);

        let compiled = compile_default(t.update().set("version", 5));
        assert_eq!(compiled.sql, "UPDATE docs SET version=:version");
        assert!(compiled.update_prefetch.is_empty());
    }

    #[test]
    fn test_empty_update_is_rejected() {
        let users = users();
        let err = compile(&users.update().into(), &Dialect::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyUpdate(ref t) if t == "users"));
    }

    #[test]
    fn test_exists_subquery_shares_bind_keys() {
        let users = users();
        let inner = select([users.c("id")])
            .select_from(&users)
            .filter(users.c("age").eq(1));
        let compiled = compile_default(
            select([exists(inner)]).filter(users.c("age").eq(2).nested().not()),
        );
        assert_eq!(
            compiled.sql,
            "SELECT EXISTS (SELECT users.id FROM users WHERE users.age = :age_1) WHERE NOT (users.age = :age_2)"
        );
    }

    #[test]
    fn test_identifiers_are_quoted() {
        let t = Table::with_schema(
            "app",
            "user",
            vec![Column::new("Order", SqlType::Integer)],
        );
        let compiled = compile_default(t.update().set("Order", 1));
        assert_eq!(compiled.sql, "UPDATE app.\"user\" SET \"Order\"=:Order");
    }

    #[test]
    fn test_compile_ddl() {
        let status = EnumType::new("status", ["new", "old"]);
        let t = Table::new(
            "pets",
            vec![
                Column::new("id", SqlType::BigInt).primary_key(),
                Column::new("name", SqlType::Varchar(Some(60))).not_null().unique(),
                Column::new("status", SqlType::Enum(Arc::clone(&status))),
                Column::new("tags", SqlType::array_of(SqlType::Text)),
            ],
        );
        let compiled = compile_default(t.create());
        assert!(compiled.is_ddl);
        assert_eq!(
            compiled.sql,
            "CREATE TABLE pets (id BIGINT PRIMARY KEY, name VARCHAR(60) NOT NULL UNIQUE, status status, tags TEXT[])"
        );
        assert_eq!(compile_default(t.drop_if_exists()).sql, "DROP TABLE IF EXISTS pets");
        assert_eq!(
            compile_default(status.create()).sql,
            "CREATE TYPE status AS ENUM ('new', 'old')"
        );
        assert_eq!(compile_default(status.drop_type()).sql, "DROP TYPE status");
        let seq = Sequence::new("serial_seq").start(10);
        assert_eq!(
            compile_default(seq.create()).sql,
            "CREATE SEQUENCE serial_seq START WITH 10"
        );
        assert_eq!(compile_default(seq.drop_sequence()).sql, "DROP SEQUENCE serial_seq");
    }

    #[test]
    fn test_composite_primary_key() {
        let t = Table::new(
            "pairs",
            vec![
                Column::new("a", SqlType::Integer).primary_key(),
                Column::new("b", SqlType::Integer).primary_key(),
            ],
        );
        assert_eq!(
            compile_default(t.create()).sql,
            "CREATE TABLE pairs (a INTEGER NOT NULL, b INTEGER NOT NULL, PRIMARY KEY (a, b))"
        );
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("first name"), "first_name");
        assert_eq!(sanitize_key(""), "param");
        assert_eq!(sanitize_key("1st"), "_1st");
        assert_eq!(sanitize_key("2 nd"), "_2_nd");
    }

    #[test]
    fn test_literal_quoting() {
        assert_eq!(compile_literal(&Literal::String("it's".into())), "'it''s'");
        assert_eq!(compile_literal(&Literal::Boolean(false)), "FALSE");
    }
}
