//! A small query language compiled to parameterised SQL.
//!
//! Attribute names become `json_extract(data, ?)` with the JSON path bound as
//! a parameter and checked against a safe identifier alphabet; every value
//! is bound. Nothing supplied by a caller is ever spliced into SQL text.

use crate::error::{StorageError, StorageResult};
use forum_types::RecordId;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// A sortable / filterable column of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// The integer primary key.
    Id,
    /// A top-level attribute of the record's JSON data.
    Attribute(String),
}

impl Column {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Attribute(name.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: Column,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }
}

/// Row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Column, Value),
    IsNull(Column),
    NotNull(Column),
    In(Column, Vec<Value>),
    /// Case-insensitive substring match on any of the columns.
    Contains { columns: Vec<Column>, needle: String },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// `column` equals `key` of some row of `table` matching `condition`.
    InTable {
        column: Column,
        table: String,
        key: Column,
        condition: Option<Box<Condition>>,
    },
}

impl Condition {
    /// Equality on an attribute.
    pub fn eq(attribute: &str, value: impl Into<Value>) -> Self {
        Self::Eq(Column::attribute(attribute), value.into())
    }

    pub fn id(id: RecordId) -> Self {
        Self::Eq(Column::Id, Value::from(id.get()))
    }

    pub fn is_null(attribute: &str) -> Self {
        Self::IsNull(Column::attribute(attribute))
    }

    /// `attribute` references a row of `table` that satisfies `condition`.
    pub fn references(attribute: &str, table: impl Into<String>, condition: Option<Condition>) -> Self {
        Self::InTable {
            column: Column::attribute(attribute),
            table: table.into(),
            key: Column::Id,
            condition: condition.map(Box::new),
        }
    }

    /// Some row of `table` satisfying `condition` points here through
    /// `attribute`.
    pub fn referenced_by(table: impl Into<String>, attribute: &str, condition: Option<Condition>) -> Self {
        Self::InTable {
            column: Column::Id,
            table: table.into(),
            key: Column::attribute(attribute),
            condition: condition.map(Box::new),
        }
    }

    /// Conjunction that flattens nested `And`s.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), c) => {
                a.push(c);
                Self::And(a)
            }
            (c, Self::And(mut b)) => {
                b.insert(0, c);
                Self::And(b)
            }
            (a, b) => Self::And(vec![a, b]),
        }
    }

    /// Conjunction of optional conditions.
    pub fn all(conditions: impl IntoIterator<Item = Option<Condition>>) -> Option<Self> {
        conditions
            .into_iter()
            .flatten()
            .reduce(|acc, c| acc.and(c))
    }
}

/// A select over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub condition: Option<Condition>,
    pub order: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: None,
            order: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Adds a condition, AND-ed with any existing one.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn filter_opt(self, condition: Option<Condition>) -> Self {
        match condition {
            Some(c) => self.filter(c),
            None => self,
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// SQL text plus its positional parameters, in order.
#[derive(Debug, Default)]
pub(crate) struct Compiled {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn check_identifier(name: &str) -> StorageResult<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

impl Compiled {
    fn column(&mut self, column: &Column) -> StorageResult<String> {
        match column {
            Column::Id => Ok("id".to_string()),
            Column::Attribute(name) => {
                check_identifier(name)?;
                self.params.push(SqlValue::Text(format!("$.{name}")));
                Ok("json_extract(data, ?)".to_string())
            }
        }
    }

    fn condition(&mut self, condition: &Condition) -> StorageResult<String> {
        Ok(match condition {
            Condition::Eq(column, value) => {
                let col = self.column(column)?;
                if value.is_null() {
                    format!("{col} IS NULL")
                } else {
                    self.params.push(to_sql_value(value));
                    format!("{col} = ?")
                }
            }
            Condition::IsNull(column) => format!("{} IS NULL", self.column(column)?),
            Condition::NotNull(column) => format!("{} IS NOT NULL", self.column(column)?),
            Condition::In(column, values) => {
                if values.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                let col = self.column(column)?;
                let marks = vec!["?"; values.len()].join(", ");
                self.params.extend(values.iter().map(to_sql_value));
                format!("{col} IN ({marks})")
            }
            Condition::Contains { columns, needle } => {
                if columns.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
                let mut parts = Vec::with_capacity(columns.len());
                for column in columns {
                    let col = self.column(column)?;
                    self.params.push(SqlValue::Text(pattern.clone()));
                    parts.push(format!("LOWER({col}) LIKE ? ESCAPE '\\'"));
                }
                format!("({})", parts.join(" OR "))
            }
            Condition::InTable {
                column,
                table,
                key,
                condition,
            } => {
                let table = check_identifier(table)?;
                let col = self.column(column)?;
                let key = self.column(key)?;
                let mut sub = format!("SELECT {key} FROM \"{table}\"");
                if let Some(condition) = condition {
                    sub.push_str(" WHERE ");
                    sub.push_str(&self.condition(condition)?);
                }
                format!("{col} IN ({sub})")
            }
            Condition::And(items) => self.join(items, " AND ", "1 = 1")?,
            Condition::Or(items) => self.join(items, " OR ", "0 = 1")?,
        })
    }

    fn join(&mut self, items: &[Condition], sep: &str, empty: &str) -> StorageResult<String> {
        if items.is_empty() {
            return Ok(empty.to_string());
        }
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(self.condition(item)?);
        }
        Ok(format!("({})", parts.join(sep)))
    }

    /// Appends ` WHERE ...` for an optional condition.
    pub(crate) fn where_clause(&mut self, condition: Option<&Condition>) -> StorageResult<()> {
        if let Some(condition) = condition {
            let clause = self.condition(condition)?;
            self.sql.push_str(" WHERE ");
            self.sql.push_str(&clause);
        }
        Ok(())
    }

    pub(crate) fn select(query: &Query) -> StorageResult<Self> {
        let table = check_identifier(&query.table)?;
        let mut compiled = Self {
            sql: format!("SELECT id, data FROM \"{table}\""),
            params: Vec::new(),
        };
        compiled.where_clause(query.condition.as_ref())?;

        if !query.order.is_empty() {
            let mut terms = Vec::with_capacity(query.order.len());
            for order in &query.order {
                let col = compiled.column(&order.column)?;
                terms.push(format!("{col} {}", order.direction.sql()));
            }
            compiled.sql.push_str(" ORDER BY ");
            compiled.sql.push_str(&terms.join(", "));
        }

        let offset = sql_integer("offset", query.offset)?;
        match query.limit {
            Some(limit) => {
                compiled.sql.push_str(" LIMIT ? OFFSET ?");
                compiled.params.push(SqlValue::Integer(sql_integer("limit", limit)?));
                compiled.params.push(SqlValue::Integer(offset));
            }
            None if offset > 0 => {
                compiled.sql.push_str(" LIMIT -1 OFFSET ?");
                compiled.params.push(SqlValue::Integer(offset));
            }
            None => {}
        }
        Ok(compiled)
    }
}

/// Page bounds beyond what SQLite can bind are rejected, not wrapped.
fn sql_integer(what: &str, n: usize) -> StorageResult<i64> {
    i64::try_from(n).map_err(|_| StorageError::InvalidData(format!("{what} {n} is out of range")))
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
