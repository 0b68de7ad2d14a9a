use crate::order::{Direction, OrderBy};
use crate::value::Value;
use std::convert::Infallible;

/// A fluent query builder for constructing SELECT and COUNT queries.
///
/// The builder is a plain value: cloning it yields a fully independent copy,
/// which is what query descriptors rely on when deriving new queries.
///
/// # Example
///
/// ```ignore
/// let q = QueryBuilder::new("users")
///     .where_eq("email", "a@b.com")
///     .where_like("name", "%alice%")
///     .order_by("id", Direction::Asc)
///     .limit(10);
/// let (sql, params) = q.build_select("*");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Do not validate or quote identifiers.
    Raw,
    /// Validate identifiers against a conservative pattern.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    Quote,
}

/// One column of a keyset seek predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekTerm {
    pub column: String,
    /// Traversal direction for this column: `Asc` seeks greater values.
    pub direction: Direction,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(String, Value),
    NotEq(String, Value),
    Like(String, String),
    Gt(String, Value),
    Ge(String, Value),
    Lt(String, Value),
    Le(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    IsNotNull(String),
    /// Rows strictly after a boundary in a multi-column order, expanded as
    /// `a > ? OR (a = ? AND b > ?) ...`. `NULL` sorts before every other
    /// value, so a `NULL` boundary value is matched with `IS NULL` and
    /// `IS NOT NULL` instead of comparisons.
    Seek(Vec<SeekTerm>),
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    alias: Option<String>,
    conditions: Vec<Condition>,
    order: Vec<(String, Direction)>,
    limit_val: Option<u64>,
    offset_val: Option<u64>,
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: None,
            conditions: Vec::new(),
            order: Vec::new(),
            limit_val: None,
            offset_val: None,
            dialect: Dialect::Generic,
            identifier_policy: IdentifierPolicy::Raw,
        }
    }

    /// Create a new builder with an explicit SQL dialect.
    pub fn new_with_dialect(table: &str, dialect: Dialect) -> Self {
        Self::new(table).dialect(dialect)
    }

    /// Set the SQL dialect (affects placeholder style and quoting).
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configure identifier validation/quoting behavior.
    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    /// Selection alias rendered after the table name.
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Eq(column.to_string(), value.into()))
    }

    pub fn where_not_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::NotEq(column.to_string(), value.into()))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.filter(Condition::Like(column.to_string(), pattern.to_string()))
    }

    pub fn where_gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Gt(column.to_string(), value.into()))
    }

    pub fn where_ge(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Ge(column.to_string(), value.into()))
    }

    pub fn where_lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Lt(column.to_string(), value.into()))
    }

    pub fn where_le(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Le(column.to_string(), value.into()))
    }

    pub fn where_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Condition::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.filter(Condition::IsNull(column.to_string()))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.filter(Condition::IsNotNull(column.to_string()))
    }

    /// Add a pre-built condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order.push((column.to_string(), direction));
        self
    }

    /// Replace the whole ordering.
    pub fn set_order(&mut self, order: &OrderBy) {
        self.order = order.fields().to_vec();
    }

    pub fn clear_order(&mut self) {
        self.order.clear();
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit_val = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset_val = Some(offset);
        self
    }

    pub(crate) fn set_window(&mut self, offset: Option<u64>, limit: Option<u64>) {
        self.offset_val = offset;
        self.limit_val = limit;
    }

    pub(crate) fn push_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub(crate) fn extend_conditions(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        self.conditions.extend(conditions);
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn ordering(&self) -> &[(String, Direction)] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit_val
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset_val
    }

    /// Build a SELECT query returning `(sql, bind_values)`.
    ///
    /// The `columns` parameter determines which columns to select (e.g., `"*"` or `"id, name"`).
    pub fn build_select(&self, columns: &str) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {columns} FROM {}", self.from_clause_raw());
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        infallible(self.append_where(&mut sql, &mut params, &mut placeholder_idx, &raw_column));
        infallible(self.append_order(&mut sql, &raw_column));
        self.append_limit_offset(&mut sql);
        (sql, params)
    }

    /// Build a SELECT query with validated identifiers.
    ///
    /// This method rejects invalid identifiers and optionally quotes them
    /// (depending on `identifier_policy`). Use it when identifiers can come
    /// from user input or when portability matters.
    pub fn build_select_checked(&self, columns: &[&str]) -> Result<(String, Vec<Value>), QueryError> {
        let from = self.from_clause_checked()?;
        let columns = self.format_column_list_checked(columns)?;
        let column = |c: &str| self.format_identifier_checked(c, false, "column");

        let mut sql = format!("SELECT {columns} FROM {from}");
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        self.append_where(&mut sql, &mut params, &mut placeholder_idx, &column)?;
        self.append_order(&mut sql, &column)?;
        self.append_limit_offset(&mut sql);
        Ok((sql, params))
    }

    /// Build a COUNT query returning `(sql, bind_values)`.
    ///
    /// Ordering, limit and offset are ignored.
    pub fn build_count(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.from_clause_raw());
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        infallible(self.append_where(&mut sql, &mut params, &mut placeholder_idx, &raw_column));
        (sql, params)
    }

    /// Build a COUNT query with validated identifiers.
    pub fn build_count_checked(&self) -> Result<(String, Vec<Value>), QueryError> {
        let from = self.from_clause_checked()?;
        let column = |c: &str| self.format_identifier_checked(c, false, "column");
        let mut sql = format!("SELECT COUNT(*) FROM {from}");
        let mut params = Vec::new();
        let mut placeholder_idx = 1usize;
        self.append_where(&mut sql, &mut params, &mut placeholder_idx, &column)?;
        Ok((sql, params))
    }

    fn from_clause_raw(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {alias}", self.table),
            None => self.table.clone(),
        }
    }

    fn from_clause_checked(&self) -> Result<String, QueryError> {
        let table = self.format_identifier_checked(&self.table, false, "table")?;
        match &self.alias {
            Some(alias) => {
                let alias = self.format_identifier_checked(alias, false, "alias")?;
                Ok(format!("{table} {alias}"))
            }
            None => Ok(table),
        }
    }

    fn next_placeholder(&self, placeholder_idx: &mut usize) -> String {
        let placeholder = self.dialect.placeholder(*placeholder_idx);
        *placeholder_idx += 1;
        placeholder
    }

    fn append_where<Er>(
        &self,
        sql: &mut String,
        params: &mut Vec<Value>,
        placeholder_idx: &mut usize,
        column: &dyn Fn(&str) -> Result<String, Er>,
    ) -> Result<(), Er> {
        if self.conditions.is_empty() {
            return Ok(());
        }
        sql.push_str(" WHERE ");
        let mut clauses = Vec::with_capacity(self.conditions.len());
        for cond in &self.conditions {
            clauses.push(self.render_condition(cond, params, placeholder_idx, column)?);
        }
        sql.push_str(&clauses.join(" AND "));
        Ok(())
    }

    fn render_condition<Er>(
        &self,
        cond: &Condition,
        params: &mut Vec<Value>,
        placeholder_idx: &mut usize,
        column: &dyn Fn(&str) -> Result<String, Er>,
    ) -> Result<String, Er> {
        let mut binary = |col: &str, op: &str, val: &Value| -> Result<String, Er> {
            let col = column(col)?;
            let placeholder = self.next_placeholder(placeholder_idx);
            params.push(val.clone());
            Ok(format!("{col} {op} {placeholder}"))
        };
        match cond {
            Condition::Eq(col, val) => binary(col, "=", val),
            Condition::NotEq(col, val) => binary(col, "!=", val),
            Condition::Like(col, pat) => binary(col, "LIKE", &Value::Text(pat.clone())),
            Condition::Gt(col, val) => binary(col, ">", val),
            Condition::Ge(col, val) => binary(col, ">=", val),
            Condition::Lt(col, val) => binary(col, "<", val),
            Condition::Le(col, val) => binary(col, "<=", val),
            Condition::In(col, vals) => {
                let col = column(col)?;
                if vals.is_empty() {
                    // `IN ()` is not valid SQL; an empty set matches nothing.
                    return Ok("1 = 0".to_string());
                }
                let placeholders: Vec<_> = vals
                    .iter()
                    .map(|_| self.next_placeholder(placeholder_idx))
                    .collect();
                params.extend(vals.iter().cloned());
                Ok(format!("{col} IN ({})", placeholders.join(", ")))
            }
            Condition::IsNull(col) => Ok(format!("{} IS NULL", column(col)?)),
            Condition::IsNotNull(col) => Ok(format!("{} IS NOT NULL", column(col)?)),
            Condition::Seek(terms) => {
                let mut branches = Vec::with_capacity(terms.len());
                for (i, term) in terms.iter().enumerate() {
                    let ascending = term.direction.is_ascending();
                    if !ascending && term.value.is_null() {
                        // Nothing sorts before NULL.
                        continue;
                    }
                    let mut parts = Vec::with_capacity(i + 1);
                    for prefix in &terms[..i] {
                        if prefix.value.is_null() {
                            parts.push(format!("{} IS NULL", column(&prefix.column)?));
                        } else {
                            parts.push(binary(&prefix.column, "=", &prefix.value)?);
                        }
                    }
                    parts.push(match (ascending, term.value.is_null()) {
                        (true, true) => format!("{} IS NOT NULL", column(&term.column)?),
                        (true, false) => binary(&term.column, ">", &term.value)?,
                        _ => {
                            let before = binary(&term.column, "<", &term.value)?;
                            format!("({before} OR {} IS NULL)", column(&term.column)?)
                        }
                    });
                    if parts.len() == 1 {
                        branches.push(parts.remove(0));
                    } else {
                        branches.push(format!("({})", parts.join(" AND ")));
                    }
                }
                if branches.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                Ok(format!("({})", branches.join(" OR ")))
            }
        }
    }

    fn append_order<Er>(
        &self,
        sql: &mut String,
        column: &dyn Fn(&str) -> Result<String, Er>,
    ) -> Result<(), Er> {
        if self.order.is_empty() {
            return Ok(());
        }
        sql.push_str(" ORDER BY ");
        let mut clauses = Vec::with_capacity(self.order.len());
        for (col, direction) in &self.order {
            clauses.push(format!("{} {}", column(col)?, direction.sql()));
        }
        sql.push_str(&clauses.join(", "));
        Ok(())
    }

    fn append_limit_offset(&self, sql: &mut String) {
        if let Some(limit) = self.limit_val {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset_val {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    fn format_column_list_checked(&self, columns: &[&str]) -> Result<String, QueryError> {
        let mut out = Vec::with_capacity(columns.len());
        for col in columns {
            out.push(self.format_identifier_checked(col, true, "column")?);
        }
        Ok(out.join(", "))
    }

    fn format_identifier_checked(
        &self,
        ident: &str,
        allow_star: bool,
        kind: &'static str,
    ) -> Result<String, QueryError> {
        if !is_valid_identifier(ident, allow_star) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        match self.identifier_policy {
            IdentifierPolicy::Quote => Ok(quote_identifier(ident, self.dialect, allow_star)),
            IdentifierPolicy::Raw | IdentifierPolicy::Validate => Ok(ident.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
        }
    }
}

impl std::error::Error for QueryError {}

fn raw_column(column: &str) -> Result<String, Infallible> {
    Ok(column.to_string())
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

pub(crate) fn is_valid_identifier(ident: &str, allow_star: bool) -> bool {
    if ident.is_empty() {
        return false;
    }
    let parts: Vec<&str> = ident.split('.').collect();
    for (idx, part) in parts.iter().enumerate() {
        if allow_star && *part == "*" {
            return idx + 1 == parts.len();
        }
        if !is_valid_segment(part) {
            return false;
        }
    }
    true
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect, allow_star: bool) -> String {
    let quote = dialect.quote_char();
    let parts: Vec<&str> = ident.split('.').collect();
    let last_idx = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .map(|(idx, part)| {
            if allow_star && part == "*" && idx == last_idx {
                part.to_string()
            } else {
                format!("{quote}{part}{quote}")
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Validate `ident` and quote it for `dialect`. For backends composing their
/// own write statements.
pub fn quote_checked(ident: &str, dialect: Dialect, kind: &'static str) -> Result<String, QueryError> {
    if !is_valid_identifier(ident, false) {
        return Err(QueryError::InvalidIdentifier {
            kind,
            ident: ident.to_string(),
        });
    }
    Ok(quote_identifier(ident, dialect, false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(v: &str) -> Value {
        Value::Text(v.to_string())
    }

    #[test]
    fn test_simple_select() {
        let (sql, params) = QueryBuilder::new("users").build_select("*");
        assert_eq!(sql, "SELECT * FROM users");
        assert!(params.is_empty());
    }

    #[test]
    fn test_where_eq() {
        let (sql, params) = QueryBuilder::new("users")
            .where_eq("email", "a@b.com")
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM users WHERE email = ?");
        assert_eq!(params, vec![text("a@b.com")]);
    }

    #[test]
    fn test_complex_query_with_alias() {
        let (sql, params) = QueryBuilder::new("users")
            .alias("e")
            .where_eq("status", "active")
            .where_like("name", "%alice%")
            .order_by("id", Direction::Asc)
            .limit(10)
            .offset(20)
            .build_select("id, name");
        assert_eq!(
            sql,
            "SELECT id, name FROM users e WHERE status = ? AND name LIKE ? ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![text("active"), text("%alice%")]);
    }

    #[test]
    fn test_count_query_ignores_order_and_window() {
        let (sql, params) = QueryBuilder::new("users")
            .where_eq("active", true)
            .order_by("name", Direction::Desc)
            .limit(5)
            .build_count();
        assert_eq!(sql, "SELECT COUNT(*) FROM users WHERE active = ?");
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_postgres_placeholders() {
        let (sql, params) = QueryBuilder::new_with_dialect("users", Dialect::Postgres)
            .where_eq("status", "active")
            .where_in("role", ["admin", "user"])
            .build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE status = $1 AND role IN ($2, $3)"
        );
        assert_eq!(params, vec![text("active"), text("admin"), text("user")]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let (sql, params) = QueryBuilder::new("users")
            .where_in("id", Vec::<i64>::new())
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM users WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_seek_condition_expansion() {
        let seek = Condition::Seek(vec![
            SeekTerm {
                column: "name".into(),
                direction: Direction::Asc,
                value: text("bob"),
            },
            SeekTerm {
                column: "id".into(),
                direction: Direction::Desc,
                value: Value::Int(7),
            },
        ]);
        let (sql, params) = QueryBuilder::new_with_dialect("users", Dialect::Postgres)
            .where_eq("active", true)
            .filter(seek)
            .build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE active = $1 AND (name > $2 OR (name = $3 AND id < $4))"
        );
        assert_eq!(
            params,
            vec![Value::Bool(true), text("bob"), text("bob"), Value::Int(7)]
        );
    }

    #[test]
    fn test_seek_with_null_boundary_values() {
        let term = |column: &str, direction, value| SeekTerm {
            column: column.into(),
            direction,
            value,
        };
        let (sql, params) = QueryBuilder::new("users")
            .filter(Condition::Seek(vec![
                term("team", Direction::Asc, Value::Null),
                term("id", Direction::Asc, Value::Int(5)),
            ]))
            .build_select("*");
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE (team IS NOT NULL OR (team IS NULL AND id > ?))"
        );
        assert_eq!(params, vec![Value::Int(5)]);

        let (sql, params) = QueryBuilder::new_with_dialect("users", Dialect::Postgres)
            .filter(Condition::Seek(vec![
                term("team", Direction::Desc, Value::Null),
                term("id", Direction::Asc, Value::Int(5)),
            ]))
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM users WHERE ((team IS NULL AND id > $1))");
        assert_eq!(params, vec![Value::Int(5)]);

        let (sql, params) = QueryBuilder::new("users")
            .filter(Condition::Seek(vec![term("team", Direction::Desc, text("even"))]))
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM users WHERE ((team < ? OR team IS NULL))");
        assert_eq!(params, vec![text("even")]);

        let (sql, params) = QueryBuilder::new("users")
            .filter(Condition::Seek(vec![term("team", Direction::Desc, Value::Null)]))
            .build_select("*");
        assert_eq!(sql, "SELECT * FROM users WHERE 1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn test_checked_identifiers_and_quoting() {
        let (sql, params) = QueryBuilder::new("users")
            .dialect(Dialect::Postgres)
            .identifier_policy(IdentifierPolicy::Quote)
            .where_eq("users.email", "a@b.com")
            .order_by("users.id", Direction::Asc)
            .build_select_checked(&["users.id", "users.email"])
            .unwrap();
        assert_eq!(
            sql,
            "SELECT \"users\".\"id\", \"users\".\"email\" FROM \"users\" WHERE \"users\".\"email\" = $1 ORDER BY \"users\".\"id\" ASC"
        );
        assert_eq!(params, vec![text("a@b.com")]);
    }

    #[test]
    fn test_checked_invalid_identifier() {
        let err = QueryBuilder::new("users;drop")
            .build_select_checked(&["*"])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { .. }));

        let err = QueryBuilder::new("users")
            .order_by("id desc; --", Direction::Asc)
            .build_select_checked(&["*"])
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidIdentifier { kind: "column", .. }));
    }

    #[test]
    fn test_clone_is_independent() {
        let base = QueryBuilder::new("users").where_eq("active", true);
        let derived = base.clone().where_gt("id", 10);
        assert_eq!(base.conditions().len(), 1);
        assert_eq!(derived.conditions().len(), 2);
    }

    #[test]
    fn test_quote_checked() {
        assert_eq!(quote_checked("order", Dialect::Sqlite, "column").unwrap(), "\"order\"");
        assert_eq!(quote_checked("name", Dialect::MySql, "column").unwrap(), "`name`");
        assert!(quote_checked("a b", Dialect::Sqlite, "column").is_err());
    }
}
