//! Compiles a parsed filter into one parameterized SQL statement.
//!
//! Identifiers (table, columns, sort attributes) are validated against a
//! strict pattern before they reach the SQL text; values only ever travel
//! as `$n` parameters. Pagination under join fan-out goes through a
//! distinct-key subquery so LIMIT applies to distinct primary keys, not to
//! duplicated joined rows. The whole statement, limiting and find-one
//! subqueries included, renders to a single SQL text executed in one round
//! trip.

use crate::error::AppError;
use crate::filter::{Filter, Predicate, SortDirection};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A rendered statement: SQL text with `$1..$n` placeholders and the
/// parameter values in order.
#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

fn check_ident(name: &str) -> Result<&str, AppError> {
    if ident_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(AppError::InvalidFilter(format!("invalid identifier '{}'", name)))
    }
}

fn quoted(name: &str) -> Result<String, AppError> {
    Ok(format!("\"{}\"", check_ident(name)?))
}

/// What the builder ultimately renders. Update and Delete reuse the same
/// WHERE clause the select path builds.
#[derive(Clone, Debug)]
enum StatementKind {
    Select,
    Update(Map<String, Value>),
    Delete,
}

/// A composable query on one table: predicates, projections, joins,
/// ordering, pagination, and the statement kind. Subqueries constraining
/// the primary key are builders themselves, rendered inline with a shared
/// parameter counter.
pub struct QueryBuilder {
    table: String,
    statement: StatementKind,
    predicates: Vec<Predicate>,
    projections: Vec<String>,
    joins: Vec<String>,
    order_by: Vec<(String, SortDirection)>,
    distinct_column: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
    id_in_subquery: Option<Box<QueryBuilder>>,
    id_eq_subquery: Option<Box<QueryBuilder>>,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Result<Self, AppError> {
        check_ident(table)?;
        Ok(QueryBuilder {
            table: table.to_string(),
            statement: StatementKind::Select,
            predicates: Vec::new(),
            projections: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            distinct_column: None,
            limit: None,
            offset: None,
            id_in_subquery: None,
            id_eq_subquery: None,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column reference scoped to this builder's table, so predicates stay
    /// unambiguous under joins.
    pub fn scoped(&self, column: &str) -> Result<String, AppError> {
        Ok(format!("{}.{}", quoted(&self.table)?, quoted(column)?))
    }

    pub fn push_predicate(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    /// Add a raw projection expression. Identifier safety is the caller's
    /// concern here; `compile` only passes validated references.
    pub fn project(&mut self, expression: String) -> &mut Self {
        self.projections.push(expression);
        self
    }

    pub fn left_join(&mut self, other: &str, other_column: &str, own_column: &str) -> Result<&mut Self, AppError> {
        let clause = format!(
            "LEFT JOIN {} ON {}.{} = {}",
            quoted(other)?,
            quoted(other)?,
            quoted(other_column)?,
            self.scoped(own_column)?
        );
        self.joins.push(clause);
        Ok(self)
    }

    pub fn order_by(&mut self, column: &str, direction: SortDirection) -> &mut Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u32) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Turn the query into `UPDATE .. SET .. RETURNING *`, keeping every
    /// predicate already applied. Rows to change are still selected by the
    /// same WHERE clause.
    pub fn update(&mut self, data: Map<String, Value>) -> &mut Self {
        self.statement = StatementKind::Update(data);
        self
    }

    /// Turn the query into `DELETE .. RETURNING *`.
    pub fn delete(&mut self) -> &mut Self {
        self.statement = StatementKind::Delete;
        self
    }

    pub fn render(&self) -> Result<QueryBuf, AppError> {
        let mut buf = QueryBuf::new();
        match &self.statement {
            StatementKind::Select => {
                let sql = self.render_select(&mut buf)?;
                buf.sql = sql;
            }
            StatementKind::Update(data) => {
                if data.is_empty() {
                    return Err(AppError::BadRequest("update carries no attributes".into()));
                }
                let mut sets = Vec::with_capacity(data.len());
                for (column, value) in data {
                    let n = buf.push_param(value.clone());
                    sets.push(format!("{} = ${}", quoted(column)?, n));
                }
                let where_clause = self.render_where(&mut buf)?;
                buf.sql = format!(
                    "UPDATE {} SET {}{} RETURNING *",
                    quoted(&self.table)?,
                    sets.join(", "),
                    where_clause
                );
            }
            StatementKind::Delete => {
                let where_clause = self.render_where(&mut buf)?;
                buf.sql = format!(
                    "DELETE FROM {}{} RETURNING *",
                    quoted(&self.table)?,
                    where_clause
                );
            }
        }
        Ok(buf)
    }

    /// Render the select form of this builder into `buf`'s parameter list,
    /// returning the SQL text. Subqueries call this on a shared buffer so
    /// placeholder numbering stays global.
    fn render_select(&self, buf: &mut QueryBuf) -> Result<String, AppError> {
        let projection = if let Some(column) = &self.distinct_column {
            format!("DISTINCT {}", self.scoped(column)?)
        } else if self.projections.is_empty() {
            format!("{}.*", quoted(&self.table)?)
        } else {
            self.projections.join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", projection, quoted(&self.table)?);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.render_where(buf)?);

        if !self.order_by.is_empty() {
            let mut parts = Vec::with_capacity(self.order_by.len());
            for (column, direction) in &self.order_by {
                parts.push(format!("{} {}", self.scoped(column)?, direction.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(sql)
    }

    /// Render `" WHERE ..."` (or nothing), pushing parameters in text order.
    fn render_where(&self, buf: &mut QueryBuf) -> Result<String, AppError> {
        let mut parts = Vec::new();
        for predicate in &self.predicates {
            parts.push(self.render_predicate(predicate, buf)?);
        }
        if let Some(sub) = &self.id_in_subquery {
            let inner = sub.render_select(buf)?;
            parts.push(format!("{} IN ({})", self.scoped("id")?, inner));
        }
        if let Some(sub) = &self.id_eq_subquery {
            let inner = sub.render_select(buf)?;
            parts.push(format!("{} = ({})", self.scoped("id")?, inner));
        }
        if parts.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", parts.join(" AND ")))
        }
    }

    fn render_predicate(&self, predicate: &Predicate, buf: &mut QueryBuf) -> Result<String, AppError> {
        Ok(match predicate {
            Predicate::Equals { column, value } => {
                if value.is_null() {
                    format!("{} IS NULL", self.scoped(column)?)
                } else {
                    let n = buf.push_param(value.clone());
                    format!("{} = ${}", self.scoped(column)?, n)
                }
            }
            Predicate::InSet { column, values } => {
                if values.is_empty() {
                    // IN () is a syntax error; an empty set matches nothing.
                    "1 = 0".to_string()
                } else {
                    let placeholders = self.push_set(values, buf);
                    format!("{} IN ({})", self.scoped(column)?, placeholders)
                }
            }
            Predicate::NotInSet { column, values } => {
                if values.is_empty() {
                    "1 = 1".to_string()
                } else {
                    // Native NOT IN: rows with NULL in the column do not
                    // match, same as the backing engine's semantics.
                    let placeholders = self.push_set(values, buf);
                    format!("{} NOT IN ({})", self.scoped(column)?, placeholders)
                }
            }
            Predicate::Compare { column, op, value } => {
                let n = buf.push_param(value.clone());
                format!("{} {} ${}", self.scoped(column)?, op.as_sql(), n)
            }
        })
    }

    fn push_set(&self, values: &[Value], buf: &mut QueryBuf) -> String {
        values
            .iter()
            .map(|v| format!("${}", buf.push_param(v.clone())))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Multi-row INSERT with `RETURNING *`. The column set is the union of the
/// rows' keys; a row missing a column binds NULL so the statement stays
/// rectangular.
pub fn insert(table: &str, rows: &[&Map<String, Value>]) -> Result<QueryBuf, AppError> {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    if columns.is_empty() {
        return Err(AppError::BadRequest("insert carries no attributes".into()));
    }
    let mut buf = QueryBuf::new();
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut placeholders = Vec::with_capacity(columns.len());
        for column in &columns {
            let n = buf.push_param(row.get(*column).cloned().unwrap_or(Value::Null));
            placeholders.push(format!("${}", n));
        }
        tuples.push(format!("({})", placeholders.join(", ")));
    }
    let column_list = columns
        .iter()
        .map(|c| quoted(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    buf.sql = format!(
        "INSERT INTO {} ({}) VALUES {} RETURNING *",
        quoted(table)?,
        column_list,
        tuples.join(", ")
    );
    Ok(buf)
}

/// Options for `compile`.
pub struct FindOptions<'a> {
    /// Constrain the result to the first matching primary key.
    pub find_one: bool,
    /// Skip the default `SELECT table.*` projection (the caller's `modify`
    /// supplies the statement shape instead).
    pub no_selects: bool,
    /// Runs against the composed builder after predicate application; the
    /// hook that turns a filtered SELECT into an UPDATE or DELETE, or adds
    /// joins and extra projections.
    pub modify: Option<&'a dyn Fn(&mut QueryBuilder)>,
}

impl Default for FindOptions<'_> {
    fn default() -> Self {
        FindOptions {
            find_one: false,
            no_selects: false,
            modify: None,
        }
    }
}

/// Compile a parsed filter against a table into one executable statement.
///
/// With `limit`, pagination goes through an embedded
/// `DISTINCT table.id .. LIMIT .. OFFSET` subquery derived independently
/// from the same filter, so page windows count distinct keys even when the
/// caller's `modify` joined in duplicate-producing relations. With
/// `find_one`, the statement is constrained to the single first matching
/// key (ordered by `sort`, falling back to the key itself ascending).
pub fn compile(table: &str, filter: &Filter, options: FindOptions<'_>) -> Result<QueryBuf, AppError> {
    let mut query = QueryBuilder::new(table)?;
    query.predicates = filter.predicates.clone();

    if let Some(limit) = filter.limit {
        let mut limiting = QueryBuilder::new(table)?;
        limiting.predicates = filter.predicates.clone();
        if let Some(modify) = options.modify {
            modify(&mut limiting);
        }
        limiting.distinct_column = Some("id".to_string());
        limiting.limit = Some(limit);
        limiting.offset = filter.skip;
        query.id_in_subquery = Some(Box::new(limiting));
    }

    if !options.no_selects {
        if let Some(count) = &filter.count {
            let expression = format!("COUNT({}) AS \"count\"", query.scoped(count)?);
            query.project(expression);
        } else if let Some(select) = &filter.select {
            let mut columns: Vec<&str> = select.iter().map(String::as_str).collect();
            if !columns.contains(&"id") {
                columns.push("id");
            }
            for column in columns {
                let reference = query.scoped(column)?;
                query.project(reference);
            }
        }
        if let Some(sort) = &filter.sort {
            query.order_by(&sort.column, sort.direction);
        }
    }

    if let Some(modify) = options.modify {
        modify(&mut query);
    }

    if options.find_one {
        let mut first = QueryBuilder::new(table)?;
        first.predicates = filter.predicates.clone();
        let id_reference = first.scoped("id")?;
        first.project(id_reference);
        match &filter.sort {
            Some(sort) => first.order_by(&sort.column, sort.direction),
            None => first.order_by("id", SortDirection::Asc),
        };
        first.limit = Some(1);
        query.id_eq_subquery = Some(Box::new(first));
    }

    query.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use serde_json::json;

    fn parse(filter: serde_json::Value) -> Filter {
        Filter::from_value(&filter).unwrap()
    }

    #[test]
    fn equality_filter_compiles_to_scoped_where() {
        let q = compile("user", &parse(json!({"age": 30})), FindOptions::default()).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."age" = $1"#
        );
        assert_eq!(q.params, vec![json!(30)]);
    }

    #[test]
    fn empty_filter_matches_all() {
        let q = compile("user", &Filter::default(), FindOptions::default()).unwrap();
        assert_eq!(q.sql, r#"SELECT "user".* FROM "user""#);
        assert!(q.params.is_empty());
    }

    #[test]
    fn bare_number_filters_by_id() {
        let q = compile("user", &parse(json!(7)), FindOptions::default()).unwrap();
        assert_eq!(q.sql, r#"SELECT "user".* FROM "user" WHERE "user"."id" = $1"#);
        assert_eq!(q.params, vec![json!(7)]);
    }

    #[test]
    fn array_filter_compiles_to_in_set() {
        let q = compile("user", &parse(json!({"status": [1, 2]})), FindOptions::default()).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."status" IN ($1, $2)"#
        );
        assert_eq!(q.params, vec![json!(1), json!(2)]);
    }

    #[test]
    fn empty_in_set_matches_nothing() {
        let q = compile("user", &parse(json!({"status": []})), FindOptions::default()).unwrap();
        assert_eq!(q.sql, r#"SELECT "user".* FROM "user" WHERE 1 = 0"#);
    }

    #[test]
    fn negation_compiles_to_not_in() {
        let q = compile("user", &parse(json!({"status": {"!": [1, 2]}})), FindOptions::default())
            .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."status" NOT IN ($1, $2)"#
        );
        assert_eq!(q.params, vec![json!(1), json!(2)]);
    }

    #[test]
    fn comparison_compiles_with_operator() {
        let q = compile("user", &parse(json!({"age": {">": 18}})), FindOptions::default()).unwrap();
        assert_eq!(q.sql, r#"SELECT "user".* FROM "user" WHERE "user"."age" > $1"#);
        assert_eq!(q.params, vec![json!(18)]);
    }

    #[test]
    fn null_equality_compiles_to_is_null() {
        let q = compile("user", &parse(json!({"deleted_at": null})), FindOptions::default()).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."deleted_at" IS NULL"#
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn pagination_goes_through_distinct_key_subquery() {
        let q = compile(
            "user",
            &parse(json!({"role": 5, "limit": 10, "skip": 20})),
            FindOptions::default(),
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."role" = $1 AND "user"."id" IN (SELECT DISTINCT "user"."id" FROM "user" WHERE "user"."role" = $2 LIMIT 10 OFFSET 20)"#
        );
        assert_eq!(q.params, vec![json!(5), json!(5)]);
    }

    #[test]
    fn limit_without_skip_omits_offset() {
        let q = compile("user", &parse(json!({"limit": 3})), FindOptions::default()).unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."id" IN (SELECT DISTINCT "user"."id" FROM "user" LIMIT 3)"#
        );
    }

    #[test]
    fn select_projects_named_columns_plus_id() {
        let q = compile(
            "user",
            &parse(json!({"select": "name, email"})),
            FindOptions::default(),
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user"."name", "user"."email", "user"."id" FROM "user""#
        );
    }

    #[test]
    fn select_does_not_duplicate_id() {
        let q = compile("user", &parse(json!({"select": "id, name"})), FindOptions::default())
            .unwrap();
        assert_eq!(q.sql, r#"SELECT "user"."id", "user"."name" FROM "user""#);
    }

    #[test]
    fn count_wins_over_select() {
        let q = compile(
            "user",
            &parse(json!({"count": "id", "select": "name"})),
            FindOptions::default(),
        )
        .unwrap();
        assert_eq!(q.sql, r#"SELECT COUNT("user"."id") AS "count" FROM "user""#);
    }

    #[test]
    fn sort_orders_scoped_column() {
        let q = compile("user", &parse(json!({"sort": "name desc"})), FindOptions::default())
            .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" ORDER BY "user"."name" DESC"#
        );
    }

    #[test]
    fn find_one_constrains_to_first_key() {
        let q = compile(
            "user",
            &parse(json!({"name": "ada"})),
            FindOptions {
                find_one: true,
                ..FindOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."name" = $1 AND "user"."id" = (SELECT "user"."id" FROM "user" WHERE "user"."name" = $2 ORDER BY "user"."id" ASC LIMIT 1)"#
        );
        assert_eq!(q.params, vec![json!("ada"), json!("ada")]);
    }

    #[test]
    fn find_one_honors_sort() {
        let q = compile(
            "user",
            &parse(json!({"sort": "age desc"})),
            FindOptions {
                find_one: true,
                ..FindOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" WHERE "user"."id" = (SELECT "user"."id" FROM "user" ORDER BY "user"."age" DESC LIMIT 1) ORDER BY "user"."age" DESC"#
        );
    }

    #[test]
    fn modify_turns_select_into_update() {
        let data: Map<String, Value> = serde_json::from_value(json!({"name": "new"})).unwrap();
        let q = compile(
            "user",
            &parse(json!({"id": 7})),
            FindOptions {
                no_selects: true,
                modify: Some(&|query| {
                    query.update(data.clone());
                }),
                ..FindOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"UPDATE "user" SET "name" = $1 WHERE "user"."id" = $2 RETURNING *"#
        );
        assert_eq!(q.params, vec![json!("new"), json!(7)]);
    }

    #[test]
    fn modify_turns_select_into_delete() {
        let q = compile(
            "user",
            &parse(json!({"status": 0})),
            FindOptions {
                no_selects: true,
                modify: Some(&|query| {
                    query.delete();
                }),
                ..FindOptions::default()
            },
        )
        .unwrap();
        assert_eq!(
            q.sql,
            r#"DELETE FROM "user" WHERE "user"."status" = $1 RETURNING *"#
        );
        assert_eq!(q.params, vec![json!(0)]);
    }

    #[test]
    fn modify_can_join_for_predicate_support() {
        let q = compile(
            "user",
            &parse(json!({"limit": 5})),
            FindOptions {
                modify: Some(&|query| {
                    query.left_join("order", "user_id", "id").unwrap();
                }),
                ..FindOptions::default()
            },
        )
        .unwrap();
        // Both the base and the limiting query carry the join, and the page
        // window still counts distinct keys.
        assert_eq!(
            q.sql,
            r#"SELECT "user".* FROM "user" LEFT JOIN "order" ON "order"."user_id" = "user"."id" WHERE "user"."id" IN (SELECT DISTINCT "user"."id" FROM "user" LEFT JOIN "order" ON "order"."user_id" = "user"."id" LIMIT 5)"#
        );
    }

    #[test]
    fn hostile_identifiers_are_rejected() {
        assert!(compile("user; DROP TABLE x", &Filter::default(), FindOptions::default()).is_err());
        assert!(compile("user", &parse(json!({"a\"b": 1})), FindOptions::default()).is_err());
        assert!(compile("user", &parse(json!({"sort": "na;me"})), FindOptions::default()).is_err());
    }

    #[test]
    fn insert_builds_multi_row_values() {
        let a: Map<String, Value> = serde_json::from_value(json!({"name": "x", "age": 1})).unwrap();
        let b: Map<String, Value> = serde_json::from_value(json!({"name": "y"})).unwrap();
        let q = insert("user", &[&a, &b]).unwrap();
        assert_eq!(
            q.sql,
            r#"INSERT INTO "user" ("age", "name") VALUES ($1, $2), ($3, $4) RETURNING *"#
        );
        assert_eq!(q.params, vec![json!(1), json!("x"), json!(null), json!("y")]);
    }

    #[test]
    fn insert_rejects_hostile_column() {
        let a: Map<String, Value> = serde_json::from_value(json!({"na\"me": "x"})).unwrap();
        assert!(insert("user", &[&a]).is_err());
    }

    #[test]
    fn update_with_no_attributes_is_rejected() {
        let data = Map::new();
        let err = compile(
            "user",
            &parse(json!({"id": 1})),
            FindOptions {
                no_selects: true,
                modify: Some(&|query| {
                    query.update(data.clone());
                }),
                ..FindOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
