//! Generic CRUD execution against PostgreSQL: filters in, JSON rows out.

use crate::error::AppError;
use crate::filter::Filter;
use crate::registry::ConnectionRegistry;
use crate::sql::{compile, FindOptions, PgBindValue, QueryBuf};
use serde_json::{Map, Value};
use sqlx::PgPool;

pub struct CrudService;

impl CrudService {
    /// Find all rows matching the filter.
    pub async fn find(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, AppError> {
        let pool = registry.get(connection)?;
        let q = compile(table, filter, FindOptions::default())?;
        Self::query_many(pool, &q).await
    }

    /// Find the first row matching the filter, or None. Ordered by the
    /// filter's sort, falling back to the primary key ascending.
    pub async fn find_one(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<Option<Value>, AppError> {
        let pool = registry.get(connection)?;
        let q = compile(
            table,
            filter,
            FindOptions {
                find_one: true,
                ..FindOptions::default()
            },
        )?;
        Self::query_optional(pool, &q).await
    }

    /// Count rows matching the filter. Counts the filter's `count`
    /// attribute when set, else the primary key.
    pub async fn count(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<i64, AppError> {
        let pool = registry.get(connection)?;
        let mut filter = filter.clone();
        if filter.count.is_none() {
            filter.count = Some("id".to_string());
        }
        let q = compile(table, &filter, FindOptions::default())?;
        let row = Self::query_optional(pool, &q).await?;
        Ok(row
            .as_ref()
            .and_then(|r| r.get("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Insert one row (object) or several (array of objects), returning the
    /// created row(s). A single created row comes back as a bare object.
    pub async fn create(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        data: &Value,
    ) -> Result<Value, AppError> {
        let pool = registry.get(connection)?;
        let rows: Vec<&Map<String, Value>> = match data {
            Value::Object(map) => vec![map],
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.as_object().ok_or_else(|| {
                        AppError::BadRequest("create expects objects".into())
                    })?);
                }
                out
            }
            _ => return Err(AppError::BadRequest("create expects an object or array".into())),
        };
        if rows.is_empty() {
            return Err(AppError::BadRequest("create carries no rows".into()));
        }
        let q = crate::sql::insert(table, &rows)?;
        let created = Self::query_many(pool, &q).await?;
        Ok(Self::collapse_single(created))
    }

    /// Update all rows matching the filter, returning the changed row(s).
    pub async fn update(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        filter: &Filter,
        data: &Map<String, Value>,
    ) -> Result<Value, AppError> {
        let pool = registry.get(connection)?;
        let q = compile(
            table,
            filter,
            FindOptions {
                no_selects: true,
                modify: Some(&|query| {
                    query.update(data.clone());
                }),
                ..FindOptions::default()
            },
        )?;
        let updated = Self::query_many(pool, &q).await?;
        Ok(Self::collapse_single(updated))
    }

    /// Delete all rows matching the filter, returning the deleted rows.
    pub async fn remove(
        registry: &ConnectionRegistry,
        connection: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<Vec<Value>, AppError> {
        let pool = registry.get(connection)?;
        let q = compile(
            table,
            filter,
            FindOptions {
                no_selects: true,
                modify: Some(&|query| {
                    query.delete();
                }),
                ..FindOptions::default()
            },
        )?;
        Self::query_many(pool, &q).await
    }

    /// One created/updated record is handed back bare, several as an array.
    fn collapse_single(mut rows: Vec<Value>) -> Value {
        if rows.len() == 1 {
            rows.remove(0)
        } else {
            Value::Array(rows)
        }
    }

    async fn query_many(pool: &PgPool, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(pool: &PgPool, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }
}

/// Decode a row to a JSON object keyed by column alias. Dotted and
/// bracketed aliases come through verbatim, ready for the reshaper.
pub fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        map.insert(sqlx::Column::name(col).to_string(), cell_to_value(row, col));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, col: &sqlx::postgres::PgColumn) -> Value {
    use sqlx::{Column, Row, TypeInfo};
    let name = col.name();
    match col.type_info().name() {
        "INT2" => row
            .try_get::<Option<i16>, _>(name)
            .ok()
            .flatten()
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(name)
            .ok()
            .flatten()
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(name)
            .ok()
            .flatten()
            .map(|n| Value::Number(n.into()))
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(name)
            .ok()
            .flatten()
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(name)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(name)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(name)
            .ok()
            .flatten()
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(name)
            .ok()
            .flatten()
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(name)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        _ => {
            // TEXT, VARCHAR, enums, and anything else that decodes as text.
            if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
                return Value::String(s);
            }
            if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
                return j;
            }
            Value::Null
        }
    }
}
