//! Generic entity handlers: list, count, read, create, update, delete.
//!
//! Every handler targets `/:table` and carries its filter in query params
//! (list, count) or in the body (filtered update/delete). Reserved params
//! keep their directive meaning; everything else filters a column. Values
//! that parse as JSON are taken as typed (`?status=[1,2]`, `?age={">":18}`),
//! anything else as a string. A whole filter object can also ride in a
//! single `filter` param.

use crate::error::AppError;
use crate::extractors::ConnectionName;
use crate::filter::Filter;
use crate::reshape::reshape;
use crate::response::{created_many, created_one, ok_many, ok_one};
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn resolve_connection(state: &AppState, header: Option<String>) -> String {
    header.unwrap_or_else(|| state.default_connection.clone())
}

/// Build the filter's JSON wire shape from query params.
fn filter_from_params(params: &HashMap<String, String>) -> Result<Filter, AppError> {
    let mut map = Map::new();
    for (key, raw) in params {
        if key == "filter" {
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| AppError::InvalidFilter(format!("'filter' is not valid JSON: {}", e)))?;
            let Value::Object(entries) = parsed else {
                return Err(AppError::InvalidFilter("'filter' must be a JSON object".into()));
            };
            for (k, v) in entries {
                map.insert(k, v);
            }
        } else {
            map.insert(key.clone(), parse_param_value(raw));
        }
    }
    Filter::from_value(&Value::Object(map))
}

/// Typed where possible, string otherwise. Reserved directives like `sort`
/// stay strings either way.
fn parse_param_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Path ids are numbers for serial keys, strings for uuid/text keys.
fn parse_id(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => Value::Number(n.into()),
        Err(_) => Value::String(id.to_string()),
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

pub async fn list(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let filter = filter_from_params(&params)?;
    let rows = CrudService::find(&state.registry, &connection, &table, &filter).await?;
    let data = match reshape(Value::Array(rows)) {
        Value::Array(rows) => rows,
        single => vec![single],
    };
    Ok(ok_many(data))
}

pub async fn count(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let filter = filter_from_params(&params)?;
    let count = CrudService::count(&state.registry, &connection, &table, &filter).await?;
    Ok(ok_one(serde_json::json!({ "count": count })))
}

pub async fn read(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let filter = Filter::by_id(parse_id(&id));
    let row = CrudService::find_one(&state.registry, &connection, &table, &filter)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{}/{}", table, id)))?;
    Ok(ok_one(reshape(row)))
}

pub async fn create(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;
    let connection = resolve_connection(&state, header);
    let created = CrudService::create(&state.registry, &connection, &table, &body).await?;
    Ok(match created {
        Value::Array(rows) => created_many(rows).into_response(),
        single => created_one(single).into_response(),
    })
}

/// PATCH /:table/:id — update one row by primary key.
pub async fn update(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let data = body_to_map(body)?;
    let filter = Filter::by_id(parse_id(&id));
    let updated = CrudService::update(&state.registry, &connection, &table, &filter, &data).await?;
    match updated {
        Value::Array(rows) if rows.is_empty() => {
            Err(AppError::NotFound(format!("{}/{}", table, id)))
        }
        single => Ok(ok_one(single)),
    }
}

/// PATCH /:table — update every row matching `filter` in the body:
/// `{"filter": {...}, "data": {...}}`.
pub async fn update_where(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let mut body = body_to_map(body)?;
    let data = match body.remove("data") {
        Some(Value::Object(map)) => map,
        _ => return Err(AppError::BadRequest("'data' object is required".into())),
    };
    let filter = Filter::from_value(body.get("filter").unwrap_or(&Value::Null))?;
    let updated = CrudService::update(&state.registry, &connection, &table, &filter, &data).await?;
    let rows = match updated {
        Value::Array(rows) => rows,
        single => vec![single],
    };
    Ok(ok_many(rows))
}

/// DELETE /:table/:id — delete one row by primary key.
pub async fn delete(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let filter = Filter::by_id(parse_id(&id));
    let removed = CrudService::remove(&state.registry, &connection, &table, &filter).await?;
    if removed.is_empty() {
        return Err(AppError::NotFound(format!("{}/{}", table, id)));
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// DELETE /:table — delete every row matching the `filter` body.
pub async fn delete_where(
    ConnectionName(header): ConnectionName,
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let connection = resolve_connection(&state, header);
    let filter = Filter::from_value(&body)?;
    if filter.predicates.is_empty() {
        // Deleting a whole table must be asked for explicitly.
        return Err(AppError::BadRequest(
            "refusing to delete without a filter; pass at least one predicate".into(),
        ));
    }
    let removed = CrudService::remove(&state.registry, &connection, &table, &filter).await?;
    Ok(ok_many(removed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_parse_as_typed_json_where_possible() {
        let mut params = HashMap::new();
        params.insert("status".to_string(), "[1,2]".to_string());
        params.insert("name".to_string(), "ada".to_string());
        params.insert("limit".to_string(), "10".to_string());
        let filter = filter_from_params(&params).unwrap();
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.predicates.len(), 2);
    }

    #[test]
    fn whole_filter_param_merges_with_direct_params() {
        let mut params = HashMap::new();
        params.insert("filter".to_string(), r#"{"age": {">": 18}}"#.to_string());
        params.insert("role".to_string(), "3".to_string());
        let filter = filter_from_params(&params).unwrap();
        assert_eq!(filter.predicates.len(), 2);
    }

    #[test]
    fn malformed_filter_param_is_rejected() {
        let mut params = HashMap::new();
        params.insert("filter".to_string(), "{not json".to_string());
        assert!(matches!(
            filter_from_params(&params),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn path_ids_type_by_shape() {
        assert_eq!(parse_id("42"), json!(42));
        assert_eq!(
            parse_id("7f2c1a90-9e3b-4b9a-8f63-0d6a24f5c9d1"),
            json!("7f2c1a90-9e3b-4b9a-8f63-0d6a24f5c9d1")
        );
    }
}
