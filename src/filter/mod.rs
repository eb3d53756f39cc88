//! Declarative row filters, parsed once from JSON into typed predicates.
//!
//! A filter is a JSON object mapping attribute names to match criteria,
//! with five reserved directive keys: `limit`, `skip`, `select`, `sort`,
//! `count`. Reserved keys are global; they can never name a column through
//! this interface. A bare number is shorthand for `{"id": n}`.

use crate::error::AppError;
use serde_json::{Map, Value};

/// Reserved directive keys, never interpreted as columns.
pub const RESERVED_KEYS: &[&str] = &["limit", "skip", "select", "sort", "count"];

/// Negation marker inside a criteria object: `{"status": {"!": [1, 2]}}`.
pub const NEGATION_OPERATOR: &str = "!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

/// Comparison operators accepted inside a criteria object. Operators are
/// interpolated into SQL text and must come from this whitelist; anything
/// else is an invalid filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    ILike,
}

impl Comparator {
    pub fn parse(op: &str) -> Option<Self> {
        match op.to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Comparator::Eq),
            "!=" | "<>" => Some(Comparator::Ne),
            "<" => Some(Comparator::Lt),
            "<=" => Some(Comparator::Le),
            ">" => Some(Comparator::Gt),
            ">=" => Some(Comparator::Ge),
            "like" => Some(Comparator::Like),
            "ilike" => Some(Comparator::ILike),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Like => "LIKE",
            Comparator::ILike => "ILIKE",
        }
    }
}

/// One parsed filter entry. All predicates on a filter combine with AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals { column: String, value: Value },
    InSet { column: String, values: Vec<Value> },
    NotInSet { column: String, values: Vec<Value> },
    Compare { column: String, op: Comparator, value: Value },
}

/// A parsed filter: predicates plus pagination, projection, and ordering
/// directives. An empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub predicates: Vec<Predicate>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
    pub select: Option<Vec<String>>,
    pub sort: Option<Sort>,
    pub count: Option<String>,
}

impl Filter {
    /// Match a single row by primary key.
    pub fn by_id(id: Value) -> Self {
        Filter {
            predicates: vec![Predicate::Equals {
                column: "id".to_string(),
                value: id,
            }],
            ..Filter::default()
        }
    }

    /// Parse a filter from its JSON wire shape. `null` means match-all; a
    /// bare number normalizes to `{"id": n}`.
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        match value {
            Value::Null => Ok(Filter::default()),
            Value::Number(_) => Ok(Filter::by_id(value.clone())),
            Value::Object(map) => Self::from_map(map),
            other => Err(AppError::InvalidFilter(format!(
                "expected an object or number, got {}",
                json_type_name(other)
            ))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, AppError> {
        let mut filter = Filter::default();
        for (key, value) in map {
            match key.as_str() {
                "limit" => filter.limit = Some(parse_page_size(key, value)?),
                "skip" => filter.skip = Some(parse_page_size(key, value)?),
                "select" => filter.select = Some(parse_select(value)?),
                "sort" => filter.sort = Some(parse_sort(value)?),
                "count" => filter.count = Some(parse_attribute(key, value)?),
                _ => parse_criteria(&mut filter.predicates, key, value)?,
            }
        }
        Ok(filter)
    }
}

fn parse_criteria(predicates: &mut Vec<Predicate>, column: &str, value: &Value) -> Result<(), AppError> {
    match value {
        Value::Array(values) => predicates.push(Predicate::InSet {
            column: column.to_string(),
            values: values.clone(),
        }),
        Value::Object(criteria) => {
            for (op, operand) in criteria {
                if op == NEGATION_OPERATOR {
                    let values = match operand {
                        Value::Array(values) => values.clone(),
                        single => vec![single.clone()],
                    };
                    predicates.push(Predicate::NotInSet {
                        column: column.to_string(),
                        values,
                    });
                } else {
                    let op = Comparator::parse(op).ok_or_else(|| {
                        AppError::InvalidFilter(format!("unknown operator '{}' on '{}'", op, column))
                    })?;
                    predicates.push(Predicate::Compare {
                        column: column.to_string(),
                        op,
                        value: operand.clone(),
                    });
                }
            }
        }
        scalar => predicates.push(Predicate::Equals {
            column: column.to_string(),
            value: scalar.clone(),
        }),
    }
    Ok(())
}

fn parse_page_size(key: &str, value: &Value) -> Result<u32, AppError> {
    let n = match value {
        Value::Number(n) => n.as_u64(),
        // Query-string values often arrive as strings.
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    let n = n.ok_or_else(|| {
        AppError::InvalidFilter(format!("'{}' must be a non-negative integer", key))
    })?;
    u32::try_from(n)
        .map_err(|_| AppError::InvalidFilter(format!("'{}' is out of range", key)))
}

fn parse_select(value: &Value) -> Result<Vec<String>, AppError> {
    let attributes: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|a| a.trim().to_string()).collect(),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let s = item.as_str().ok_or_else(|| {
                    AppError::InvalidFilter("'select' entries must be strings".into())
                })?;
                out.push(s.trim().to_string());
            }
            out
        }
        _ => {
            return Err(AppError::InvalidFilter(
                "'select' must be a string or array of strings".into(),
            ))
        }
    };
    let attributes: Vec<String> = attributes.into_iter().filter(|a| !a.is_empty()).collect();
    if attributes.is_empty() {
        return Err(AppError::InvalidFilter("'select' names no attributes".into()));
    }
    Ok(attributes)
}

fn parse_sort(value: &Value) -> Result<Sort, AppError> {
    let s = value
        .as_str()
        .ok_or_else(|| AppError::InvalidFilter("'sort' must be a string".into()))?;
    let mut parts = s.split_whitespace();
    let column = parts
        .next()
        .ok_or_else(|| AppError::InvalidFilter("'sort' names no attribute".into()))?
        .to_string();
    let direction = match parts.next() {
        None => SortDirection::Asc,
        Some(dir) => SortDirection::parse(dir).ok_or_else(|| {
            AppError::InvalidFilter(format!("'sort' direction must be asc or desc, got '{}'", dir))
        })?,
    };
    if parts.next().is_some() {
        return Err(AppError::InvalidFilter(
            "'sort' must be \"attribute direction\"".into(),
        ));
    }
    Ok(Sort { column, direction })
}

fn parse_attribute(key: &str, value: &Value) -> Result<String, AppError> {
    value
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::InvalidFilter(format!("'{}' must name an attribute", key)))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
