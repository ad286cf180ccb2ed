//! Query-related data models.
//!
//! This module defines parameter values and the driver-level result shape
//! shared by the query guard and the introspection tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit injected into unbounded SELECT statements.
pub const DEFAULT_ROW_LIMIT: i64 = 1000;

/// Smallest accepted row limit.
pub const MIN_ROW_LIMIT: i64 = 1;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: i64 = 10000;

/// A positional parameter value for parameterized queries.
///
/// Values are opaque to the guard. At bind time each one is read as the
/// type the server infers for its placeholder, as if it had been written
/// there as an untyped literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects
    Json(JsonValue),
}

impl QueryParam {
    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }

    /// Convert one element of a JSON array parameter.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(*v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// Literal text of the value, `None` for NULL.
    ///
    /// Arrays render as Postgres array literals (`{1,"a b",NULL}`), objects
    /// as JSON text.
    pub fn literal(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::String(v) => Some(v.clone()),
            Self::Json(JsonValue::Array(items)) => Some(array_literal(items)),
            Self::Json(v) => Some(v.to_string()),
        }
    }
}

fn array_literal(items: &[JsonValue]) -> String {
    let elements: Vec<String> = items
        .iter()
        .map(|item| match item {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::Array(nested) => array_literal(nested),
            JsonValue::String(s) => quote_element(s),
            JsonValue::Object(_) => quote_element(&item.to_string()),
            other => other.to_string(),
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn quote_element(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Column descriptor of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    /// Postgres type OID
    #[serde(rename = "dataTypeID")]
    pub data_type_id: u32,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, data_type_id: u32) -> Self {
        Self {
            name: name.into(),
            data_type_id,
        }
    }
}

/// Native result of running one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows returned (SELECT) or affected (INSERT/UPDATE) as reported by the server.
    pub row_count: u64,
    pub fields: Vec<FieldInfo>,
}

impl RawQueryResult {
    /// Build a result whose row count equals the number of rows.
    pub fn from_rows(rows: Vec<serde_json::Map<String, JsonValue>>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            rows,
            row_count,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldInfo>) -> Self {
        self.fields = fields;
        self
    }

    /// Read a text column from a row.
    pub fn text(row: &serde_json::Map<String, JsonValue>, column: &str) -> Option<String> {
        match row.get(column)? {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Read an integer column from a row, accepting numeric text.
    pub fn integer(row: &serde_json::Map<String, JsonValue>, column: &str) -> Option<i64> {
        match row.get(column)? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
