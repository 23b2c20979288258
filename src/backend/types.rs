//! Values and result shapes returned by a storage backend

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One cell as reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual rendering used when a cell is displayed rather than replayed.
    /// Blobs are decoded lossily as UTF-8.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Blob(v) => String::from_utf8_lossy(v).into_owned(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Integer(v) => JsonValue::from(*v),
            Value::Real(v) => JsonValue::from(*v),
            Value::Text(v) => JsonValue::from(v.as_str()),
            Value::Blob(v) => JsonValue::from(String::from_utf8_lossy(v).into_owned()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

/// Rows returned by a query, column names in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json_objects(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|row| {
                let object = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                JsonValue::Object(object)
            })
            .collect()
    }
}

/// One column as reported by a DESCRIBE-equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    /// `PRI` for primary-key columns, empty otherwise
    pub key: String,
    pub default: Option<String>,
}
