//! SQL literal rendering for dumped rows

use std::fmt::Write;

use crate::backend::Value;

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a value so that it can be pasted into an `INSERT ... VALUES (...)`.
///
/// `NULL` for null, single-quoted text with embedded quotes doubled, `X'..'`
/// hex for blobs, the plain textual form for numbers.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => {
            if v.is_finite() {
                v.to_string()
            } else {
                "NULL".to_string()
            }
        }
        Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
        Value::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for byte in bytes {
                let _ = write!(out, "{:02X}", byte);
            }
            out.push('\'');
            out
        }
    }
}
