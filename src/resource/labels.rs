//! Index labels: indexed data fields mirrored into `crdbase.io/<field>` labels so the store
//! can select on them.

use crate::resource::{LABEL_MANAGED_BY, LABEL_PREFIX, MANAGED_BY};
use crate::schema::ModelSchema;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MAX_LABEL_LEN: usize = 63;

fn is_label_part(s: &str, allow_empty: bool) -> bool {
    if s.is_empty() {
        return allow_empty;
    }
    let bytes = s.as_bytes();
    bytes.len() <= MAX_LABEL_LEN
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

pub fn is_label_value(s: &str) -> bool {
    is_label_part(s, true)
}

/// Label key for an indexed field, if the field name fits a label name.
pub fn label_key(field: &str) -> Option<String> {
    is_label_part(field, false).then(|| format!("{}/{}", LABEL_PREFIX, field))
}

/// Label text of a stored scalar; `None` when the value has no label form.
pub fn label_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    is_label_value(&text).then_some(text)
}

/// Label text a filter value would match for a field of `field_type`. Only values whose
/// label text equals the stored label exactly qualify.
pub fn filter_label_text(field_type: &str, value: &Value) -> Option<String> {
    let text = match (field_type, value) {
        ("string", Value::String(s)) => s.clone(),
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
        ("integer", Value::String(s)) => s.parse::<i64>().ok().filter(|n| n.to_string() == *s).map(|_| s.clone())?,
        ("boolean", Value::Bool(b)) => b.to_string(),
        ("boolean", Value::String(s)) if s == "true" || s == "false" => s.clone(),
        _ => return None,
    };
    is_label_value(&text).then_some(text)
}

/// Managed-by label plus one label per indexed field with a label-safe value.
pub fn index_labels(schema: &ModelSchema, spec: &Map<String, Value>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string());
    for field in schema.indexed_fields() {
        let Some(key) = label_key(field) else { continue };
        if let Some(text) = spec.get(field).and_then(label_text) {
            labels.insert(key, text);
        }
    }
    labels
}
