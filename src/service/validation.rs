//! Data validation against the model's declared properties.

use crate::error::CrdbError;
use crate::schema::JsonSchemaProps;
use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub struct DataValidator;

impl DataValidator {
    /// Check every declared field present in `data` against its type and format.
    /// Undeclared fields are kept as they are; null is always accepted.
    pub fn validate(
        data: &Map<String, Value>,
        properties: &BTreeMap<String, JsonSchemaProps>,
    ) -> Result<(), CrdbError> {
        for (name, props) in properties {
            if let Some(v) = data.get(name) {
                validate_field(name, v, props)?;
            }
        }
        Ok(())
    }
}

fn type_matches(type_name: &str, v: &Value) -> bool {
    match type_name {
        "string" => v.is_string(),
        "integer" => v.is_i64() || v.is_u64(),
        "number" => v.is_number(),
        "boolean" => v.is_boolean(),
        "object" => v.is_object(),
        "array" => v.is_array(),
        _ => true,
    }
}

fn validate_field(path: &str, v: &Value, props: &JsonSchemaProps) -> Result<(), CrdbError> {
    if v.is_null() {
        return Ok(());
    }
    if !type_matches(props.type_name(), v) {
        return Err(CrdbError::Validation(format!("{} must be of type {}", path, props.type_name())));
    }
    if let Some(format) = &props.format {
        validate_format(path, v, format)?;
    }
    match v {
        Value::Object(map) => {
            for (name, inner) in &props.properties {
                if let Some(child) = map.get(name) {
                    validate_field(&format!("{}.{}", path, name), child, inner)?;
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_props) = &props.items {
                for (i, item) in items.iter().enumerate() {
                    validate_field(&format!("{}[{}]", path, i), item, item_props)?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_format(path: &str, v: &Value, format: &str) -> Result<(), CrdbError> {
    let ok = match format {
        "int32" => v.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
        "date-time" => v.as_str().is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        "uuid" => v.as_str().is_some_and(|s| Uuid::parse_str(s).is_ok()),
        _ => true,
    };
    if !ok {
        return Err(CrdbError::Validation(format!("{} must be a valid {}", path, format)));
    }
    Ok(())
}
