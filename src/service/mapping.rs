//! Instance <-> data section. Serialized keys are renamed to declared names on the way in
//! and back on the way out. Hidden fields are dropped from documents; keys the schema does
//! not declare pass through untouched.

use crate::error::CrdbError;
use crate::schema::{FieldMapping, ModelSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Copy)]
enum Side {
    ToDocument,
    FromDocument,
}

impl Side {
    fn from_key(self, f: &FieldMapping) -> Option<&str> {
        match self {
            Side::ToDocument => Some(&f.rust_name),
            Side::FromDocument => (!f.hidden).then_some(f.name.as_str()),
        }
    }

    fn to_key(self, f: &FieldMapping) -> &str {
        match self {
            Side::ToDocument => &f.name,
            Side::FromDocument => &f.rust_name,
        }
    }
}

fn rename_map(map: Map<String, Value>, fields: &[FieldMapping], side: Side) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        match fields.iter().find(|f| side.from_key(f) == Some(key.as_str())) {
            Some(f) if f.hidden => {}
            Some(f) => {
                out.insert(side.to_key(f).to_string(), rename_value(value, &f.nested, side));
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    out
}

fn rename_value(value: Value, nested: &[FieldMapping], side: Side) -> Value {
    if nested.is_empty() {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(rename_map(map, nested, side)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| rename_value(v, nested, side)).collect()),
        other => other,
    }
}

/// Serialize `instance` into a data section keyed by declared names.
pub fn to_data<M: Serialize>(schema: &ModelSchema, instance: &M) -> Result<Map<String, Value>, CrdbError> {
    match serde_json::to_value(instance) {
        Ok(Value::Object(map)) => Ok(rename_map(map, &schema.fields, Side::ToDocument)),
        Ok(other) => Err(CrdbError::Mapping(format!(
            "{} must serialize to an object, got {}",
            schema.kind(),
            json_type(&other)
        ))),
        Err(e) => Err(CrdbError::Mapping(format!("encode {}: {}", schema.kind(), e))),
    }
}

/// Decode a data section back into the model type.
pub fn from_data<M: DeserializeOwned>(schema: &ModelSchema, data: &Map<String, Value>) -> Result<M, CrdbError> {
    let renamed = rename_map(data.clone(), &schema.fields, Side::FromDocument);
    serde_json::from_value(Value::Object(renamed))
        .map_err(|e| CrdbError::Mapping(format!("decode {}: {}", schema.kind(), e)))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build_schema, FieldSchema, SchemaBuilder};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Owner {
        display_name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Repo {
        name: String,
        star_count: i64,
        owner: Owner,
        maintainers: Vec<Owner>,
    }

    fn schema() -> ModelSchema {
        let mut b = SchemaBuilder::default();
        b.field("name", FieldSchema::string()).tag("name,primaryKey");
        b.field("star_count", FieldSchema::integer()).tag("stars");
        let owner = || {
            FieldSchema::object(|o| {
                o.field("display_name", FieldSchema::string()).tag("displayName");
            })
        };
        b.field("owner", owner());
        b.field("maintainers", FieldSchema::array(owner()));
        build_schema("Repo", "Repo", &b).unwrap()
    }

    fn repo() -> Repo {
        Repo {
            name: "crdbase".into(),
            star_count: 3,
            owner: Owner { display_name: "Ada".into() },
            maintainers: vec![Owner { display_name: "Bob".into() }],
        }
    }

    #[test]
    fn uses_declared_names_recursively() {
        let data = to_data(&schema(), &repo()).unwrap();
        assert_eq!(
            Value::Object(data),
            json!({
                "name": "crdbase",
                "stars": 3,
                "owner": {"displayName": "Ada"},
                "maintainers": [{"displayName": "Bob"}]
            })
        );
    }

    #[test]
    fn decodes_back_ignoring_unknown_keys() {
        let schema = schema();
        let mut data = to_data(&schema, &repo()).unwrap();
        data.insert("addedLater".into(), json!(true));
        let back: Repo = from_data(&schema, &data).unwrap();
        assert_eq!(back, repo());
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Login {
        user: String,
        #[serde(default)]
        token: String,
        profile: Profile,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        email: String,
        #[serde(default)]
        password: String,
    }

    #[test]
    fn hidden_fields_are_not_stored() {
        let mut b = SchemaBuilder::default();
        b.field("user", FieldSchema::string()).tag("user,primaryKey");
        b.field("token", FieldSchema::string()).tag("-");
        b.field("profile", FieldSchema::object(|p| {
            p.field("email", FieldSchema::string());
            p.field("password", FieldSchema::string()).tag("-");
        }));
        let schema = build_schema("Login", "Login", &b).unwrap();

        let login = Login {
            user: "ada".into(),
            token: "s3cret".into(),
            profile: Profile { email: "ada@example.com".into(), password: "hunter2".into() },
        };
        let data = to_data(&schema, &login).unwrap();
        assert_eq!(
            Value::Object(data.clone()),
            json!({"user": "ada", "profile": {"email": "ada@example.com"}})
        );

        let back: Login = from_data(&schema, &data).unwrap();
        assert_eq!(back.token, "");
        assert_eq!(back.profile.password, "");
        assert_eq!(back.profile.email, "ada@example.com");
    }

    #[test]
    fn non_objects_are_mapping_errors() {
        assert!(matches!(to_data(&schema(), &5), Err(CrdbError::Mapping(_))));
        let data = json!({"name": "x"}).as_object().cloned().unwrap();
        assert!(matches!(from_data::<Repo>(&schema(), &data), Err(CrdbError::Mapping(_))));
    }
}
