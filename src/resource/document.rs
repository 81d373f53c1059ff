//! Stored documents: the envelope every model instance is persisted in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        ObjectMeta { name: name.into(), ..Default::default() }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectMeta { name: name.into(), namespace: Some(namespace.into()), ..Default::default() }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.as_deref().unwrap_or_default(), &self.name)
    }
}

/// Namespace and name of an object; the empty namespace means cluster scope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectKey { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl StoredDocument {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// Value at a dotted path.
    ///
    /// Paths rooted at `apiVersion`, `kind`, `metadata`, `spec` or `status` address the
    /// envelope; any other path is relative to `spec`. A leading '.' is ignored, so
    /// `.metadata.name`, `spec.type` and `type` all work.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let path = path.trim_start_matches('.');
        if path.is_empty() {
            return None;
        }
        let mut parts = path.split('.');
        let head = parts.next()?;
        match head {
            "apiVersion" => leaf(Value::String(self.api_version.clone()), parts),
            "kind" => leaf(Value::String(self.kind.clone()), parts),
            "metadata" => descend(&serde_json::to_value(&self.metadata).ok()?, parts),
            "spec" => match parts.next() {
                None => Some(Value::Object(self.spec.clone())),
                Some(first) => descend(self.spec.get(first)?, parts),
            },
            "status" => descend(self.status.as_ref()?, parts),
            _ => descend(self.spec.get(head)?, parts),
        }
    }
}

fn leaf<'a>(value: Value, mut rest: impl Iterator<Item = &'a str>) -> Option<Value> {
    rest.next().is_none().then_some(value)
}

fn descend<'a>(mut value: &Value, rest: impl Iterator<Item = &'a str>) -> Option<Value> {
    for part in rest {
        value = match value {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value.clone())
}
