//! OpenAPI v3 schema fragments as embedded in resource definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchemaProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonSchemaProps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchemaProps>>,
    #[serde(
        rename = "x-kubernetes-preserve-unknown-fields",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preserve_unknown_fields: Option<bool>,
}

impl JsonSchemaProps {
    pub fn typed(type_: &str) -> Self {
        JsonSchemaProps { type_: Some(type_.to_string()), ..Default::default() }
    }

    pub fn object(properties: BTreeMap<String, JsonSchemaProps>) -> Self {
        JsonSchemaProps { properties, ..JsonSchemaProps::typed("object") }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn preserve_unknown(mut self) -> Self {
        self.preserve_unknown_fields = Some(true);
        self
    }

    pub fn type_name(&self) -> &str {
        self.type_.as_deref().unwrap_or("")
    }
}
