//! Resource definitions synthesized from model schemas.

use crate::config::GroupVersion;
use crate::error::CrdbError;
use crate::naming::KindNames;
use crate::resource::document::ObjectMeta;
use crate::resource::{ApiResource, ANNOTATION_API_VERSION, ANNOTATION_VERSION};
use crate::schema::{JsonSchemaProps, ModelSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFINITION_API_VERSION: &str = "apiextensions.k8s.io/v1";
pub const DEFINITION_KIND: &str = "CustomResourceDefinition";

const API_VERSION_DESCRIPTION: &str = "APIVersion defines the versioned schema of this representation of an object.";
const KIND_DESCRIPTION: &str = "Kind is a string value representing the REST resource this object represents.";
const SPEC_DESCRIPTION: &str = "spec holds the saved model data";
const STATUS_DESCRIPTION: &str = "status holds the observed state of the saved data";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    Namespaced,
    Cluster,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSubresource {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subresources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSubresource>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionValidation {
    #[serde(rename = "openAPIV3Schema")]
    pub open_api_v3_schema: JsonSchemaProps,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionVersion {
    pub name: String,
    pub served: bool,
    pub storage: bool,
    pub schema: DefinitionValidation,
    #[serde(default)]
    pub subresources: Subresources,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSpec {
    pub group: String,
    pub names: KindNames,
    pub scope: Scope,
    pub versions: Vec<DefinitionVersion>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DefinitionSpec,
}

fn envelope(kind: &str, spec: &BTreeMap<String, JsonSchemaProps>) -> JsonSchemaProps {
    let mut properties = BTreeMap::new();
    properties.insert("apiVersion".to_string(), JsonSchemaProps::typed("string").describe(API_VERSION_DESCRIPTION));
    properties.insert("kind".to_string(), JsonSchemaProps::typed("string").describe(KIND_DESCRIPTION));
    properties.insert("metadata".to_string(), JsonSchemaProps::typed("object"));
    properties.insert(
        "spec".to_string(),
        JsonSchemaProps::object(spec.clone()).describe(SPEC_DESCRIPTION).preserve_unknown(),
    );
    properties.insert(
        "status".to_string(),
        JsonSchemaProps::typed("object").describe(STATUS_DESCRIPTION).preserve_unknown(),
    );
    JsonSchemaProps::object(properties)
        .describe(format!("Auto generated schema for: {}", kind))
        .preserve_unknown()
}

impl ResourceDefinition {
    /// Definition for one model schema, named `<plural>.<group>` and served at the configured version.
    pub fn synthesize(schema: &ModelSchema, group_version: &GroupVersion) -> Result<Self, CrdbError> {
        if schema.is_empty() {
            return Err(CrdbError::InvalidModel(schema.id.clone()));
        }
        let names = schema.names.clone();
        let mut metadata = ObjectMeta::named(format!("{}.{}", names.plural, group_version.group));
        metadata
            .annotations
            .insert(ANNOTATION_VERSION.to_string(), env!("CARGO_PKG_VERSION").to_string());
        metadata
            .annotations
            .insert(ANNOTATION_API_VERSION.to_string(), group_version.version.clone());

        Ok(ResourceDefinition {
            api_version: DEFINITION_API_VERSION.to_string(),
            kind: DEFINITION_KIND.to_string(),
            metadata,
            spec: DefinitionSpec {
                group: group_version.group.clone(),
                scope: Scope::Namespaced,
                versions: vec![DefinitionVersion {
                    name: group_version.version.clone(),
                    served: true,
                    storage: true,
                    schema: DefinitionValidation { open_api_v3_schema: envelope(&names.kind, &schema.spec) },
                    subresources: Subresources { status: Some(StatusSubresource {}) },
                }],
                names,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn plural(&self) -> &str {
        &self.spec.names.plural
    }

    /// Group/versions this definition serves.
    pub fn served_versions(&self) -> Vec<GroupVersion> {
        self.spec
            .versions
            .iter()
            .filter(|v| v.served)
            .map(|v| GroupVersion::new(self.spec.group.clone(), v.name.clone()))
            .collect()
    }

    /// Address of documents of this kind at its storage version.
    pub fn api_resource(&self) -> Option<ApiResource> {
        let storage = self.spec.versions.iter().find(|v| v.storage)?;
        Some(ApiResource {
            group: self.spec.group.clone(),
            version: storage.name.clone(),
            kind: self.spec.names.kind.clone(),
            plural: self.spec.names.plural.clone(),
        })
    }

    /// Whether `existing` already matches this desired definition.
    pub fn same_desired_state(&self, existing: &ResourceDefinition) -> bool {
        self.spec == existing.spec
            && self
                .metadata
                .annotations
                .iter()
                .all(|(k, v)| existing.metadata.annotations.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build_schema, FieldSchema, SchemaBuilder};

    fn count_schema() -> ModelSchema {
        let mut b = SchemaBuilder::default();
        b.field("name", FieldSchema::string()).tag("name,primaryKey");
        b.field("count_type", FieldSchema::integer()).tag("type,index");
        b.field("counter", FieldSchema::integer()).tag("count");
        build_schema("Count", "Count", &b).unwrap()
    }

    #[test]
    fn synthesizes_namespaced_definition() {
        let gv = GroupVersion::new("test.crdbase.io", "v1");
        let def = ResourceDefinition::synthesize(&count_schema(), &gv).unwrap();
        assert_eq!(def.name(), "counts.test.crdbase.io");
        assert_eq!(def.kind, DEFINITION_KIND);
        assert_eq!(def.spec.scope, Scope::Namespaced);
        assert_eq!(def.spec.names.list_kind, "CountList");
        assert_eq!(def.metadata.annotations[ANNOTATION_API_VERSION], "v1");

        let version = &def.spec.versions[0];
        assert!(version.served && version.storage);
        assert!(version.subresources.status.is_some());
        let root = &version.schema.open_api_v3_schema;
        assert_eq!(root.preserve_unknown_fields, Some(true));
        assert_eq!(root.description.as_deref(), Some("Auto generated schema for: Count"));
        let spec = &root.properties["spec"];
        assert_eq!(spec.properties["type"].type_name(), "integer");
        assert!(root.properties.contains_key("status"));
        assert_eq!(def.served_versions(), vec![gv]);
        assert_eq!(def.api_resource().unwrap().plural, "counts");
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let def =
            ResourceDefinition::synthesize(&count_schema(), &GroupVersion::new("test.crdbase.io", "v1")).unwrap();
        let v = serde_json::to_value(&def).unwrap();
        assert_eq!(v["spec"]["scope"], "Namespaced");
        assert_eq!(v["spec"]["names"]["listKind"], "CountList");
        let root = &v["spec"]["versions"][0]["schema"]["openAPIV3Schema"];
        assert_eq!(root["x-kubernetes-preserve-unknown-fields"], true);
        assert_eq!(root["properties"]["spec"]["properties"]["name"]["type"], "string");
        assert!(v["spec"]["names"].get("shortNames").is_none());
    }

    #[test]
    fn empty_schema_is_rejected() {
        let gv = GroupVersion::new("test.crdbase.io", "v1");
        assert!(matches!(
            ResourceDefinition::synthesize(&ModelSchema::empty("x"), &gv),
            Err(CrdbError::InvalidModel(_))
        ));
    }

    #[test]
    fn same_desired_state_ignores_server_fields() {
        let gv = GroupVersion::new("test.crdbase.io", "v1");
        let desired = ResourceDefinition::synthesize(&count_schema(), &gv).unwrap();
        let mut existing = desired.clone();
        existing.metadata.resource_version = Some("3".into());
        existing.metadata.annotations.insert("other".into(), "x".into());
        assert!(desired.same_desired_state(&existing));
        existing.spec.versions[0].served = false;
        assert!(!desired.same_desired_state(&existing));
    }
}
