//! Wire shapes written to the store: documents, resource definitions and access control.

pub mod definition;
pub mod document;
pub mod labels;
pub mod rbac;

pub use definition::{ResourceDefinition, Scope};
pub use document::{ObjectKey, ObjectMeta, StoredDocument};
pub use rbac::{PolicyRule, Role, RoleBinding, RoleRef, Subject};

use crate::config::GroupVersion;
use crate::schema::ModelSchema;

pub const MANAGED_BY: &str = "crdbase";
pub const LABEL_PREFIX: &str = "crdbase.io";
pub const LABEL_MANAGED_BY: &str = "crdbase.io/managed-by";
pub const ANNOTATION_VERSION: &str = "crdbase.io/version";
pub const ANNOTATION_API_VERSION: &str = "crdbase.io/api-version";

/// Where documents of one kind live: group, version, kind and plural resource name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApiResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl ApiResource {
    pub fn from_schema(schema: &ModelSchema, group_version: &GroupVersion) -> Self {
        ApiResource {
            group: group_version.group.clone(),
            version: group_version.version.clone(),
            kind: schema.names.kind.clone(),
            plural: schema.names.plural.clone(),
        }
    }

    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group, self.version)
    }

    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::new(self.group.clone(), self.version.clone())
    }

    /// `<plural>.<group>`, the name of the backing definition.
    pub fn definition_name(&self) -> String {
        format!("{}.{}", self.plural, self.group)
    }
}
