//! Store collaborators: the document, definition, discovery and access-control APIs the
//! engines talk to. [`memory::InMemoryStore`] implements all of them.

pub mod memory;

pub use memory::InMemoryStore;

use crate::config::GroupVersion;
use crate::error::StoreError;
use crate::resource::{ApiResource, ObjectKey, ResourceDefinition, Role, RoleBinding, StoredDocument};
use async_trait::async_trait;

/// Selectors pushed down to a list call. Both use [`crate::query::selector`] syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListParams {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListParams {
    pub fn labels(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn fields(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.label_selector.is_none() && self.field_selector.is_none()
    }
}

#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn create(&self, resource: &ApiResource, doc: &StoredDocument) -> Result<StoredDocument, StoreError>;
    async fn get(&self, resource: &ApiResource, key: &ObjectKey) -> Result<StoredDocument, StoreError>;
    /// Replace a document; its resource version must match the stored one.
    async fn update(&self, resource: &ApiResource, doc: &StoredDocument) -> Result<StoredDocument, StoreError>;
    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError>;
    /// Documents in `namespace` (all namespaces when empty) matching the selectors.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<StoredDocument>, StoreError>;
}

#[async_trait]
pub trait DefinitionApi: Send + Sync {
    async fn get_definition(&self, name: &str) -> Result<ResourceDefinition, StoreError>;
    async fn create_definition(&self, definition: &ResourceDefinition) -> Result<ResourceDefinition, StoreError>;
    async fn update_definition(&self, definition: &ResourceDefinition) -> Result<ResourceDefinition, StoreError>;
    async fn delete_definition(&self, name: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DiscoveryApi: Send + Sync {
    /// Plural names currently served under a group/version.
    async fn served_resources(&self, group_version: &GroupVersion) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait RbacApi: Send + Sync {
    async fn get_role(&self, key: &ObjectKey) -> Result<Role, StoreError>;
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError>;
    async fn update_role(&self, role: &Role) -> Result<Role, StoreError>;
    async fn delete_role(&self, key: &ObjectKey) -> Result<(), StoreError>;
    async fn get_role_binding(&self, key: &ObjectKey) -> Result<RoleBinding, StoreError>;
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError>;
    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError>;
    async fn delete_role_binding(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Everything the engines need from one backend.
pub trait Store: DocumentApi + DefinitionApi + DiscoveryApi + RbacApi {}

impl<T> Store for T where T: DocumentApi + DefinitionApi + DiscoveryApi + RbacApi {}
