//! In-process store with API-server semantics: resource versions with optimistic
//! concurrency, name validation, delayed establishment of definitions and selector
//! evaluation. Used by tests and the example consumer.

use crate::config::{is_dns_label, is_dns_subdomain, GroupVersion};
use crate::error::StoreError;
use crate::query::selector::{matches_labels, parse_selector};
use crate::query::types::value_text;
use crate::query::Operator;
use crate::resource::{ApiResource, ObjectKey, ObjectMeta, ResourceDefinition, Role, RoleBinding, StoredDocument};
use crate::store::{DefinitionApi, DiscoveryApi, DocumentApi, ListParams, RbacApi};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const DEFINITION: &str = "CustomResourceDefinition";

trait Object: Clone {
    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

impl Object for Role {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for RoleBinding {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for StoredDocument {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for ResourceDefinition {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

struct StoredDefinition {
    definition: ResourceDefinition,
    /// `None` never establishes.
    established_at: Option<Instant>,
}

impl StoredDefinition {
    fn is_established(&self) -> bool {
        self.established_at.is_some_and(|at| Instant::now() >= at)
    }

    fn serves(&self, group_version: &GroupVersion) -> bool {
        self.definition.spec.group == group_version.group
            && self
                .definition
                .spec
                .versions
                .iter()
                .any(|v| v.served && v.name == group_version.version)
    }
}

#[derive(Default)]
struct State {
    revision: u64,
    injected_conflicts: usize,
    definitions: BTreeMap<String, StoredDefinition>,
    documents: BTreeMap<String, BTreeMap<ObjectKey, StoredDocument>>,
    roles: BTreeMap<ObjectKey, Role>,
    bindings: BTreeMap<ObjectKey, RoleBinding>,
}

impl State {
    fn take_conflict(&mut self) -> bool {
        if self.injected_conflicts == 0 {
            return false;
        }
        self.injected_conflicts -= 1;
        true
    }

    /// New resource version; uid and creation time are set once.
    fn stamp(&mut self, meta: &mut ObjectMeta) {
        self.revision += 1;
        meta.resource_version = Some(self.revision.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(Uuid::new_v4().to_string());
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Utc::now());
        }
    }

    fn served(&self, resource: &ApiResource) -> Result<String, StoreError> {
        let name = resource.definition_name();
        match self.definitions.get(&name) {
            Some(stored)
                if stored.is_established()
                    && stored.serves(&resource.group_version())
                    && stored.definition.spec.names.kind == resource.kind =>
            {
                Ok(name)
            }
            _ => Err(StoreError::not_found("resource", name)),
        }
    }

    fn create_object<T: Object>(
        &mut self,
        kind: &str,
        map: impl Fn(&mut State) -> &mut BTreeMap<ObjectKey, T>,
        object: &T,
    ) -> Result<T, StoreError> {
        let key = object.meta().key();
        if map(self).contains_key(&key) {
            return Err(StoreError::already_exists(kind, key.to_string()));
        }
        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.resource_version = None;
        meta.uid = None;
        meta.creation_timestamp = None;
        self.stamp(stored.meta_mut());
        map(self).insert(key, stored.clone());
        Ok(stored)
    }

    fn update_object<T: Object>(
        &mut self,
        kind: &str,
        map: impl Fn(&mut State) -> &mut BTreeMap<ObjectKey, T>,
        object: &T,
        require_version: bool,
    ) -> Result<T, StoreError> {
        let key = object.meta().key();
        let existing = map(self)
            .get(&key)
            .map(|e| e.meta().clone())
            .ok_or_else(|| StoreError::not_found(kind, key.to_string()))?;
        check_version(kind, &key.to_string(), object.meta(), &existing, require_version)?;
        if self.take_conflict() {
            return Err(StoreError::conflict(kind, key.to_string(), "injected conflict"));
        }
        let mut stored = object.clone();
        let meta = stored.meta_mut();
        meta.uid = existing.uid;
        meta.creation_timestamp = existing.creation_timestamp;
        self.stamp(stored.meta_mut());
        map(self).insert(key, stored.clone());
        Ok(stored)
    }
}

fn check_version(
    kind: &str,
    name: &str,
    incoming: &ObjectMeta,
    existing: &ObjectMeta,
    required: bool,
) -> Result<(), StoreError> {
    match incoming.resource_version.as_deref() {
        None if required => Err(StoreError::Invalid(format!(
            "{} '{}': resourceVersion must be specified for an update",
            kind, name
        ))),
        None => Ok(()),
        Some(v) if Some(v) == existing.resource_version.as_deref() => Ok(()),
        Some(_) => Err(StoreError::conflict(
            kind,
            name,
            "the object has been modified; please apply your changes to the latest version and try again",
        )),
    }
}

fn check_namespaced_name(kind: &str, meta: &ObjectMeta) -> Result<(), StoreError> {
    if !is_dns_subdomain(&meta.name) {
        return Err(StoreError::Invalid(format!("{} name '{}' is not a valid resource name", kind, meta.name)));
    }
    match meta.namespace.as_deref() {
        Some(ns) if is_dns_label(ns) => Ok(()),
        _ => Err(StoreError::Invalid(format!("{} '{}' needs a valid namespace", kind, meta.name))),
    }
}

fn matches_fields(selector: &[crate::query::Filter], doc: &StoredDocument) -> Result<bool, StoreError> {
    for filter in selector {
        let actual = match filter.field.trim_start_matches('.') {
            "metadata.name" => doc.name(),
            "metadata.namespace" => doc.namespace(),
            other => return Err(StoreError::Invalid(format!("field label not supported: {}", other))),
        };
        let wanted = filter.values.first().map(value_text).unwrap_or_default();
        let ok = match filter.operator {
            Operator::Equals => actual == wanted,
            Operator::NotEquals => actual != wanted,
            op => return Err(StoreError::Invalid(format!("field selectors do not support '{}'", op.symbol()))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

pub struct InMemoryStore {
    state: Mutex<State>,
    establish_after: Option<Duration>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Definitions are served as soon as they are created.
    pub fn new() -> Self {
        InMemoryStore { state: Mutex::new(State::default()), establish_after: Some(Duration::ZERO) }
    }

    /// Definitions are served `delay` after creation.
    pub fn with_establish_delay(delay: Duration) -> Self {
        InMemoryStore { establish_after: Some(delay), ..Self::new() }
    }

    /// Definitions are stored but never served.
    pub fn never_establish() -> Self {
        InMemoryStore { establish_after: None, ..Self::new() }
    }

    /// Fail the next `n` updates (of any object) with a conflict.
    pub fn inject_conflicts(&self, n: usize) {
        self.lock().injected_conflicts += n;
    }

    /// Count of writes so far; unchanged when nothing was written.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn definition(&self, name: &str) -> Option<ResourceDefinition> {
        self.lock().definitions.get(name).map(|s| s.definition.clone())
    }

    pub fn role(&self, key: &ObjectKey) -> Option<Role> {
        self.lock().roles.get(key).cloned()
    }

    pub fn role_binding(&self, key: &ObjectKey) -> Option<RoleBinding> {
        self.lock().bindings.get(key).cloned()
    }

    /// Every stored document of a kind, whether or not its definition is served.
    pub fn documents(&self, resource: &ApiResource) -> Vec<StoredDocument> {
        self.lock()
            .documents
            .get(&resource.definition_name())
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentApi for InMemoryStore {
    async fn create(&self, resource: &ApiResource, doc: &StoredDocument) -> Result<StoredDocument, StoreError> {
        let mut state = self.lock();
        let collection = state.served(resource)?;
        if doc.kind != resource.kind || doc.api_version != resource.api_version() {
            return Err(StoreError::Invalid(format!(
                "document {}/{} does not belong to {}",
                doc.api_version,
                doc.kind,
                resource.definition_name()
            )));
        }
        check_namespaced_name(&resource.kind, &doc.metadata)?;
        state.create_object(&resource.kind, |s| s.documents.entry(collection.clone()).or_default(), doc)
    }

    async fn get(&self, resource: &ApiResource, key: &ObjectKey) -> Result<StoredDocument, StoreError> {
        let state = self.lock();
        let collection = state.served(resource)?;
        state
            .documents
            .get(&collection)
            .and_then(|docs| docs.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(&resource.kind, key.to_string()))
    }

    async fn update(&self, resource: &ApiResource, doc: &StoredDocument) -> Result<StoredDocument, StoreError> {
        let mut state = self.lock();
        let collection = state.served(resource)?;
        state.update_object(&resource.kind, |s| s.documents.entry(collection.clone()).or_default(), doc, true)
    }

    async fn delete(&self, resource: &ApiResource, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.lock();
        let collection = state.served(resource)?;
        state
            .documents
            .get_mut(&collection)
            .and_then(|docs| docs.remove(key))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(&resource.kind, key.to_string()))
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let labels = parse_selector(params.label_selector.as_deref().unwrap_or_default())
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        let fields = parse_selector(params.field_selector.as_deref().unwrap_or_default())
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        let state = self.lock();
        let collection = state.served(resource)?;
        let mut out = Vec::new();
        for doc in state.documents.get(&collection).into_iter().flat_map(|docs| docs.values()) {
            if !namespace.is_empty() && doc.namespace() != namespace {
                continue;
            }
            if !labels.iter().all(|f| matches_labels(f, &doc.metadata.labels)) {
                continue;
            }
            if matches_fields(&fields, doc)? {
                out.push(doc.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DefinitionApi for InMemoryStore {
    async fn get_definition(&self, name: &str) -> Result<ResourceDefinition, StoreError> {
        self.definition(name).ok_or_else(|| StoreError::not_found(DEFINITION, name))
    }

    async fn create_definition(&self, definition: &ResourceDefinition) -> Result<ResourceDefinition, StoreError> {
        let name = definition.name();
        let expected = format!("{}.{}", definition.spec.names.plural, definition.spec.group);
        if name != expected || !is_dns_subdomain(name) {
            return Err(StoreError::Invalid(format!("definition name '{}' must be '{}'", name, expected)));
        }
        let mut state = self.lock();
        if state.definitions.contains_key(name) {
            return Err(StoreError::already_exists(DEFINITION, name));
        }
        let mut stored = definition.clone();
        stored.metadata.resource_version = None;
        stored.metadata.uid = None;
        stored.metadata.creation_timestamp = None;
        state.stamp(&mut stored.metadata);
        let established_at = self.establish_after.map(|delay| Instant::now() + delay);
        state
            .definitions
            .insert(name.to_string(), StoredDefinition { definition: stored.clone(), established_at });
        Ok(stored)
    }

    async fn update_definition(&self, definition: &ResourceDefinition) -> Result<ResourceDefinition, StoreError> {
        let name = definition.name();
        let mut state = self.lock();
        let existing = state
            .definitions
            .get(name)
            .map(|s| s.definition.metadata.clone())
            .ok_or_else(|| StoreError::not_found(DEFINITION, name))?;
        check_version(DEFINITION, name, &definition.metadata, &existing, true)?;
        if state.take_conflict() {
            return Err(StoreError::conflict(DEFINITION, name, "injected conflict"));
        }
        let mut stored = definition.clone();
        stored.metadata.uid = existing.uid;
        stored.metadata.creation_timestamp = existing.creation_timestamp;
        state.stamp(&mut stored.metadata);
        if let Some(slot) = state.definitions.get_mut(name) {
            slot.definition = stored.clone();
        }
        Ok(stored)
    }

    async fn delete_definition(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .definitions
            .remove(name)
            .ok_or_else(|| StoreError::not_found(DEFINITION, name))?;
        state.documents.remove(name);
        Ok(())
    }
}

#[async_trait]
impl DiscoveryApi for InMemoryStore {
    async fn served_resources(&self, group_version: &GroupVersion) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        let served: Vec<String> = state
            .definitions
            .values()
            .filter(|s| s.is_established() && s.serves(group_version))
            .map(|s| s.definition.spec.names.plural.clone())
            .collect();
        if served.is_empty() {
            return Err(StoreError::not_found("group version", group_version.to_string()));
        }
        Ok(served)
    }
}

#[async_trait]
impl RbacApi for InMemoryStore {
    async fn get_role(&self, key: &ObjectKey) -> Result<Role, StoreError> {
        self.role(key).ok_or_else(|| StoreError::not_found("Role", key.to_string()))
    }

    async fn create_role(&self, role: &Role) -> Result<Role, StoreError> {
        check_namespaced_name("Role", &role.metadata)?;
        self.lock().create_object("Role", |s| &mut s.roles, role)
    }

    async fn update_role(&self, role: &Role) -> Result<Role, StoreError> {
        self.lock().update_object("Role", |s| &mut s.roles, role, false)
    }

    async fn delete_role(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.lock()
            .roles
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("Role", key.to_string()))
    }

    async fn get_role_binding(&self, key: &ObjectKey) -> Result<RoleBinding, StoreError> {
        self.role_binding(key)
            .ok_or_else(|| StoreError::not_found("RoleBinding", key.to_string()))
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        check_namespaced_name("RoleBinding", &binding.metadata)?;
        self.lock().create_object("RoleBinding", |s| &mut s.bindings, binding)
    }

    async fn update_role_binding(&self, binding: &RoleBinding) -> Result<RoleBinding, StoreError> {
        self.lock().update_object("RoleBinding", |s| &mut s.bindings, binding, false)
    }

    async fn delete_role_binding(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.lock()
            .bindings
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("RoleBinding", key.to_string()))
    }
}
