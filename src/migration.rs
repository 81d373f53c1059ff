//! Install model kinds in the store: resource definitions, a readiness wait until discovery
//! serves them, then a manager role and role binding per kind. Every step converges, so a
//! failed run is repaired by running it again.

use crate::config::{BaseConfig, GroupVersion};
use crate::error::{CrdbError, MigrationStep, ReadinessError, StoreError};
use crate::resource::{ObjectMeta, ResourceDefinition, Role, RoleBinding};
use crate::retry::{retry_on_conflict, DEFAULT_RETRY};
use crate::schema::ModelSchema;
use crate::service::{DeleteOutcome, OperationResult};
use crate::store::{DiscoveryApi, Store};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// An object the engine owns and keeps at a desired state.
#[async_trait]
trait Reconcile: Clone + Send + Sync + Sized {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn same_desired_state(&self, existing: &Self) -> bool;

    async fn fetch(&self, store: &dyn Store) -> Result<Self, StoreError>;
    async fn create(&self, store: &dyn Store) -> Result<Self, StoreError>;
    async fn replace(&self, store: &dyn Store) -> Result<Self, StoreError>;
    async fn remove(&self, store: &dyn Store) -> Result<(), StoreError>;

    fn target(&self) -> String {
        format!("{} {}", Self::KIND, self.meta().key())
    }

    /// Take the store-owned fields from `existing`; its labels and annotations are kept
    /// unless this object sets them.
    fn carry_forward(&mut self, existing: &Self) {
        let from = existing.meta();
        let mut labels = from.labels.clone();
        let mut annotations = from.annotations.clone();
        let meta = self.meta_mut();
        meta.resource_version = from.resource_version.clone();
        meta.uid = from.uid.clone();
        meta.creation_timestamp = from.creation_timestamp;
        labels.append(&mut meta.labels);
        annotations.append(&mut meta.annotations);
        meta.labels = labels;
        meta.annotations = annotations;
    }
}

#[async_trait]
impl Reconcile for ResourceDefinition {
    const KIND: &'static str = "resource definition";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn same_desired_state(&self, existing: &Self) -> bool {
        ResourceDefinition::same_desired_state(self, existing)
    }

    async fn fetch(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.get_definition(self.name()).await
    }

    async fn create(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.create_definition(self).await
    }

    async fn replace(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.update_definition(self).await
    }

    async fn remove(&self, store: &dyn Store) -> Result<(), StoreError> {
        store.delete_definition(self.name()).await
    }
}

#[async_trait]
impl Reconcile for Role {
    const KIND: &'static str = "role";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn same_desired_state(&self, existing: &Self) -> bool {
        Role::same_desired_state(self, existing)
    }

    async fn fetch(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.get_role(&self.metadata.key()).await
    }

    async fn create(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.create_role(self).await
    }

    async fn replace(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.update_role(self).await
    }

    async fn remove(&self, store: &dyn Store) -> Result<(), StoreError> {
        store.delete_role(&self.metadata.key()).await
    }
}

#[async_trait]
impl Reconcile for RoleBinding {
    const KIND: &'static str = "role binding";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn same_desired_state(&self, existing: &Self) -> bool {
        RoleBinding::same_desired_state(self, existing)
    }

    async fn fetch(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.get_role_binding(&self.metadata.key()).await
    }

    async fn create(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.create_role_binding(self).await
    }

    async fn replace(&self, store: &dyn Store) -> Result<Self, StoreError> {
        store.update_role_binding(self).await
    }

    async fn remove(&self, store: &dyn Store) -> Result<(), StoreError> {
        store.delete_role_binding(&self.metadata.key()).await
    }
}

/// Get-or-create, then update in place when the stored object drifted. Updates re-read the
/// resource version before each attempt.
async fn ensure<R: Reconcile>(store: &dyn Store, desired: &R) -> Result<OperationResult, CrdbError> {
    let target = desired.target();
    match desired.fetch(store).await {
        Ok(existing) if desired.same_desired_state(&existing) => {
            tracing::debug!(object = %target, "unchanged");
            return Ok(OperationResult::Unchanged);
        }
        Ok(_) => {}
        Err(e) if e.is_not_found() => match desired.create(store).await {
            Ok(_) => {
                tracing::debug!(object = %target, "created");
                return Ok(OperationResult::Created);
            }
            // Lost a race with another installer; fall through to the update.
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(CrdbError::store("create", target, e)),
        },
        Err(e) => return Err(CrdbError::store("get", target, e)),
    }

    let target = &target;
    retry_on_conflict(DEFAULT_RETRY, || async move {
        let existing = desired.fetch(store).await.map_err(|e| CrdbError::store("get", target.as_str(), e))?;
        let mut next = desired.clone();
        next.carry_forward(&existing);
        next.replace(store).await.map_err(|e| CrdbError::store("update", target.as_str(), e))?;
        Ok(())
    })
    .await?;
    tracing::debug!(object = %target, "updated");
    Ok(OperationResult::Updated)
}

async fn remove<R: Reconcile>(store: &dyn Store, object: &R) -> Result<DeleteOutcome, CrdbError> {
    match object.remove(store).await {
        Ok(()) => {
            tracing::debug!(object = %object.target(), "deleted");
            Ok(DeleteOutcome::Deleted)
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(object = %object.target(), "already absent");
            Ok(DeleteOutcome::Absent)
        }
        Err(e) => Err(CrdbError::store("delete", object.target(), e)),
    }
}

/// Resources still waiting to be served, per group/version.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    waiting_for: BTreeMap<GroupVersion, BTreeSet<String>>,
}

impl Readiness {
    pub fn for_definitions<'a>(definitions: impl IntoIterator<Item = &'a ResourceDefinition>) -> Self {
        let mut waiting_for: BTreeMap<GroupVersion, BTreeSet<String>> = BTreeMap::new();
        for definition in definitions {
            for group_version in definition.served_versions() {
                waiting_for.entry(group_version).or_default().insert(definition.plural().to_string());
            }
        }
        Readiness { waiting_for }
    }

    pub fn is_ready(&self) -> bool {
        self.waiting_for.is_empty()
    }

    /// `<group>/<version>/<plural>` for each resource not yet served.
    pub fn pending(&self) -> Vec<String> {
        self.waiting_for
            .iter()
            .flat_map(|(gv, plurals)| plurals.iter().map(move |p| format!("{}/{}", gv, p)))
            .collect()
    }

    /// One discovery round. A group/version discovery does not know yet serves nothing.
    pub async fn poll<D>(&mut self, discovery: &D) -> Result<(), CrdbError>
    where
        D: DiscoveryApi + ?Sized,
    {
        let mut done = Vec::new();
        for (group_version, plurals) in self.waiting_for.iter_mut() {
            let served = match discovery.served_resources(group_version).await {
                Ok(served) => served,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(CrdbError::store("discover", group_version.to_string(), e)),
            };
            for plural in served {
                plurals.remove(&plural);
            }
            if plurals.is_empty() {
                done.push(group_version.clone());
            }
        }
        for group_version in done {
            self.waiting_for.remove(&group_version);
        }
        Ok(())
    }

    /// Poll now and then every `interval` until everything is served, `max_wait` has passed or
    /// `cancel` fires. Cancellation is noticed between and during polls.
    pub async fn wait<D>(
        mut self,
        discovery: &D,
        interval: Duration,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), CrdbError>
    where
        D: DiscoveryApi + ?Sized,
    {
        let start = Instant::now();
        let deadline = start + max_wait;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessError::Cancelled.into()),
                polled = self.poll(discovery) => polled?,
            }
            if self.is_ready() {
                tracing::debug!(waited = ?start.elapsed(), "resource definitions served");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ReadinessError::Timeout { waited: now - start, pending: self.pending() }.into());
            }
            tracing::trace!(pending = ?self.pending(), "waiting for discovery");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReadinessError::Cancelled.into()),
                _ = sleep_until((now + interval).min(deadline)) => {}
            }
        }
    }
}

/// What a migration did to each object, by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub definitions: Vec<(String, OperationResult)>,
    pub roles: Vec<(String, OperationResult)>,
    pub role_bindings: Vec<(String, OperationResult)>,
}

impl MigrationReport {
    /// True when nothing had to be written.
    pub fn is_unchanged(&self) -> bool {
        self.definitions
            .iter()
            .chain(&self.roles)
            .chain(&self.role_bindings)
            .all(|(_, result)| *result == OperationResult::Unchanged)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub definitions: Vec<(String, DeleteOutcome)>,
    pub roles: Vec<(String, DeleteOutcome)>,
    pub role_bindings: Vec<(String, DeleteOutcome)>,
}

fn definitions(schemas: &[Arc<ModelSchema>], group_version: &GroupVersion) -> Result<Vec<ResourceDefinition>, CrdbError> {
    schemas
        .iter()
        .map(|schema| ResourceDefinition::synthesize(schema, group_version))
        .collect::<Result<_, _>>()
        .map_err(|e| e.in_step(MigrationStep::GenerateDefinitions))
}

/// Install or update the kinds of `schemas`, wait until they are served, then grant the
/// configured service account access to them.
pub async fn auto_migrate(
    store: &dyn Store,
    config: &BaseConfig,
    cancel: &CancellationToken,
    schemas: &[Arc<ModelSchema>],
) -> Result<MigrationReport, CrdbError> {
    let definitions = definitions(schemas, &config.group_version)?;
    let mut report = MigrationReport::default();

    for definition in &definitions {
        let result = ensure(store, definition)
            .await
            .map_err(|e| e.in_step(MigrationStep::InstallDefinitions))?;
        tracing::debug!(definition = %definition.name(), %result, "definition");
        report.definitions.push((definition.name().to_string(), result));
    }

    Readiness::for_definitions(&definitions)
        .wait(store, config.poll_interval, config.max_wait, cancel)
        .await
        .map_err(|e| e.in_step(MigrationStep::EnsureDefinitions))?;

    for schema in schemas {
        let role = Role::manager(&schema.names, config);
        let result = ensure(store, &role)
            .await
            .map_err(|e| e.in_step(MigrationStep::ApplyAccessControl))?;
        tracing::debug!(role = %role.metadata.name, %result, "role");
        report.roles.push((role.metadata.name.clone(), result));

        let binding = RoleBinding::manager(&schema.names, config);
        let result = ensure(store, &binding)
            .await
            .map_err(|e| e.in_step(MigrationStep::ApplyAccessControl))?;
        tracing::debug!(role_binding = %binding.metadata.name, %result, "role binding");
        report.role_bindings.push((binding.metadata.name.clone(), result));
    }

    tracing::info!(
        group_version = %config.group_version,
        definitions = report.definitions.len(),
        unchanged = report.is_unchanged(),
        "auto migrate complete"
    );
    Ok(report)
}

/// Delete the kinds of `schemas` and their access control. Objects already gone count as done.
pub async fn prune(store: &dyn Store, config: &BaseConfig, schemas: &[Arc<ModelSchema>]) -> Result<PruneReport, CrdbError> {
    let definitions = definitions(schemas, &config.group_version)?;
    let mut report = PruneReport::default();

    for definition in &definitions {
        let outcome = remove(store, definition)
            .await
            .map_err(|e| e.in_step(MigrationStep::DeleteDefinitions))?;
        report.definitions.push((definition.name().to_string(), outcome));
    }

    for schema in schemas {
        let role = Role::manager(&schema.names, config);
        let outcome = remove(store, &role)
            .await
            .map_err(|e| e.in_step(MigrationStep::DeleteAccessControl))?;
        report.roles.push((role.metadata.name.clone(), outcome));

        let binding = RoleBinding::manager(&schema.names, config);
        let outcome = remove(store, &binding)
            .await
            .map_err(|e| e.in_step(MigrationStep::DeleteAccessControl))?;
        report.role_bindings.push((binding.metadata.name.clone(), outcome));
    }

    tracing::info!(group_version = %config.group_version, definitions = report.definitions.len(), "prune complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{build_schema, FieldSchema, SchemaBuilder};
    use crate::store::{DefinitionApi, InMemoryStore};

    fn schema(kind: &str) -> ModelSchema {
        let mut b = SchemaBuilder::default();
        b.field("name", FieldSchema::string()).tag("name,primaryKey");
        build_schema(kind, kind, &b).unwrap()
    }

    fn definition(kind: &str) -> ResourceDefinition {
        ResourceDefinition::synthesize(&schema(kind), &GroupVersion::new("test.crdbase.io", "v1")).unwrap()
    }

    #[test]
    fn readiness_groups_plurals_by_group_version() {
        let defs = [definition("Count"), definition("Repo")];
        let readiness = Readiness::for_definitions(&defs);
        assert!(!readiness.is_ready());
        assert_eq!(readiness.pending(), vec!["test.crdbase.io/v1/counts", "test.crdbase.io/v1/repos"]);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_resolves_once_discovery_serves() {
        let store = InMemoryStore::with_establish_delay(Duration::from_millis(2500));
        let def = definition("Count");
        store.create_definition(&def).await.unwrap();
        let start = Instant::now();
        Readiness::for_definitions([&def])
            .wait(&store, Duration::from_secs(1), Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_times_out_at_the_deadline() {
        let store = InMemoryStore::never_establish();
        let def = definition("Count");
        store.create_definition(&def).await.unwrap();
        let start = Instant::now();
        let err = Readiness::for_definitions([&def])
            .wait(&store, Duration::from_secs(3), Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        match err.readiness_error() {
            Some(ReadinessError::Timeout { waited, pending }) => {
                assert_eq!(*waited, Duration::from_secs(10));
                assert_eq!(pending, &vec!["test.crdbase.io/v1/counts".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_the_wait() {
        let store = InMemoryStore::never_establish();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Readiness::for_definitions([&definition("Count")])
            .wait(&store, Duration::from_secs(1), Duration::from_secs(10), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.readiness_error(), Some(&ReadinessError::Cancelled));
    }

    #[tokio::test]
    async fn ensure_creates_then_leaves_alone_then_updates() {
        let store = InMemoryStore::new();
        let config = BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), "crdb-test", "crdb-test");
        let names = schema("Count").names;
        let mut role = Role::manager(&names, &config);
        assert_eq!(ensure(&store, &role).await.unwrap(), OperationResult::Created);
        assert_eq!(ensure(&store, &role).await.unwrap(), OperationResult::Unchanged);

        role.rules.truncate(1);
        role.metadata.labels.insert("team".into(), "core".into());
        assert_eq!(ensure(&store, &role).await.unwrap(), OperationResult::Updated);
        let stored = store.role(&role.metadata.key()).unwrap();
        assert_eq!(stored.rules.len(), 1);
        assert_eq!(stored.metadata.labels.get("team").map(String::as_str), Some("core"));
    }

    #[test]
    fn carry_forward_keeps_store_fields_and_foreign_labels() {
        let mut existing = definition("Count");
        existing.metadata.resource_version = Some("7".into());
        existing.metadata.uid = Some("uid-1".into());
        existing.metadata.labels.insert("owner".into(), "ops".into());
        existing.metadata.annotations.insert("crdbase.io/version".into(), "0.0.1".into());

        let mut next = definition("Count");
        next.carry_forward(&existing);
        assert_eq!(next.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(next.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(next.metadata.labels.get("owner").map(String::as_str), Some("ops"));
        assert_eq!(
            next.metadata.annotations.get("crdbase.io/version").map(String::as_str),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }
}
