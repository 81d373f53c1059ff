//! Shared handle for application code: configuration, store and schema registry.

use crate::config::{validate, BaseConfig};
use crate::error::CrdbError;
use crate::migration::{self, MigrationReport, PruneReport};
use crate::resource::ResourceDefinition;
use crate::schema::{Model, ModelSchema, SchemaRegistry};
use crate::service::{ModelClient, OperationResult};
use crate::store::Store;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct CrdBase {
    config: Arc<BaseConfig>,
    store: Arc<dyn Store>,
    /// Shared by clones; each model type is derived once per registry.
    registry: Arc<SchemaRegistry>,
}

impl CrdBase {
    /// Validates `config` before returning.
    pub fn new(config: BaseConfig, store: Arc<dyn Store>) -> Result<Self, CrdbError> {
        validate(&config)?;
        Ok(CrdBase {
            config: Arc::new(config),
            store,
            registry: Arc::new(SchemaRegistry::new()),
        })
    }

    /// Use a registry shared with other handles.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &BaseConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Schema of `M`; empty when `M` cannot be derived.
    pub fn schema<M: Model>(&self) -> Arc<ModelSchema> {
        self.registry.schema_of::<M>()
    }

    pub fn try_schema<M: Model>(&self) -> Result<Arc<ModelSchema>, CrdbError> {
        Ok(self.registry.try_schema_of::<M>()?)
    }

    pub fn model<M: Model>(&self) -> Result<ModelClient<M>, CrdbError> {
        ModelClient::new(Arc::clone(&self.store), self.try_schema::<M>()?, &self.config)
    }

    pub fn definition_for<M: Model>(&self) -> Result<ResourceDefinition, CrdbError> {
        ResourceDefinition::synthesize(&self.schema::<M>(), &self.config.group_version)
    }

    pub async fn auto_migrate(
        &self,
        cancel: &CancellationToken,
        schemas: &[Arc<ModelSchema>],
    ) -> Result<MigrationReport, CrdbError> {
        migration::auto_migrate(self.store.as_ref(), &self.config, cancel, schemas).await
    }

    pub async fn prune(&self, schemas: &[Arc<ModelSchema>]) -> Result<PruneReport, CrdbError> {
        migration::prune(self.store.as_ref(), &self.config, schemas).await
    }

    pub async fn create<M: Model>(&self, instance: &M) -> Result<(String, OperationResult), CrdbError> {
        self.model::<M>()?.create(instance).await
    }

    pub async fn save<M: Model>(&self, instance: &M) -> Result<(String, OperationResult), CrdbError> {
        self.model::<M>()?.save(instance).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupVersion;
    use crate::error::ConfigError;
    use crate::schema::{FieldSchema, SchemaBuilder};
    use crate::store::InMemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Broken {
        id: i64,
    }

    impl Model for Broken {
        const NAME: &'static str = "Broken";
        fn describe(schema: &mut SchemaBuilder) {
            schema.field("id", FieldSchema::integer()).tag("id,primaryKey");
        }
    }

    fn base() -> CrdBase {
        let config = BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), "crdb-test", "crdb-test");
        CrdBase::new(config, Arc::new(InMemoryStore::new())).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = BaseConfig::new(GroupVersion::new("nodots", "v1"), "crdb-test", "crdb-test");
        let err = CrdBase::new(config, Arc::new(InMemoryStore::new())).err();
        assert!(matches!(err, Some(CrdbError::Config(ConfigError::Validation(_)))), "{:?}", err);
    }

    #[test]
    fn schema_errors_surface_on_first_use() {
        let base = base();
        assert!(base.schema::<Broken>().is_empty());
        assert!(matches!(base.try_schema::<Broken>(), Err(CrdbError::Schema(_))));
        assert!(matches!(base.model::<Broken>().err(), Some(CrdbError::Schema(_))));
        assert!(matches!(base.definition_for::<Broken>(), Err(CrdbError::InvalidModel(_))));
    }

    #[test]
    fn clones_share_the_registry() {
        let base = base();
        let other = base.clone();
        base.schema::<Broken>();
        assert_eq!(other.registry().len(), 1);
    }
}
