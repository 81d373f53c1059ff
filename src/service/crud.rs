//! Typed CRUD for one model kind against the document store.

use crate::config::BaseConfig;
use crate::error::CrdbError;
use crate::id::generate_id;
use crate::query::{self, Query};
use crate::resource::labels::index_labels;
use crate::resource::{ApiResource, ObjectKey, ObjectMeta, StoredDocument, LABEL_PREFIX};
use crate::retry::{Retrier, DEFAULT_RETRY};
use crate::schema::{Model, ModelSchema};
use crate::service::mapping::{from_data, to_data};
use crate::service::validation::DataValidator;
use crate::service::{DeleteOutcome, OperationResult};
use crate::store::Store;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct ModelClient<M> {
    store: Arc<dyn Store>,
    schema: Arc<ModelSchema>,
    resource: ApiResource,
    namespace: String,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelClient<M> {
    fn clone(&self) -> Self {
        ModelClient {
            store: Arc::clone(&self.store),
            schema: Arc::clone(&self.schema),
            resource: self.resource.clone(),
            namespace: self.namespace.clone(),
            _model: PhantomData,
        }
    }
}

fn identity(doc: &StoredDocument) -> String {
    format!("{} {} {}", doc.api_version, doc.kind, doc.key())
}

/// Drop engine-owned index labels and write the current ones.
fn relabel(schema: &ModelSchema, doc: &mut StoredDocument) {
    let prefix = format!("{}/", LABEL_PREFIX);
    doc.metadata.labels.retain(|k, _| !k.starts_with(&prefix));
    doc.metadata.labels.extend(index_labels(schema, &doc.spec));
}

impl<M: Model> ModelClient<M> {
    pub fn new(store: Arc<dyn Store>, schema: Arc<ModelSchema>, config: &BaseConfig) -> Result<Self, CrdbError> {
        if schema.is_empty() {
            return Err(CrdbError::InvalidModel(schema.id.clone()));
        }
        let resource = ApiResource::from_schema(&schema, &config.group_version);
        Ok(ModelClient {
            store,
            schema,
            resource,
            namespace: config.namespace.clone(),
            _model: PhantomData,
        })
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn resource(&self) -> &ApiResource {
        &self.resource
    }

    pub fn key(&self, name: &str) -> ObjectKey {
        ObjectKey::new(&self.namespace, name)
    }

    fn target(&self, name: &str) -> String {
        format!("{} {}", self.resource.kind, self.key(name))
    }

    /// Map an instance to the document it is stored as. The name is the primary key value;
    /// when the model has none, or its value is empty, a generated id is used and written
    /// back into the primary key field.
    pub fn to_document(&self, instance: &M) -> Result<StoredDocument, CrdbError> {
        let mut data = to_data(&self.schema, instance)?;
        let declared = self
            .schema
            .primary_key
            .as_ref()
            .and_then(|pk| data.get(pk))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from);
        let name = match declared {
            Some(name) => name,
            None => {
                let id = generate_id();
                if let Some(pk) = &self.schema.primary_key {
                    data.insert(pk.clone(), Value::String(id.clone()));
                }
                id
            }
        };
        DataValidator::validate(&data, &self.schema.spec)?;

        let mut doc = StoredDocument {
            api_version: self.resource.api_version(),
            kind: self.resource.kind.clone(),
            metadata: ObjectMeta::namespaced(&self.namespace, name),
            spec: data,
            status: None,
        };
        relabel(&self.schema, &mut doc);
        Ok(doc)
    }

    pub fn from_document(&self, doc: &StoredDocument) -> Result<M, CrdbError> {
        from_data(&self.schema, &doc.spec)
    }

    /// Create a new document. Fails when one already exists under the same name.
    pub async fn create(&self, instance: &M) -> Result<(String, OperationResult), CrdbError> {
        let doc = self.to_document(instance)?;
        let name = doc.name().to_string();
        self.store
            .create(&self.resource, &doc)
            .await
            .map_err(|e| CrdbError::store("create", self.target(&name), e))?;
        tracing::debug!(kind = %self.resource.kind, name = %name, "created");
        Ok((name, OperationResult::Created))
    }

    /// Create the document, or update it in place when it exists. `mutate` runs on the
    /// outgoing document in both cases and must leave its identity alone. The whole cycle
    /// is retried on write conflicts.
    pub async fn create_or_update<F>(&self, instance: &M, mut mutate: F) -> Result<(String, OperationResult), CrdbError>
    where
        F: FnMut(&mut StoredDocument) -> Result<(), CrdbError> + Send,
    {
        let desired = self.to_document(instance)?;
        let name = desired.name().to_string();
        let mut retrier = Retrier::new(DEFAULT_RETRY);
        loop {
            match self.create_or_update_once(&desired, &mut mutate).await {
                Err(e) if e.is_conflict() || e.is_already_exists() => {
                    tracing::debug!(kind = %self.resource.kind, name = %name, attempt = retrier.attempt(), error = %e, "write conflict");
                    if !retrier.wait().await {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
                Ok(result) => return Ok((name, result)),
            }
        }
    }

    async fn create_or_update_once<F>(&self, desired: &StoredDocument, mutate: &mut F) -> Result<OperationResult, CrdbError>
    where
        F: FnMut(&mut StoredDocument) -> Result<(), CrdbError> + Send,
    {
        let key = desired.key();
        match self.store.get(&self.resource, &key).await {
            Err(e) if e.is_not_found() => {
                let mut doc = desired.clone();
                self.apply_mutation(&mut doc, desired, mutate)?;
                self.store
                    .create(&self.resource, &doc)
                    .await
                    .map_err(|e| CrdbError::store("create", self.target(&key.name), e))?;
                tracing::debug!(kind = %self.resource.kind, name = %key.name, "created");
                Ok(OperationResult::Created)
            }
            Err(e) => Err(CrdbError::store("get", self.target(&key.name), e)),
            Ok(existing) => {
                let mut doc = desired.clone();
                doc.metadata.resource_version = existing.metadata.resource_version.clone();
                doc.metadata.uid = existing.metadata.uid.clone();
                doc.metadata.creation_timestamp = existing.metadata.creation_timestamp;
                let mut labels = existing.metadata.labels.clone();
                labels.extend(desired.metadata.labels.clone());
                doc.metadata.labels = labels;
                let mut annotations = existing.metadata.annotations.clone();
                annotations.extend(desired.metadata.annotations.clone());
                doc.metadata.annotations = annotations;
                doc.status = existing.status.clone();

                self.apply_mutation(&mut doc, desired, mutate)?;
                self.store
                    .update(&self.resource, &doc)
                    .await
                    .map_err(|e| CrdbError::store("update", self.target(&key.name), e))?;
                tracing::debug!(kind = %self.resource.kind, name = %key.name, "updated");
                Ok(OperationResult::Updated)
            }
        }
    }

    fn apply_mutation<F>(&self, doc: &mut StoredDocument, desired: &StoredDocument, mutate: &mut F) -> Result<(), CrdbError>
    where
        F: FnMut(&mut StoredDocument) -> Result<(), CrdbError>,
    {
        mutate(doc)?;
        let (expected, actual) = (identity(desired), identity(doc));
        if expected != actual {
            return Err(CrdbError::MutateContract { expected, actual });
        }
        DataValidator::validate(&doc.spec, &self.schema.spec)?;
        relabel(&self.schema, doc);
        Ok(())
    }

    /// [`Self::create_or_update`] without a mutation.
    pub async fn save(&self, instance: &M) -> Result<(String, OperationResult), CrdbError> {
        self.create_or_update(instance, |_| Ok(())).await
    }

    /// Create or update each instance in turn; stops at the first failure.
    pub async fn create_or_update_list<F>(
        &self,
        instances: &[M],
        mut mutate: F,
    ) -> Result<Vec<(String, OperationResult)>, CrdbError>
    where
        F: FnMut(&mut StoredDocument) -> Result<(), CrdbError> + Send,
    {
        let mut results = Vec::with_capacity(instances.len());
        for instance in instances {
            results.push(self.create_or_update(instance, &mut mutate).await?);
        }
        Ok(results)
    }

    pub async fn delete(&self, name: &str) -> Result<DeleteOutcome, CrdbError> {
        match self.store.delete(&self.resource, &self.key(name)).await {
            Ok(()) => {
                tracing::debug!(kind = %self.resource.kind, name = %name, "deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(kind = %self.resource.kind, name = %name, "already absent");
                Ok(DeleteOutcome::Absent)
            }
            Err(e) => Err(CrdbError::store("delete", self.target(name), e)),
        }
    }

    /// Delete every document matching `query`, ignoring its page and limit. Returns how many
    /// were deleted.
    pub async fn delete_all_of(&self, query: &Query) -> Result<usize, CrdbError> {
        let docs = query::execute_all(&*self.store, &self.resource, &self.namespace, &self.schema, query).await?;
        let mut deleted = 0;
        for doc in docs {
            if self.delete(doc.name()).await? == DeleteOutcome::Deleted {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn get(&self, name: &str) -> Result<M, CrdbError> {
        let doc = match self.store.get(&self.resource, &self.key(name)).await {
            Ok(doc) => doc,
            Err(e) if e.is_not_found() => {
                return Err(CrdbError::NotFound { kind: self.resource.kind.clone(), name: name.to_string() })
            }
            Err(e) => return Err(CrdbError::store("get", self.target(name), e)),
        };
        self.from_document(&doc)
    }

    /// First match of `query`.
    pub async fn first(&self, query: &Query) -> Result<M, CrdbError> {
        match self.documents(query).await?.first() {
            Some(doc) => self.from_document(doc),
            None => Err(CrdbError::NotFound { kind: self.resource.kind.clone(), name: query.to_string() }),
        }
    }

    pub async fn list(&self, query: &Query) -> Result<Vec<M>, CrdbError> {
        self.documents(query).await?.iter().map(|doc| self.from_document(doc)).collect()
    }

    pub async fn documents(&self, query: &Query) -> Result<Vec<StoredDocument>, CrdbError> {
        query::execute(&*self.store, &self.resource, &self.namespace, &self.schema, query).await
    }
}
