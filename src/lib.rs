//! crdbase: typed models stored as custom resources, with schema-derived definitions,
//! migrations and queries.

pub mod base;
pub mod config;
pub mod error;
pub mod id;
pub mod migration;
pub mod naming;
pub mod query;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod service;
pub mod store;

pub use base::CrdBase;
pub use config::{load_from_env, validate, BaseConfig, GroupVersion};
pub use error::{ConfigError, CrdbError, MigrationStep, QueryError, ReadinessError, SchemaError, StoreError};
pub use id::generate_id;
pub use migration::{auto_migrate, prune, MigrationReport, PruneReport, Readiness};
pub use query::{Direction, Filter, Operator, Order, Query};
pub use resource::{ApiResource, ObjectKey, ObjectMeta, ResourceDefinition, StoredDocument};
pub use schema::{FieldSchema, Model, ModelSchema, SchemaBuilder, SchemaRegistry};
pub use service::{DeleteOutcome, ModelClient, OperationResult};
pub use store::{InMemoryStore, ListParams, Store};
