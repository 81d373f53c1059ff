//! Shared fixtures: the Count model and bases backed by the in-memory store.

#![allow(dead_code)]

use crdbase::{BaseConfig, CrdBase, FieldSchema, GroupVersion, InMemoryStore, Model, SchemaBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "crdb-test";
pub const DEFINITION: &str = "counts.test.crdbase.io";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Count {
    pub name: String,
    pub count_type: i64,
    pub counter: i64,
}

impl Count {
    pub fn new(name: &str, count_type: i64, counter: i64) -> Self {
        Count { name: name.to_string(), count_type, counter }
    }
}

impl Model for Count {
    const NAME: &'static str = "Count";

    fn describe(schema: &mut SchemaBuilder) {
        schema.field("name", FieldSchema::string()).tag("name,primaryKey");
        schema.field("count_type", FieldSchema::integer()).tag("type,index");
        schema.field("counter", FieldSchema::integer()).tag("count");
    }
}

pub fn config() -> BaseConfig {
    BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), NAMESPACE, NAMESPACE)
}

pub fn base_with(store: Arc<InMemoryStore>) -> CrdBase {
    CrdBase::new(config(), store).expect("valid test config")
}

/// A base whose Count kind is installed and served.
pub async fn migrated() -> (Arc<InMemoryStore>, CrdBase) {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let schemas = [base.try_schema::<Count>().expect("Count derives")];
    base.auto_migrate(&CancellationToken::new(), &schemas)
        .await
        .expect("migration succeeds");
    (store, base)
}
