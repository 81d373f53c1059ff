//! Example consumer: a separate Rust project that uses crdbase as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`
//!
//! Reads `CRDBASE_*` settings from the environment (or `.env`) and falls back to
//! `test.crdbase.io/v1` in namespace `crdb-test`.

use crdbase::{
    BaseConfig, CrdBase, FieldSchema, Filter, GroupVersion, InMemoryStore, Model, Order, Query, SchemaBuilder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Count {
    name: String,
    count_type: i64,
    counter: i64,
}

impl Model for Count {
    const NAME: &'static str = "Count";

    fn describe(schema: &mut SchemaBuilder) {
        schema.field("name", FieldSchema::string()).tag("name,primaryKey");
        schema.field("count_type", FieldSchema::integer()).tag("type,index");
        schema.field("counter", FieldSchema::integer()).tag("count");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crdbase=info")),
        )
        .init();

    let config = BaseConfig::from_env().unwrap_or_else(|e| {
        tracing::info!(error = %e, "using default configuration");
        BaseConfig::new(GroupVersion::new("test.crdbase.io", "v1"), "crdb-test", "crdb-test")
            .with_readiness(Duration::from_millis(200), Duration::from_secs(5))
    });
    let store = Arc::new(InMemoryStore::with_establish_delay(Duration::from_millis(500)));
    let base = CrdBase::new(config, store)?;

    let schemas = [base.try_schema::<Count>()?];
    let report = base.auto_migrate(&CancellationToken::new(), &schemas).await?;
    tracing::info!(?report, "migrated");

    let counts = base.model::<Count>()?;
    let (name, result) = counts.create(&Count { name: "u1".into(), count_type: 0, counter: 1 }).await?;
    tracing::info!(%name, %result, "create");
    let (name, result) = counts.save(&Count { name: "u1".into(), count_type: 0, counter: 2 }).await?;
    tracing::info!(%name, %result, "create or update");
    for (i, count_type) in [1, 1, 2].into_iter().enumerate() {
        counts
            .save(&Count { name: format!("batch-{}", i), count_type, counter: i as i64 * 10 })
            .await?;
    }

    let u1 = counts.get("u1").await?;
    tracing::info!(counter = u1.counter, "get");

    let query = Query::new().filter(Filter::eq("type", 1)).order_by(Order::desc("count"));
    for count in counts.list(&query).await? {
        tracing::info!(name = %count.name, counter = count.counter, "type 1");
    }

    let report = base.prune(&schemas).await?;
    tracing::info!(?report, "pruned");
    Ok(())
}
