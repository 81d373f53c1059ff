//! Queries over stored documents: compile what the store can select on, run the rest in memory.

pub mod compile;
pub mod parse;
pub mod pipeline;
pub mod selector;
pub mod types;

pub use compile::{compile, CompiledQuery};
pub use pipeline::{Pipeline, Plan};
pub use selector::parse_selector;
pub use types::{Direction, Filter, Operator, Order, Query, DEFAULT_LIMIT, DEFAULT_PAGE, MAX_LIMIT};

use crate::error::CrdbError;
use crate::resource::{ApiResource, StoredDocument};
use crate::schema::ModelSchema;
use crate::store::DocumentApi;

/// Validate, push down, list, then filter, sort, deduplicate and paginate.
pub async fn execute<S>(
    store: &S,
    resource: &ApiResource,
    namespace: &str,
    schema: &ModelSchema,
    query: &Query,
) -> Result<Vec<StoredDocument>, CrdbError>
where
    S: DocumentApi + ?Sized,
{
    query.validate()?;
    run(store, resource, namespace, compile(query, schema)).await
}

/// Like [`execute`] but returns every match, ignoring page and limit.
pub async fn execute_all<S>(
    store: &S,
    resource: &ApiResource,
    namespace: &str,
    schema: &ModelSchema,
    query: &Query,
) -> Result<Vec<StoredDocument>, CrdbError>
where
    S: DocumentApi + ?Sized,
{
    query.validate()?;
    let mut compiled = compile(query, schema);
    compiled.plan = compiled.plan.unpaged();
    run(store, resource, namespace, compiled).await
}

async fn run<S>(
    store: &S,
    resource: &ApiResource,
    namespace: &str,
    compiled: CompiledQuery,
) -> Result<Vec<StoredDocument>, CrdbError>
where
    S: DocumentApi + ?Sized,
{
    tracing::debug!(
        resource = %resource.definition_name(),
        labels = ?compiled.params.label_selector,
        fields = ?compiled.params.field_selector,
        residual = compiled.plan.filters.len(),
        "query"
    );
    let docs = store
        .list(resource, namespace, &compiled.params)
        .await
        .map_err(|e| CrdbError::store("list", resource.definition_name(), e))?;
    Ok(Pipeline::standard().run(docs, &compiled.plan))
}
