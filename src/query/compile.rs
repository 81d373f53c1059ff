//! Push-down: split a query into store selectors and the in-memory remainder.
//!
//! A filter is pushed only when the store would return exactly the documents the
//! in-memory stage would keep:
//! - `metadata.name` equality and inequality on valid object names become a field selector;
//! - set-based filters on indexed top-level fields become label selectors, provided
//!   every value has an exact label form for the field's type.
//! Everything else stays residual.

use crate::config::is_dns_subdomain;
use crate::query::pipeline::Plan;
use crate::query::selector::to_selector;
use crate::query::types::{Filter, Operator, Query};
use crate::resource::labels::{filter_label_text, label_key};
use crate::schema::ModelSchema;
use crate::store::ListParams;
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledQuery {
    pub params: ListParams,
    pub plan: Plan,
}

impl CompiledQuery {
    pub fn pushed_down(&self) -> bool {
        !self.params.is_empty()
    }
}

enum Placement {
    Field(Filter),
    Label(Filter),
    Residual,
}

fn place(filter: &Filter, schema: &ModelSchema) -> Placement {
    let path = filter.field.trim_start_matches('.');

    if path == "metadata.name" {
        // A value that is not a valid object name matches nothing, so it is left in memory.
        let plain = filter.values.iter().all(|v| matches!(v, Value::String(s) if is_dns_subdomain(s)));
        return match filter.operator {
            Operator::Equals | Operator::NotEquals if plain => Placement::Field(Filter {
                field: path.to_string(),
                ..filter.clone()
            }),
            _ => Placement::Residual,
        };
    }

    // Existence checks stay in memory: a field whose value has no label form carries no label.
    if matches!(filter.operator, Operator::Exists | Operator::DoesNotExist) || !filter.operator.is_set_based() {
        return Placement::Residual;
    }
    let field = path.strip_prefix("spec.").unwrap_or(path);
    if field.contains('.') || !schema.is_indexed(field) {
        return Placement::Residual;
    }
    let (Some(key), Some(props)) = (label_key(field), schema.spec.get(field)) else {
        return Placement::Residual;
    };
    let values: Option<Vec<Value>> = filter
        .values
        .iter()
        .map(|v| filter_label_text(props.type_name(), v).map(Value::String))
        .collect();
    match values {
        Some(values) if !values.is_empty() => Placement::Label(Filter::new(key, filter.operator, values)),
        _ => Placement::Residual,
    }
}

/// Compile `query` against `schema`. Call [`Query::validate`] first.
pub fn compile(query: &Query, schema: &ModelSchema) -> CompiledQuery {
    let mut fields = Vec::new();
    let mut labels = Vec::new();
    let mut residual = Vec::new();
    for filter in &query.filters {
        match place(filter, schema) {
            Placement::Field(f) => fields.push(f),
            Placement::Label(f) => labels.push(f),
            Placement::Residual => residual.push(filter.clone()),
        }
    }

    let mut params = ListParams::default();
    if !labels.is_empty() {
        params = params.labels(to_selector(&labels));
    }
    if !fields.is_empty() {
        params = params.fields(to_selector(&fields));
    }
    CompiledQuery {
        params,
        plan: Plan { filters: residual, ..Plan::from_query(query) },
    }
}
