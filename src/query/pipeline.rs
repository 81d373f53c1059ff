//! In-memory stages applied to listed documents: filter, sort, distinct, paginate.
//! Each stage is a pure function of its input and the plan.

use crate::query::types::{value_text, Direction, Filter, Operator, Order, Query};
use crate::resource::StoredDocument;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// What the in-memory stages still have to do after push-down.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub distinct: Vec<String>,
    /// `None` keeps every matching document.
    pub window: Option<(usize, usize)>,
}

impl Plan {
    /// Everything evaluated in memory, nothing pushed down.
    pub fn from_query(query: &Query) -> Self {
        Plan {
            filters: query.filters.clone(),
            order: query.order.clone(),
            distinct: query.distinct.clone(),
            window: Some((query.offset(), query.effective_limit() as usize)),
        }
    }

    pub fn unpaged(mut self) -> Self {
        self.window = None;
        self
    }
}

pub type Stage = fn(Vec<StoredDocument>, &Plan) -> Vec<StoredDocument>;

pub struct Pipeline {
    stages: Vec<(&'static str, Stage)>,
}

impl Pipeline {
    pub fn standard() -> Self {
        Pipeline {
            stages: vec![
                ("filter", filter_stage as Stage),
                ("sort", sort_stage),
                ("distinct", distinct_stage),
                ("paginate", paginate_stage),
            ],
        }
    }

    pub fn run(&self, docs: Vec<StoredDocument>, plan: &Plan) -> Vec<StoredDocument> {
        self.stages.iter().fold(docs, |docs, (name, stage)| {
            let before = docs.len();
            let out = stage(docs, plan);
            tracing::trace!(stage = *name, before, after = out.len(), "query stage");
            out
        })
    }
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numbers compare numerically (numeric strings included), booleans match "true"/"false".
fn loosely_equal(doc: &Value, wanted: &Value) -> bool {
    match (doc, wanted) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (coerce_number(doc), coerce_number(wanted)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => s == &b.to_string(),
        _ => doc == wanted,
    }
}

fn compare(doc: &Value, wanted: &Value) -> Option<Ordering> {
    match (coerce_number(doc), coerce_number(wanted)) {
        (Some(a), Some(b)) if doc.is_number() || wanted.is_number() => a.partial_cmp(&b),
        _ => match (doc, wanted) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

pub fn matches(filter: &Filter, doc: &StoredDocument) -> bool {
    let value = doc.lookup(&filter.field).filter(|v| !v.is_null());
    let listed = |v: &Value| filter.values.iter().any(|w| loosely_equal(v, w));
    let ordered = |accept: fn(Ordering) -> bool| {
        value
            .as_ref()
            .zip(filter.values.first())
            .and_then(|(v, w)| compare(v, w))
            .is_some_and(accept)
    };
    match filter.operator {
        Operator::Equals | Operator::In => value.as_ref().is_some_and(listed),
        Operator::NotEquals | Operator::NotIn => !value.as_ref().is_some_and(listed),
        Operator::Exists => value.is_some(),
        Operator::DoesNotExist => value.is_none(),
        Operator::GreaterThan => ordered(|o| o == Ordering::Greater),
        Operator::GreaterThanOrEqual => ordered(|o| o != Ordering::Less),
        Operator::LessThan => ordered(|o| o == Ordering::Less),
        Operator::LessThanOrEqual => ordered(|o| o != Ordering::Greater),
    }
}

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order for sorting: missing (or null) first, then by JSON type, then by value.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(_), Value::Number(_)) => compare(a, b).unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        }),
    }
}

pub fn filter_stage(docs: Vec<StoredDocument>, plan: &Plan) -> Vec<StoredDocument> {
    if plan.filters.is_empty() {
        return docs;
    }
    docs.into_iter()
        .filter(|doc| plan.filters.iter().all(|f| matches(f, doc)))
        .collect()
}

/// Stable sort by the order keys, ties broken by namespace then name. Without keys the
/// store's order is kept.
pub fn sort_stage(docs: Vec<StoredDocument>, plan: &Plan) -> Vec<StoredDocument> {
    if plan.order.is_empty() {
        return docs;
    }
    let mut keyed: Vec<(Vec<Option<Value>>, StoredDocument)> = docs
        .into_iter()
        .map(|doc| {
            let keys = plan
                .order
                .iter()
                .map(|o| doc.lookup(&o.field).filter(|v| !v.is_null()))
                .collect();
            (keys, doc)
        })
        .collect();
    keyed.sort_by(|(ka, da), (kb, db)| {
        plan.order
            .iter()
            .zip(ka.iter().zip(kb.iter()))
            .map(|(order, (a, b))| {
                let o = sort_cmp(a.as_ref(), b.as_ref());
                match order.direction {
                    Direction::Ascending => o,
                    Direction::Descending => o.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
            .then_with(|| da.namespace().cmp(db.namespace()))
            .then_with(|| da.name().cmp(db.name()))
    });
    keyed.into_iter().map(|(_, doc)| doc).collect()
}

/// Keep the first document for each combination of distinct-key values.
pub fn distinct_stage(docs: Vec<StoredDocument>, plan: &Plan) -> Vec<StoredDocument> {
    if plan.distinct.is_empty() {
        return docs;
    }
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|doc| {
            let key: Vec<String> = plan
                .distinct
                .iter()
                .map(|field| doc.lookup(field).map(|v| format!("{}:{}", rank(&v), value_text(&v))).unwrap_or_default())
                .collect();
            seen.insert(key)
        })
        .collect()
}

pub fn paginate_stage(docs: Vec<StoredDocument>, plan: &Plan) -> Vec<StoredDocument> {
    match plan.window {
        Some((offset, limit)) => docs.into_iter().skip(offset).take(limit).collect(),
        None => docs,
    }
}
