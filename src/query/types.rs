//! Query model: filters, ordering, distinct keys and pagination.

use crate::error::QueryError;
use serde_json::Value;
use std::fmt;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    /// Operators a label selector can express.
    pub fn is_set_based(self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::In
                | Operator::NotIn
                | Operator::Exists
                | Operator::DoesNotExist
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Exists => "",
            Operator::DoesNotExist => "!",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
        }
    }
}

/// One predicate on a document path (see [`crate::resource::StoredDocument::lookup`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub values: Vec<Value>,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, values: Vec<Value>) -> Self {
        Filter { field: field.into(), operator, values }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equals, vec![value.into()])
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEquals, vec![value.into()])
    }

    pub fn one_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(field, Operator::In, values.into_iter().map(Into::into).collect())
    }

    pub fn none_of<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::new(field, Operator::NotIn, values.into_iter().map(Into::into).collect())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, Vec::new())
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, Operator::DoesNotExist, Vec::new())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThan, vec![value.into()])
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThanOrEqual, vec![value.into()])
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThan, vec![value.into()])
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThanOrEqual, vec![value.into()])
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        let invalid = |reason: &str| QueryError::Filter { field: self.field.clone(), reason: reason.to_string() };
        if self.field.trim_start_matches('.').is_empty() {
            return Err(invalid("empty field path"));
        }
        match self.operator {
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(invalid("existence checks take no values"))
            }
            Operator::In | Operator::NotIn if self.values.is_empty() => Err(invalid("set operators need values")),
            Operator::Equals
            | Operator::NotEquals
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual
                if self.values.len() != 1 =>
            {
                Err(invalid("operator takes exactly one value"))
            }
            _ => Ok(()),
        }
    }
}

pub(crate) fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.values.iter().map(value_text).collect();
        match self.operator {
            Operator::Exists => f.write_str(&self.field),
            Operator::DoesNotExist => write!(f, "!{}", self.field),
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.field, self.operator.symbol(), values.join(","))
            }
            op => write!(f, "{}{}{}", self.field, op.symbol(), values.join(",")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: impl Into<String>) -> Self {
        Order { field: field.into(), direction: Direction::Ascending }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Order { field: field.into(), direction: Direction::Descending }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Ascending => f.write_str(&self.field),
            Direction::Descending => write!(f, "-{}", self.field),
        }
    }
}

/// A list query. `page` is 1-based (0 reads as the first page) and `limit` 0 means
/// [`DEFAULT_LIMIT`].
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub distinct: Vec<String>,
    pub page: i64,
    pub limit: i64,
}

impl Default for Query {
    fn default() -> Self {
        Query { filters: Vec::new(), order: Vec::new(), distinct: Vec::new(), page: DEFAULT_PAGE, limit: DEFAULT_LIMIT }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn distinct_on(mut self, field: impl Into<String>) -> Self {
        self.distinct.push(field.into());
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.page < 0 {
            return Err(QueryError::Page(self.page));
        }
        if !(0..=MAX_LIMIT).contains(&self.limit) {
            return Err(QueryError::Limit(self.limit));
        }
        self.filters.iter().try_for_each(Filter::validate)
    }

    pub fn effective_page(&self) -> i64 {
        self.page.max(DEFAULT_PAGE)
    }

    pub fn effective_limit(&self) -> i64 {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit.clamp(1, MAX_LIMIT)
        }
    }

    /// Number of documents skipped before the requested page.
    pub fn offset(&self) -> usize {
        usize::try_from((self.effective_page() - 1).saturating_mul(self.effective_limit())).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_first_page_of_ten() {
        let q = Query::new();
        assert_eq!((q.page, q.limit), (1, 10));
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn validation_bounds() {
        assert_eq!(Query::new().page(-1).validate(), Err(QueryError::Page(-1)));
        assert_eq!(Query::new().limit(-1).validate(), Err(QueryError::Limit(-1)));
        assert_eq!(Query::new().limit(1001).validate(), Err(QueryError::Limit(1001)));
        assert!(Query::new().limit(1000).validate().is_ok());
        assert!(Query::new().page(0).limit(0).validate().is_ok());
    }

    #[test]
    fn zero_page_and_limit_use_defaults() {
        let q = Query::new().page(0).limit(0);
        assert_eq!(q.effective_page(), 1);
        assert_eq!(q.effective_limit(), 10);
        assert_eq!(Query::new().page(3).limit(20).offset(), 40);
    }

    #[test]
    fn filter_arity_is_checked() {
        assert!(Filter::eq("type", 1).validate().is_ok());
        assert!(Filter::new("type", Operator::Equals, vec![]).validate().is_err());
        assert!(Filter::new("type", Operator::In, vec![]).validate().is_err());
        assert!(Filter::new("type", Operator::Exists, vec![json!(1)]).validate().is_err());
        assert!(Filter::exists(".").validate().is_err());
    }

    #[test]
    fn filters_display_as_selectors() {
        assert_eq!(Filter::eq("type", "a").to_string(), "type=a");
        assert_eq!(Filter::ne("type", 2).to_string(), "type!=2");
        assert_eq!(Filter::one_of("type", ["a", "b"]).to_string(), "type in (a,b)");
        assert_eq!(Filter::missing("owner").to_string(), "!owner");
        assert_eq!(Filter::ge("count", 3).to_string(), "count>=3");
        assert_eq!(Order::desc("count").to_string(), "-count");
    }
}
