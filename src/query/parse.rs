//! Query strings: `page=2&limit=20&filter=type%3D1&sort=-count,name&distinct=type`.
//!
//! `filter` takes selector text and may repeat; `sort` keys prefixed with '-' sort
//! descending. A full URL is accepted too; only its query part is read.

use crate::error::QueryError;
use crate::query::selector::{parse_selector, to_selector};
use crate::query::types::{Order, Query};
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;
use url::Url;

fn parse_number(key: &str, value: &str) -> Result<i64, QueryError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| QueryError::Parse(format!("{}: {}", key, e)))
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl Query {
    /// Parse a query string (with or without a leading '?').
    pub fn from_query_string(input: &str) -> Result<Self, QueryError> {
        let input = input.trim().trim_start_matches('?');
        let mut query = Query::new();
        for (key, value) in form_urlencoded::parse(input.as_bytes()) {
            match key.as_ref() {
                "page" => query.page = parse_number("page", &value)?,
                "limit" => query.limit = parse_number("limit", &value)?,
                "filter" => query.filters.extend(parse_selector(&value)?),
                "sort" => query.order.extend(split_list(&value).map(|key| match key.strip_prefix('-') {
                    Some(field) => Order::desc(field),
                    None => Order::asc(key.trim_start_matches('+')),
                })),
                "distinct" => query.distinct.extend(split_list(&value).map(String::from)),
                other => return Err(QueryError::Parse(format!("unknown parameter '{}'", other))),
            }
        }
        query.validate()?;
        Ok(query)
    }

    /// Parse the query part of a URL.
    pub fn from_url(url: &str) -> Result<Self, QueryError> {
        let url = Url::parse(url).map_err(|e| QueryError::Parse(e.to_string()))?;
        Self::from_query_string(url.query().unwrap_or_default())
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains("://") {
            Query::from_url(s)
        } else {
            Query::from_query_string(s)
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = form_urlencoded::Serializer::new(String::new());
        out.append_pair("page", &self.page.to_string());
        out.append_pair("limit", &self.limit.to_string());
        if !self.filters.is_empty() {
            out.append_pair("filter", &to_selector(&self.filters));
        }
        if !self.order.is_empty() {
            let keys: Vec<String> = self.order.iter().map(ToString::to_string).collect();
            out.append_pair("sort", &keys.join(","));
        }
        if !self.distinct.is_empty() {
            out.append_pair("distinct", &self.distinct.join(","));
        }
        f.write_str(&out.finish())
    }
}
