//! Query options and the native view-range query they translate into

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::clock::format_timestamp;
use crate::error::TransportError;

/// Rows returned when the caller does not ask for a count.
pub const DEFAULT_ROWS: usize = 10;

/// Width of the default `from..until` window.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Traversal order of the time index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl FromStr for Order {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(TransportError::InvalidQuery(format!(
                "order must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// Parse an instant given as RFC3339 text or as epoch milliseconds.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, TransportError> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| TransportError::InvalidQuery(format!("instant out of range: {raw}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TransportError::InvalidQuery(format!("invalid instant '{raw}': {e}")))
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Instant {
        Millis(i64),
        Text(String),
    }

    match Option::<Instant>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Instant::Millis(millis)) => DateTime::from_timestamp_millis(millis)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("instant out of range")),
        Some(Instant::Text(text)) => parse_instant(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// A query as the caller phrases it; every field is optional.
///
/// Missing bounds fall back to the last 24 hours. Set `unbounded` to leave
/// a missing side of the range open instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    #[serde(alias = "limit")]
    pub rows: Option<usize>,
    pub start: Option<usize>,
    pub order: Option<Order>,
    #[serde(deserialize_with = "deserialize_instant")]
    pub from: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_instant")]
    pub until: Option<DateTime<Utc>>,
    pub fields: Option<Vec<String>>,
    pub unbounded: bool,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = Some(start);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Do not apply the default window to missing bounds.
    pub fn unbounded(mut self) -> Self {
        self.unbounded = true;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Fill in defaults the way the logging front-end does.
    ///
    /// `rows` falls back to 10 (zero counts as unset), `start` to 0, `until`
    /// to `now`, `from` to 24 hours before `until` and `order` to `desc`.
    /// An `unbounded` request keeps missing bounds open.
    pub fn normalize(self, now: DateTime<Utc>) -> Result<QueryOptions, TransportError> {
        let (from, until) = if self.unbounded {
            (self.from, self.until)
        } else {
            let until = self.until.unwrap_or(now);
            let from = self
                .from
                .unwrap_or_else(|| until - Duration::hours(DEFAULT_WINDOW_HOURS));
            (Some(from), Some(until))
        };

        Ok(QueryOptions {
            rows: Some(self.rows.filter(|&rows| rows > 0).unwrap_or(DEFAULT_ROWS)),
            start: self.start.unwrap_or(0),
            order: self.order.unwrap_or_default(),
            from,
            until,
            fields: self.fields.map(|fields| fields.into_iter().collect()),
        })
    }
}

/// A normalized query. `None` bounds leave that side of the range open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub rows: Option<usize>,
    pub start: usize,
    pub order: Order,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub fields: Option<BTreeSet<String>>,
}

/// View query parameters in CouchDB's vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeRangeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub descending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endkey: Option<String>,
}

impl NativeRangeQuery {
    /// URL query pairs; keys are JSON-encoded as CouchDB expects.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(skip) = self.skip {
            pairs.push(("skip", skip.to_string()));
        }
        if self.descending {
            pairs.push(("descending", "true".to_string()));
        }
        if let Some(key) = &self.startkey {
            pairs.push(("startkey", serde_json::Value::String(key.clone()).to_string()));
        }
        if let Some(key) = &self.endkey {
            pairs.push(("endkey", serde_json::Value::String(key.clone()).to_string()));
        }
        pairs
    }

    /// Whether `key` lies inside the range for the query's direction.
    pub fn contains_key(&self, key: &str) -> bool {
        let (low, high) = if self.descending {
            (self.endkey.as_deref(), self.startkey.as_deref())
        } else {
            (self.startkey.as_deref(), self.endkey.as_deref())
        };
        low.map_or(true, |low| key >= low) && high.map_or(true, |high| key <= high)
    }
}

/// Format a query bound as an index key.
pub fn range_key(instant: &DateTime<Utc>) -> String {
    format_timestamp(instant)
}
