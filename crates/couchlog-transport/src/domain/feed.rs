//! Change-feed types: offsets, feed options, change notifications

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Keep-alive interval the store is asked to send on an idle feed.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Position in the store's update sequence.
///
/// CouchDB 1.x issues integers, 2.x and later opaque strings. Both are
/// passed back verbatim as `since`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamOffset {
    Number(i64),
    Token(String),
}

impl StreamOffset {
    /// The beginning of the sequence.
    pub const ZERO: StreamOffset = StreamOffset::Number(0);

    /// `-1` asks for the current tip.
    pub fn is_tip(&self) -> bool {
        matches!(self, Self::Number(-1))
    }

    /// Numeric value, when the token has one (`"42"` or `"42-g1AAA..."`).
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Token(token) => token.split('-').next().and_then(|n| n.parse().ok()),
        }
    }
}

impl Default for StreamOffset {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Token(token) => f.write_str(token),
        }
    }
}

impl From<i64> for StreamOffset {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for StreamOffset {
    fn from(value: &str) -> Self {
        Self::Token(value.to_string())
    }
}

/// Options for opening a live log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Offset to resume from. Absent or `-1` means "from the current tip".
    pub start: Option<StreamOffset>,
}

impl StreamOptions {
    /// Only logs written after the stream opens.
    pub fn from_tip() -> Self {
        Self::default()
    }

    /// Resume after `offset`.
    pub fn since(offset: impl Into<StreamOffset>) -> Self {
        Self {
            start: Some(offset.into()),
        }
    }

    /// The explicit start offset, with `-1` treated as unset.
    pub fn resolved_start(&self) -> Option<StreamOffset> {
        self.start.clone().filter(|offset| !offset.is_tip())
    }
}

/// Revision style of the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedStyle {
    /// Winning revision only, no conflict branches.
    #[default]
    MainOnly,
    AllDocs,
}

impl FeedStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainOnly => "main_only",
            Self::AllDocs => "all_docs",
        }
    }
}

/// Parameters of a continuous change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    pub since: StreamOffset,
    pub include_docs: bool,
    pub style: FeedStyle,
    pub descending: bool,
    pub heartbeat: Duration,
}

impl FeedOptions {
    /// Forward feed of full documents, winning revisions only.
    pub fn continuous(since: StreamOffset) -> Self {
        Self {
            since,
            include_docs: true,
            style: FeedStyle::MainOnly,
            descending: false,
            heartbeat: DEFAULT_HEARTBEAT,
        }
    }

    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("feed", "continuous".to_string()),
            ("include_docs", self.include_docs.to_string()),
            ("style", self.style.as_str().to_string()),
            ("descending", self.descending.to_string()),
            ("since", self.since.to_string()),
            ("heartbeat", self.heartbeat.as_millis().to_string()),
        ]
    }
}

/// One change notification from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub seq: StreamOffset,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

impl Change {
    /// The `params` payload of a live log document, if this change carries one.
    ///
    /// Deletions, changes without a body and documents that are not logs
    /// (the design document, for one) yield `None`.
    pub fn log_params(&self) -> Option<&Map<String, Value>> {
        if self.deleted {
            return None;
        }
        self.doc.as_ref()?.get("params")?.as_object()
    }
}

/// Database metadata returned by `GET /{db}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub update_seq: StreamOffset,
}
