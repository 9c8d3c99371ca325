//! Command-line surface.

use clap::{Args, Parser, Subcommand};
use couchlog_transport::domain::query::parse_instant;
use couchlog_transport::{Order, QueryRequest, StreamOffset, StreamOptions, TransportConfig};
use serde_json::Value;
use std::convert::Infallible;

/// Couchlog admin: write, query and tail logs stored in CouchDB
#[derive(Parser, Debug)]
#[command(name = "couchlog-admin", version)]
#[command(about = "Write, query and tail logs stored in CouchDB")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the logs live. Every flag falls back to its `COUCHLOG_*` variable.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Host or URL prefix, e.g. `couch.internal` or `https://couch.internal`
    #[arg(long, env = "COUCHLOG_HOST", global = true)]
    pub host: Option<String>,

    #[arg(long, env = "COUCHLOG_PORT", global = true)]
    pub port: Option<u16>,

    /// Database name
    #[arg(long, env = "COUCHLOG_DB", global = true)]
    pub db: Option<String>,

    #[arg(long, env = "COUCHLOG_USER", global = true)]
    pub user: Option<String>,

    #[arg(long, env = "COUCHLOG_PASS", global = true, hide_env_values = true)]
    pub pass: Option<String>,

    /// Verify TLS certificates
    #[arg(long, env = "COUCHLOG_SECURE", global = true)]
    pub secure: bool,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> TransportConfig {
        TransportConfig {
            host: self.host.clone(),
            port: self.port,
            db: self.db.clone(),
            user: self.user.clone(),
            pass: self.pass.clone(),
            secure: self.secure,
            ..TransportConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write one log document
    Log {
        level: String,
        message: String,
        /// Metadata as a JSON value
        #[arg(long, value_parser = parse_json)]
        meta: Option<Value>,
    },

    /// Query logs by time range, one JSON object per line
    Query(QueryArgs),

    /// Follow newly written logs until interrupted
    Tail {
        /// Sequence to resume from; -1 or omitted means the current tip
        #[arg(long, value_parser = parse_offset, allow_hyphen_values = true)]
        start: Option<StreamOffset>,
    },

    /// Create the database and the timestamp view if missing
    EnsureIndex,
}

#[derive(Args, Debug, Default, Clone)]
pub struct QueryArgs {
    /// Maximum number of rows
    #[arg(long)]
    pub rows: Option<usize>,

    /// Rows to skip
    #[arg(long)]
    pub start: Option<usize>,

    /// asc or desc
    #[arg(long)]
    pub order: Option<Order>,

    /// Lower bound, RFC3339 or epoch milliseconds
    #[arg(long)]
    pub from: Option<String>,

    /// Upper bound, RFC3339 or epoch milliseconds
    #[arg(long)]
    pub until: Option<String>,

    /// Comma-separated fields to keep
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Leave omitted bounds open instead of the last 24 hours
    #[arg(long)]
    pub all_time: bool,
}

impl QueryArgs {
    pub fn to_request(&self) -> anyhow::Result<QueryRequest> {
        Ok(QueryRequest {
            rows: self.rows,
            start: self.start,
            order: self.order,
            from: self.from.as_deref().map(parse_instant).transpose()?,
            until: self.until.as_deref().map(parse_instant).transpose()?,
            fields: (!self.fields.is_empty()).then(|| self.fields.clone()),
            unbounded: self.all_time,
        })
    }
}

pub fn stream_options(start: Option<StreamOffset>) -> StreamOptions {
    match start {
        Some(offset) => StreamOptions::since(offset),
        None => StreamOptions::from_tip(),
    }
}

fn parse_json(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Numbers stay numbers; anything else is an opaque sequence token.
fn parse_offset(raw: &str) -> Result<StreamOffset, Infallible> {
    let raw = raw.trim();
    Ok(match raw.parse::<i64>() {
        Ok(n) => StreamOffset::Number(n),
        Err(_) => StreamOffset::Token(raw.to_string()),
    })
}
