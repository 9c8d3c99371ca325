//! Query translation: abstract options to a `byTimestamp` range query

use tracing::debug;

use crate::domain::query::range_key;
use crate::domain::{LogRecord, NativeRangeQuery, Order, QueryOptions, DESIGN_NAME, VIEW_NAME};
use crate::error::TransportError;
use crate::ports::DocumentStore;

/// Map normalized options onto CouchDB view parameters.
///
/// A descending scan walks the index from its high end, so `until` becomes
/// the start key and `from` the end key.
pub fn translate(options: &QueryOptions) -> NativeRangeQuery {
    let from = options.from.as_ref().map(range_key);
    let until = options.until.as_ref().map(range_key);
    let (startkey, endkey, descending) = match options.order {
        Order::Desc => (until, from, true),
        Order::Asc => (from, until, false),
    };

    NativeRangeQuery {
        limit: options.rows,
        skip: (options.start > 0).then_some(options.start),
        descending,
        startkey,
        endkey,
    }
}

/// Unwrap view rows to their `params`, projecting to `fields` when given.
pub fn collect_records(rows: Vec<serde_json::Value>, options: &QueryOptions) -> Vec<LogRecord> {
    rows.iter()
        .filter_map(LogRecord::from_document)
        .map(|record| match &options.fields {
            Some(fields) => record.project(fields),
            None => record,
        })
        .collect()
}

/// Run a normalized query against `store`.
pub async fn execute(
    store: &dyn DocumentStore,
    options: &QueryOptions,
) -> Result<Vec<LogRecord>, TransportError> {
    let native = translate(options);
    debug!(
        descending = native.descending,
        startkey = ?native.startkey,
        endkey = ?native.endkey,
        limit = ?native.limit,
        skip = ?native.skip,
        "Querying log view"
    );
    let rows = store.view(DESIGN_NAME, VIEW_NAME, &native).await?;
    Ok(collect_records(rows, options))
}
