//! Subcommand implementations. Results go to `out` as JSON lines.

use anyhow::{Context, Result};
use couchlog_transport::{
    CouchDbTransport, Metadata, QueryRequest, StreamEvent, StreamOffset, StreamOptions,
};
use serde_json::{json, Value};
use std::future::Future;
use std::io::Write;
use tracing::{debug, info};

fn write_line<W: Write>(out: &mut W, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

pub async fn log<W: Write>(
    transport: &CouchDbTransport,
    level: &str,
    message: &str,
    meta: Option<Value>,
    out: &mut W,
) -> Result<()> {
    let metadata = meta.map(Metadata::from).unwrap_or_default();
    let logged = transport
        .log(level, message, metadata)
        .await
        .context("failed to write log")?;
    write_line(out, &json!({ "logged": logged }))
}

pub async fn query<W: Write>(
    transport: &CouchDbTransport,
    request: QueryRequest,
    out: &mut W,
) -> Result<usize> {
    let records = transport.query(request).await.context("query failed")?;
    for record in &records {
        write_line(out, record)?;
    }
    debug!(rows = records.len(), "Query finished");
    Ok(records.len())
}

/// Print live logs until `shutdown` resolves or the feed ends.
///
/// Returns the offset to resume from.
pub async fn tail<W, F>(
    transport: &CouchDbTransport,
    options: StreamOptions,
    out: &mut W,
    shutdown: F,
) -> Result<Option<StreamOffset>>
where
    W: Write,
    F: Future<Output = ()>,
{
    let mut stream = transport.stream(options);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = stream.recv() => match event {
                Some(StreamEvent::Log(record)) => write_line(out, &record)?,
                Some(StreamEvent::Error(e)) => {
                    let resume = stream
                        .offset()
                        .map(|offset| offset.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    return Err(anyhow::Error::new(e)
                        .context(format!("tail stopped (resume with --start {resume})")));
                }
                None => break,
            },
        }
    }

    let offset = stream.offset();
    stream.destroy();
    info!(
        offset = %offset.as_ref().map(ToString::to_string).unwrap_or_default(),
        "Tail stopped"
    );
    Ok(offset)
}

pub async fn ensure_index<W: Write>(transport: &CouchDbTransport, out: &mut W) -> Result<()> {
    transport
        .ensure_index()
        .await
        .context("index provisioning failed")?;
    let settings = transport.settings();
    write_line(
        out,
        &json!({ "db": settings.db, "state": format!("{:?}", transport.provisioning_state()) }),
    )
}
