//! couchlog-admin: write, query and tail logs stored in CouchDB.

use anyhow::{Context, Result};
use clap::Parser;
use couchlog_telemetry::{init_logging, log_transport_event, TelemetryConfig};
use couchlog_transport::CouchDbTransport;
use std::io;

use couchlog_admin::cli::{stream_options, Cli, Command};
use couchlog_admin::commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::for_service("couchlog-admin");
    if cli.json_logs {
        telemetry = telemetry.with_json_logs(true);
    }
    let _guard = init_logging(&telemetry)?;

    let transport =
        CouchDbTransport::new(&cli.connection.to_config()).context("invalid connection settings")?;
    let settings = transport.settings();
    log_transport_event!(debug, settings.name, settings.db, "Connecting", url = %settings.url);

    let mut out = io::stdout().lock();
    match cli.command {
        Command::Log { level, message, meta } => {
            commands::log(&transport, &level, &message, meta, &mut out).await?;
        }
        Command::Query(args) => {
            commands::query(&transport, args.to_request()?, &mut out).await?;
        }
        Command::Tail { start } => {
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            commands::tail(&transport, stream_options(start), &mut out, shutdown).await?;
        }
        Command::EnsureIndex => {
            commands::ensure_index(&transport, &mut out).await?;
        }
    }

    let metrics = transport.metrics().snapshot();
    log_transport_event!(debug, settings.name, settings.db, "Done", metrics = ?metrics);
    Ok(())
}
