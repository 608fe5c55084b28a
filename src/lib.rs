//! signalsearcher -- finds year-long drops in per-network download speeds.
//!
//! Monthly aggregates keyed by (ASN, location) are regrouped into series,
//! scanned year over year, and every stretch where a year ran more than 30%
//! below the year before it is reported as an incident.

pub mod config;
pub mod detect;
pub mod pipeline;
pub mod report;
pub mod sequencer;
pub mod storage;

use std::io::Write;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::pipeline::RunSummary;
use crate::report::Reporter;

/// Scan the configured table and write the incident report to `out`.
///
/// The database is opened read-only and must already hold the table.
pub async fn scan<W: Write>(
    config: &Config,
    out: W,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    config.validate()?;
    let db_path = config.source.db_path.to_string_lossy();
    tracing::info!(%db_path, table = %config.source.table, "Starting scan");

    let pool = storage::open_pool_read_only(&db_path, &config.source.table)?;
    let source = storage::SqliteSource::new(pool, &config.source.table)?;

    let mut reporter = Reporter::new(out, config.report.format, &config.report.viz_base_url);
    reporter.start().context("failed to write report header")?;

    let summary = pipeline::run(
        source,
        config.pipeline.queue_capacity,
        cancel,
        |key, incident| Ok(reporter.write_incident(key, incident)?),
    )
    .await?;

    reporter.finish().context("failed to flush report")?;
    Ok(summary)
}
