//! Producer/consumer wiring between a record source and the drop detector.
//!
//! The producer drains the source on the blocking pool and feeds a
//! [`SequenceBuilder`]; finished series cross a bounded channel to the
//! consumer, which analyses one series at a time and hands each incident to
//! a callback. The channel closing is the only end-of-stream signal, and the
//! producer's own result is always checked before the run is reported as
//! complete.

use std::num::NonZeroUsize;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::detect::{self, Incident};
use crate::sequencer::{self, BuilderStats, EntityKey, SequenceBuilder, SequenceError, Series};
use crate::storage::RecordSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error("record source failed: {0:#}")]
    Source(anyhow::Error),

    #[error("producer task failed")]
    Producer(#[from] tokio::task::JoinError),

    #[error("failed to write report")]
    Report(#[from] std::io::Error),

    #[error("run cancelled")]
    Cancelled,
}

/// What one run saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub records: u64,
    pub series: u64,
    pub series_analysed: u64,
    /// Series too short to hold a year-over-year comparison.
    pub series_skipped: u64,
    pub incidents: u64,
    pub malformed_counts: u64,
}

type Producer = JoinHandle<Result<BuilderStats, PipelineError>>;

fn spawn_producer<S>(
    mut source: S,
    mut builder: SequenceBuilder,
    cancel: CancellationToken,
) -> Producer
where
    S: RecordSource + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut failure = None;
        source
            .read_rows(&mut |record| {
                if cancel.is_cancelled() {
                    failure = Some(PipelineError::Cancelled);
                    return false;
                }
                match builder.process_record(record) {
                    Ok(()) => true,
                    Err(e) => {
                        failure = Some(e.into());
                        false
                    }
                }
            })
            .map_err(PipelineError::Source)?;

        if let Some(e) = failure {
            // `builder` drops with this closure, closing the queue without
            // emitting the in-flight series.
            return Err(e);
        }
        Ok(builder.finish()?)
    })
}

/// Close the queue and wait for the producer to notice.
async fn shut_down(rx: mpsc::Receiver<Series>, producer: Producer) {
    drop(rx);
    match producer.await {
        Ok(Ok(_))
        | Ok(Err(PipelineError::Cancelled))
        | Ok(Err(PipelineError::Sequence(SequenceError::QueueClosed))) => {}
        Ok(Err(e)) => debug!(error = %e, "producer failed during shutdown"),
        Err(e) => debug!(error = %e, "producer panicked during shutdown"),
    }
}

/// Run the full search over `source`, calling `on_incident` for every
/// incident in the order found.
///
/// Returns an error if the source fails, a record is malformed, the
/// callback fails, or `cancel` fires. Incidents already passed to the
/// callback are not retracted.
pub async fn run<S, F>(
    source: S,
    queue_capacity: NonZeroUsize,
    cancel: CancellationToken,
    mut on_incident: F,
) -> Result<RunSummary, PipelineError>
where
    S: RecordSource + 'static,
    F: FnMut(&EntityKey, &Incident) -> Result<(), PipelineError>,
{
    let (builder, mut rx) = sequencer::channel(queue_capacity);
    let producer = spawn_producer(source, builder, cancel.clone());
    let mut summary = RunSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            series = rx.recv() => Some(series),
        };
        let series = match next {
            None => {
                info!("cancellation requested, stopping");
                shut_down(rx, producer).await;
                return Err(PipelineError::Cancelled);
            }
            Some(None) => break,
            Some(Some(series)) => series,
        };

        summary.series += 1;
        if !detect::has_enough_history(&series) {
            debug!(key = %series.key, months = series.len(), "series too short, skipping");
            summary.series_skipped += 1;
            continue;
        }

        summary.series_analysed += 1;
        let incidents = detect::find_performance_drops(&series);
        for incident in &incidents {
            if let Err(e) = on_incident(&series.key, incident) {
                shut_down(rx, producer).await;
                return Err(e);
            }
        }
        summary.incidents += incidents.len() as u64;
    }

    let stats = match producer.await? {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "producer failed");
            return Err(e);
        }
    };
    summary.records = stats.records;
    summary.malformed_counts = stats.malformed_counts;

    info!(
        records = summary.records,
        series = summary.series,
        analysed = summary.series_analysed,
        skipped = summary.series_skipped,
        incidents = summary.incidents,
        malformed_counts = summary.malformed_counts,
        "search complete"
    );
    Ok(summary)
}
