//! Regroups a flat, key-clustered record stream into per-key monthly series.
//!
//! Rows arrive grouped by `(asn, loc)`, so every row for one pair is
//! contiguous. The builder keeps exactly one in-flight [`Series`] and hands it
//! to the output queue the moment a row with a different key shows up.

pub mod record;

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use record::Record;

/// Capacity of the series queue unless configured otherwise.
pub const DEFAULT_QUEUE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => panic!("default queue capacity is zero"),
};

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("could not parse month {value:?}")]
    MalformedMonth {
        value: String,
        /// Absent when the text is not shaped like `YYYY-MM` at all.
        #[source]
        source: Option<chrono::ParseError>,
    },

    #[error("download cell must be 8 bytes, got {len}")]
    MalformedDownload { len: usize },

    #[error("series queue closed by consumer")]
    QueueClosed,
}

/// Identity of one time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityKey {
    pub asn: String,
    pub loc: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asn, self.loc)
    }
}

/// One month of aggregated tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measurement {
    /// Number of tests in the month.
    pub count: u64,
    /// Median download speed, Mbps.
    pub download: f64,
}

/// A key plus its month -> measurement mapping.
#[derive(Debug, Clone)]
pub struct Series {
    pub key: EntityKey,
    pub samples: HashMap<NaiveDate, Measurement>,
}

impl Series {
    pub fn new(key: EntityKey) -> Self {
        Self {
            key,
            samples: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Split the mapping into parallel vectors ordered by month.
    pub fn sorted_slices(&self) -> (Vec<NaiveDate>, Vec<Measurement>) {
        let mut dates: Vec<NaiveDate> = self.samples.keys().copied().collect();
        dates.sort_unstable();
        let values = dates.iter().map(|d| self.samples[d]).collect();
        (dates, values)
    }
}

/// Counters kept by a builder over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuilderStats {
    pub records: u64,
    pub series_emitted: u64,
    /// Count cells that failed to parse and were read as zero.
    pub malformed_counts: u64,
}

/// Groups records into [`Series`] and pushes finished ones onto a bounded
/// queue.
///
/// Sending blocks when the queue is full, so the builder must be driven from
/// a blocking context (a plain thread or `spawn_blocking`), never directly
/// from inside an async task.
pub struct SequenceBuilder {
    current: Option<Series>,
    output: mpsc::Sender<Series>,
    stats: BuilderStats,
}

/// Make a builder and the receiving end of its series queue.
pub fn channel(capacity: NonZeroUsize) -> (SequenceBuilder, mpsc::Receiver<Series>) {
    let (tx, rx) = mpsc::channel(capacity.get());
    let builder = SequenceBuilder {
        current: None,
        output: tx,
        stats: BuilderStats::default(),
    };
    (builder, rx)
}

impl SequenceBuilder {
    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    /// Fold one record into the in-flight series, emitting the previous
    /// series first if the key changed.
    ///
    /// A bad month or download cell is fatal. A bad count is read as zero.
    pub fn process_record(&mut self, record: Record) -> Result<(), SequenceError> {
        let Record { meta, data } = record;
        let month = record::parse_month(&meta.date)?;
        let download = record::decode_download(&data.download)?;
        let count = match record::parse_count(&data.count) {
            Some(c) => c,
            None => {
                warn!(
                    asn = %meta.asn,
                    loc = %meta.loc,
                    month = %meta.date,
                    value = %data.count,
                    "unparseable count, using 0"
                );
                self.stats.malformed_counts += 1;
                0
            }
        };
        let key = EntityKey {
            asn: meta.asn,
            loc: meta.loc,
        };

        if self.current.as_ref().is_some_and(|s| s.key != key) {
            self.emit()?;
        }
        let series = self.current.get_or_insert_with(|| Series::new(key));
        series
            .samples
            .insert(month, Measurement { count, download });
        self.stats.records += 1;
        Ok(())
    }

    /// Emit the last series, if any, and close the queue.
    pub fn finish(mut self) -> Result<BuilderStats, SequenceError> {
        self.emit()?;
        // Dropping `self.output` here is what closes the queue.
        Ok(self.stats)
    }

    fn emit(&mut self) -> Result<(), SequenceError> {
        let Some(series) = self.current.take() else {
            return Ok(());
        };
        debug!(key = %series.key, months = series.len(), "series complete");
        self.output
            .blocking_send(series)
            .map_err(|_| SequenceError::QueueClosed)?;
        self.stats.series_emitted += 1;
        Ok(())
    }
}
