//! Year-over-year sliding window scan.

use crate::sequencer::Measurement;

use super::{DROP_RATIO, WINDOW_MONTHS};

/// A candidate drop, indexed into the sorted sample arrays of one series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct RawInterval {
    pub start: usize,
    pub end: usize,
    /// Fractional drop, `1 - current/previous`.
    pub severity: f64,
    /// Mean monthly download over the year before the drop.
    pub good_period_download: f64,
    /// Mean monthly download over the dropped year.
    pub bad_period_download: f64,
}

/// Compare every 12-month window with the 12 months before it and flag each
/// month where the later year's total is more than 30% under the earlier one.
///
/// Consecutive flagged months produce overlapping intervals; run the result
/// through `merge::merge_intervals`.
pub(crate) fn find_drops(values: &[Measurement]) -> Vec<RawInterval> {
    let w = WINDOW_MONTHS;
    if values.len() < 2 * w {
        return Vec::new();
    }

    let mut previous: f64 = values[..w].iter().map(|m| m.download).sum();
    let mut current: f64 = values[w..2 * w].iter().map(|m| m.download).sum();

    let mut found = Vec::new();
    for i in 2 * w..values.len() {
        previous += values[i - w].download - values[i - 2 * w].download;
        current += values[i].download - values[i - w].download;

        if previous * DROP_RATIO > current {
            found.push(RawInterval {
                start: i - w,
                end: i,
                severity: 1.0 - current / previous,
                good_period_download: previous / w as f64,
                bad_period_download: current / w as f64,
            });
        }
    }
    found
}
