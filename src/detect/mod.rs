//! Year-over-year drop detection for one monthly series.
//!
//! The scan flags every month whose trailing year is more than 30% under the
//! year before it. Those flags overlap by construction, so the merge pass
//! folds them into one [`Incident`] per contiguous run.

mod drops;
pub mod incident;
mod merge;

use crate::sequencer::Series;

pub use incident::Incident;

/// Length of each comparison window.
pub const WINDOW_MONTHS: usize = 12;

/// A window counts as a drop when `previous * DROP_RATIO > current`.
pub const DROP_RATIO: f64 = 0.7;

/// Series with this many months or fewer are not analysed.
pub const MIN_SERIES_MONTHS: usize = 2 * WINDOW_MONTHS;

/// Whether `series` is long enough to hold a year-over-year comparison.
pub fn has_enough_history(series: &Series) -> bool {
    series.len() > MIN_SERIES_MONTHS
}

/// Find every sustained drop in `series`.
///
/// Series of [`MIN_SERIES_MONTHS`] or fewer months can never hold an incident
/// and yield an empty list; callers that track them check
/// [`has_enough_history`] themselves.
pub fn find_performance_drops(series: &Series) -> Vec<Incident> {
    if !has_enough_history(series) {
        return Vec::new();
    }

    let (dates, values) = series.sorted_slices();
    let raw = drops::find_drops(&values);
    let merged = merge::merge_intervals(raw);
    merge::materialize(&merged, &dates, &values)
}
