//! Coalescing of per-month drop flags into incidents.

use chrono::NaiveDate;

use crate::sequencer::Measurement;

use super::drops::RawInterval;
use super::Incident;

/// Merge intervals whose end indexes step forward by exactly one month.
///
/// Only the end index takes part in the adjacency test: the next interval
/// joins the accumulator when `acc.end + 1 == next.end`, whatever its start.
/// Severity keeps the maximum; the bad-period download is a running pairwise
/// mean, so later months weigh more than earlier ones.
pub(crate) fn merge_intervals(intervals: Vec<RawInterval>) -> Vec<RawInterval> {
    let mut iter = intervals.into_iter();
    let Some(mut acc) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::new();
    for next in iter {
        if acc.end + 1 == next.end {
            acc.end = next.end;
            acc.severity = acc.severity.max(next.severity);
            acc.bad_period_download = (acc.bad_period_download + next.bad_period_download) / 2.0;
        } else {
            merged.push(acc);
            acc = next;
        }
    }
    merged.push(acc);
    merged
}

/// Turn merged index intervals back into dated incidents.
///
/// `affected_count` covers `[start, end)`: the end month is not counted.
pub(crate) fn materialize(
    intervals: &[RawInterval],
    dates: &[NaiveDate],
    values: &[Measurement],
) -> Vec<Incident> {
    intervals
        .iter()
        .map(|r| Incident {
            start: dates[r.start],
            end: dates[r.end],
            affected_count: values[r.start..r.end].iter().map(|m| m.count).sum(),
            severity: r.severity,
            good_period_download: r.good_period_download,
            bad_period_download: r.bad_period_download,
        })
        .collect()
}
