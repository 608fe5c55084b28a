use chrono::{Months, NaiveDate};
use serde::Serialize;

use crate::sequencer::EntityKey;

/// Dashboard the incident links point at.
pub const DEFAULT_VIZ_BASE_URL: &str = "https://viz.measurementlab.net";

/// Date format used in links and reports.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A year or more of download speeds more than 30% below the year before.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    /// First month of the comparison window (inclusive).
    pub start: NaiveDate,
    /// Last month of the dropped year (inclusive).
    pub end: NaiveDate,
    /// Tests run from `start` up to, but not including, `end`.
    pub affected_count: u64,
    pub severity: f64,
    pub good_period_download: f64,
    pub bad_period_download: f64,
}

impl Incident {
    /// Link to the location view for `key`, opened a year before the
    /// incident so the good period is on screen too.
    pub fn url(&self, key: &EntityKey, base: &str) -> String {
        let window_start = self
            .start
            .checked_sub_months(Months::new(12))
            .unwrap_or(self.start);
        format!(
            "{}/location/{}?aggr=month&isps={}&start={}&end={}",
            base.trim_end_matches('/'),
            key.loc,
            key.asn,
            window_start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT),
        )
    }
}
