//! Incident report formatting.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::detect::incident::DATE_FORMAT;
use crate::detect::Incident;
use crate::sequencer::EntityKey;

/// Column header of the CSV report.
pub const CSV_HEADER: &str = "TestsAffected, AS, LocationCode, Start, End, URL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    asn: &'a str,
    loc: &'a str,
    #[serde(flatten)]
    incident: &'a Incident,
    url: String,
}

/// Writes incidents to `out` as they are found.
pub struct Reporter<W: Write> {
    out: W,
    format: ReportFormat,
    viz_base_url: String,
    started: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, format: ReportFormat, viz_base_url: &str) -> Self {
        Self {
            out,
            format,
            viz_base_url: viz_base_url.to_string(),
            started: false,
        }
    }

    /// Print the CSV header. Called implicitly by the first incident; call it
    /// directly so an empty report still has one.
    pub fn start(&mut self) -> io::Result<()> {
        if !self.started {
            self.started = true;
            if self.format == ReportFormat::Csv {
                writeln!(self.out, "{CSV_HEADER}")?;
            }
        }
        Ok(())
    }

    pub fn write_incident(&mut self, key: &EntityKey, incident: &Incident) -> io::Result<()> {
        self.start()?;
        let url = incident.url(key, &self.viz_base_url);
        match self.format {
            ReportFormat::Csv => writeln!(
                self.out,
                "{}, {}, {}, {}, {}, {}",
                incident.affected_count,
                key.asn,
                key.loc,
                incident.start.format(DATE_FORMAT),
                incident.end.format(DATE_FORMAT),
                url,
            ),
            ReportFormat::Json => {
                let line = JsonLine {
                    asn: &key.asn,
                    loc: &key.loc,
                    incident,
                    url,
                };
                serde_json::to_writer(&mut self.out, &line)?;
                writeln!(self.out)
            }
        }
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixture() -> (EntityKey, Incident) {
        let key = EntityKey {
            asn: "AS2".to_string(),
            loc: "venus".to_string(),
        };
        let incident = Incident {
            start: NaiveDate::from_ymd_opt(2014, 8, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2016, 6, 1).unwrap(),
            affected_count: 66,
            severity: 0.5,
            good_period_download: 20.0,
            bad_period_download: 11.25,
        };
        (key, incident)
    }

    #[test]
    fn test_csv_line() {
        let (key, incident) = fixture();
        let mut reporter = Reporter::new(Vec::new(), ReportFormat::Csv, "https://viz.example");
        reporter.write_incident(&key, &incident).unwrap();
        let text = String::from_utf8(reporter.finish().unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "66, AS2, venus, 2014-08-01, 2016-06-01, \
             https://viz.example/location/venus?aggr=month&isps=AS2&start=2013-08-01&end=2016-06-01"
        );
    }

    #[test]
    fn test_empty_csv_report_has_header() {
        let mut reporter = Reporter::new(Vec::new(), ReportFormat::Csv, "https://viz.example");
        reporter.start().unwrap();
        reporter.start().unwrap();
        let text = String::from_utf8(reporter.finish().unwrap()).unwrap();
        assert_eq!(text, format!("{CSV_HEADER}\n"));
    }

    #[test]
    fn test_json_line() {
        let (key, incident) = fixture();
        let mut reporter = Reporter::new(Vec::new(), ReportFormat::Json, "https://viz.example");
        reporter.start().unwrap();
        reporter.write_incident(&key, &incident).unwrap();
        let text = String::from_utf8(reporter.finish().unwrap()).unwrap();

        assert_eq!(text.lines().count(), 1);
        let v: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(v["asn"], "AS2");
        assert_eq!(v["loc"], "venus");
        assert_eq!(v["affected_count"], 66);
        assert_eq!(v["start"], "2014-08-01");
        assert_eq!(v["severity"], 0.5);
        assert!(v["url"].as_str().unwrap().contains("isps=AS2"));
    }
}
