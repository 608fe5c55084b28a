//! Raw input records and the cell decoders the builder applies to them.
//!
//! A record mirrors one row of the monthly aggregate table: a `meta` group
//! naming the network, location and month, and a `data` group holding the
//! sample count as text and the median download as a big-endian `f64`.

use chrono::NaiveDate;

use super::SequenceError;

/// Format of the `meta:date` cell.
pub const MONTH_FORMAT: &str = "%Y-%m";

/// Metadata cells of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub asn: String,
    pub loc: String,
    /// Calendar month, `YYYY-MM`.
    pub date: String,
}

/// Data cells of a row, kept exactly as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordData {
    /// Decimal integer text.
    pub count: String,
    /// 8-byte big-endian IEEE-754 double.
    pub download: Vec<u8>,
}

/// One row of the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub meta: RecordMeta,
    pub data: RecordData,
}

impl Record {
    /// Build a record from already-typed values, encoding the cells the way
    /// the table stores them.
    pub fn new(asn: &str, loc: &str, date: &str, count: u64, download: f64) -> Self {
        Self {
            meta: RecordMeta {
                asn: asn.to_string(),
                loc: loc.to_string(),
                date: date.to_string(),
            },
            data: RecordData {
                count: count.to_string(),
                download: encode_download(download),
            },
        }
    }
}

/// Parse a `YYYY-MM` cell into the first day of that month.
pub fn parse_month(value: &str) -> Result<NaiveDate, SequenceError> {
    let malformed = |source: Option<chrono::ParseError>| SequenceError::MalformedMonth {
        value: value.to_string(),
        source,
    };
    // chrono accepts signs and short fields, so check the `YYYY-MM` shape first.
    let b = value.as_bytes();
    let shaped = b.len() == 7
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..].iter().all(u8::is_ascii_digit);
    if !shaped {
        return Err(malformed(None));
    }
    // chrono cannot build a date without a day, so pin it to the 1st.
    NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").map_err(|e| malformed(Some(e)))
}

/// Parse a count cell. `None` means the cell was not a valid integer.
pub fn parse_count(value: &str) -> Option<u64> {
    value.parse().ok()
}

pub fn decode_download(bytes: &[u8]) -> Result<f64, SequenceError> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| SequenceError::MalformedDownload { len: bytes.len() })?;
    Ok(f64::from_be_bytes(raw))
}

pub fn encode_download(value: f64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}
