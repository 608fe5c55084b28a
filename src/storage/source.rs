//! Record sources that feed the sequencer.

use anyhow::{Context, Result};
use tracing::info;

use super::{schema, Pool};
use crate::sequencer::record::{Record, RecordData, RecordMeta};

/// A full, ordered scan over the monthly aggregate rows.
///
/// Rows are delivered grouped by `(asn, loc)` pair, months ascending within a
/// pair. The scan runs on the calling thread and may block on I/O.
pub trait RecordSource: Send {
    /// Call `visit` for each row until the rows run out or `visit` returns
    /// `false`. Stopping early is not an error.
    fn read_rows(&mut self, visit: &mut dyn FnMut(Record) -> bool) -> Result<()>;
}

/// In-memory rows, already in delivery order.
impl RecordSource for Vec<Record> {
    fn read_rows(&mut self, visit: &mut dyn FnMut(Record) -> bool) -> Result<()> {
        for record in self.drain(..) {
            if !visit(record) {
                break;
            }
        }
        Ok(())
    }
}

/// Scans one table of the SQLite store.
pub struct SqliteSource {
    pool: Pool,
    table: String,
}

impl SqliteSource {
    pub fn new(pool: Pool, table: &str) -> Result<Self> {
        schema::check_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }
}

impl RecordSource for SqliteSource {
    fn read_rows(&mut self, visit: &mut dyn FnMut(Record) -> bool) -> Result<()> {
        let conn = self.pool.get().context("Failed to get DB connection")?;
        let mut stmt = conn.prepare(&format!(
            "SELECT client_asn_number, client_location_key, date, count, download_speed_mbps_median
             FROM {} ORDER BY client_asn_number, client_location_key, date",
            self.table
        ))?;

        let mut rows = stmt.query([])?;
        let mut scanned = 0u64;
        while let Some(row) = rows.next().context("Failed to read row")? {
            let record = Record {
                meta: RecordMeta {
                    asn: row.get(0)?,
                    loc: row.get(1)?,
                    date: row.get(2)?,
                },
                data: RecordData {
                    count: row.get(3)?,
                    download: row.get(4)?,
                },
            };
            scanned += 1;
            if !visit(record) {
                break;
            }
        }

        info!(table = %self.table, rows = scanned, "table scan finished");
        Ok(())
    }
}
