//! Database schema and migrations.

use anyhow::{bail, Result};
use rusqlite::Connection;

/// Name of the monthly aggregate table.
pub const DEFAULT_TABLE: &str = "client_asn_client_loc_by_month";

/// Table names are spliced into SQL, so only plain identifiers are allowed.
pub fn check_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("invalid table name {table:?}");
    }
    Ok(())
}

/// Create the monthly aggregate table if it does not exist.
///
/// `count` and `download_speed_mbps_median` hold the raw cell contents
/// (decimal text and 8 big-endian bytes) and are decoded by the sequencer.
pub fn migrate(conn: &Connection, table: &str) -> Result<()> {
    check_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS {table} (
            row_key TEXT PRIMARY KEY,
            client_asn_number TEXT NOT NULL,
            client_location_key TEXT NOT NULL,
            date TEXT NOT NULL,
            count TEXT NOT NULL,
            download_speed_mbps_median BLOB NOT NULL
        );

        CREATE INDEX IF NOT EXISTS {table}_by_pair
            ON {table} (client_asn_number, client_location_key, date);

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);"
    ))?;
    Ok(())
}

/// Fail unless `table` already exists. Used where the schema must not be
/// touched, such as read-only scans.
pub fn ensure_table(conn: &Connection, table: &str) -> Result<()> {
    check_table_name(table)?;
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if !found {
        bail!("table {table} not found in database");
    }
    Ok(())
}
