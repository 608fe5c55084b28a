//! SQLite storage layer -- schema, row import, table scans.

pub mod schema;
pub mod source;

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags};
use serde::Deserialize;

use crate::sequencer::record::{encode_download, Record, RecordMeta};

pub use source::{RecordSource, SqliteSource};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str, table: &str) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database: {path}"))?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn, table)?;

    Ok(pool)
}

/// Open an existing database for scanning.
///
/// Unlike [`open_pool`] this never creates the file or changes its schema: a
/// missing file or table is an error.
pub fn open_pool_read_only(path: &str, table: &str) -> Result<Pool> {
    if !Path::new(path).is_file() {
        bail!("database not found: {path}");
    }
    let manager = SqliteConnectionManager::file(path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_init(|c| c.execute_batch("PRAGMA busy_timeout = 5000;"));

    let pool = R2D2Pool::new(manager)
        .with_context(|| format!("failed to open database: {path}"))?;

    let conn = pool.get()?;
    schema::ensure_table(&conn, table)?;

    Ok(pool)
}

/// Row key for a record: `{asn}-{loc}-{date}`. Unique per pair and month, but
/// not a safe sort key: `-` inside a location can interleave two pairs.
pub fn row_key(meta: &RecordMeta) -> String {
    format!("{}-{}-{}", meta.asn, meta.loc, meta.date)
}

/// Insert or replace one raw row.
pub fn insert_record(conn: &Connection, table: &str, record: &Record) -> Result<()> {
    schema::check_table_name(table)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {table}
             (row_key, client_asn_number, client_location_key, date, count, download_speed_mbps_median)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ),
        params![
            row_key(&record.meta),
            record.meta.asn,
            record.meta.loc,
            record.meta.date,
            record.data.count,
            record.data.download,
        ],
    )?;
    Ok(())
}

/// Columns an import file must name in its header row.
pub const IMPORT_COLUMNS: [&str; 5] = ["asn", "loc", "date", "count", "download"];

/// One line of an import file. Month and count stay as text so the sequencer
/// sees exactly what a production table would hold.
#[derive(Debug, Deserialize)]
struct ImportRow {
    asn: String,
    loc: String,
    date: String,
    count: String,
    download: f64,
}

/// Load CSV rows with an `asn,loc,date,count,download` header into `table`.
///
/// Columns are matched by header name, fields may be quoted, and surrounding
/// whitespace is trimmed. Blank lines and `#` comments are skipped. Only the
/// download is converted, to the 8-byte encoding the sequencer reads. The
/// whole file is one transaction. Returns the number of rows written.
pub fn import_rows(conn: &mut Connection, table: &str, input: impl Read) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(input);

    let headers = reader.headers().context("failed to read import header")?;
    for column in IMPORT_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            bail!("import header is missing column {column:?}");
        }
    }

    let tx = conn.transaction()?;
    let mut written = 0;
    for row in reader.deserialize::<ImportRow>() {
        let row = row.context("failed to read import row")?;
        let mut record = Record::new(&row.asn, &row.loc, &row.date, 0, 0.0);
        record.data.count = row.count;
        record.data.download = encode_download(row.download);
        insert_record(&tx, table, &record)?;
        written += 1;
    }

    tx.commit()?;
    tracing::info!(%table, rows = written, "import complete");
    Ok(written)
}
