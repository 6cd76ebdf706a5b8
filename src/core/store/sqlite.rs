//! SQLite backend for the persistent store.

use super::{
    format_time, now, parse_time, EnrichmentColumns, FileRecord, LockRecord, NewFileRecord,
    StoreStats,
};
use crate::core::hasher::{hamming_distance, PerceptualHash};
use crate::error::StoreError;
use chrono::{NaiveDateTime, SubsecRound};
use rusqlite::types::{Type, Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a statement waits on another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        content_hash TEXT NOT NULL,
        perceptual_hash TEXT,
        is_duplicate INTEGER NOT NULL DEFAULT 0,
        duplicate_of_id INTEGER REFERENCES file_records(id),
        related_id INTEGER REFERENCES file_records(id),
        size INTEGER NOT NULL DEFAULT 0,
        media_type TEXT,
        content_identifier TEXT,
        taken_at TEXT,
        gps TEXT,
        place TEXT,
        manufacturer TEXT,
        raw_exif TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_file_records_content_hash
        ON file_records(content_hash);
    CREATE INDEX IF NOT EXISTS idx_file_records_perceptual_hash
        ON file_records(perceptual_hash);
    CREATE INDEX IF NOT EXISTS idx_file_records_content_identifier
        ON file_records(content_identifier);

    CREATE TABLE IF NOT EXISTS locks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        lock_name TEXT NOT NULL UNIQUE,
        holder_process INTEGER NOT NULL,
        holder_host TEXT NOT NULL,
        acquired_at TEXT NOT NULL,
        expires_at TEXT
    );
";

const FILE_COLUMNS: &str = "id, path, content_hash, perceptual_hash, is_duplicate, \
    duplicate_of_id, related_id, size, media_type, content_identifier, taken_at, gps, \
    place, manufacturer, raw_exif, created_at, updated_at";

const LOCK_COLUMNS: &str =
    "id, lock_name, holder_process, holder_host, acquired_at, expires_at";

/// SQLite-backed store
///
/// Uses WAL mode so read-only invocations (`duplicates`, `stats`) do not
/// block a running scan.
pub struct Store {
    conn: Connection,
    db_path: PathBuf,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::init(conn, path.to_path_buf())
    }

    /// Private in-memory database, for tests and dry runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, db_path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("Opened store at {}", db_path.display());
        Ok(Self { conn, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // ---- file records ----

    /// Insert a new record. Fails with a constraint violation if the path is
    /// already recorded.
    pub fn insert_file(&self, record: &NewFileRecord) -> Result<i64, StoreError> {
        let at = format_time(now());
        self.conn.execute(
            "INSERT INTO file_records
                (path, content_hash, perceptual_hash, is_duplicate, duplicate_of_id,
                 size, media_type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                path_value(&record.path),
                record.content_hash,
                record.perceptual_hash,
                record.is_duplicate,
                record.duplicate_of_id,
                record.size as i64,
                record.media_type,
                at,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!("Inserted file record {} for {}", id, record.path.display());
        Ok(id)
    }

    /// Overwrite the classification columns of an existing record and
    /// refresh its `updated_at`
    pub fn update_classification(&self, id: i64, record: &NewFileRecord) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE file_records
             SET content_hash = ?1, perceptual_hash = ?2, is_duplicate = ?3,
                 duplicate_of_id = ?4, size = ?5, media_type = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                record.content_hash,
                record.perceptual_hash,
                record.is_duplicate,
                record.duplicate_of_id,
                record.size as i64,
                record.media_type,
                format_time(now()),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    /// Lowest id with this content hash, ignoring `exclude`
    pub fn earliest_by_content_hash(
        &self,
        content_hash: &str,
        exclude: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        self.earliest_where("content_hash", content_hash, exclude)
    }

    /// Lowest id with exactly this perceptual hash, ignoring `exclude`
    pub fn earliest_by_perceptual_hash(
        &self,
        perceptual_hash: &str,
        exclude: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        self.earliest_where("perceptual_hash", perceptual_hash, exclude)
    }

    /// Lowest id sharing this capture identifier, ignoring `exclude`
    pub fn earliest_by_content_identifier(
        &self,
        identifier: &str,
        exclude: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        self.earliest_where("content_identifier", identifier, exclude)
    }

    fn earliest_where(
        &self,
        column: &'static str,
        value: &str,
        exclude: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT MIN(id) FROM file_records WHERE {} = ?1 AND (?2 IS NULL OR id != ?2)",
            column
        );
        let id = self
            .conn
            .query_row(&sql, params![value, exclude], |row| row.get::<_, Option<i64>>(0))?;
        Ok(id)
    }

    pub fn get_file_by_id(&self, id: i64) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {} FROM file_records WHERE id = ?1", FILE_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, [id], file_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn get_file_by_path(&self, path: &Path) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {} FROM file_records WHERE path = ?1", FILE_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, [path_value(path)], file_from_row)
            .optional()?;
        Ok(record)
    }

    /// Records in id order, optionally capped
    pub fn list_files(&self, limit: Option<usize>) -> Result<Vec<FileRecord>, StoreError> {
        let sql = format!("SELECT {} FROM file_records ORDER BY id LIMIT ?1", FILE_COLUMNS);
        // SQLite treats a negative LIMIT as no limit.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// `(id, perceptual_hash)` for every record carrying one, ascending id
    pub fn hashed_records(&self) -> Result<Vec<(i64, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, perceptual_hash FROM file_records
             WHERE perceptual_hash IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Records within `max_distance` bits of `target`, closest first
    pub fn find_similar_by_phash(
        &self,
        target: PerceptualHash,
        max_distance: u32,
    ) -> Result<Vec<(FileRecord, u32)>, StoreError> {
        let target = target.to_hex();
        let sql = format!(
            "SELECT {} FROM file_records WHERE perceptual_hash IS NOT NULL ORDER BY id",
            FILE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], file_from_row)?;

        let mut matches = Vec::new();
        for record in rows {
            let record = record?;
            let distance = record
                .perceptual_hash
                .as_deref()
                .map(|hash| hamming_distance(&target, hash))
                .unwrap_or(u32::MAX);
            if distance <= max_distance {
                matches.push((record, distance));
            }
        }
        matches.sort_by_key(|(record, distance)| (*distance, record.id));
        Ok(matches)
    }

    /// Persist enrichment output for a record. Every enrichment column is
    /// overwritten, so empty columns clear values from an earlier run.
    pub fn set_enrichment(&self, id: i64, columns: &EnrichmentColumns) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE file_records
             SET taken_at = ?1, gps = ?2, place = ?3, content_identifier = ?4,
                 manufacturer = ?5, raw_exif = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                columns.taken_at.map(format_time),
                columns.gps,
                columns.place,
                columns.content_identifier,
                columns.manufacturer,
                columns.raw_exif,
                format_time(now()),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    pub fn set_related(&self, id: i64, related_id: Option<i64>) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE file_records SET related_id = ?1 WHERE id = ?2",
            params![related_id, id],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let (total, hashed, duplicates, related, bytes) = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(perceptual_hash),
                    COALESCE(SUM(is_duplicate), 0),
                    COUNT(related_id),
                    COALESCE(SUM(size), 0)
             FROM file_records",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;
        let locks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM locks", [], |row| row.get(0))?;

        Ok(StoreStats {
            total: total as usize,
            hashed: hashed as usize,
            duplicates: duplicates as usize,
            related: related as usize,
            bytes: bytes as u64,
            locks: locks as usize,
        })
    }

    // ---- lock rows ----

    pub fn get_lock(&self, lock_name: &str) -> Result<Option<LockRecord>, StoreError> {
        let sql = format!("SELECT {} FROM locks WHERE lock_name = ?1", LOCK_COLUMNS);
        let lock = self
            .conn
            .query_row(&sql, [lock_name], lock_from_row)
            .optional()?;
        Ok(lock)
    }

    /// Insert a lock row. A constraint violation means another holder
    /// inserted first.
    pub fn insert_lock(
        &self,
        lock_name: &str,
        holder_process: u32,
        holder_host: &str,
        acquired_at: NaiveDateTime,
        expires_at: Option<NaiveDateTime>,
    ) -> Result<LockRecord, StoreError> {
        // Match the stored precision so the returned record equals the row
        let acquired_at = acquired_at.trunc_subsecs(6);
        let expires_at = expires_at.map(|t| t.trunc_subsecs(6));
        self.conn.execute(
            "INSERT INTO locks (lock_name, holder_process, holder_host, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                lock_name,
                holder_process as i64,
                holder_host,
                format_time(acquired_at),
                expires_at.map(format_time),
            ],
        )?;
        Ok(LockRecord {
            id: self.conn.last_insert_rowid(),
            lock_name: lock_name.to_string(),
            holder_process,
            holder_host: holder_host.to_string(),
            acquired_at,
            expires_at,
        })
    }

    /// Delete one lock row by id. Returns the number of rows removed.
    pub fn delete_lock(&self, id: i64) -> Result<usize, StoreError> {
        Ok(self.conn.execute("DELETE FROM locks WHERE id = ?1", [id])?)
    }

    pub fn list_locks(&self) -> Result<Vec<LockRecord>, StoreError> {
        let sql = format!("SELECT {} FROM locks ORDER BY lock_name", LOCK_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], lock_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_time(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

fn optional_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_column(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Paths are bound as text when they are valid UTF-8 and as raw bytes
/// otherwise, so two distinct names never collapse into one row
fn path_value(path: &Path) -> Value {
    match path.to_str() {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Blob(path_to_bytes(path)),
    }
}

fn path_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<PathBuf> {
    match row.get_ref(idx)? {
        ValueRef::Text(raw) => std::str::from_utf8(raw)
            .map(PathBuf::from)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        ValueRef::Blob(raw) => Ok(path_from_bytes(raw)),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "path".to_string(),
            other.data_type(),
        )),
    }
}

#[cfg(unix)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn path_from_bytes(raw: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(raw))
}

#[cfg(windows)]
fn path_to_bytes(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(windows)]
fn path_from_bytes(raw: &[u8]) -> PathBuf {
    use std::os::windows::ffi::OsStringExt;
    let wide: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    PathBuf::from(std::ffi::OsString::from_wide(&wide))
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: path_column(row, 1)?,
        content_hash: row.get(2)?,
        perceptual_hash: row.get(3)?,
        is_duplicate: row.get(4)?,
        duplicate_of_id: row.get(5)?,
        related_id: row.get(6)?,
        size: row.get::<_, i64>(7)? as u64,
        media_type: row.get(8)?,
        content_identifier: row.get(9)?,
        taken_at: optional_time_column(row, 10)?,
        gps: row.get(11)?,
        place: row.get(12)?,
        manufacturer: row.get(13)?,
        raw_exif: row.get(14)?,
        created_at: time_column(row, 15)?,
        updated_at: time_column(row, 16)?,
    })
}

fn lock_from_row(row: &Row<'_>) -> rusqlite::Result<LockRecord> {
    Ok(LockRecord {
        id: row.get(0)?,
        lock_name: row.get(1)?,
        holder_process: row.get::<_, i64>(2)? as u32,
        holder_host: row.get(3)?,
        acquired_at: time_column(row, 4)?,
        expires_at: optional_time_column(row, 5)?,
    })
}
