//! # Store Module
//!
//! Persistent records shared by every invocation: one row per scanned file
//! and one row per held lock.
//!
//! The store is opened by the coordinating thread only. Workers never touch
//! it, so all mutations are serialized without store-level locking beyond the
//! lock rows themselves.

mod sqlite;

pub use sqlite::Store;

use chrono::{NaiveDateTime, SubsecRound, Utc};
use serde::Serialize;
use std::path::PathBuf;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Current UTC time, at the microsecond precision the database stores
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

pub(crate) fn format_time(time: NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub(crate) fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// A persisted file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    /// 32 hex digits
    pub content_hash: String,
    /// 16 hex digits, absent for non-images
    pub perceptual_hash: Option<String>,
    pub is_duplicate: bool,
    /// Always a smaller id than `id` when set
    pub duplicate_of_id: Option<i64>,
    /// Grouping that is not hash based (shared capture identifiers)
    pub related_id: Option<i64>,
    pub size: u64,
    pub media_type: Option<String>,
    pub content_identifier: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
    /// `"lat,lon"`
    pub gps: Option<String>,
    pub place: Option<String>,
    /// Camera make
    pub manufacturer: Option<String>,
    /// JSON object of the primary EXIF fields
    pub raw_exif: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Classification columns written by the duplicate classifier
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileRecord {
    pub path: PathBuf,
    pub content_hash: String,
    pub perceptual_hash: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of_id: Option<i64>,
    pub size: u64,
    pub media_type: Option<String>,
}

/// Enrichment columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentColumns {
    pub taken_at: Option<NaiveDateTime>,
    pub gps: Option<String>,
    pub place: Option<String>,
    pub content_identifier: Option<String>,
    pub manufacturer: Option<String>,
    pub raw_exif: Option<String>,
}

/// A lease lock row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRecord {
    pub id: i64,
    pub lock_name: String,
    pub holder_process: u32,
    pub holder_host: String,
    pub acquired_at: NaiveDateTime,
    pub expires_at: Option<NaiveDateTime>,
}

impl LockRecord {
    /// A lock without an expiry never expires
    pub fn is_expired(&self, at: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|expires| expires < at)
    }
}

/// Row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    /// Records carrying a perceptual hash
    pub hashed: usize,
    pub duplicates: usize,
    pub related: usize,
    /// Sum of recorded file sizes
    pub bytes: u64,
    pub locks: usize,
}

impl StoreStats {
    pub fn unique(&self) -> usize {
        self.total - self.duplicates
    }
}
