//! # Metadata Module
//!
//! Enrichment collaborator called by the orchestrator after a file's record
//! has been written.
//!
//! ## Contract
//! `enrich(path)` returns `Ok(None)` when the file carries no metadata,
//! `Ok(Some(..))` otherwise. When GPS coordinates are present they must be
//! resolved to a place name. Failing that is fatal to the run
//! ([`EnrichError::is_fatal`]); a file that cannot be read is skipped.
//!
//! ## Extracted Fields
//! - Date taken (DateTimeOriginal)
//! - Camera make and model
//! - Every primary EXIF field, as display text
//! - GPS position and resolved place
//! - Image unique identifier (groups burst shots and edits)

mod exif_reader;
mod geocode;

pub use exif_reader::{dms_to_degrees, ExifEnricher};
pub use geocode::{haversine_km, GazetteerResolver, Place, PlaceResolver};

use crate::core::store::EnrichmentColumns;
use crate::error::EnrichError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A GPS fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for GpsCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Metadata gathered for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub taken_at: Option<NaiveDateTime>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps: Option<GpsCoordinates>,
    /// Set whenever `gps` is
    pub place: Option<String>,
    pub content_identifier: Option<String>,
    /// Tag name to display value
    pub raw: BTreeMap<String, String>,
}

impl Enrichment {
    pub fn has_data(&self) -> bool {
        self.taken_at.is_some()
            || self.camera_make.is_some()
            || self.camera_model.is_some()
            || self.gps.is_some()
            || self.content_identifier.is_some()
            || !self.raw.is_empty()
    }

    /// Columns persisted on the file record
    pub fn columns(&self) -> EnrichmentColumns {
        EnrichmentColumns {
            taken_at: self.taken_at,
            gps: self.gps.map(|g| g.to_string()),
            place: self.place.clone(),
            content_identifier: self.content_identifier.clone(),
            manufacturer: self.camera_make.clone(),
            raw_exif: if self.raw.is_empty() {
                None
            } else {
                serde_json::to_string(&self.raw).ok()
            },
        }
    }
}

/// The enrichment collaborator
pub trait Enricher {
    fn enrich(&self, path: &Path) -> Result<Option<Enrichment>, EnrichError>;
}
