//! EXIF-backed enricher.

use super::{Enricher, Enrichment, GpsCoordinates, PlaceResolver};
use crate::error::EnrichError;
use chrono::NaiveDateTime;
use exif::{In, Rational, Reader, Tag, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads EXIF tags and names the place of any GPS fix
pub struct ExifEnricher<R: PlaceResolver> {
    resolver: R,
}

impl<R: PlaceResolver> ExifEnricher<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Attach a place name to a GPS-tagged enrichment
    fn resolve_place(&self, path: &Path, mut enrichment: Enrichment) -> Result<Enrichment, EnrichError> {
        if let Some(position) = enrichment.gps {
            match self.resolver.resolve(position) {
                Some(place) => enrichment.place = Some(place),
                None => {
                    return Err(EnrichError::Unresolvable {
                        path: path.to_path_buf(),
                        latitude: position.latitude,
                        longitude: position.longitude,
                    })
                }
            }
        }
        Ok(enrichment)
    }
}

impl<R: PlaceResolver> Enricher for ExifEnricher<R> {
    fn enrich(&self, path: &Path) -> Result<Option<Enrichment>, EnrichError> {
        let file = File::open(path).map_err(|e| EnrichError::Failed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut bufreader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut bufreader) {
            Ok(exif) => exif,
            Err(e) => {
                tracing::debug!("No EXIF in {}: {}", path.display(), e);
                return Ok(None);
            }
        };

        let gps = match (
            exif.get_field(Tag::GPSLatitude, In::PRIMARY),
            exif.get_field(Tag::GPSLongitude, In::PRIMARY),
        ) {
            (Some(lat), Some(lon)) => {
                let lat_ref = exif
                    .get_field(Tag::GPSLatitudeRef, In::PRIMARY)
                    .and_then(|f| ascii_value(&f.value));
                let lon_ref = exif
                    .get_field(Tag::GPSLongitudeRef, In::PRIMARY)
                    .and_then(|f| ascii_value(&f.value));
                match (
                    rationals(&lat.value).and_then(|v| dms_to_degrees(v, lat_ref.as_deref())),
                    rationals(&lon.value).and_then(|v| dms_to_degrees(v, lon_ref.as_deref())),
                ) {
                    (Some(latitude), Some(longitude)) => Some(GpsCoordinates {
                        latitude,
                        longitude,
                    }),
                    _ => None,
                }
            }
            _ => None,
        };

        let field_text = |tag: Tag| {
            exif.get_field(tag, In::PRIMARY)
                .and_then(|f| ascii_value(&f.value))
        };

        let mut raw = BTreeMap::new();
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            raw.entry(field.tag.to_string())
                .or_insert_with(|| field.display_value().with_unit(&exif).to_string());
        }

        let enrichment = Enrichment {
            taken_at: field_text(Tag::DateTimeOriginal)
                .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y:%m:%d %H:%M:%S").ok()),
            camera_make: field_text(Tag::Make),
            camera_model: field_text(Tag::Model),
            gps,
            place: None,
            content_identifier: field_text(Tag::ImageUniqueID),
            raw,
        };

        if !enrichment.has_data() {
            return Ok(None);
        }
        self.resolve_place(path, enrichment).map(Some)
    }
}

/// Degrees/minutes/seconds to signed decimal degrees.
///
/// `reference` is the hemisphere letter; `S` and `W` are negative.
pub fn dms_to_degrees(values: &[Rational], reference: Option<&str>) -> Option<f64> {
    let part = |i: usize| -> Option<f64> {
        match values.get(i) {
            Some(r) if r.denom == 0 => None,
            Some(r) => Some(r.num as f64 / r.denom as f64),
            None => Some(0.0),
        }
    };
    if values.is_empty() {
        return None;
    }

    let degrees = part(0)? + part(1)? / 60.0 + part(2)? / 3600.0;
    match reference.map(|r| r.trim().to_ascii_uppercase()) {
        Some(r) if r == "S" || r == "W" => Some(-degrees),
        _ => Some(degrees),
    }
}

fn rationals(value: &Value) -> Option<&[Rational]> {
    match value {
        Value::Rational(values) => Some(values.as_slice()),
        _ => None,
    }
}

/// First ASCII component, trimmed, if non-empty
fn ascii_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        let bytes = vec.first()?;
        let s = std::str::from_utf8(bytes).ok()?;
        let trimmed = s.trim_end_matches('\0').trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}
