//! Offline reverse geocoding against a local gazetteer.

use super::GpsCoordinates;
use crate::error::EnrichError;
use serde::Deserialize;
use std::path::Path;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Turns a GPS fix into a place name
pub trait PlaceResolver {
    /// `None` when no place can be named for the position
    fn resolve(&self, position: GpsCoordinates) -> Option<String>;
}

/// A named point in the gazetteer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Place {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Nearest-place lookup over a fixed list
pub struct GazetteerResolver {
    places: Vec<Place>,
    max_distance_km: f64,
}

impl GazetteerResolver {
    pub fn new(places: Vec<Place>, max_distance_km: f64) -> Self {
        Self {
            places,
            max_distance_km,
        }
    }

    /// Load a JSON array of `{ "name", "latitude", "longitude" }`
    pub fn load(path: &Path, max_distance_km: f64) -> Result<Self, EnrichError> {
        let raw = std::fs::read_to_string(path).map_err(|e| EnrichError::Gazetteer {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let places: Vec<Place> = serde_json::from_str(&raw).map_err(|e| EnrichError::Gazetteer {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::info!("Loaded {} places from {}", places.len(), path.display());
        Ok(Self::new(places, max_distance_km))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl PlaceResolver for GazetteerResolver {
    fn resolve(&self, position: GpsCoordinates) -> Option<String> {
        self.places
            .iter()
            .map(|place| {
                let distance = haversine_km(
                    position,
                    GpsCoordinates {
                        latitude: place.latitude,
                        longitude: place.longitude,
                    },
                );
                (place, distance)
            })
            .filter(|(_, distance)| *distance <= self.max_distance_km)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(place, _)| place.name.clone())
    }
}

/// Great-circle distance in kilometres
pub fn haversine_km(a: GpsCoordinates, b: GpsCoordinates) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gps(latitude: f64, longitude: f64) -> GpsCoordinates {
        GpsCoordinates {
            latitude,
            longitude,
        }
    }

    fn resolver() -> GazetteerResolver {
        GazetteerResolver::new(
            vec![
                Place {
                    name: "Paris".into(),
                    latitude: 48.8566,
                    longitude: 2.3522,
                },
                Place {
                    name: "Versailles".into(),
                    latitude: 48.8049,
                    longitude: 2.1204,
                },
            ],
            25.0,
        )
    }

    #[test]
    fn paris_to_london_is_about_344_km() {
        let d = haversine_km(gps(48.8566, 2.3522), gps(51.5074, -0.1278));
        assert!((d - 343.5).abs() < 2.0, "distance was {}", d);
    }

    #[test]
    fn nearest_place_wins() {
        assert_eq!(resolver().resolve(gps(48.86, 2.34)).as_deref(), Some("Paris"));
        assert_eq!(resolver().resolve(gps(48.80, 2.13)).as_deref(), Some("Versailles"));
    }

    #[test]
    fn far_position_is_unresolved() {
        assert_eq!(resolver().resolve(gps(-33.86, 151.21)), None);
    }

    #[test]
    fn loads_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"name": "Oslo", "latitude": 59.91, "longitude": 10.75}]"#)
            .unwrap();

        let resolver = GazetteerResolver::load(file.path(), 10.0).unwrap();
        assert_eq!(resolver.len(), 1);
        assert_eq!(resolver.resolve(gps(59.9, 10.7)).as_deref(), Some("Oslo"));
    }

    #[test]
    fn malformed_gazetteer_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert!(matches!(
            GazetteerResolver::load(file.path(), 10.0),
            Err(EnrichError::Gazetteer { .. })
        ));
    }
}
