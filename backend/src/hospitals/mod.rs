//! Hospital data collaborators
//!
//! The engine treats hospitals as static input captured once when a scenario
//! is built. Sources implement [`HospitalSource`]; two are provided:
//! an in-memory list and a loader for the US hospital-locations CSV layout
//! (`ID, NAME, CITY, STATE, LATITUDE, LONGITUDE, BEDS, TRAUMA, HELIPAD, ...`).

use crate::models::hospital::{parse_trauma_level, Hospital};
use crate::routing::{GeoPoint, RegionBounds};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default padding around the hospital extent, in degrees
pub const DEFAULT_REGION_PADDING_DEG: f64 = 0.1;

#[derive(Debug, Error)]
pub enum HospitalSourceError {
    #[error("failed to read hospital data: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed hospital CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("no hospitals found for region {0:?}")]
    EmptyRegion(String),
}

/// Read-only hospital lookup
pub trait HospitalSource: Send + Sync {
    /// Hospitals whose state code equals `region`; an empty region means all
    fn get_hospitals(&self, region: &str) -> Result<Vec<Hospital>, HospitalSourceError>;
}

fn in_region(hospital: &Hospital, region: &str) -> bool {
    region.is_empty() || hospital.state.eq_ignore_ascii_case(region)
}

/// Fixed list of hospitals held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryHospitalSource {
    hospitals: Vec<Hospital>,
}

impl InMemoryHospitalSource {
    pub fn new(hospitals: Vec<Hospital>) -> Self {
        Self { hospitals }
    }
}

impl HospitalSource for InMemoryHospitalSource {
    fn get_hospitals(&self, region: &str) -> Result<Vec<Hospital>, HospitalSourceError> {
        Ok(self
            .hospitals
            .iter()
            .filter(|h| in_region(h, region))
            .cloned()
            .collect())
    }
}

/// Loads hospitals from a CSV file on every call
#[derive(Debug, Clone)]
pub struct CsvHospitalSource {
    path: PathBuf,
}

impl CsvHospitalSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HospitalSource for CsvHospitalSource {
    fn get_hospitals(&self, region: &str) -> Result<Vec<Hospital>, HospitalSourceError> {
        let file = std::fs::File::open(&self.path)?;
        parse_hospitals_csv(file, region)
    }
}

#[derive(Debug, Deserialize)]
struct HospitalRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "STATE", default)]
    state: String,
    #[serde(rename = "LATITUDE", default)]
    latitude: String,
    #[serde(rename = "LONGITUDE", default)]
    longitude: String,
    #[serde(rename = "BEDS", default)]
    beds: String,
    #[serde(rename = "TRAUMA", default)]
    trauma: String,
    #[serde(rename = "HELIPAD", default)]
    helipad: String,
}

impl HospitalRow {
    /// None when the row has no usable coordinates
    fn into_hospital(self) -> Option<Hospital> {
        let lat: f64 = self.latitude.trim().parse().ok()?;
        let lon: f64 = self.longitude.trim().parse().ok()?;
        let location = GeoPoint::new(lat, lon);
        location.validate().ok()?;

        // -999 and "NOT AVAILABLE" both mean unknown
        let beds = self
            .beds
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|b| *b > 0)
            .and_then(|b| u32::try_from(b).ok());

        Some(Hospital {
            id: self.id.trim().to_string(),
            name: self.name.trim().to_string(),
            location,
            beds,
            trauma_level: parse_trauma_level(&self.trauma),
            helipad: self.helipad.trim().eq_ignore_ascii_case("Y"),
            state: self.state.trim().to_string(),
        })
    }
}

/// Parse the hospital CSV layout, keeping rows in `region`
///
/// Rows without valid coordinates are skipped.
pub fn parse_hospitals_csv<R: Read>(
    reader: R,
    region: &str,
) -> Result<Vec<Hospital>, HospitalSourceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut hospitals = Vec::new();
    for row in csv_reader.deserialize::<HospitalRow>() {
        let row = row?;
        if let Some(hospital) = row.into_hospital() {
            if in_region(&hospital, region) {
                hospitals.push(hospital);
            }
        }
    }
    Ok(hospitals)
}

/// Bounding box of the hospitals, grown by `padding_deg` on every side
///
/// Returns `None` for an empty slice.
pub fn region_bounds(hospitals: &[Hospital], padding_deg: f64) -> Option<RegionBounds> {
    let first = hospitals.first()?;
    let mut bounds = RegionBounds::new(
        first.location.lat,
        first.location.lat,
        first.location.lon,
        first.location.lon,
    );
    for h in &hospitals[1..] {
        bounds.min_lat = bounds.min_lat.min(h.location.lat);
        bounds.max_lat = bounds.max_lat.max(h.location.lat);
        bounds.min_lon = bounds.min_lon.min(h.location.lon);
        bounds.max_lon = bounds.max_lon.max(h.location.lon);
    }
    bounds.min_lat = (bounds.min_lat - padding_deg).max(-90.0);
    bounds.max_lat = (bounds.max_lat + padding_deg).min(90.0);
    bounds.min_lon = (bounds.min_lon - padding_deg).max(-180.0);
    bounds.max_lon = (bounds.max_lon + padding_deg).min(180.0);
    Some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ID,NAME,CITY,STATE,LATITUDE,LONGITUDE,BEDS,TRAUMA,HELIPAD
100,General,Sacramento,CA,38.55,-121.45,300,LEVEL I,Y
101,Valley,Fresno,CA,36.74,-119.78,-999,NOT AVAILABLE,N
102,Desert,Reno,NV,39.52,-119.81,120,LEVEL III,N
103,Nowhere,Nowhere,CA,,,10,LEVEL II,N
104,Kids,Oakland,CA,37.80,-122.27,NOT AVAILABLE,LEVEL II PEDIATRIC,Y
";

    #[test]
    fn test_parse_filters_region_and_skips_missing_coordinates() {
        let hospitals = parse_hospitals_csv(SAMPLE.as_bytes(), "CA").unwrap();
        let ids: Vec<&str> = hospitals.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["100", "101", "104"]);
    }

    #[test]
    fn test_parse_fields() {
        let hospitals = parse_hospitals_csv(SAMPLE.as_bytes(), "").unwrap();
        assert_eq!(hospitals.len(), 4);

        let general = &hospitals[0];
        assert_eq!(general.beds, Some(300));
        assert_eq!(general.trauma_level, 1);
        assert!(general.helipad);

        let valley = &hospitals[1];
        assert_eq!(valley.beds, None);
        assert_eq!(valley.trauma_level, 5);
        assert!(!valley.helipad);

        let kids = &hospitals[3];
        assert_eq!(kids.trauma_level, 2);
        assert_eq!(kids.beds, None);
    }

    #[test]
    fn test_region_bounds_padding() {
        let hospitals = parse_hospitals_csv(SAMPLE.as_bytes(), "CA").unwrap();
        let b = region_bounds(&hospitals, 0.1).unwrap();
        assert!((b.min_lat - 36.64).abs() < 1e-9);
        assert!((b.max_lat - 38.65).abs() < 1e-9);
        assert!((b.min_lon - (-122.37)).abs() < 1e-9);
        assert!((b.max_lon - (-119.68)).abs() < 1e-9);
        assert!(region_bounds(&[], 0.1).is_none());
    }

    #[test]
    fn test_in_memory_source_filters_by_state() {
        let source = InMemoryHospitalSource::new(vec![
            Hospital::new("A", GeoPoint::new(1.0, 1.0), 1).with_state("CA"),
            Hospital::new("B", GeoPoint::new(2.0, 2.0), 2).with_state("NV"),
        ]);
        assert_eq!(source.get_hospitals("ca").unwrap().len(), 1);
        assert_eq!(source.get_hospitals("").unwrap().len(), 2);
    }
}
