//! Straight-line routing
//!
//! Distances are great-circle (Haversine) distances on a spherical Earth and
//! travel times assume a constant speed. There is no road network.
//!
//! # Critical Invariants
//!
//! 1. All functions are pure and infallible for valid coordinates
//! 2. Callers reject NaN or out-of-range coordinates with [`GeoPoint::validate`]
//!    before routing
//! 3. ETAs are whole minutes, rounded up

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the Haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Emergency-vehicle speed used for ambulance movement
pub const DEFAULT_AMBULANCE_SPEED_KMH: f64 = 80.0;

/// Ordinary driving speed used for non-emergency estimates
pub const DEFAULT_NORMAL_SPEED_KMH: f64 = 65.0;

/// Kilometres per degree of latitude, used for local offsets
pub const KM_PER_DEGREE: f64 = 111.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Rejected coordinate
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("coordinate is not finite: ({lat}, {lon})")]
    NotFinite { lat: f64, lon: f64 },

    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check the point is finite and inside the valid lat/lon ranges
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(CoordinateError::NotFinite {
                lat: self.lat,
                lon: self.lon,
            });
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoordinateError::LatitudeOutOfRange(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(CoordinateError::LongitudeOutOfRange(self.lon));
        }
        Ok(())
    }
}

/// Axis-aligned lat/lon box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl RegionBounds {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    /// Corners are valid coordinates and min ≤ max on both axes
    pub fn is_valid(&self) -> bool {
        GeoPoint::new(self.min_lat, self.min_lon).validate().is_ok()
            && GeoPoint::new(self.max_lat, self.max_lon).validate().is_ok()
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        (self.min_lat..=self.max_lat).contains(&p.lat) && (self.min_lon..=self.max_lon).contains(&p.lon)
    }

    /// Nearest point inside the box
    pub fn clamp(&self, p: GeoPoint) -> GeoPoint {
        GeoPoint::new(
            p.lat.clamp(self.min_lat, self.max_lat),
            p.lon.clamp(self.min_lon, self.max_lon),
        )
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Map a point to [0, 1] on each axis; degenerate axes map to 0.5
    pub fn normalize(&self, p: GeoPoint) -> (f64, f64) {
        let span = |lo: f64, hi: f64, v: f64| {
            if hi > lo {
                ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                0.5
            }
        };
        (
            span(self.min_lat, self.max_lat, p.lat),
            span(self.min_lon, self.max_lon, p.lon),
        )
    }
}

/// Great-circle distance in kilometres
///
/// # Example
/// ```
/// use mci_simulator_core_rs::routing::{distance_km, GeoPoint};
///
/// let sf = GeoPoint::new(37.7749, -122.4194);
/// let la = GeoPoint::new(34.0522, -118.2437);
/// let d = distance_km(sf, la);
/// assert!((d - 559.1).abs() < 1.0);
/// ```
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// Travel time in (fractional) minutes at a constant speed
pub fn travel_time_minutes(a: GeoPoint, b: GeoPoint, speed_kmh: f64) -> f64 {
    distance_km(a, b) / speed_kmh * 60.0
}

/// Round a travel time up to whole minutes
///
/// A tolerance absorbs floating-point noise so that an exact 5.0 minute trip
/// is not billed as 6.
///
/// # Example
/// ```
/// use mci_simulator_core_rs::routing::eta_minutes;
///
/// assert_eq!(eta_minutes(0.0), 0);
/// assert_eq!(eta_minutes(4.2), 5);
/// assert_eq!(eta_minutes(5.0), 5);
/// ```
pub fn eta_minutes(travel_time: f64) -> u32 {
    if !travel_time.is_finite() || travel_time <= 0.0 {
        return 0;
    }
    (travel_time - 1e-9).ceil().max(0.0) as u32
}

/// Symmetric pairwise distance matrix with a zero diagonal
pub fn distance_matrix(points: &[GeoPoint]) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distance_km(points[i], points[j]);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}

/// Point reached by moving `north_km`/`east_km` from `origin`
///
/// Uses the flat 111 km-per-degree approximation on both axes, which is what
/// scenario placement expects for offsets of a few kilometres.
pub fn offset_point(origin: GeoPoint, north_km: f64, east_km: f64) -> GeoPoint {
    GeoPoint::new(
        origin.lat + north_km / KM_PER_DEGREE,
        origin.lon + east_km / KM_PER_DEGREE,
    )
}
