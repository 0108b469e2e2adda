//! Hospital records
//!
//! Hospitals are static input captured once per scenario. The mutable load
//! counter lives in [`crate::fleet::ResourceFleet`], not here.

use crate::routing::GeoPoint;
use serde::{Deserialize, Serialize};

/// Hospital identifier as it appears in the source dataset
pub type HospitalId = String;

/// Lowest trauma capability; also used for unknown levels
pub const UNKNOWN_TRAUMA_LEVEL: u8 = 5;

/// A receiving hospital
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: HospitalId,
    #[serde(default)]
    pub name: String,
    pub location: GeoPoint,
    /// Staffed beds; `None` when the dataset does not report capacity
    pub beds: Option<u32>,
    /// 1 (highest capability) through 5 (none or unknown)
    pub trauma_level: u8,
    #[serde(default)]
    pub helipad: bool,
    /// Two-letter region code, used by hospital sources to filter
    #[serde(default)]
    pub state: String,
}

impl Hospital {
    pub fn new(id: impl Into<String>, location: GeoPoint, trauma_level: u8) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            location,
            beds: None,
            trauma_level: trauma_level.clamp(1, UNKNOWN_TRAUMA_LEVEL),
            helipad: false,
            state: String::new(),
        }
    }

    pub fn with_beds(mut self, beds: u32) -> Self {
        self.beds = Some(beds);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_helipad(mut self, helipad: bool) -> Self {
        self.helipad = helipad;
        self
    }

    /// Level I or II trauma centre
    pub fn is_major_trauma_centre(&self) -> bool {
        self.trauma_level <= 2
    }
}

/// Map a dataset trauma label to a numeric level
///
/// "LEVEL I" → 1 through "LEVEL IV" → 4; pediatric variants map to the same
/// level; anything else is unknown (5).
///
/// # Example
/// ```
/// use mci_simulator_core_rs::models::hospital::parse_trauma_level;
///
/// assert_eq!(parse_trauma_level("LEVEL II"), 2);
/// assert_eq!(parse_trauma_level("LEVEL I PEDIATRIC"), 1);
/// assert_eq!(parse_trauma_level("NOT AVAILABLE"), 5);
/// ```
pub fn parse_trauma_level(label: &str) -> u8 {
    let normalized = label.trim().to_ascii_uppercase();
    let roman = normalized
        .strip_prefix("LEVEL ")
        .and_then(|rest| rest.split_whitespace().next());
    match roman {
        Some("I") => 1,
        Some("II") => 2,
        Some("III") => 3,
        Some("IV") => 4,
        _ => UNKNOWN_TRAUMA_LEVEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trauma_level_parsing() {
        assert_eq!(parse_trauma_level("LEVEL I"), 1);
        assert_eq!(parse_trauma_level("level iii"), 3);
        assert_eq!(parse_trauma_level("LEVEL IV"), 4);
        assert_eq!(parse_trauma_level("LEVEL II PEDIATRIC"), 2);
        assert_eq!(parse_trauma_level(""), 5);
        assert_eq!(parse_trauma_level("LEVEL V"), 5);
    }

    #[test]
    fn test_new_clamps_trauma_level() {
        let h = Hospital::new("H1", GeoPoint::new(0.0, 0.0), 9);
        assert_eq!(h.trauma_level, 5);
        let h = Hospital::new("H2", GeoPoint::new(0.0, 0.0), 0);
        assert_eq!(h.trauma_level, 1);
        assert!(h.is_major_trauma_centre());
    }
}
