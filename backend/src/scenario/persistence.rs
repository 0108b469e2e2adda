//! Scenario persistence
//!
//! Scenarios are stored as JSON. Ambulances are never written; only the
//! [`super::AmbulanceConfig`] and its seed, from which the roster is rebuilt.

use super::{ConfigurationError, Scenario};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("scenario serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("scenario file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("loaded scenario is invalid: {0}")]
    Invalid(#[from] ConfigurationError),
}

/// Encode a scenario as pretty-printed JSON
pub fn save(scenario: &Scenario) -> Result<Vec<u8>, PersistenceError> {
    Ok(serde_json::to_vec_pretty(scenario)?)
}

/// Decode and validate a scenario
pub fn load(bytes: &[u8]) -> Result<Scenario, PersistenceError> {
    let scenario: Scenario = serde_json::from_slice(bytes)?;
    scenario.validate()?;
    Ok(scenario)
}

pub fn save_to_path(scenario: &Scenario, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
    std::fs::write(path, save(scenario)?)?;
    Ok(())
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Scenario, PersistenceError> {
    let bytes = std::fs::read(path)?;
    load(&bytes)
}

/// SHA-256 of the canonical JSON form (object keys sorted), hex encoded
pub fn fingerprint(scenario: &Scenario) -> Result<String, PersistenceError> {
    canonical_hash(scenario)
}

/// Hash any serializable value through canonical JSON
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, PersistenceError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let canonical = canonicalize(serde_json::to_value(value)?);
    let json = serde_json::to_string(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
