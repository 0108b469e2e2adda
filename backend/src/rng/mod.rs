//! Deterministic random number generation
//!
//! Wraps a seeded ChaCha8 stream. CRITICAL: All randomness in the simulator
//! MUST go through this module.

mod manager;

pub use manager::RngManager;
