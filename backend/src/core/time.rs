//! Simulated clock
//!
//! The simulation advances in discrete one-minute steps up to a fixed horizon.
//! Minute 0 is the moment of injury for every casualty in the scenario.

use serde::{Deserialize, Serialize};

/// Default episode horizon in minutes.
pub const DEFAULT_HORIZON_MINUTES: u32 = 180;

/// Tracks the current simulated minute against an episode horizon
///
/// # Example
/// ```
/// use mci_simulator_core_rs::SimClock;
///
/// let mut clock = SimClock::new(180);
/// assert_eq!(clock.current_minute(), 0);
///
/// clock.advance();
/// assert_eq!(clock.current_minute(), 1);
/// assert!(!clock.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    /// Minutes elapsed since the incident
    current_minute: u32,
    /// Minute at which the episode ends
    horizon: u32,
}

impl SimClock {
    /// Create a clock at minute 0
    pub fn new(horizon: u32) -> Self {
        Self {
            current_minute: 0,
            horizon,
        }
    }

    /// Advance by one minute
    pub fn advance(&mut self) {
        self.current_minute += 1;
    }

    /// Minutes elapsed since the incident
    pub fn current_minute(&self) -> u32 {
        self.current_minute
    }

    /// Configured horizon
    pub fn horizon(&self) -> u32 {
        self.horizon
    }

    /// True once the clock has reached the horizon
    ///
    /// # Example
    /// ```
    /// use mci_simulator_core_rs::SimClock;
    ///
    /// let mut clock = SimClock::new(2);
    /// clock.advance();
    /// clock.advance();
    /// assert!(clock.is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        self.current_minute >= self.horizon
    }

    /// Elapsed fraction of the horizon, clamped to [0, 1]
    pub fn elapsed_fraction(&self) -> f64 {
        if self.horizon == 0 {
            return 1.0;
        }
        (self.current_minute as f64 / self.horizon as f64).min(1.0)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON_MINUTES)
    }
}
