//! Slot release cooldown range.

use crate::ResourceError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Range a slot's release cooldown is drawn from, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRange {
    /// Shortest cooldown.
    pub min_ms: u64,
    /// Longest cooldown (inclusive).
    pub max_ms: u64,
}

impl CooldownRange {
    /// Create a range, rejecting `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, ResourceError> {
        let range = Self {
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        };
        range.validate()?;
        Ok(range)
    }

    /// A range that always yields `cooldown`.
    pub fn fixed(cooldown: Duration) -> Self {
        let ms = cooldown.as_millis() as u64;
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Check that the range is not empty.
    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.min_ms > self.max_ms {
            return Err(ResourceError::InvalidCooldown {
                min_ms: self.min_ms,
                max_ms: self.max_ms,
            });
        }
        Ok(())
    }

    /// Shortest cooldown.
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// Longest cooldown.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Draw a cooldown uniformly from the range.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.min_ms >= self.max_ms {
            return self.min();
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

impl Default for CooldownRange {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 2_000,
        }
    }
}
