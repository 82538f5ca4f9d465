//! Pacing driver contract.

use std::time::Duration;

/// What the pacing driver wants the peer to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverAction {
    /// Nothing this round.
    Idle,
    /// Start the next protocol round.
    Tick,
}

/// Decides *when* a peer attempts a new request.
///
/// Runners call [`PacingDriver::next_action`] between protocol rounds and
/// sleep for [`PacingDriver::next_delay`] before asking again. The protocol
/// itself never sleeps.
pub trait PacingDriver {
    /// Decide what to do this round.
    fn next_action(&mut self) -> DriverAction;

    /// How long to wait before the next round.
    fn next_delay(&mut self) -> Duration;
}

/// Pacing driver that ticks after a uniformly random pause.
///
/// The pause is `min_delay` plus a jitter drawn from `[0, max_jitter)`. With
/// `idle_probability > 0` some rounds are skipped.
#[derive(Debug, Clone)]
pub struct RandomPacing<R> {
    rng: R,
    min_delay: Duration,
    max_jitter: Duration,
    idle_probability: f64,
}

impl<R: rand::Rng> RandomPacing<R> {
    /// Create a driver drawing from `rng`.
    pub fn new(rng: R, max_jitter: Duration) -> Self {
        Self {
            rng,
            min_delay: Duration::from_millis(1),
            max_jitter,
            idle_probability: 0.0,
        }
    }

    /// Set the pause every round waits before the jitter.
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Set the share of rounds that do nothing.
    pub fn with_idle_probability(mut self, probability: f64) -> Self {
        self.idle_probability = probability.clamp(0.0, 1.0);
        self
    }
}

impl<R: rand::Rng> PacingDriver for RandomPacing<R> {
    fn next_action(&mut self) -> DriverAction {
        if self.idle_probability > 0.0 && self.rng.gen_bool(self.idle_probability) {
            DriverAction::Idle
        } else {
            DriverAction::Tick
        }
    }

    fn next_delay(&mut self) -> Duration {
        let max_us = self.max_jitter.as_micros() as u64;
        let jitter = if max_us == 0 {
            0
        } else {
            self.rng.gen_range(0..max_us)
        };
        self.min_delay + Duration::from_micros(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_delay_within_bounds() {
        let mut pacing = RandomPacing::new(ChaCha8Rng::seed_from_u64(1), Duration::from_millis(50))
            .with_min_delay(Duration::from_millis(2));

        for _ in 0..500 {
            let delay = pacing.next_delay();
            assert!(delay >= Duration::from_millis(2));
            assert!(delay < Duration::from_millis(52));
        }
    }

    #[test]
    fn test_zero_jitter_uses_min_delay() {
        let mut pacing = RandomPacing::new(ChaCha8Rng::seed_from_u64(1), Duration::ZERO);
        assert_eq!(pacing.next_delay(), Duration::from_millis(1));
        assert_eq!(pacing.next_action(), DriverAction::Tick);
    }

    #[test]
    fn test_idle_probability() {
        let mut always_idle = RandomPacing::new(ChaCha8Rng::seed_from_u64(1), Duration::ZERO)
            .with_idle_probability(1.0);
        assert_eq!(always_idle.next_action(), DriverAction::Idle);
    }
}
