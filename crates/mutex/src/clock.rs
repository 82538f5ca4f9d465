//! Per-domain Lamport clocks.

use cohort_types::{DomainId, LamportTime};
use std::collections::BTreeMap;

/// Logical time of one process: a Lamport counter per domain.
///
/// Owned by exactly one process. Counters never decrease. A domain that has
/// never been touched reads as [`LamportTime::ZERO`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalTime {
    counters: BTreeMap<DomainId, LamportTime>,
}

impl LogicalTime {
    /// Create a clock with every domain at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time of a domain.
    pub fn current(&self, domain: DomainId) -> LamportTime {
        self.counters
            .get(&domain)
            .copied()
            .unwrap_or(LamportTime::ZERO)
    }

    /// Advance a domain before sending a REQUEST or RELEASE.
    ///
    /// Pre-increment: returns the new time.
    pub fn tick(&mut self, domain: DomainId) -> LamportTime {
        let counter = self.counters.entry(domain).or_default();
        *counter = counter.next();
        *counter
    }

    /// Fold in the time of a received envelope: `max(local, incoming) + 1`.
    pub fn observe(&mut self, domain: DomainId, incoming: LamportTime) -> LamportTime {
        let counter = self.counters.entry(domain).or_default();
        *counter = (*counter).max(incoming).next();
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_pre_increments() {
        let mut clock = LogicalTime::new();
        let domain = DomainId(0);

        assert_eq!(clock.current(domain), LamportTime(0));
        assert_eq!(clock.tick(domain), LamportTime(1));
        assert_eq!(clock.tick(domain), LamportTime(2));
        assert_eq!(clock.current(domain), LamportTime(2));
    }

    #[test]
    fn test_observe_takes_max_plus_one() {
        let mut clock = LogicalTime::new();
        let domain = DomainId(0);

        assert_eq!(clock.observe(domain, LamportTime(5)), LamportTime(6));

        // An older timestamp still advances, never rewinds
        assert_eq!(clock.observe(domain, LamportTime(2)), LamportTime(7));
    }

    #[test]
    fn test_domains_are_independent() {
        let mut clock = LogicalTime::new();

        clock.observe(DomainId(0), LamportTime(10));
        clock.tick(DomainId(1));

        assert_eq!(clock.current(DomainId(0)), LamportTime(11));
        assert_eq!(clock.current(DomainId(1)), LamportTime(1));
        assert_eq!(clock.current(DomainId(2)), LamportTime(0));
    }
}
