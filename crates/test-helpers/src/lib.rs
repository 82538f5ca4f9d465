//! Test helpers for Cohort.
//!
//! Node configurations for common scenarios and helpers that pull the
//! protocol's observable history out of a notification log.

pub mod fixtures;

pub use fixtures::{
    counted_config, grants_by_domain, slotted_config, two_domain_config, GrantRecord,
};
