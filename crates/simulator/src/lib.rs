//! Cohort Simulator
//!
//! A long-running workload simulator built on top of the simulation framework.
//! Provides tools for stress testing, performance measurement, and protocol
//! validation.
//!
//! # Architecture
//!
//! The simulator builds on `cohort-simulation` to provide:
//!
//! - **Invariant Checking**: grant order, counted-pool conservation and slot
//!   cooldowns verified after every simulated event
//! - **Metrics Collection**: grants per domain, workflow cycles, request-to-grant
//!   latency percentiles
//! - **Seed Sweeps**: many independent seeds run in parallel
//! - **Configuration**: Flexible setup for various test scenarios
//!
//! # Example
//!
//! ```ignore
//! use cohort_simulator::{Simulator, SimulatorConfig};
//! use std::time::Duration;
//!
//! let config = SimulatorConfig::new(5).with_duration(Duration::from_secs(60));
//!
//! let mut simulator = Simulator::new(config)?;
//! let report = simulator.run();
//!
//! println!("cycles: {}", report.cycles_completed);
//! println!("P99 wait: {:?}", report.p99_wait);
//! ```

pub mod config;
pub mod invariants;
pub mod metrics;
pub mod runner;

pub use config::SimulatorConfig;
pub use invariants::{InvariantChecker, Violation};
pub use metrics::{MetricsCollector, SimulationReport};
pub use runner::{sweep, Simulator, SimulatorError};
