//! Node configuration.
//!
//! A node runs one mutual exclusion engine per configured domain. Every domain
//! guards exactly one resource view, either a counted pool or a slot table.
//! The workflow names which domain plays which role.

use cohort_resources::{CooldownRange, CountedPool, KindSpec, ResourceError, SlotTable};
use cohort_types::DomainId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors found while validating a [`NodeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no domains configured")]
    NoDomains,

    #[error("{0} configured twice")]
    DuplicateDomain(DomainId),

    #[error("{domain}: {source}")]
    Resource {
        domain: DomainId,
        #[source]
        source: ResourceError,
    },

    #[error("workflow refers to unknown {0}")]
    UnknownWorkflowDomain(DomainId),

    #[error("workflow expects {domain} to guard a {expected} resource")]
    WrongResource {
        domain: DomainId,
        expected: &'static str,
    },

    #[error("workflow uses {0} for both roles")]
    SharedWorkflowDomain(DomainId),
}

/// Resource guarded by a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceConfig {
    /// Several kinds of anonymous units.
    Counted {
        /// Kinds in wire order.
        kinds: Vec<KindSpec>,
    },

    /// Identity-bearing slots with a release cooldown.
    Slotted {
        /// Number of slots.
        slots: usize,
        /// Range the cooldown is drawn from on every release.
        #[serde(default)]
        cooldown: CooldownRange,
    },
}

impl ResourceConfig {
    /// Short name used in errors and logs.
    pub fn flavour(&self) -> &'static str {
        match self {
            ResourceConfig::Counted { .. } => "counted",
            ResourceConfig::Slotted { .. } => "slotted",
        }
    }

    fn validate(&self) -> Result<(), ResourceError> {
        match self {
            ResourceConfig::Counted { kinds } => CountedPool::new(kinds).map(drop),
            ResourceConfig::Slotted { slots, cooldown } => {
                SlotTable::new(*slots)?;
                cooldown.validate()
            }
        }
    }
}

/// One arbitration domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Wire identifier.
    pub id: DomainId,
    /// Human-readable name for logs.
    pub name: String,
    /// Resource this domain guards.
    pub resource: ResourceConfig,
}

impl DomainConfig {
    /// A domain guarding a counted pool.
    pub fn counted(id: DomainId, name: impl Into<String>, kinds: Vec<KindSpec>) -> Self {
        Self {
            id,
            name: name.into(),
            resource: ResourceConfig::Counted { kinds },
        }
    }

    /// A domain guarding a slot table.
    pub fn slotted(
        id: DomainId,
        name: impl Into<String>,
        slots: usize,
        cooldown: CooldownRange,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            resource: ResourceConfig::Slotted { slots, cooldown },
        }
    }
}

/// Which domains the workflow sequencer visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Counted domain to acquire from and return to.
    pub counted_domain: DomainId,
    /// Slot domain visited while holding every kind. `None` skips the visit.
    #[serde(default)]
    pub slot_domain: Option<DomainId>,
}

/// Configuration shared by every peer of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Arbitration domains.
    pub domains: Vec<DomainConfig>,

    /// Workflow driven by pacing ticks. `None` leaves the node idle until an
    /// entry is requested directly.
    #[serde(default)]
    pub workflow: Option<WorkflowConfig>,

    /// Base seed for per-peer randomness, mixed with the peer id.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    12345
}

impl NodeConfig {
    /// Create a configuration with the given domains and no workflow.
    pub fn new(domains: Vec<DomainConfig>) -> Self {
        Self {
            domains,
            workflow: None,
            seed: default_seed(),
        }
    }

    /// A single counted domain driven by the workflow without a slot visit.
    pub fn single_counted(kinds: Vec<KindSpec>) -> Self {
        Self::new(vec![DomainConfig::counted(DomainId(0), "equipment", kinds)]).with_workflow(
            WorkflowConfig {
                counted_domain: DomainId(0),
                slot_domain: None,
            },
        )
    }

    /// Set the workflow.
    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Run without a workflow.
    pub fn without_workflow(mut self) -> Self {
        self.workflow = None;
        self
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Look a domain up by id.
    pub fn domain(&self, id: DomainId) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.id == id)
    }

    /// Check the configuration before any node is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domains.is_empty() {
            return Err(ConfigError::NoDomains);
        }

        let mut seen = BTreeSet::new();
        for domain in &self.domains {
            if !seen.insert(domain.id) {
                return Err(ConfigError::DuplicateDomain(domain.id));
            }
            domain
                .resource
                .validate()
                .map_err(|source| ConfigError::Resource {
                    domain: domain.id,
                    source,
                })?;
        }

        if let Some(workflow) = &self.workflow {
            self.expect_resource(workflow.counted_domain, "counted")?;
            if let Some(slot_domain) = workflow.slot_domain {
                if slot_domain == workflow.counted_domain {
                    return Err(ConfigError::SharedWorkflowDomain(slot_domain));
                }
                self.expect_resource(slot_domain, "slotted")?;
            }
        }

        Ok(())
    }

    fn expect_resource(&self, id: DomainId, expected: &'static str) -> Result<(), ConfigError> {
        let domain = self
            .domain(id)
            .ok_or(ConfigError::UnknownWorkflowDomain(id))?;
        if domain.resource.flavour() != expected {
            return Err(ConfigError::WrongResource {
                domain: id,
                expected,
            });
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    /// Two domains: medical staff as counted kinds and rings as slots.
    fn default() -> Self {
        Self::new(vec![
            DomainConfig::counted(
                DomainId(0),
                "staff",
                vec![KindSpec::new("doctor", 5), KindSpec::new("judge", 5)],
            ),
            DomainConfig::slotted(DomainId(1), "rings", 5, CooldownRange::default()),
        ])
        .with_workflow(WorkflowConfig {
            counted_domain: DomainId(0),
            slot_domain: Some(DomainId(1)),
        })
    }
}
