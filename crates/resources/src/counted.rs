//! Counted-resource manager.

use crate::ResourceError;
use cohort_messages::MAX_RESOURCE_KINDS;
use cohort_types::ResourceKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Declaration of one counted resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSpec {
    /// Human-readable kind name.
    pub name: String,
    /// Total units of this kind in the run.
    pub capacity: u32,
}

impl KindSpec {
    /// Create a kind declaration.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KindState {
    capacity: u32,
    free: u32,
}

/// Local view of a counted pool plus the units this process holds.
///
/// Kinds keep declaration order; a kind's position is its [`ResourceKind`]
/// and its index in the envelope's count array. `0 <= free <= capacity`
/// holds for every kind at all times.
#[derive(Debug, Clone)]
pub struct CountedPool {
    /// Kind name -> capacity and free units.
    kinds: IndexMap<String, KindState>,

    /// Kinds the local process holds one unit of.
    held: BTreeSet<ResourceKind>,
}

impl CountedPool {
    /// Create a pool with every unit free.
    pub fn new(specs: &[KindSpec]) -> Result<Self, ResourceError> {
        if specs.len() > MAX_RESOURCE_KINDS {
            return Err(ResourceError::TooManyKinds {
                count: specs.len(),
                max: MAX_RESOURCE_KINDS,
            });
        }

        let mut kinds = IndexMap::with_capacity(specs.len());
        for spec in specs {
            if spec.capacity > i32::MAX as u32 {
                return Err(ResourceError::CapacityTooLarge {
                    name: spec.name.clone(),
                    capacity: spec.capacity,
                });
            }
            let state = KindState {
                capacity: spec.capacity,
                free: spec.capacity,
            };
            if kinds.insert(spec.name.clone(), state).is_some() {
                return Err(ResourceError::DuplicateKind(spec.name.clone()));
            }
        }

        Ok(Self {
            kinds,
            held: BTreeSet::new(),
        })
    }

    /// Number of declared kinds.
    pub fn kind_count(&self) -> usize {
        self.kinds.len()
    }

    /// Every declared kind, in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> {
        (0..self.kinds.len() as u8).map(ResourceKind)
    }

    /// Look a kind up by name.
    pub fn kind_by_name(&self, name: &str) -> Option<ResourceKind> {
        self.kinds
            .get_index_of(name)
            .map(|index| ResourceKind(index as u8))
    }

    /// Name of a kind.
    pub fn name(&self, kind: ResourceKind) -> Option<&str> {
        self.kinds
            .get_index(kind.index())
            .map(|(name, _)| name.as_str())
    }

    /// Capacity of a kind.
    pub fn capacity(&self, kind: ResourceKind) -> Option<u32> {
        self.kinds.get_index(kind.index()).map(|(_, s)| s.capacity)
    }

    /// Free units of a kind in the local view.
    pub fn free(&self, kind: ResourceKind) -> Option<u32> {
        self.kinds.get_index(kind.index()).map(|(_, s)| s.free)
    }

    /// Kinds the local process holds.
    pub fn held(&self) -> &BTreeSet<ResourceKind> {
        &self.held
    }

    /// Check if the local process holds a unit of `kind`.
    pub fn holds(&self, kind: ResourceKind) -> bool {
        self.held.contains(&kind)
    }

    /// Claim one unit of every kind not yet held that has a free unit.
    ///
    /// Must only run inside a granted critical section. Partial success is
    /// normal; the kinds claimed by this call are returned.
    pub fn acquire_if_available(&mut self) -> Vec<ResourceKind> {
        let mut acquired = Vec::new();

        for (index, state) in self.kinds.values_mut().enumerate() {
            let kind = ResourceKind(index as u8);
            if self.held.contains(&kind) || state.free == 0 {
                continue;
            }
            state.free -= 1;
            self.held.insert(kind);
            acquired.push(kind);
        }

        acquired
    }

    /// Return every held unit to the pool.
    ///
    /// Must only run inside a granted critical section. Returns the kinds
    /// given back.
    pub fn release_all(&mut self) -> Vec<ResourceKind> {
        let returned: Vec<ResourceKind> = std::mem::take(&mut self.held).into_iter().collect();

        for kind in &returned {
            if let Some((name, state)) = self.kinds.get_index_mut(kind.index()) {
                if state.free >= state.capacity {
                    warn!(kind = %name, "Returning a unit to a full pool view");
                    continue;
                }
                state.free += 1;
            }
        }

        returned
    }

    /// Check if the local process holds one unit of every kind.
    pub fn holds_all(&self) -> bool {
        self.held.len() == self.kinds.len()
    }

    /// Check if the local process holds one unit of each of `kinds`.
    pub fn holds_all_of(&self, kinds: &[ResourceKind]) -> bool {
        kinds.iter().all(|kind| self.held.contains(kind))
    }

    /// Free counts in envelope layout. Undeclared kinds read as zero.
    pub fn snapshot(&self) -> [i32; MAX_RESOURCE_KINDS] {
        let mut counts = [0; MAX_RESOURCE_KINDS];
        for (count, state) in counts.iter_mut().zip(self.kinds.values()) {
            *count = state.free as i32;
        }
        counts
    }

    /// Replace the free counts with a peer's snapshot.
    ///
    /// The snapshot is checked in full before anything changes. Held units
    /// are local knowledge and are left alone.
    pub fn apply_snapshot(
        &mut self,
        counts: &[i32; MAX_RESOURCE_KINDS],
    ) -> Result<(), ResourceError> {
        for (index, (count, state)) in counts.iter().zip(self.kinds.values()).enumerate() {
            let valid = u32::try_from(*count).is_ok_and(|free| free <= state.capacity);
            if !valid {
                return Err(ResourceError::InvalidCount {
                    kind: ResourceKind(index as u8),
                    count: *count,
                    capacity: state.capacity,
                });
            }
        }

        for (count, state) in counts.iter().zip(self.kinds.values_mut()) {
            state.free = *count as u32;
        }
        Ok(())
    }
}
