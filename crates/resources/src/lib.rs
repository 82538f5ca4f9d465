//! Resource managers.
//!
//! Both managers hold a process-local *view* of logically shared state. A
//! view is only mutated inside a granted critical section of its domain, and
//! only ever replaced (never merged) by the snapshot in a peer's RELEASE.
//!
//! - [`CountedPool`] - several independent kinds of anonymous units with a
//!   fixed capacity each. A process holds at most one unit of each kind.
//! - [`SlotTable`] - identity-bearing slots that cool down after release
//!   before anyone can claim them again.

mod cooldown;
mod counted;
mod error;
mod slotted;

pub use cooldown::CooldownRange;
pub use counted::{CountedPool, KindSpec};
pub use error::ResourceError;
pub use slotted::{Slot, SlotTable};
