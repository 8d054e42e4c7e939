//! Chaos injection for the duration of the suite
//!
//! While enabled, a background task periodically picks a share of the
//! ready nodes and hands them to a [`FailurePolicy`].

mod injector;
mod policy;
mod schedule;

pub use injector::ChaosInjector;
#[cfg(test)]
pub use policy::MockFailurePolicy;
pub use policy::{FailurePolicy, NodeDeletionPolicy};
pub use schedule::{ChaosSchedule, MAX_CHAOS_WAIT};
