//! stratus-dedication — dedicated-resource placement constraints.
//!
//! For VMs under explicit-dedication affinity groups, computes the
//! avoid-list of pods, clusters, and hosts a deployment planner must not
//! use, so placement only lands on resources dedicated to the VM's own
//! account or domain chain. Verifies already-pinned plans and raises a
//! [`DedicationError::Conflict`] when a pinned element violates policy.

pub mod avoid;
pub mod error;
pub mod processor;

pub use avoid::ExcludeList;
pub use error::{DedicationError, DedicationResult};
pub use processor::{DedicationProcessor, DeploymentPlan};
