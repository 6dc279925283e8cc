//! stratus-endpoint — storage endpoint selection for Stratus.
//!
//! Decides which physical agent executes a storage data movement or
//! action: classifies the movement by store-role pair, applies VM-host
//! affinity overrides where a hypervisor family requires them, and runs
//! the scoped-candidate algorithm (dedication-aware, randomized within
//! priority buckets) for primary storage.
//!
//! Selection misses are `Ok(None)`; only unsupported role/scope
//! combinations raise [`SelectionError`].

mod candidates;
pub mod error;
pub mod selector;
pub mod types;

pub use error::{SelectionError, SelectionResult};
pub use selector::EndpointSelector;
pub use types::{
    Caller, DataObject, DataStore, Endpoint, MoveKind, ObjectKind, SelectorConfig, StorageAction,
    StoreRole,
};
