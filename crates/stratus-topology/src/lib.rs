//! stratus-topology — resource directory for the Stratus placement core.
//!
//! Backed by [redb](https://docs.rs/redb), provides the blocking read
//! directories every placement decision queries: the zone → pod → cluster →
//! host tree, storage pool attachments, virtual machines, affinity groups,
//! and dedicated-resource bindings.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{pool_id}:{host_id}`, `{group_id}:{vm_id}`) enable
//! prefix scans for membership records.
//!
//! The `TopologyStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is shared by the selection and dedication engines.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{TopologyError, TopologyResult};
pub use store::TopologyStore;
pub use types::*;
