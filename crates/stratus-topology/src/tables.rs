//! redb table definitions for the Stratus topology directory.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{parent_id}:{child_id}`.

use redb::TableDefinition;

/// Hosts keyed by `{host_id}`.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Clusters keyed by `{cluster_id}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Pods keyed by `{pod_id}`.
pub const PODS: TableDefinition<&str, &[u8]> = TableDefinition::new("pods");

/// Zones keyed by `{zone_id}`.
pub const ZONES: TableDefinition<&str, &[u8]> = TableDefinition::new("zones");

/// Domains keyed by `{domain_id}`.
pub const DOMAINS: TableDefinition<&str, &[u8]> = TableDefinition::new("domains");

/// Storage pool attachments keyed by `{pool_id}:{host_id}`.
pub const POOL_HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("pool_hosts");

/// Virtual machines keyed by `{vm_id}`.
pub const VMS: TableDefinition<&str, &[u8]> = TableDefinition::new("vms");

/// Affinity groups keyed by `{group_id}`.
pub const AFFINITY_GROUPS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("affinity_groups");

/// Group memberships keyed by `{group_id}:{vm_id}`.
pub const GROUP_MEMBERS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("group_members");

/// Dedicated resources keyed by `{dedication_id}`.
pub const DEDICATIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("dedications");
