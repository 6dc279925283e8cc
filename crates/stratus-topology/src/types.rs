//! Domain types for the Stratus topology directory.
//!
//! These types describe the physical resource tree (zone → pod → cluster →
//! host), storage pool attachments, virtual machines, affinity groups, and
//! dedicated-resource bindings. All types are serializable to/from JSON for
//! storage in redb tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a host (physical agent).
pub type HostId = String;

/// Unique identifier for a cluster.
pub type ClusterId = String;

/// Unique identifier for a pod.
pub type PodId = String;

/// Unique identifier for a zone (data center).
pub type ZoneId = String;

/// Unique identifier for a storage pool.
pub type PoolId = String;

/// Unique identifier for a virtual machine.
pub type VmId = String;

/// Unique identifier for an account.
pub type AccountId = String;

/// Unique identifier for a domain (account hierarchy node).
pub type DomainId = String;

/// Unique identifier for an affinity group.
pub type GroupId = String;

// ── Scope ──────────────────────────────────────────────────────────

/// A topology bound restricting candidate search.
///
/// "Unscoped" is expressed as `Option<Scope>` at the call sites that
/// allow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Host(HostId),
    Cluster(ClusterId),
    Zone(ZoneId),
}

impl Scope {
    /// Whether a host falls inside this scope.
    pub fn contains_host(&self, host: &Host) -> bool {
        match self {
            Scope::Host(id) => &host.id == id,
            Scope::Cluster(id) => &host.cluster_id == id,
            Scope::Zone(id) => &host.zone_id == id,
        }
    }

    /// The zone id, when this is a zone-wide scope.
    pub fn zone_id(&self) -> Option<&ZoneId> {
        match self {
            Scope::Zone(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_zone(&self) -> bool {
        matches!(self, Scope::Zone(_))
    }
}

// ── Hosts ──────────────────────────────────────────────────────────

/// Operational status of a host agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    Up,
    Connecting,
    Disconnecting,
    Down,
    Alert,
    Removed,
}

impl HostStatus {
    /// Whether an agent in this status can still accept commands.
    /// `Connecting` agents are reachable for storage-bridge work.
    pub fn is_reachable(self) -> bool {
        matches!(self, HostStatus::Up | HostStatus::Connecting)
    }
}

/// What kind of agent a host runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostKind {
    /// A hypervisor host that runs guest VMs.
    Routing,
    /// A storage-bridge agent for image store operations.
    SecondaryStorageVm,
    ConsoleProxy,
    Storage,
}

/// Administrative resource state of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    Enabled,
    Disabled,
    Maintenance,
}

/// Hypervisor family running on a host (and its guests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hypervisor {
    Kvm,
    Vmware,
    Hyperv,
    Xen,
}

/// A physical execution agent. Read-only to the placement core; owned and
/// mutated by the host-management subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    pub status: HostStatus,
    pub kind: HostKind,
    pub resource_state: ResourceState,
    pub hypervisor: Hypervisor,
    pub cluster_id: ClusterId,
    pub pod_id: PodId,
    pub zone_id: ZoneId,
    /// Address reachable from outside the management network (download
    /// URLs resolve back to agents through this).
    pub public_ip: String,
    /// Address commands are routed to.
    pub private_ip: String,
}

// ── Topology tree ──────────────────────────────────────────────────

/// A cluster of hosts sharing primary storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub pod_id: PodId,
    pub zone_id: ZoneId,
    /// When set, hosts in this cluster are never picked for storage
    /// data-movement operations.
    pub storage_ops_excluded: bool,
}

/// A pod groups clusters within a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    pub name: String,
    pub zone_id: ZoneId,
}

/// A zone (data center), the root of the topology tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
}

/// A node in the account-domain hierarchy. `parent_id` is `None` only for
/// the root domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub parent_id: Option<DomainId>,
}

/// Host ↔ storage-pool membership record, keyed `{pool_id}:{host_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolAttachment {
    pub pool_id: PoolId,
    pub host_id: HostId,
}

// ── Virtual machines ───────────────────────────────────────────────

/// Lifecycle state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VmState {
    Running,
    Stopped,
    Migrating,
    Destroyed,
}

/// The slice of VM state the placement core reads: ownership, hypervisor
/// family, and where the VM runs (or last ran).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: VmId,
    pub account_id: AccountId,
    pub domain_id: DomainId,
    pub state: VmState,
    pub hypervisor: Hypervisor,
    pub host_id: Option<HostId>,
    pub last_host_id: Option<HostId>,
}

impl VirtualMachine {
    /// The host the VM currently runs on, falling back to where it last
    /// ran. Hypervisor families that keep storage access pinned to the VM
    /// host use this for endpoint affinity.
    pub fn current_or_last_host(&self) -> Option<&HostId> {
        self.host_id.as_ref().or(self.last_host_id.as_ref())
    }
}

// ── Affinity groups ────────────────────────────────────────────────

/// The policy family an affinity group enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// VMs in the group may only land on resources dedicated to the
    /// group's owner.
    ExplicitDedication,
    /// VMs in the group repel each other across hosts.
    HostAntiAffinity,
}

/// A policy object grouping VMs under a shared placement constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffinityGroup {
    pub id: GroupId,
    pub name: String,
    pub kind: GroupKind,
    pub account_id: AccountId,
    pub domain_id: DomainId,
}

/// VM membership in an affinity group, keyed `{group_id}:{vm_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_id: GroupId,
    pub vm_id: VmId,
}

// ── Dedicated resources ────────────────────────────────────────────

/// Who a resource is dedicated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DedicationOwner {
    Account(AccountId),
    Domain(DomainId),
}

/// The single topology node a dedication row binds. The sum type enforces
/// the one-level-per-record invariant at the type level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum DedicationLevel {
    Host(HostId),
    Cluster(ClusterId),
    Pod(PodId),
    Zone(ZoneId),
}

impl DedicationLevel {
    /// Human-readable form for conflict messages.
    pub fn describe(&self) -> String {
        match self {
            DedicationLevel::Host(id) => format!("host {id}"),
            DedicationLevel::Cluster(id) => format!("cluster {id}"),
            DedicationLevel::Pod(id) => format!("pod {id}"),
            DedicationLevel::Zone(id) => format!("zone {id}"),
        }
    }
}

/// An exclusive binding of a topology node to an account or domain,
/// optionally tied to an explicit-dedication affinity group.
///
/// Created by administrative dedication, removed when dedication is
/// revoked or the owning affinity group is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedicatedResource {
    pub id: String,
    pub level: DedicationLevel,
    pub owner: DedicationOwner,
    pub group_id: Option<GroupId>,
}
