//! Request and result types for endpoint selection.

use serde::{Deserialize, Serialize};
use stratus_topology::{AccountId, DomainId, Host, HostId, PoolId, Scope, VmId, ZoneId};

/// The role a data store plays in the storage fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRole {
    /// Primary storage attached to hypervisor hosts.
    Primary,
    /// An image store (templates, ISOs, snapshot archives).
    Image,
    /// A staging cache bridging primary and image stores.
    ImageCache,
    /// Backup storage; no data-movement rule selects agents for it.
    Backup,
}

impl StoreRole {
    /// Whether this role serves images (directly or as a cache).
    pub fn is_image_kind(self) -> bool {
        matches!(self, StoreRole::Image | StoreRole::ImageCache)
    }
}

/// A data store as the selector sees it: role plus topology scope.
/// Immutable for the duration of a selection operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    pub id: PoolId,
    pub role: StoreRole,
    /// `None` means region-wide (no topology bound at all).
    pub scope: Option<Scope>,
}

impl DataStore {
    /// The store's zone, when it is zone-scoped.
    pub fn zone_id(&self) -> Option<&ZoneId> {
        self.scope.as_ref().and_then(Scope::zone_id)
    }

    /// Width rank used when picking the narrower of two stores:
    /// host/cluster scope < zone scope < region-wide.
    pub(crate) fn scope_width(&self) -> u8 {
        match &self.scope {
            Some(s) if !s.is_zone() => 0,
            Some(_) => 1,
            None => 2,
        }
    }
}

/// What kind of data object a selection concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Template {
        /// System templates (routing/secondary-storage appliances) may
        /// live in region-wide stores and bootstrap through the local
        /// endpoint.
        system: bool,
    },
    Volume,
    Snapshot,
}

/// The calling owner on whose behalf a selection runs. Threaded explicitly
/// so the caller's own dedicated hosts are never de-prioritized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caller {
    pub account_id: AccountId,
    pub domain_id: Option<DomainId>,
}

/// A data object (template, volume, snapshot) and the store it lives on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub kind: ObjectKind,
    pub store: DataStore,
    pub owner: Option<Caller>,
    /// The VM the object is attached to, where one exists (volumes and
    /// snapshots of attached volumes).
    pub vm_id: Option<VmId>,
}

impl DataObject {
    pub fn is_system_template(&self) -> bool {
        matches!(self.kind, ObjectKind::Template { system: true })
    }
}

/// Storage actions that may override generic selection with VM-host
/// affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageAction {
    BackupSnapshot,
    TakeSnapshot,
    MigrateVolume,
    DeleteVolume,
}

/// Movement categories, classified once per call from the
/// (source role, dest role) pair and dispatched through a single `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// Primary storage on one side, an image-capable store on the other.
    PrimaryImage,
    /// Direct transfer between two primary stores. Shares the
    /// `PrimaryImage` rule on purpose.
    PrimaryDirect,
    /// Between the staging cache and an image store.
    CacheImage,
    /// Between two image stores.
    ImageImage,
}

impl MoveKind {
    /// Classify a movement by its role pair. `None` means the selector has
    /// no rule for this movement and the operation is unsupported from the
    /// current state.
    pub fn classify(src: StoreRole, dst: StoreRole) -> Option<MoveKind> {
        use StoreRole::*;
        match (src, dst) {
            (Primary, Image) | (Primary, ImageCache) | (Image, Primary) | (ImageCache, Primary) => {
                Some(MoveKind::PrimaryImage)
            }
            (Primary, Primary) => Some(MoveKind::PrimaryDirect),
            (ImageCache, Image) | (Image, ImageCache) => Some(MoveKind::CacheImage),
            (Image, Image) => Some(MoveKind::ImageImage),
            _ => None,
        }
    }
}

/// A handle to the agent chosen to execute an operation. Carries the host
/// identity and the address commands are routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host_id: HostId,
    pub address: String,
}

impl Endpoint {
    pub fn new(host_id: impl Into<HostId>, address: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            address: address.into(),
        }
    }

    pub fn from_host(host: &Host) -> Self {
        Self {
            host_id: host.id.clone(),
            address: host.private_ip.clone(),
        }
    }
}

/// Selector configuration. The local endpoint is the management-server
/// bootstrap agent used when a system template lives in a region-wide
/// image store with no zone to search.
#[derive(Debug, Clone, Default)]
pub struct SelectorConfig {
    pub local_endpoint: Option<Endpoint>,
}

impl SelectorConfig {
    pub fn with_local_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.local_endpoint = Some(endpoint);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StoreRole::*;

    #[test]
    fn movement_classification() {
        assert_eq!(MoveKind::classify(Primary, Image), Some(MoveKind::PrimaryImage));
        assert_eq!(MoveKind::classify(Image, Primary), Some(MoveKind::PrimaryImage));
        assert_eq!(
            MoveKind::classify(ImageCache, Primary),
            Some(MoveKind::PrimaryImage)
        );
        assert_eq!(
            MoveKind::classify(Primary, Primary),
            Some(MoveKind::PrimaryDirect)
        );
        assert_eq!(
            MoveKind::classify(ImageCache, Image),
            Some(MoveKind::CacheImage)
        );
        assert_eq!(
            MoveKind::classify(Image, ImageCache),
            Some(MoveKind::CacheImage)
        );
        assert_eq!(MoveKind::classify(Image, Image), Some(MoveKind::ImageImage));
        assert_eq!(MoveKind::classify(ImageCache, ImageCache), None);
        assert_eq!(MoveKind::classify(Backup, Image), None);
    }

    #[test]
    fn scope_width_ordering() {
        let host_scoped = DataStore {
            id: "pool-1".to_string(),
            role: Primary,
            scope: Some(Scope::Host("h1".to_string())),
        };
        let cluster_scoped = DataStore {
            id: "pool-2".to_string(),
            role: Primary,
            scope: Some(Scope::Cluster("c1".to_string())),
        };
        let zone_scoped = DataStore {
            id: "pool-3".to_string(),
            role: Image,
            scope: Some(Scope::Zone("z1".to_string())),
        };
        let region_wide = DataStore {
            id: "pool-4".to_string(),
            role: Image,
            scope: None,
        };

        assert!(host_scoped.scope_width() < zone_scoped.scope_width());
        assert_eq!(host_scoped.scope_width(), cluster_scoped.scope_width());
        assert!(zone_scoped.scope_width() < region_wide.scope_width());

        assert_eq!(zone_scoped.zone_id(), Some(&"z1".to_string()));
        assert_eq!(cluster_scoped.zone_id(), None);
        assert_eq!(region_wide.zone_id(), None);
    }
}
