//! EndpointSelector — resolves which agent executes a storage operation.
//!
//! Given a data object, a store, or an explicit scope, the selector:
//! 1. Classifies data movements into movement categories (`MoveKind`)
//! 2. Applies VM-host affinity overrides for snapshot/volume actions
//! 3. Runs the scoped-candidate algorithm for primary storage, with
//!    third-party-dedicated hosts de-prioritized
//! 4. Picks zone storage agents for image and cache stores
//!
//! A selection miss is `Ok(None)` — frequent and expected. Directory
//! failures are logged and degraded to a miss; only unsupported
//! role/scope combinations are fatal.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::thread_rng;
use tracing::{debug, warn};

use stratus_topology::{
    HostStatus, Hypervisor, Scope, TopologyResult, TopologyStore, VmState,
};

use crate::candidates::pick_one;
use crate::error::{SelectionError, SelectionResult};
use crate::types::{
    Caller, DataObject, DataStore, Endpoint, MoveKind, ObjectKind, SelectorConfig, StorageAction,
    StoreRole,
};

/// Degrade a directory failure to a selection miss. Callers treat a miss
/// as a normal outcome, so transient query errors must not propagate.
fn degraded<T: Default>(result: TopologyResult<T>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(%error, what, "directory lookup failed, treating as selection miss");
            T::default()
        }
    }
}

/// Picks the execution agent for storage data movements and actions.
pub struct EndpointSelector {
    topology: TopologyStore,
    config: SelectorConfig,
}

impl EndpointSelector {
    /// Create a selector with no local bootstrap endpoint configured.
    pub fn new(topology: TopologyStore) -> Self {
        Self {
            topology,
            config: SelectorConfig::default(),
        }
    }

    /// Create a selector with explicit configuration.
    pub fn with_config(topology: TopologyStore, config: SelectorConfig) -> Self {
        Self { topology, config }
    }

    // ── Data movement ──────────────────────────────────────────────

    /// Pick the agent for a data movement between two objects' stores.
    ///
    /// Returns `Ok(None)` when no movement rule matches — the operation is
    /// not supported from the current state and the caller must treat it
    /// as a miss, not a bug.
    pub fn select_for_move(
        &self,
        src: &DataObject,
        dst: &DataObject,
    ) -> SelectionResult<Option<Endpoint>> {
        let Some(kind) = MoveKind::classify(src.store.role, dst.store.role) else {
            debug!(
                src_role = ?src.store.role,
                dst_role = ?dst.store.role,
                "no movement rule for role pair"
            );
            return Ok(None);
        };

        let result = match kind {
            // Direct primary-to-primary transfers share the image-move
            // rule on purpose; see MoveKind.
            MoveKind::PrimaryImage | MoveKind::PrimaryDirect => self.image_move(src, dst),
            MoveKind::CacheImage => self.cache_move(src, dst),
            MoveKind::ImageImage => self.image_to_image(dst),
        };
        Ok(degraded(result, "data movement"))
    }

    /// Like [`select_for_move`](Self::select_for_move), but snapshot
    /// backups prefer the host running the snapshot's attached VM: KVM
    /// only while the VM is `Running`, VMware from its current-else-last
    /// host unconditionally.
    pub fn select_for_move_action(
        &self,
        src: &DataObject,
        dst: &DataObject,
        action: StorageAction,
    ) -> SelectionResult<Option<Endpoint>> {
        if action == StorageAction::BackupSnapshot
            && matches!(src.kind, ObjectKind::Snapshot)
            && src.store.role == StoreRole::Primary
        {
            if let Some(endpoint) = degraded(self.backup_affinity(src), "snapshot backup") {
                debug!(host = %endpoint.host_id, "snapshot backup routed to vm host");
                return Ok(Some(endpoint));
            }
        }
        self.select_for_move(src, dst)
    }

    // ── Single-object selection ────────────────────────────────────

    /// Pick the agent for an operation on a single object, from the
    /// object's own store. A system template in a region-wide image store
    /// resolves to the configured local endpoint.
    pub fn select_for_object(&self, obj: &DataObject) -> SelectionResult<Option<Endpoint>> {
        if obj.is_system_template()
            && obj.store.role == StoreRole::Image
            && obj.store.scope.is_none()
        {
            return Ok(self.config.local_endpoint.clone());
        }
        self.select_for_store(&obj.store, obj.owner.as_ref())
    }

    /// Like [`select_for_object`](Self::select_for_object), but routes
    /// hypervisor-affine actions to the attached VM's host first.
    pub fn select_for_object_action(
        &self,
        obj: &DataObject,
        action: StorageAction,
    ) -> SelectionResult<Option<Endpoint>> {
        let eligible = match action {
            StorageAction::TakeSnapshot => matches!(obj.kind, ObjectKind::Snapshot),
            StorageAction::MigrateVolume | StorageAction::DeleteVolume => {
                matches!(obj.kind, ObjectKind::Volume) && obj.store.role == StoreRole::Primary
            }
            StorageAction::BackupSnapshot => false,
        };
        if eligible {
            if let Some(endpoint) = degraded(self.action_affinity(obj, action), "action affinity") {
                debug!(host = %endpoint.host_id, ?action, "action routed to vm host");
                return Ok(Some(endpoint));
            }
        }
        self.select_for_object(obj)
    }

    // ── Store and scope selection ──────────────────────────────────

    /// Pick one agent for a store: the scoped-candidate algorithm for
    /// primary storage, a zone storage agent for image and cache stores.
    /// A role with no selection rule is a fatal configuration error.
    pub fn select_for_store(
        &self,
        store: &DataStore,
        caller: Option<&Caller>,
    ) -> SelectionResult<Option<Endpoint>> {
        match store.role {
            StoreRole::Primary => {
                let picked = pick_one(
                    &self.topology,
                    &store.id,
                    store.scope.as_ref(),
                    caller,
                    &mut thread_rng(),
                );
                Ok(degraded(picked, "primary candidate").map(|h| Endpoint::from_host(&h)))
            }
            StoreRole::Image | StoreRole::ImageCache => {
                let Some(zone_id) = store.zone_id() else {
                    return Ok(None);
                };
                Ok(degraded(self.zone_agent(zone_id), "zone agent"))
            }
            StoreRole::Backup => Err(SelectionError::UnsupportedRole("backup".to_string())),
        }
    }

    /// Explicit-scope entry point to the scoped-candidate algorithm.
    pub fn select_in_scope(
        &self,
        scope: &Scope,
        pool_id: &str,
        caller: Option<&Caller>,
    ) -> SelectionResult<Option<Endpoint>> {
        let picked = pick_one(&self.topology, pool_id, Some(scope), caller, &mut thread_rng());
        Ok(degraded(picked, "scoped candidate").map(|h| Endpoint::from_host(&h)))
    }

    /// Every reachable (`Up`/`Connecting`) storage agent in the store's
    /// zone; empty when the store is not zone-scoped.
    pub fn find_all_endpoints_for_scope(
        &self,
        store: &DataStore,
    ) -> SelectionResult<Vec<Endpoint>> {
        let Some(zone_id) = store.zone_id() else {
            return Ok(Vec::new());
        };
        let agents = self.topology.storage_agents(zone_id);
        Ok(degraded(agents, "storage agents")
            .iter()
            .map(Endpoint::from_host)
            .collect())
    }

    /// All agents for a store scope: the single host for host scope, every
    /// `Up` host for cluster scope. Wider scopes have no all-agents rule
    /// and are a fatal configuration error.
    pub fn select_all(&self, store: &DataStore) -> SelectionResult<Vec<Endpoint>> {
        match &store.scope {
            Some(Scope::Host(host_id)) => {
                let host = self.topology.host(host_id);
                Ok(degraded(host, "host lookup")
                    .iter()
                    .map(Endpoint::from_host)
                    .collect())
            }
            Some(Scope::Cluster(cluster_id)) => {
                let hosts = self.topology.hosts_by_cluster(cluster_id);
                Ok(degraded(hosts, "cluster hosts")
                    .iter()
                    .filter(|h| h.status == HostStatus::Up)
                    .map(Endpoint::from_host)
                    .collect())
            }
            Some(Scope::Zone(_)) => Err(SelectionError::UnsupportedScope("zone".to_string())),
            None => Err(SelectionError::UnsupportedScope("region-wide".to_string())),
        }
    }

    /// Map a download URL authority (the agent's public IP) back to an
    /// endpoint.
    pub fn select_by_download_url(&self, url_host: &str) -> SelectionResult<Option<Endpoint>> {
        let found = self.topology.host_by_public_ip(url_host);
        Ok(degraded(found, "public ip lookup").map(|h| Endpoint::from_host(&h)))
    }

    // ── Internal resolution rules ──────────────────────────────────

    /// The image-move rule: operate on the narrower of the two stores,
    /// then run the scoped-candidate algorithm against it.
    fn image_move(&self, src: &DataObject, dst: &DataObject) -> TopologyResult<Option<Endpoint>> {
        let operate_on = narrower(&src.store, &dst.store);
        let caller = src.owner.as_ref().or(dst.owner.as_ref());
        let picked = pick_one(
            &self.topology,
            &operate_on.id,
            operate_on.scope.as_ref(),
            caller,
            &mut thread_rng(),
        )?;
        Ok(picked.map(|h| Endpoint::from_host(&h)))
    }

    /// The cache-move rule: a storage agent in the cache store's zone,
    /// with a local-endpoint fallback for system templates that live in a
    /// store with no scope at all.
    fn cache_move(&self, src: &DataObject, dst: &DataObject) -> TopologyResult<Option<Endpoint>> {
        let cache = if src.store.role == StoreRole::ImageCache {
            &src.store
        } else {
            &dst.store
        };
        if let Some(zone_id) = cache.zone_id() {
            if let Some(endpoint) = self.zone_agent(zone_id)? {
                return Ok(Some(endpoint));
            }
        }
        if src.is_system_template() && src.store.scope.is_none() {
            return Ok(self.config.local_endpoint.clone());
        }
        Ok(None)
    }

    /// Image-to-image copies run on the destination zone's agent pool.
    fn image_to_image(&self, dst: &DataObject) -> TopologyResult<Option<Endpoint>> {
        match dst.store.zone_id() {
            Some(zone_id) => self.zone_agent(zone_id),
            None => Ok(None),
        }
    }

    /// One reachable storage agent in a zone, picked at random to spread
    /// load across the agent pool.
    fn zone_agent(&self, zone_id: &str) -> TopologyResult<Option<Endpoint>> {
        let agents = self.topology.storage_agents(zone_id)?;
        Ok(agents.choose(&mut thread_rng()).map(Endpoint::from_host))
    }

    /// VM-host affinity for snapshot backups.
    fn backup_affinity(&self, src: &DataObject) -> TopologyResult<Option<Endpoint>> {
        let Some(vm_id) = &src.vm_id else {
            return Ok(None);
        };
        let Some(vm) = self.topology.vm(vm_id)? else {
            return Ok(None);
        };
        match vm.hypervisor {
            Hypervisor::Kvm if vm.state == VmState::Running => {
                self.endpoint_for(vm.host_id.as_deref())
            }
            Hypervisor::Vmware => self.endpoint_for(vm.current_or_last_host().map(String::as_str)),
            _ => Ok(None),
        }
    }

    /// VM-host affinity for single-object actions.
    fn action_affinity(
        &self,
        obj: &DataObject,
        action: StorageAction,
    ) -> TopologyResult<Option<Endpoint>> {
        let Some(vm_id) = &obj.vm_id else {
            return Ok(None);
        };
        let Some(vm) = self.topology.vm(vm_id)? else {
            return Ok(None);
        };
        match action {
            StorageAction::TakeSnapshot
                if vm.hypervisor == Hypervisor::Kvm && vm.state == VmState::Running =>
            {
                self.endpoint_for(vm.host_id.as_deref())
            }
            StorageAction::MigrateVolume
                if vm.hypervisor == Hypervisor::Hyperv && vm.state == VmState::Running =>
            {
                self.endpoint_for(vm.host_id.as_deref())
            }
            StorageAction::DeleteVolume if vm.hypervisor == Hypervisor::Vmware => {
                self.endpoint_for(vm.current_or_last_host().map(String::as_str))
            }
            _ => Ok(None),
        }
    }

    fn endpoint_for(&self, host_id: Option<&str>) -> TopologyResult<Option<Endpoint>> {
        let Some(host_id) = host_id else {
            return Ok(None);
        };
        Ok(self.topology.host(host_id)?.map(|h| Endpoint::from_host(&h)))
    }
}

/// The narrower of two stores: host/cluster scope beats zone scope beats
/// region-wide; on a tie the Primary-role side wins, then the source.
fn narrower<'a>(a: &'a DataStore, b: &'a DataStore) -> &'a DataStore {
    match a.scope_width().cmp(&b.scope_width()) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if b.role == StoreRole::Primary && a.role != StoreRole::Primary {
                b
            } else {
                a
            }
        }
    }
}
