//! TopologyStore — redb-backed resource directory for Stratus.
//!
//! Provides the read-side directories the placement engines query (hosts,
//! clusters, pods, zones, domains, storage pool attachments, virtual
//! machines, affinity groups, dedicated resources) and the administrative
//! write operations that maintain them. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{TopologyError, TopologyResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `TopologyError` variant via a closure
/// factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| TopologyError::$variant(e.to_string())
    };
}

/// Thread-safe topology directory backed by redb.
///
/// `Clone + Send + Sync` over `Arc<Database>`; one store is shared by every
/// engine in the process. Reads are plain blocking queries; writes go
/// through redb's single-writer transactions, which is what stands in for
/// row-level locking on dedication rows.
#[derive(Clone)]
pub struct TopologyStore {
    db: Arc<Database>,
}

impl TopologyStore {
    /// Open (or create) a persistent topology directory at the given path.
    pub fn open(path: &Path) -> TopologyResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "topology store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory topology directory (for testing).
    pub fn open_in_memory() -> TopologyResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory topology store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> TopologyResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(PODS).map_err(map_err!(Table))?;
        txn.open_table(ZONES).map_err(map_err!(Table))?;
        txn.open_table(DOMAINS).map_err(map_err!(Table))?;
        txn.open_table(POOL_HOSTS).map_err(map_err!(Table))?;
        txn.open_table(VMS).map_err(map_err!(Table))?;
        txn.open_table(AFFINITY_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(GROUP_MEMBERS).map_err(map_err!(Table))?;
        txn.open_table(DEDICATIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Raw JSON access shared by every directory ──────────────────

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        key: &str,
        value: &T,
    ) -> TopologyResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        key: &str,
    ) -> TopologyResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Full-table scan keeping the entries that match `keep`.
    fn scan<T, F>(
        &self,
        table: TableDefinition<&'static str, &'static [u8]>,
        keep: F,
    ) -> TopologyResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let item: T =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&item) {
                results.push(item);
            }
        }
        Ok(results)
    }

    // ── Zone directory ─────────────────────────────────────────────

    /// Insert or update a zone.
    pub fn put_zone(&self, zone: &Zone) -> TopologyResult<()> {
        self.put_json(ZONES, &zone.id, zone)
    }

    /// Get a zone by id.
    pub fn zone(&self, id: &str) -> TopologyResult<Option<Zone>> {
        self.get_json(ZONES, id)
    }

    // ── Pod directory ──────────────────────────────────────────────

    /// Insert or update a pod.
    pub fn put_pod(&self, pod: &Pod) -> TopologyResult<()> {
        self.put_json(PODS, &pod.id, pod)
    }

    /// Get a pod by id.
    pub fn pod(&self, id: &str) -> TopologyResult<Option<Pod>> {
        self.get_json(PODS, id)
    }

    /// List pods under a zone.
    pub fn pods_by_zone(&self, zone_id: &str) -> TopologyResult<Vec<Pod>> {
        self.scan(PODS, |p: &Pod| p.zone_id == zone_id)
    }

    // ── Cluster directory ──────────────────────────────────────────

    /// Insert or update a cluster.
    pub fn put_cluster(&self, cluster: &Cluster) -> TopologyResult<()> {
        self.put_json(CLUSTERS, &cluster.id, cluster)
    }

    /// Get a cluster by id.
    pub fn cluster(&self, id: &str) -> TopologyResult<Option<Cluster>> {
        self.get_json(CLUSTERS, id)
    }

    /// List clusters under a pod.
    pub fn clusters_by_pod(&self, pod_id: &str) -> TopologyResult<Vec<Cluster>> {
        self.scan(CLUSTERS, |c: &Cluster| c.pod_id == pod_id)
    }

    /// List clusters under a zone.
    pub fn clusters_by_zone(&self, zone_id: &str) -> TopologyResult<Vec<Cluster>> {
        self.scan(CLUSTERS, |c: &Cluster| c.zone_id == zone_id)
    }

    // ── Host directory ─────────────────────────────────────────────

    /// Insert or update a host.
    pub fn put_host(&self, host: &Host) -> TopologyResult<()> {
        self.put_json(HOSTS, &host.id, host)
    }

    /// Get a host by id.
    pub fn host(&self, id: &str) -> TopologyResult<Option<Host>> {
        self.get_json(HOSTS, id)
    }

    /// List hosts in a cluster.
    pub fn hosts_by_cluster(&self, cluster_id: &str) -> TopologyResult<Vec<Host>> {
        self.scan(HOSTS, |h: &Host| h.cluster_id == cluster_id)
    }

    /// List hosts in a pod.
    pub fn hosts_by_pod(&self, pod_id: &str) -> TopologyResult<Vec<Host>> {
        self.scan(HOSTS, |h: &Host| h.pod_id == pod_id)
    }

    /// List hosts in a zone.
    pub fn hosts_by_zone(&self, zone_id: &str) -> TopologyResult<Vec<Host>> {
        self.scan(HOSTS, |h: &Host| h.zone_id == zone_id)
    }

    /// Find the host exposing a given public IP (maps a download URL
    /// authority back to an agent).
    pub fn host_by_public_ip(&self, ip: &str) -> TopologyResult<Option<Host>> {
        let matches = self.scan(HOSTS, |h: &Host| h.public_ip == ip)?;
        Ok(matches.into_iter().next())
    }

    /// Storage-bridge agents (`SecondaryStorageVm`) in a zone that are
    /// reachable (`Up` or `Connecting`).
    pub fn storage_agents(&self, zone_id: &str) -> TopologyResult<Vec<Host>> {
        self.scan(HOSTS, |h: &Host| {
            h.zone_id == zone_id
                && h.kind == HostKind::SecondaryStorageVm
                && h.status.is_reachable()
        })
    }

    /// Candidate hosts for a storage operation against `pool_id`: status
    /// `Up`, kind `Routing`, resource state `Enabled`, attached to the
    /// pool, inside `scope` when one is given, and not in a cluster flagged
    /// out of storage operations.
    pub fn candidate_hosts(
        &self,
        pool_id: &str,
        scope: Option<&Scope>,
    ) -> TopologyResult<Vec<Host>> {
        let attached = self.pool_host_ids(pool_id)?;
        let excluded_clusters: HashSet<ClusterId> = self
            .scan(CLUSTERS, |c: &Cluster| c.storage_ops_excluded)?
            .into_iter()
            .map(|c| c.id)
            .collect();

        self.scan(HOSTS, |h: &Host| {
            h.status == HostStatus::Up
                && h.kind == HostKind::Routing
                && h.resource_state == ResourceState::Enabled
                && attached.contains(&h.id)
                && scope.is_none_or(|s| s.contains_host(h))
                && !excluded_clusters.contains(&h.cluster_id)
        })
    }

    // ── Domain directory ───────────────────────────────────────────

    /// Insert or update a domain.
    pub fn put_domain(&self, domain: &Domain) -> TopologyResult<()> {
        self.put_json(DOMAINS, &domain.id, domain)
    }

    /// Get a domain by id.
    pub fn domain(&self, id: &str) -> TopologyResult<Option<Domain>> {
        self.get_json(DOMAINS, id)
    }

    /// The domain and its ancestors up to the root, nearest first.
    ///
    /// A dangling parent reference is a hard error: dedication lookups
    /// depend on the chain and must not guess at ancestry.
    pub fn domain_chain(&self, id: &str) -> TopologyResult<Vec<Domain>> {
        let mut chain = Vec::new();
        let mut seen: HashSet<DomainId> = HashSet::new();

        let mut current = self
            .domain(id)?
            .ok_or_else(|| TopologyError::NotFound(format!("domain {id}")))?;
        seen.insert(current.id.clone());

        loop {
            let parent_id = current.parent_id.clone();
            chain.push(current);
            let Some(parent_id) = parent_id else {
                return Ok(chain);
            };
            if !seen.insert(parent_id.clone()) {
                return Err(TopologyError::Read(format!(
                    "domain parent cycle at {parent_id}"
                )));
            }
            current = self.domain(&parent_id)?.ok_or_else(|| {
                TopologyError::OrphanDomain {
                    child: chain.last().map(|d| d.id.clone()).unwrap_or_default(),
                    parent: parent_id,
                }
            })?;
        }
    }

    // ── Storage pool attachments ───────────────────────────────────

    /// Record that a host has a storage pool attached.
    pub fn attach_pool_host(&self, pool_id: &str, host_id: &str) -> TopologyResult<()> {
        let key = format!("{pool_id}:{host_id}");
        let record = PoolAttachment {
            pool_id: pool_id.to_string(),
            host_id: host_id.to_string(),
        };
        self.put_json(POOL_HOSTS, &key, &record)?;
        debug!(%pool_id, %host_id, "pool attachment stored");
        Ok(())
    }

    /// Remove a pool attachment. Returns true if it existed.
    pub fn detach_pool_host(&self, pool_id: &str, host_id: &str) -> TopologyResult<bool> {
        let key = format!("{pool_id}:{host_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(POOL_HOSTS).map_err(map_err!(Table))?;
            existed = t.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// Ids of every host attached to a pool (by key prefix scan).
    pub fn pool_host_ids(&self, pool_id: &str) -> TopologyResult<BTreeSet<HostId>> {
        let prefix = format!("{pool_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(POOL_HOSTS).map_err(map_err!(Table))?;
        let mut ids = BTreeSet::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let att: PoolAttachment =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                ids.insert(att.host_id);
            }
        }
        Ok(ids)
    }

    // ── Virtual machine directory ──────────────────────────────────

    /// Insert or update a virtual machine record.
    pub fn put_vm(&self, vm: &VirtualMachine) -> TopologyResult<()> {
        self.put_json(VMS, &vm.id, vm)
    }

    /// Get a virtual machine by id.
    pub fn vm(&self, id: &str) -> TopologyResult<Option<VirtualMachine>> {
        self.get_json(VMS, id)
    }

    // ── Affinity group directory ───────────────────────────────────

    /// Insert or update an affinity group.
    pub fn put_group(&self, group: &AffinityGroup) -> TopologyResult<()> {
        self.put_json(AFFINITY_GROUPS, &group.id, group)
    }

    /// Get an affinity group by id.
    pub fn group(&self, id: &str) -> TopologyResult<Option<AffinityGroup>> {
        self.get_json(AFFINITY_GROUPS, id)
    }

    /// Record a VM's membership in an affinity group.
    pub fn add_group_member(&self, group_id: &str, vm_id: &str) -> TopologyResult<()> {
        let key = format!("{group_id}:{vm_id}");
        let record = GroupMembership {
            group_id: group_id.to_string(),
            vm_id: vm_id.to_string(),
        };
        self.put_json(GROUP_MEMBERS, &key, &record)
    }

    /// The affinity groups of a given kind a VM belongs to.
    pub fn groups_for_vm(&self, vm_id: &str, kind: GroupKind) -> TopologyResult<Vec<AffinityGroup>> {
        let memberships =
            self.scan(GROUP_MEMBERS, |m: &GroupMembership| m.vm_id == vm_id)?;
        let mut groups = Vec::new();
        for m in memberships {
            if let Some(group) = self.group(&m.group_id)? {
                if group.kind == kind {
                    groups.push(group);
                }
            }
        }
        Ok(groups)
    }

    /// Ids of every VM in an affinity group (by key prefix scan).
    pub fn vms_in_group(&self, group_id: &str) -> TopologyResult<Vec<VmId>> {
        let members =
            self.scan(GROUP_MEMBERS, |m: &GroupMembership| m.group_id == group_id)?;
        Ok(members.into_iter().map(|m| m.vm_id).collect())
    }

    // ── Dedicated-resource directory ───────────────────────────────

    /// Insert or update a dedication row.
    pub fn put_dedication(&self, res: &DedicatedResource) -> TopologyResult<()> {
        self.put_json(DEDICATIONS, &res.id, res)
    }

    /// Every dedication row tied to an affinity group.
    pub fn dedications_by_group(&self, group_id: &str) -> TopologyResult<Vec<DedicatedResource>> {
        self.scan(DEDICATIONS, |d: &DedicatedResource| {
            d.group_id.as_deref() == Some(group_id)
        })
    }

    /// The dedication row binding a specific host, if any.
    pub fn dedication_for_host(&self, host_id: &str) -> TopologyResult<Option<DedicatedResource>> {
        let rows = self.scan(DEDICATIONS, |d: &DedicatedResource| {
            matches!(&d.level, DedicationLevel::Host(h) if h == host_id)
        })?;
        Ok(rows.into_iter().next())
    }

    /// The dedication row binding a specific cluster, if any.
    pub fn dedication_for_cluster(
        &self,
        cluster_id: &str,
    ) -> TopologyResult<Option<DedicatedResource>> {
        let rows = self.scan(DEDICATIONS, |d: &DedicatedResource| {
            matches!(&d.level, DedicationLevel::Cluster(c) if c == cluster_id)
        })?;
        Ok(rows.into_iter().next())
    }

    /// The dedication row binding a specific pod, if any.
    pub fn dedication_for_pod(&self, pod_id: &str) -> TopologyResult<Option<DedicatedResource>> {
        let rows = self.scan(DEDICATIONS, |d: &DedicatedResource| {
            matches!(&d.level, DedicationLevel::Pod(p) if p == pod_id)
        })?;
        Ok(rows.into_iter().next())
    }

    /// The dedication row binding a specific zone, if any.
    pub fn dedication_for_zone(&self, zone_id: &str) -> TopologyResult<Option<DedicatedResource>> {
        let rows = self.scan(DEDICATIONS, |d: &DedicatedResource| {
            matches!(&d.level, DedicationLevel::Zone(z) if z == zone_id)
        })?;
        Ok(rows.into_iter().next())
    }

    /// Every dedication row whose bound node sits under the given zone.
    ///
    /// Rows referencing topology nodes that no longer exist are skipped.
    pub fn dedications_in_zone(&self, zone_id: &str) -> TopologyResult<Vec<DedicatedResource>> {
        let all = self.scan(DEDICATIONS, |_: &DedicatedResource| true)?;
        let mut results = Vec::new();
        for row in all {
            let in_zone = match &row.level {
                DedicationLevel::Zone(z) => z == zone_id,
                DedicationLevel::Pod(p) => {
                    self.pod(p)?.is_some_and(|p| p.zone_id == zone_id)
                }
                DedicationLevel::Cluster(c) => {
                    self.cluster(c)?.is_some_and(|c| c.zone_id == zone_id)
                }
                DedicationLevel::Host(h) => {
                    match self.host(h)? {
                        Some(host) => host.zone_id == zone_id,
                        None => {
                            debug!(dedication = %row.id, host = %h, "dedication references missing host, skipped");
                            false
                        }
                    }
                }
            };
            if in_zone {
                results.push(row);
            }
        }
        Ok(results)
    }

    /// Host-level dedication rows within a scope, excluding rows owned by
    /// any of the exempt owners (a caller's own account and domain chain).
    pub fn dedicated_host_ids(
        &self,
        scope: Option<&Scope>,
        exempt: &[DedicationOwner],
    ) -> TopologyResult<BTreeSet<HostId>> {
        let rows = self.scan(DEDICATIONS, |d: &DedicatedResource| {
            matches!(d.level, DedicationLevel::Host(_)) && !exempt.contains(&d.owner)
        })?;
        let mut ids = BTreeSet::new();
        for row in rows {
            let DedicationLevel::Host(host_id) = row.level else {
                continue;
            };
            match scope {
                None => {
                    ids.insert(host_id);
                }
                Some(s) => {
                    if let Some(host) = self.host(&host_id)? {
                        if s.contains_host(&host) {
                            ids.insert(host_id);
                        }
                    }
                }
            }
        }
        Ok(ids)
    }

    /// Remove every dedication row tied to an affinity group, inside a
    /// single write transaction. Returns the number of rows removed; zero
    /// is a no-op.
    pub fn delete_dedications_for_group(&self, group_id: &str) -> TopologyResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut t = txn.open_table(DEDICATIONS).map_err(map_err!(Table))?;
            // Collect matching keys under the write lock, then remove.
            let keys: Vec<String> = t
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let row: DedicatedResource = serde_json::from_slice(value.value()).ok()?;
                    (row.group_id.as_deref() == Some(group_id))
                        .then(|| key.value().to_string())
                })
                .collect();
            count = keys.len();
            for key in &keys {
                t.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%group_id, removed = count, "dedications removed for group");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_zone(id: &str) -> Zone {
        Zone {
            id: id.to_string(),
            name: id.to_string(),
        }
    }

    fn make_pod(id: &str, zone: &str) -> Pod {
        Pod {
            id: id.to_string(),
            name: id.to_string(),
            zone_id: zone.to_string(),
        }
    }

    fn make_cluster(id: &str, pod: &str, zone: &str) -> Cluster {
        Cluster {
            id: id.to_string(),
            name: id.to_string(),
            pod_id: pod.to_string(),
            zone_id: zone.to_string(),
            storage_ops_excluded: false,
        }
    }

    fn make_host(id: &str, cluster: &str, pod: &str, zone: &str) -> Host {
        Host {
            id: id.to_string(),
            name: id.to_string(),
            status: HostStatus::Up,
            kind: HostKind::Routing,
            resource_state: ResourceState::Enabled,
            hypervisor: Hypervisor::Kvm,
            cluster_id: cluster.to_string(),
            pod_id: pod.to_string(),
            zone_id: zone.to_string(),
            public_ip: format!("198.51.100.{}", id.len()),
            private_ip: format!("10.0.0.{}", id.len()),
        }
    }

    fn dedicate_host(id: &str, host: &str, account: &str, group: &str) -> DedicatedResource {
        DedicatedResource {
            id: id.to_string(),
            level: DedicationLevel::Host(host.to_string()),
            owner: DedicationOwner::Account(account.to_string()),
            group_id: Some(group.to_string()),
        }
    }

    /// A zone with one pod, one cluster, and three attached Up hosts.
    fn seeded_store() -> TopologyStore {
        let store = TopologyStore::open_in_memory().unwrap();
        store.put_zone(&make_zone("z1")).unwrap();
        store.put_pod(&make_pod("p1", "z1")).unwrap();
        store.put_cluster(&make_cluster("c1", "p1", "z1")).unwrap();
        for id in ["h1", "h2", "h3"] {
            store.put_host(&make_host(id, "c1", "p1", "z1")).unwrap();
            store.attach_pool_host("pool-1", id).unwrap();
        }
        store
    }

    #[test]
    fn host_put_and_get() {
        let store = TopologyStore::open_in_memory().unwrap();
        let host = make_host("h1", "c1", "p1", "z1");

        store.put_host(&host).unwrap();
        assert_eq!(store.host("h1").unwrap(), Some(host));
        assert!(store.host("h2").unwrap().is_none());
    }

    #[test]
    fn hosts_by_parent_levels() {
        let store = seeded_store();
        store.put_pod(&make_pod("p2", "z1")).unwrap();
        store.put_cluster(&make_cluster("c2", "p2", "z1")).unwrap();
        store.put_host(&make_host("h9", "c2", "p2", "z1")).unwrap();

        assert_eq!(store.hosts_by_cluster("c1").unwrap().len(), 3);
        assert_eq!(store.hosts_by_pod("p2").unwrap().len(), 1);
        assert_eq!(store.hosts_by_zone("z1").unwrap().len(), 4);
    }

    #[test]
    fn host_lookup_by_public_ip() {
        let store = TopologyStore::open_in_memory().unwrap();
        let mut host = make_host("h1", "c1", "p1", "z1");
        host.public_ip = "203.0.113.7".to_string();
        store.put_host(&host).unwrap();

        let found = store.host_by_public_ip("203.0.113.7").unwrap();
        assert_eq!(found.map(|h| h.id), Some("h1".to_string()));
        assert!(store.host_by_public_ip("203.0.113.8").unwrap().is_none());
    }

    #[test]
    fn storage_agents_filter_kind_and_status() {
        let store = TopologyStore::open_in_memory().unwrap();
        let mut up = make_host("ssvm-up", "c1", "p1", "z1");
        up.kind = HostKind::SecondaryStorageVm;
        let mut connecting = make_host("ssvm-conn", "c1", "p1", "z1");
        connecting.kind = HostKind::SecondaryStorageVm;
        connecting.status = HostStatus::Connecting;
        let mut down = make_host("ssvm-down", "c1", "p1", "z1");
        down.kind = HostKind::SecondaryStorageVm;
        down.status = HostStatus::Down;
        let routing = make_host("h1", "c1", "p1", "z1");

        for h in [&up, &connecting, &down, &routing] {
            store.put_host(h).unwrap();
        }

        let agents = store.storage_agents("z1").unwrap();
        let ids: Vec<_> = agents.iter().map(|h| h.id.as_str()).collect();
        assert!(ids.contains(&"ssvm-up"));
        assert!(ids.contains(&"ssvm-conn"));
        assert!(!ids.contains(&"ssvm-down"));
        assert!(!ids.contains(&"h1"));
    }

    #[test]
    fn candidate_hosts_require_attachment() {
        let store = seeded_store();
        store.put_host(&make_host("h4", "c1", "p1", "z1")).unwrap();
        // h4 not attached to pool-1.

        let candidates = store.candidate_hosts("pool-1", None).unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|h| h.id != "h4"));
    }

    #[test]
    fn candidate_hosts_filter_status_kind_state() {
        let store = seeded_store();
        let mut down = make_host("h1", "c1", "p1", "z1");
        down.status = HostStatus::Down;
        store.put_host(&down).unwrap();
        let mut disabled = make_host("h2", "c1", "p1", "z1");
        disabled.resource_state = ResourceState::Disabled;
        store.put_host(&disabled).unwrap();

        let candidates = store.candidate_hosts("pool-1", None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "h3");
    }

    #[test]
    fn candidate_hosts_respect_scope() {
        let store = seeded_store();
        store.put_cluster(&make_cluster("c2", "p1", "z1")).unwrap();
        store.put_host(&make_host("hx", "c2", "p1", "z1")).unwrap();
        store.attach_pool_host("pool-1", "hx").unwrap();

        let scope = Scope::Cluster("c2".to_string());
        let candidates = store.candidate_hosts("pool-1", Some(&scope)).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "hx");

        let scope = Scope::Host("h2".to_string());
        let candidates = store.candidate_hosts("pool-1", Some(&scope)).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "h2");
    }

    #[test]
    fn candidate_hosts_skip_excluded_clusters() {
        let store = seeded_store();
        let mut cluster = make_cluster("c1", "p1", "z1");
        cluster.storage_ops_excluded = true;
        store.put_cluster(&cluster).unwrap();

        let candidates = store.candidate_hosts("pool-1", None).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn pool_attachment_lifecycle() {
        let store = TopologyStore::open_in_memory().unwrap();
        store.attach_pool_host("pool-1", "h1").unwrap();
        store.attach_pool_host("pool-1", "h2").unwrap();
        store.attach_pool_host("pool-2", "h3").unwrap();

        let ids = store.pool_host_ids("pool-1").unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("h1"));

        assert!(store.detach_pool_host("pool-1", "h1").unwrap());
        assert!(!store.detach_pool_host("pool-1", "h1").unwrap());
        assert_eq!(store.pool_host_ids("pool-1").unwrap().len(), 1);
    }

    #[test]
    fn domain_chain_walks_to_root() {
        let store = TopologyStore::open_in_memory().unwrap();
        store
            .put_domain(&Domain {
                id: "root".to_string(),
                name: "ROOT".to_string(),
                parent_id: None,
            })
            .unwrap();
        store
            .put_domain(&Domain {
                id: "eng".to_string(),
                name: "eng".to_string(),
                parent_id: Some("root".to_string()),
            })
            .unwrap();
        store
            .put_domain(&Domain {
                id: "storage-team".to_string(),
                name: "storage-team".to_string(),
                parent_id: Some("eng".to_string()),
            })
            .unwrap();

        let chain = store.domain_chain("storage-team").unwrap();
        let ids: Vec<_> = chain.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["storage-team", "eng", "root"]);
    }

    #[test]
    fn domain_chain_dangling_parent_is_fatal() {
        let store = TopologyStore::open_in_memory().unwrap();
        store
            .put_domain(&Domain {
                id: "orphan".to_string(),
                name: "orphan".to_string(),
                parent_id: Some("gone".to_string()),
            })
            .unwrap();

        let err = store.domain_chain("orphan").unwrap_err();
        assert!(matches!(err, TopologyError::OrphanDomain { .. }));
    }

    #[test]
    fn groups_for_vm_filters_kind() {
        let store = TopologyStore::open_in_memory().unwrap();
        store
            .put_group(&AffinityGroup {
                id: "g1".to_string(),
                name: "dedicated".to_string(),
                kind: GroupKind::ExplicitDedication,
                account_id: "acct-a".to_string(),
                domain_id: "root".to_string(),
            })
            .unwrap();
        store
            .put_group(&AffinityGroup {
                id: "g2".to_string(),
                name: "spread".to_string(),
                kind: GroupKind::HostAntiAffinity,
                account_id: "acct-a".to_string(),
                domain_id: "root".to_string(),
            })
            .unwrap();
        store.add_group_member("g1", "vm1").unwrap();
        store.add_group_member("g2", "vm1").unwrap();

        let groups = store
            .groups_for_vm("vm1", GroupKind::ExplicitDedication)
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "g1");

        assert_eq!(store.vms_in_group("g1").unwrap(), vec!["vm1".to_string()]);
    }

    #[test]
    fn dedication_lookups_per_level() {
        let store = seeded_store();
        store
            .put_dedication(&dedicate_host("d1", "h1", "acct-a", "g1"))
            .unwrap();
        store
            .put_dedication(&DedicatedResource {
                id: "d2".to_string(),
                level: DedicationLevel::Cluster("c1".to_string()),
                owner: DedicationOwner::Domain("root".to_string()),
                group_id: Some("g2".to_string()),
            })
            .unwrap();

        assert!(store.dedication_for_host("h1").unwrap().is_some());
        assert!(store.dedication_for_host("h2").unwrap().is_none());
        assert!(store.dedication_for_cluster("c1").unwrap().is_some());
        assert!(store.dedication_for_pod("p1").unwrap().is_none());
        assert!(store.dedication_for_zone("z1").unwrap().is_none());
        assert_eq!(store.dedications_by_group("g1").unwrap().len(), 1);
    }

    #[test]
    fn dedications_in_zone_resolve_each_level() {
        let store = seeded_store();
        store.put_zone(&make_zone("z2")).unwrap();
        store.put_pod(&make_pod("p9", "z2")).unwrap();

        store
            .put_dedication(&dedicate_host("d1", "h1", "acct-a", "g1"))
            .unwrap();
        store
            .put_dedication(&DedicatedResource {
                id: "d2".to_string(),
                level: DedicationLevel::Pod("p9".to_string()),
                owner: DedicationOwner::Account("acct-b".to_string()),
                group_id: None,
            })
            .unwrap();
        store
            .put_dedication(&DedicatedResource {
                id: "d3".to_string(),
                level: DedicationLevel::Zone("z1".to_string()),
                owner: DedicationOwner::Account("acct-c".to_string()),
                group_id: None,
            })
            .unwrap();

        let z1 = store.dedications_in_zone("z1").unwrap();
        let ids: Vec<_> = z1.iter().map(|d| d.id.as_str()).collect();
        assert!(ids.contains(&"d1"));
        assert!(ids.contains(&"d3"));
        assert!(!ids.contains(&"d2"));
    }

    #[test]
    fn dedicated_host_ids_exempts_owners() {
        let store = seeded_store();
        store
            .put_dedication(&dedicate_host("d1", "h1", "acct-a", "g1"))
            .unwrap();
        store
            .put_dedication(&dedicate_host("d2", "h2", "acct-b", "g2"))
            .unwrap();

        let exempt = vec![DedicationOwner::Account("acct-a".to_string())];
        let ids = store.dedicated_host_ids(None, &exempt).unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("h2"));

        // Scoped to a cluster that holds both hosts.
        let scope = Scope::Cluster("c1".to_string());
        let ids = store.dedicated_host_ids(Some(&scope), &exempt).unwrap();
        assert!(ids.contains("h2"));

        // Scope with neither host.
        let scope = Scope::Cluster("c9".to_string());
        let ids = store.dedicated_host_ids(Some(&scope), &exempt).unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn delete_dedications_for_group_cascades() {
        let store = seeded_store();
        store
            .put_dedication(&dedicate_host("d1", "h1", "acct-a", "g1"))
            .unwrap();
        store
            .put_dedication(&dedicate_host("d2", "h2", "acct-a", "g1"))
            .unwrap();
        store
            .put_dedication(&dedicate_host("d3", "h3", "acct-b", "g2"))
            .unwrap();

        assert_eq!(store.delete_dedications_for_group("g1").unwrap(), 2);
        assert_eq!(store.delete_dedications_for_group("g1").unwrap(), 0);
        assert_eq!(store.dedications_by_group("g2").unwrap().len(), 1);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("topology.redb");

        {
            let store = TopologyStore::open(&db_path).unwrap();
            store.put_host(&make_host("h1", "c1", "p1", "z1")).unwrap();
        }

        // Reopen the same database file.
        let store = TopologyStore::open(&db_path).unwrap();
        let host = store.host("h1").unwrap();
        assert!(host.is_some());
        assert_eq!(host.unwrap().cluster_id, "c1");
    }

    #[test]
    fn empty_store_operations() {
        let store = TopologyStore::open_in_memory().unwrap();

        assert!(store.hosts_by_zone("z1").unwrap().is_empty());
        assert!(store.pods_by_zone("z1").unwrap().is_empty());
        assert!(store.pool_host_ids("pool-1").unwrap().is_empty());
        assert!(store.dedications_in_zone("z1").unwrap().is_empty());
        assert_eq!(store.delete_dedications_for_group("g1").unwrap(), 0);
        assert!(!store.detach_pool_host("pool-1", "h1").unwrap());
    }
}
