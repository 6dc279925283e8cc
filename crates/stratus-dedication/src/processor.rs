//! DedicationProcessor — placement constraints for explicit dedication.
//!
//! For a VM whose affinity groups are of the explicit-dedication kind,
//! computes which pods, clusters, and hosts a deployment planner must
//! avoid so placement only lands on resources dedicated to the VM's own
//! account/domain chain. Dedication is inherited downward: a dedicated
//! zone admits its pods, clusters, and hosts unless a sub-resource is
//! separately dedicated to someone else.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info};

use stratus_topology::{
    ClusterId, DedicatedResource, DedicationLevel, GroupKind, HostId, PodId, TopologyStore, ZoneId,
};

use crate::avoid::ExcludeList;
use crate::error::{DedicationError, DedicationResult};

/// Where the orchestrator already decided to place a VM. Narrower fields
/// progressively pin the plan; a zone-only plan is fully open.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    pub zone_id: ZoneId,
    pub pod_id: Option<PodId>,
    pub cluster_id: Option<ClusterId>,
    pub host_id: Option<HostId>,
}

impl DeploymentPlan {
    /// An open plan: only the zone is decided.
    pub fn zone_wide(zone_id: impl Into<ZoneId>) -> Self {
        Self {
            zone_id: zone_id.into(),
            pod_id: None,
            cluster_id: None,
            host_id: None,
        }
    }

    pub fn in_pod(mut self, pod_id: impl Into<PodId>) -> Self {
        self.pod_id = Some(pod_id.into());
        self
    }

    pub fn in_cluster(mut self, cluster_id: impl Into<ClusterId>) -> Self {
        self.cluster_id = Some(cluster_id.into());
        self
    }

    pub fn on_host(mut self, host_id: impl Into<HostId>) -> Self {
        self.host_id = Some(host_id.into());
        self
    }
}

/// Computes avoid-lists for VMs under explicit-dedication affinity groups.
pub struct DedicationProcessor {
    topology: TopologyStore,
}

impl DedicationProcessor {
    pub fn new(topology: TopologyStore) -> Self {
        Self { topology }
    }

    // ── Static policy ──────────────────────────────────────────────
    // Explicit-dedication groups are created by administrators, may be
    // shared across a domain and its sub-domains, and are never shared
    // across unrelated accounts.

    pub fn admin_controlled(&self) -> bool {
        true
    }

    pub fn domain_wide(&self) -> bool {
        true
    }

    pub fn subdomain_access(&self) -> bool {
        true
    }

    pub fn cross_account_sharable(&self) -> bool {
        false
    }

    // ── Constraint processing ──────────────────────────────────────

    /// Apply dedication constraints for `vm_id` against `plan`, extending
    /// `avoid` with the topology elements the planner must not use.
    ///
    /// The avoid-list is built as a local value and merged only on
    /// success: a conflict error leaves `avoid` exactly as it was.
    pub fn process(
        &self,
        vm_id: &str,
        plan: &DeploymentPlan,
        avoid: &mut ExcludeList,
    ) -> DedicationResult<()> {
        let groups = self
            .topology
            .groups_for_vm(vm_id, GroupKind::ExplicitDedication)?;
        if groups.is_empty() {
            debug!(%vm_id, "vm has no explicit-dedication groups");
            return Ok(());
        }

        let mut mine: Vec<DedicatedResource> = Vec::new();
        for group in &groups {
            mine.extend(self.topology.dedications_by_group(&group.id)?);
        }

        if let Some(host_id) = &plan.host_id {
            // A fully pinned plan needs verification only; the avoid-list
            // has nothing left to constrain.
            return self.verify_pinned_host(host_id, &mine);
        }

        let mut staged = ExcludeList::new();
        if let Some(cluster_id) = &plan.cluster_id {
            self.constrain_pinned_cluster(cluster_id, &mine, &mut staged)?;
        } else if let Some(pod_id) = &plan.pod_id {
            self.constrain_pinned_pod(pod_id, &mine, &mut staged)?;
        } else {
            self.constrain_open_plan(&plan.zone_id, &mine, &mut staged)?;
        }

        avoid.merge(staged);
        Ok(())
    }

    /// When an affinity group of this kind is deleted, release every
    /// dedication row that referenced it. No-op if none exist.
    pub fn handle_delete_group(&self, group_id: &str) -> DedicationResult<()> {
        let removed = self.topology.delete_dedications_for_group(group_id)?;
        if removed > 0 {
            info!(%group_id, removed, "released dedications of deleted affinity group");
        }
        Ok(())
    }

    /// The pinned host (or an ancestor) must appear among the VM's
    /// dedicated resources.
    fn verify_pinned_host(
        &self,
        host_id: &str,
        mine: &[DedicatedResource],
    ) -> DedicationResult<()> {
        let Some(host) = self.topology.host(host_id)? else {
            return Err(DedicationError::conflict(format!("host {host_id}")));
        };

        let covered = mine.iter().any(|d| match &d.level {
            DedicationLevel::Host(h) => h == host_id,
            DedicationLevel::Cluster(c) => c == &host.cluster_id,
            DedicationLevel::Pod(p) => p == &host.pod_id,
            DedicationLevel::Zone(z) => z == &host.zone_id,
        });
        if covered {
            debug!(%host_id, "pinned host covered by dedication");
            Ok(())
        } else {
            Err(DedicationError::conflict(format!("host {host_id}")))
        }
    }

    /// A pinned cluster is valid if the cluster (or its pod/zone) is
    /// dedicated, or if it contains dedicated hosts — in which case every
    /// other host in the cluster is avoided so the planner is steered to
    /// the dedicated ones.
    fn constrain_pinned_cluster(
        &self,
        cluster_id: &str,
        mine: &[DedicatedResource],
        staged: &mut ExcludeList,
    ) -> DedicationResult<()> {
        let Some(cluster) = self.topology.cluster(cluster_id)? else {
            return Err(DedicationError::conflict(format!("cluster {cluster_id}")));
        };

        let covered = mine.iter().any(|d| match &d.level {
            DedicationLevel::Cluster(c) => c == cluster_id,
            DedicationLevel::Pod(p) => p == &cluster.pod_id,
            DedicationLevel::Zone(z) => z == &cluster.zone_id,
            DedicationLevel::Host(_) => false,
        });
        if covered {
            return Ok(());
        }

        let dedicated_hosts = host_level_ids(mine);
        let hosts_in_cluster = self.topology.hosts_by_cluster(cluster_id)?;
        let usable: BTreeSet<&str> = hosts_in_cluster
            .iter()
            .filter(|h| dedicated_hosts.contains(&h.id))
            .map(|h| h.id.as_str())
            .collect();
        if usable.is_empty() {
            return Err(DedicationError::conflict(format!("cluster {cluster_id}")));
        }

        for host in &hosts_in_cluster {
            if !usable.contains(host.id.as_str()) {
                staged.avoid_host(host.id.clone());
            }
        }
        debug!(%cluster_id, usable = usable.len(), "pinned cluster steered to dedicated hosts");
        Ok(())
    }

    /// A pinned pod is valid if the pod (or its zone) is dedicated, or if
    /// it contains dedicated clusters or hosts — non-matching clusters and
    /// hosts within the pod are then avoided.
    fn constrain_pinned_pod(
        &self,
        pod_id: &str,
        mine: &[DedicatedResource],
        staged: &mut ExcludeList,
    ) -> DedicationResult<()> {
        let Some(pod) = self.topology.pod(pod_id)? else {
            return Err(DedicationError::conflict(format!("pod {pod_id}")));
        };

        let covered = mine.iter().any(|d| match &d.level {
            DedicationLevel::Pod(p) => p == pod_id,
            DedicationLevel::Zone(z) => z == &pod.zone_id,
            _ => false,
        });
        if covered {
            return Ok(());
        }

        let cluster_rows = cluster_level_ids(mine);
        let host_rows = host_level_ids(mine);

        let clusters_in_pod = self.topology.clusters_by_pod(pod_id)?;
        let hosts_in_pod = self.topology.hosts_by_pod(pod_id)?;

        let dedicated_clusters: BTreeSet<&str> = clusters_in_pod
            .iter()
            .filter(|c| cluster_rows.contains(&c.id))
            .map(|c| c.id.as_str())
            .collect();
        let dedicated_hosts: BTreeSet<&str> = hosts_in_pod
            .iter()
            .filter(|h| host_rows.contains(&h.id))
            .map(|h| h.id.as_str())
            .collect();

        if dedicated_clusters.is_empty() && dedicated_hosts.is_empty() {
            return Err(DedicationError::conflict(format!("pod {pod_id}")));
        }

        for cluster in &clusters_in_pod {
            let shelters_dedicated_host = hosts_in_pod
                .iter()
                .any(|h| h.cluster_id == cluster.id && dedicated_hosts.contains(h.id.as_str()));
            if !dedicated_clusters.contains(cluster.id.as_str()) && !shelters_dedicated_host {
                staged.avoid_cluster(cluster.id.clone());
            }
        }
        for host in &hosts_in_pod {
            if !dedicated_hosts.contains(host.id.as_str())
                && !dedicated_clusters.contains(host.cluster_id.as_str())
            {
                staged.avoid_host(host.id.clone());
            }
        }
        Ok(())
    }

    /// The open-plan case: expand every dedicated resource downward into
    /// an include-list (the sub-resource conflict rule pushes
    /// foreign-dedicated nodes out), then avoid everything under the zone
    /// that the include-list does not cover. A VM whose groups hold no
    /// dedicated resources at all cannot be placed: the whole zone is
    /// avoided.
    fn constrain_open_plan(
        &self,
        zone_id: &str,
        mine: &[DedicatedResource],
        staged: &mut ExcludeList,
    ) -> DedicationResult<()> {
        if mine.is_empty() {
            info!(%zone_id, "no dedicated resources for vm's groups, avoiding whole zone");
            staged.avoid_zone(zone_id.to_string());
            return Ok(());
        }

        // Nodes dedicated through rows that are not the VM's: never
        // includable, even under an included ancestor.
        let my_row_ids: HashSet<&str> = mine.iter().map(|d| d.id.as_str()).collect();
        let mut foreign_pods: BTreeSet<PodId> = BTreeSet::new();
        let mut foreign_clusters: BTreeSet<ClusterId> = BTreeSet::new();
        let mut foreign_hosts: BTreeSet<HostId> = BTreeSet::new();
        for row in self.topology.dedications_in_zone(zone_id)? {
            if my_row_ids.contains(row.id.as_str()) {
                continue;
            }
            match row.level {
                DedicationLevel::Pod(p) => {
                    foreign_pods.insert(p);
                }
                DedicationLevel::Cluster(c) => {
                    foreign_clusters.insert(c);
                }
                DedicationLevel::Host(h) => {
                    foreign_hosts.insert(h);
                }
                DedicationLevel::Zone(_) => {}
            }
        }

        let mut include_pods: BTreeSet<PodId> = BTreeSet::new();
        let mut include_clusters: BTreeSet<ClusterId> = BTreeSet::new();
        let mut include_hosts: BTreeSet<HostId> = BTreeSet::new();

        for row in mine {
            match &row.level {
                DedicationLevel::Zone(z) if z == zone_id => {
                    for pod in self.topology.pods_by_zone(zone_id)? {
                        if !foreign_pods.contains(&pod.id) {
                            include_pods.insert(pod.id);
                        }
                    }
                    for cluster in self.topology.clusters_by_zone(zone_id)? {
                        if !foreign_clusters.contains(&cluster.id)
                            && !foreign_pods.contains(&cluster.pod_id)
                        {
                            include_clusters.insert(cluster.id);
                        }
                    }
                    for host in self.topology.hosts_by_zone(zone_id)? {
                        if !foreign_hosts.contains(&host.id)
                            && !foreign_clusters.contains(&host.cluster_id)
                            && !foreign_pods.contains(&host.pod_id)
                        {
                            include_hosts.insert(host.id);
                        }
                    }
                }
                DedicationLevel::Zone(_) => {}
                DedicationLevel::Pod(pod_id) => {
                    let Some(pod) = self.topology.pod(pod_id)? else {
                        continue;
                    };
                    if pod.zone_id != zone_id {
                        continue;
                    }
                    include_pods.insert(pod.id);
                    for cluster in self.topology.clusters_by_pod(pod_id)? {
                        if !foreign_clusters.contains(&cluster.id) {
                            include_clusters.insert(cluster.id);
                        }
                    }
                    for host in self.topology.hosts_by_pod(pod_id)? {
                        if !foreign_hosts.contains(&host.id)
                            && !foreign_clusters.contains(&host.cluster_id)
                        {
                            include_hosts.insert(host.id);
                        }
                    }
                }
                DedicationLevel::Cluster(cluster_id) => {
                    let Some(cluster) = self.topology.cluster(cluster_id)? else {
                        continue;
                    };
                    if cluster.zone_id != zone_id {
                        continue;
                    }
                    include_clusters.insert(cluster.id);
                    // Upward closure so the planner can descend; a
                    // foreign-dedicated ancestor stays avoided and the
                    // sub-resource stays unreachable.
                    if !foreign_pods.contains(&cluster.pod_id) {
                        include_pods.insert(cluster.pod_id);
                    }
                    for host in self.topology.hosts_by_cluster(cluster_id)? {
                        if !foreign_hosts.contains(&host.id) {
                            include_hosts.insert(host.id);
                        }
                    }
                }
                DedicationLevel::Host(host_id) => {
                    let Some(host) = self.topology.host(host_id)? else {
                        continue;
                    };
                    if host.zone_id != zone_id {
                        continue;
                    }
                    include_hosts.insert(host.id);
                    if !foreign_clusters.contains(&host.cluster_id) {
                        include_clusters.insert(host.cluster_id);
                    }
                    if !foreign_pods.contains(&host.pod_id) {
                        include_pods.insert(host.pod_id);
                    }
                }
            }
        }

        // Reconcile: everything under the zone lands in exactly one of
        // include (by absence) or avoid.
        for pod in self.topology.pods_by_zone(zone_id)? {
            if !include_pods.contains(&pod.id) {
                staged.avoid_pod(pod.id);
            }
        }
        for cluster in self.topology.clusters_by_zone(zone_id)? {
            if !include_clusters.contains(&cluster.id) {
                staged.avoid_cluster(cluster.id);
            }
        }
        for host in self.topology.hosts_by_zone(zone_id)? {
            if !include_hosts.contains(&host.id) {
                staged.avoid_host(host.id);
            }
        }
        debug!(
            %zone_id,
            include_pods = include_pods.len(),
            include_clusters = include_clusters.len(),
            include_hosts = include_hosts.len(),
            "open plan reconciled against dedications"
        );
        Ok(())
    }
}

fn host_level_ids(rows: &[DedicatedResource]) -> BTreeSet<&HostId> {
    rows.iter()
        .filter_map(|d| match &d.level {
            DedicationLevel::Host(h) => Some(h),
            _ => None,
        })
        .collect()
}

fn cluster_level_ids(rows: &[DedicatedResource]) -> BTreeSet<&ClusterId> {
    rows.iter()
        .filter_map(|d| match &d.level {
            DedicationLevel::Cluster(c) => Some(c),
            _ => None,
        })
        .collect()
}
