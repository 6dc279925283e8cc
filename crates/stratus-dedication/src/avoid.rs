//! Avoid-list accumulator consumed by the deployment planner.
//!
//! Strictly additive: once a topology element is added it is never
//! removed within a planning pass. The processor builds a local list and
//! merges it into the caller's accumulator only when processing succeeds,
//! so a conflict error leaves the caller's list untouched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stratus_topology::{ClusterId, HostId, PodId, ZoneId};

/// Topology elements a deployment planner must not choose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeList {
    zones: BTreeSet<ZoneId>,
    pods: BTreeSet<PodId>,
    clusters: BTreeSet<ClusterId>,
    hosts: BTreeSet<HostId>,
}

impl ExcludeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avoid_zone(&mut self, id: impl Into<ZoneId>) {
        self.zones.insert(id.into());
    }

    pub fn avoid_pod(&mut self, id: impl Into<PodId>) {
        self.pods.insert(id.into());
    }

    pub fn avoid_cluster(&mut self, id: impl Into<ClusterId>) {
        self.clusters.insert(id.into());
    }

    pub fn avoid_host(&mut self, id: impl Into<HostId>) {
        self.hosts.insert(id.into());
    }

    pub fn avoids_zone(&self, id: &str) -> bool {
        self.zones.contains(id)
    }

    pub fn avoids_pod(&self, id: &str) -> bool {
        self.pods.contains(id)
    }

    pub fn avoids_cluster(&self, id: &str) -> bool {
        self.clusters.contains(id)
    }

    pub fn avoids_host(&self, id: &str) -> bool {
        self.hosts.contains(id)
    }

    pub fn zones(&self) -> &BTreeSet<ZoneId> {
        &self.zones
    }

    pub fn pods(&self) -> &BTreeSet<PodId> {
        &self.pods
    }

    pub fn clusters(&self) -> &BTreeSet<ClusterId> {
        &self.clusters
    }

    pub fn hosts(&self) -> &BTreeSet<HostId> {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
            && self.pods.is_empty()
            && self.clusters.is_empty()
            && self.hosts.is_empty()
    }

    /// Fold another list into this one.
    pub fn merge(&mut self, other: ExcludeList) {
        self.zones.extend(other.zones);
        self.pods.extend(other.pods);
        self.clusters.extend(other.clusters);
        self.hosts.extend(other.hosts);
    }
}
