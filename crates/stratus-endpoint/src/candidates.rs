//! Scoped-candidate selection for primary storage operations.
//!
//! Given a storage pool and an optional topology scope, pick one eligible
//! host: among hosts that are `Up`, `Routing`, `Enabled`, and attached to
//! the pool, prefer any host not dedicated to a third party; break
//! remaining ties uniformly at random. Hosts dedicated to the calling
//! account (or a domain in its ancestor chain) count as ordinary
//! candidates.

use std::collections::BTreeSet;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use stratus_topology::{DedicationOwner, Host, HostId, Scope, TopologyResult, TopologyStore};

use crate::types::Caller;

/// Owners whose dedications are transparent to this caller: the caller's
/// account plus every domain in its ancestor chain.
pub(crate) fn exempt_owners(
    topology: &TopologyStore,
    caller: Option<&Caller>,
) -> TopologyResult<Vec<DedicationOwner>> {
    let Some(caller) = caller else {
        return Ok(Vec::new());
    };
    let mut owners = vec![DedicationOwner::Account(caller.account_id.clone())];
    if let Some(domain_id) = &caller.domain_id {
        for domain in topology.domain_chain(domain_id)? {
            owners.push(DedicationOwner::Domain(domain.id));
        }
    }
    Ok(owners)
}

/// Two-bucket ordering: candidates not dedicated to a third party are
/// shuffled first, third-party-dedicated candidates are shuffled second,
/// and the buckets are concatenated. Deterministic in structure, random
/// only within each bucket.
pub(crate) fn order_candidates<R: Rng>(
    candidates: Vec<Host>,
    deprioritized: &BTreeSet<HostId>,
    rng: &mut R,
) -> Vec<Host> {
    let (mut preferred, mut fallback): (Vec<Host>, Vec<Host>) = candidates
        .into_iter()
        .partition(|h| !deprioritized.contains(&h.id));
    preferred.shuffle(rng);
    fallback.shuffle(rng);
    preferred.extend(fallback);
    preferred
}

/// The scoped-candidate algorithm. Returns the chosen host, or `None` when
/// no eligible candidate exists.
pub(crate) fn pick_one<R: Rng>(
    topology: &TopologyStore,
    pool_id: &str,
    scope: Option<&Scope>,
    caller: Option<&Caller>,
    rng: &mut R,
) -> TopologyResult<Option<Host>> {
    let candidates = topology.candidate_hosts(pool_id, scope)?;
    if candidates.is_empty() {
        debug!(%pool_id, "no eligible hosts attached to pool");
        return Ok(None);
    }

    let exempt = exempt_owners(topology, caller)?;
    let deprioritized = topology.dedicated_host_ids(scope, &exempt)?;

    let ordered = order_candidates(candidates, &deprioritized, rng);
    Ok(ordered.into_iter().next())
}
