//! Replica and VM sizing.

use tracing::trace;

use spd_state::{Limit, PerformanceProfile, VmCatalogue, VmProfile, VmScale};

/// Replicas needed to serve `requests`: whole profile copies, each made of
/// `replicas_per_copy` replicas. Zero demand needs no replicas. `None` when
/// the count does not fit a `u32`.
pub fn replica_count(requests: f64, profile: &PerformanceProfile) -> Option<u32> {
    if requests <= 0.0 || profile.trn <= 0.0 {
        return Some(0);
    }
    let copies = (requests / profile.trn).ceil();
    if copies > u32::MAX as f64 {
        return None;
    }
    (copies as u32).max(1).checked_mul(profile.replicas_per_copy)
}

/// How many replicas with `limit` fit on one VM, bounded by both CPU and
/// memory.
pub fn max_replicas_in_vm(vm: &VmProfile, limit: &Limit) -> u32 {
    let by_cpu = vm.cpu_cores / limit.cpu_cores;
    let by_memory = vm.memory_gb / limit.memory_gb;
    let fit = by_cpu.min(by_memory).floor();
    if fit.is_finite() && fit > 0.0 { fit as u32 } else { 0 }
}

/// Instances of one VM type for `replicas` under the greedy floor rule.
fn instances_for(capacity: u32, replicas: u32) -> u32 {
    if capacity > replicas { 1 } else { replicas / capacity }
}

/// Cheapest single-type allocation for `replicas`.
///
/// Every type that fits at least one replica is a candidate; the one with
/// the lowest `price × instances` wins, ties going to the first type by name.
/// Returns an empty scale when no type fits a replica.
pub fn select_vms(catalogue: &VmCatalogue, replicas: u32, limit: &Limit) -> VmScale {
    let mut best: Option<(&str, u32, f64)> = None;
    for (vm_type, vm) in catalogue {
        let capacity = max_replicas_in_vm(vm, limit);
        if capacity == 0 {
            continue;
        }
        let instances = instances_for(capacity, replicas);
        let cost = vm.price * instances as f64;
        trace!(%vm_type, capacity, instances, cost, "vm candidate");
        if best.is_none_or(|(_, _, c)| cost < c) {
            best = Some((vm_type, instances, cost));
        }
    }
    best.map(|(vm_type, instances, _)| VmScale::from([(vm_type.to_string(), instances)]))
        .unwrap_or_default()
}

/// Homogeneous allocation on one given VM type: enough instances to host
/// every replica, and never fewer than one (the same floor `select_vms`
/// keeps). `None` when the type cannot host a single replica.
pub fn fit_on_type(vm: &VmProfile, replicas: u32, limit: &Limit) -> Option<VmScale> {
    let capacity = max_replicas_in_vm(vm, limit);
    if capacity == 0 {
        return None;
    }
    let instances = replicas.div_ceil(capacity).max(1);
    Some(VmScale::from([(vm.vm_type.clone(), instances)]))
}

/// The profile used to size a service: highest throughput per replica,
/// ties going to the smaller CPU limit. Profiles without throughput,
/// replicas or resource limits are skipped.
pub fn select_profile(profiles: &[PerformanceProfile]) -> Option<&PerformanceProfile> {
    profiles
        .iter()
        .filter(|p| {
            p.trn > 0.0
                && p.replicas_per_copy > 0
                && p.limit.cpu_cores > 0.0
                && p.limit.memory_gb > 0.0
        })
        .min_by(|a, b| {
            let per_replica = |p: &PerformanceProfile| p.trn / p.replicas_per_copy as f64;
            per_replica(b)
                .total_cmp(&per_replica(a))
                .then(a.limit.cpu_cores.total_cmp(&b.limit.cpu_cores))
        })
}
