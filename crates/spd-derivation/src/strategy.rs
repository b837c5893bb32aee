//! Policy builders — one per derivation algorithm.

use chrono::{Duration, Utc};
use tracing::debug;

use spd_core::Algorithm;
use spd_state::{
    Configuration, CriticalInterval, PerformanceProfile, Policy, PolicyMetrics, PolicyStatus,
    ProcessedForecast, ServiceInfo, ServiceProfile, State, VmCatalogue, VmProfile, VmScale,
    new_object_id,
};

use crate::error::{DerivationError, DerivationResult};
use crate::sizer::{fit_on_type, replica_count, select_profile, select_vms};

/// Read-only inputs shared by every strategy in one derivation cycle.
#[derive(Debug, Clone, Default)]
pub struct DerivationContext {
    pub catalogue: VmCatalogue,
    /// What is running now, as reported by the scheduler.
    pub current_state: State,
    /// Demand percentage provisioned by the naive strategy.
    pub over_provision_percent: f64,
}

/// Builds a complete policy from the critical intervals of a forecast.
pub trait PolicyBuilder {
    fn algorithm(&self) -> Algorithm;

    fn build(
        &self,
        processed: &ProcessedForecast,
        service: &ServiceProfile,
        ctx: &DerivationContext,
    ) -> DerivationResult<Policy>;
}

// ── Shared assembly ───────────────────────────────────────────────

/// Replicas and VMs chosen for one interval.
struct Sizing {
    replicas: u32,
    vms: VmScale,
}

/// Walk the intervals in order, sizing each with `size`, and assemble the
/// policy. Consecutive intervals with an identical state collapse into one
/// configuration.
fn assemble<F>(
    algorithm: Algorithm,
    processed: &ProcessedForecast,
    service: &ServiceProfile,
    mut size: F,
) -> DerivationResult<Policy>
where
    F: FnMut(&CriticalInterval, &PerformanceProfile) -> DerivationResult<Sizing>,
{
    let started = Utc::now();
    let profile = select_profile(&service.performance_profiles).ok_or_else(|| {
        DerivationError::InfeasibleAllocation(format!(
            "service {} has no usable performance profile",
            service.name
        ))
    })?;

    let mut configurations: Vec<Configuration> = Vec::new();
    for interval in &processed.critical_intervals {
        let Sizing { replicas, vms } = size(interval, profile)?;
        let state = State {
            services: [(
                service.name.clone(),
                ServiceInfo {
                    scale: replicas,
                    cpu: profile.limit.cpu_cores,
                    memory: profile.limit.memory_gb,
                },
            )]
            .into(),
            vms,
        };

        if let Some(last) = configurations.last_mut()
            && last.state == state
        {
            last.time_end = interval.time_end;
            continue;
        }

        let copies = replicas / profile.replicas_per_copy;
        configurations.push(Configuration {
            state,
            time_start: interval.time_start,
            time_end: interval.time_end,
            transition_lead_secs: profile.boot_time_secs,
            time_start_transition: interval.time_start
                - Duration::milliseconds((profile.boot_time_secs * 1000.0).round() as i64),
            requests_capacity: copies as f64 * profile.trn,
        });
    }

    let finished = Utc::now();
    let policy = Policy {
        id: new_object_id(),
        algorithm,
        status: PolicyStatus::Discarded,
        metrics: PolicyMetrics {
            start_time_derivation: started,
            finish_time_derivation: finished,
            derivation_duration_secs: (finished - started).num_microseconds().unwrap_or(0) as f64
                / 1e6,
            number_configurations: configurations.len(),
            cost: 0.0,
        },
        window_start: configurations.first().map(|c| c.time_start),
        window_end: configurations.last().map(|c| c.time_end),
        configurations,
    };
    debug!(
        %algorithm,
        id = %policy.id,
        configurations = policy.configurations.len(),
        "policy built"
    );
    Ok(policy)
}

fn infeasible(service: &ServiceProfile, replicas: u32, interval: &CriticalInterval) -> DerivationError {
    DerivationError::InfeasibleAllocation(format!(
        "no VM type fits {replicas} replicas of {} at {}",
        service.name,
        interval.time_start.to_rfc3339()
    ))
}

/// Replicas for `requests`, with an unrepresentable count reported as
/// infeasible.
fn replicas_for(
    requests: f64,
    profile: &PerformanceProfile,
    service: &ServiceProfile,
    interval: &CriticalInterval,
) -> DerivationResult<u32> {
    replica_count(requests, profile).ok_or_else(|| {
        DerivationError::InfeasibleAllocation(format!(
            "{requests} requests of {} at {} need more replicas than can be counted",
            service.name,
            interval.time_start.to_rfc3339()
        ))
    })
}

// ── Naive ─────────────────────────────────────────────────────────

/// Over-provisions demand by a fixed factor and keeps the VM type that is
/// already running.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaivePolicy;

impl NaivePolicy {
    /// The running VM type with the most memory that the catalogue knows.
    fn current_vm_type<'a>(ctx: &'a DerivationContext) -> Option<&'a VmProfile> {
        ctx.current_state
            .vms
            .keys()
            .filter_map(|t| ctx.catalogue.get(t))
            .max_by(|a, b| a.memory_gb.total_cmp(&b.memory_gb))
    }
}

impl PolicyBuilder for NaivePolicy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Naive
    }

    fn build(
        &self,
        processed: &ProcessedForecast,
        service: &ServiceProfile,
        ctx: &DerivationContext,
    ) -> DerivationResult<Policy> {
        let factor = ctx.over_provision_percent / 100.0;
        let current = Self::current_vm_type(ctx);
        assemble(Algorithm::Naive, processed, service, |interval, profile| {
            let replicas = replicas_for(interval.requests * factor, profile, service, interval)?;
            let vms = current
                .and_then(|vm| fit_on_type(vm, replicas, &profile.limit))
                .unwrap_or_else(|| select_vms(&ctx.catalogue, replicas, &profile.limit));
            if vms.is_empty() {
                return Err(infeasible(service, replicas, interval));
            }
            Ok(Sizing { replicas, vms })
        })
    }
}

// ── Small-step repacking ──────────────────────────────────────────

/// Repacks every interval onto the cheapest single VM type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallStepRepack;

impl PolicyBuilder for SmallStepRepack {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SmallStepRepacking
    }

    fn build(
        &self,
        processed: &ProcessedForecast,
        service: &ServiceProfile,
        ctx: &DerivationContext,
    ) -> DerivationResult<Policy> {
        assemble(
            Algorithm::SmallStepRepacking,
            processed,
            service,
            |interval, profile| {
                let replicas = replicas_for(interval.requests, profile, service, interval)?;
                let vms = select_vms(&ctx.catalogue, replicas, &profile.limit);
                if vms.is_empty() {
                    return Err(infeasible(service, replicas, interval));
                }
                Ok(Sizing { replicas, vms })
            },
        )
    }
}

// ── Integer programming ───────────────────────────────────────────

/// Slot for an exact solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerProgramming;

impl PolicyBuilder for IntegerProgramming {
    fn algorithm(&self) -> Algorithm {
        Algorithm::IntegerProgramming
    }

    fn build(
        &self,
        _processed: &ProcessedForecast,
        _service: &ServiceProfile,
        _ctx: &DerivationContext,
    ) -> DerivationResult<Policy> {
        Err(DerivationError::UnimplementedStrategy(Algorithm::IntegerProgramming))
    }
}

// ── Selection ─────────────────────────────────────────────────────

/// A concrete strategy, one per non-aggregate [`Algorithm`].
#[derive(Debug, Clone, Copy)]
pub enum Strategy {
    Naive(NaivePolicy),
    SmallStep(SmallStepRepack),
    IntegerProgramming(IntegerProgramming),
}

impl Strategy {
    /// The strategies `algorithm` runs, in a fixed order.
    pub fn for_algorithm(algorithm: Algorithm) -> Vec<Strategy> {
        algorithm
            .strategies()
            .iter()
            .filter_map(|a| match a {
                Algorithm::Naive => Some(Strategy::Naive(NaivePolicy)),
                Algorithm::SmallStepRepacking => Some(Strategy::SmallStep(SmallStepRepack)),
                Algorithm::IntegerProgramming => {
                    Some(Strategy::IntegerProgramming(IntegerProgramming))
                }
                Algorithm::All => None,
            })
            .collect()
    }
}

impl PolicyBuilder for Strategy {
    fn algorithm(&self) -> Algorithm {
        match self {
            Self::Naive(s) => s.algorithm(),
            Self::SmallStep(s) => s.algorithm(),
            Self::IntegerProgramming(s) => s.algorithm(),
        }
    }

    fn build(
        &self,
        processed: &ProcessedForecast,
        service: &ServiceProfile,
        ctx: &DerivationContext,
    ) -> DerivationResult<Policy> {
        match self {
            Self::Naive(s) => s.build(processed, service, ctx),
            Self::SmallStep(s) => s.build(processed, service, ctx),
            Self::IntegerProgramming(s) => s.build(processed, service, ctx),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, TimeZone};
    use spd_state::Limit;

    use super::*;

    pub(crate) fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    pub(crate) fn interval(start: i64, end: i64, requests: f64) -> CriticalInterval {
        CriticalInterval {
            time_start: at(start),
            time_end: at(end),
            requests,
        }
    }

    pub(crate) fn processed(intervals: Vec<CriticalInterval>) -> ProcessedForecast {
        ProcessedForecast {
            need_to_scale: true,
            critical_intervals: intervals,
        }
    }

    /// One replica per copy, 100 requests per copy, 1 core / 1 GB, 30 s boot.
    pub(crate) fn service() -> ServiceProfile {
        ServiceProfile {
            name: "api".to_string(),
            performance_profiles: vec![PerformanceProfile {
                trn: 100.0,
                replicas_per_copy: 1,
                limit: Limit { cpu_cores: 1.0, memory_gb: 1.0 },
                boot_time_secs: 30.0,
            }],
        }
    }

    pub(crate) fn vm(vm_type: &str, capacity: f64, price: f64) -> VmProfile {
        VmProfile {
            vm_type: vm_type.to_string(),
            cpu_cores: capacity,
            memory_gb: capacity,
            price,
        }
    }

    pub(crate) fn context(vms: &[VmProfile]) -> DerivationContext {
        DerivationContext {
            catalogue: vms.iter().map(|v| (v.vm_type.clone(), v.clone())).collect(),
            current_state: State::default(),
            over_provision_percent: 100.0,
        }
    }

    #[test]
    fn end_to_end_sizing_scenario() {
        // 250 requests → 3 replicas. A (cap 2, 5/h) gets floor(3 / 2) = 1
        // instance, B (cap 4, 8/h) one instance. A is cheaper.
        let ctx = context(&[vm("A", 2.0, 5.0), vm("B", 4.0, 8.0)]);
        let policy = SmallStepRepack
            .build(&processed(vec![interval(0, 1, 250.0)]), &service(), &ctx)
            .unwrap();

        assert_eq!(policy.configurations.len(), 1);
        let state = &policy.configurations[0].state;
        assert_eq!(state.services["api"].scale, 3);
        assert_eq!(state.vms, VmScale::from([("A".to_string(), 1)]));
    }

    #[test]
    fn configurations_tile_the_intervals() {
        let ctx = context(&[vm("A", 2.0, 5.0)]);
        let intervals = vec![
            interval(0, 2, 150.0),
            interval(2, 3, 450.0),
            interval(3, 5, 90.0),
        ];
        let policy = SmallStepRepack
            .build(&processed(intervals), &service(), &ctx)
            .unwrap();

        let spans: Vec<_> = policy
            .configurations
            .iter()
            .map(|c| (c.time_start, c.time_end))
            .collect();
        assert_eq!(spans, vec![(at(0), at(2)), (at(2), at(3)), (at(3), at(5))]);
        assert_eq!(policy.window_start, Some(at(0)));
        assert_eq!(policy.window_end, Some(at(5)));
        assert_eq!(policy.metrics.number_configurations, 3);
        assert_eq!(policy.algorithm, Algorithm::SmallStepRepacking);
    }

    #[test]
    fn identical_consecutive_states_merge() {
        let ctx = context(&[vm("A", 2.0, 5.0)]);
        // 150 and 180 both need 2 replicas.
        let intervals = vec![interval(0, 1, 150.0), interval(1, 3, 180.0)];
        let policy = SmallStepRepack
            .build(&processed(intervals), &service(), &ctx)
            .unwrap();

        assert_eq!(policy.configurations.len(), 1);
        assert_eq!(policy.configurations[0].time_start, at(0));
        assert_eq!(policy.configurations[0].time_end, at(3));
    }

    #[test]
    fn transition_starts_boot_time_early() {
        let ctx = context(&[vm("A", 2.0, 5.0)]);
        let policy = SmallStepRepack
            .build(&processed(vec![interval(1, 2, 100.0)]), &service(), &ctx)
            .unwrap();

        let config = &policy.configurations[0];
        assert_eq!(config.transition_lead_secs, 30.0);
        assert_eq!(config.time_start_transition, at(1) - Duration::seconds(30));
        assert_eq!(config.requests_capacity, 100.0);
    }

    #[test]
    fn infeasible_when_no_vm_fits() {
        let ctx = context(&[vm("tiny", 0.5, 1.0)]);
        let err = SmallStepRepack
            .build(&processed(vec![interval(0, 1, 100.0)]), &service(), &ctx)
            .unwrap_err();
        assert!(matches!(err, DerivationError::InfeasibleAllocation(_)));
    }

    #[test]
    fn infeasible_without_profiles() {
        let mut svc = service();
        svc.performance_profiles.clear();
        let err = SmallStepRepack
            .build(&processed(vec![]), &svc, &context(&[vm("A", 2.0, 5.0)]))
            .unwrap_err();
        assert!(matches!(err, DerivationError::InfeasibleAllocation(_)));
    }

    #[test]
    fn no_intervals_yield_empty_policy() {
        let policy = SmallStepRepack
            .build(&processed(vec![]), &service(), &context(&[vm("A", 2.0, 5.0)]))
            .unwrap();
        assert!(policy.configurations.is_empty());
        assert_eq!(policy.window_start, None);
    }

    #[test]
    fn naive_stays_on_running_vm_type() {
        let mut ctx = context(&[vm("A", 2.0, 5.0), vm("B", 4.0, 50.0)]);
        ctx.current_state.vms = VmScale::from([("B".to_string(), 1)]);
        ctx.over_provision_percent = 150.0;

        // 300 × 1.5 = 450 → 5 replicas → ceil(5 / 4) = 2 × B.
        let policy = NaivePolicy
            .build(&processed(vec![interval(0, 1, 300.0)]), &service(), &ctx)
            .unwrap();

        let state = &policy.configurations[0].state;
        assert_eq!(state.services["api"].scale, 5);
        assert_eq!(state.vms, VmScale::from([("B".to_string(), 2)]));
        assert_eq!(policy.algorithm, Algorithm::Naive);
    }

    #[test]
    fn unrepresentable_demand_is_infeasible() {
        let ctx = context(&[vm("A", 2.0, 5.0)]);
        for builder in [Strategy::Naive(NaivePolicy), Strategy::SmallStep(SmallStepRepack)] {
            let err = builder
                .build(&processed(vec![interval(0, 1, 1.0e12)]), &service(), &ctx)
                .unwrap_err();
            assert!(matches!(err, DerivationError::InfeasibleAllocation(_)));
        }
    }

    #[test]
    fn naive_keeps_one_running_instance_without_demand() {
        let mut ctx = context(&[vm("A", 2.0, 5.0), vm("B", 4.0, 50.0)]);
        ctx.current_state.vms = VmScale::from([("B".to_string(), 3)]);

        let policy = NaivePolicy
            .build(
                &processed(vec![interval(0, 1, 300.0), interval(1, 2, 0.0)]),
                &service(),
                &ctx,
            )
            .unwrap();

        let idle = &policy.configurations[1].state;
        assert_eq!(idle.services["api"].scale, 0);
        assert_eq!(idle.vms, VmScale::from([("B".to_string(), 1)]));
    }

    #[test]
    fn naive_falls_back_to_cheapest_type() {
        let ctx = context(&[vm("A", 2.0, 5.0), vm("B", 4.0, 50.0)]);
        let policy = NaivePolicy
            .build(&processed(vec![interval(0, 1, 200.0)]), &service(), &ctx)
            .unwrap();
        assert_eq!(
            policy.configurations[0].state.vms,
            VmScale::from([("A".to_string(), 1)])
        );
    }

    #[test]
    fn integer_programming_is_unimplemented() {
        let err = IntegerProgramming
            .build(&processed(vec![]), &service(), &context(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            DerivationError::UnimplementedStrategy(Algorithm::IntegerProgramming)
        ));
    }

    #[test]
    fn all_expands_to_three_strategies() {
        let algorithms: Vec<_> = Strategy::for_algorithm(Algorithm::All)
            .iter()
            .map(|s| s.algorithm())
            .collect();
        assert_eq!(
            algorithms,
            vec![
                Algorithm::Naive,
                Algorithm::SmallStepRepacking,
                Algorithm::IntegerProgramming
            ]
        );
    }
}
