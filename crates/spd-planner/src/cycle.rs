//! Planner — the derivation cycle and its timer loop.
//!
//! A cycle that fails after the forecast was reconciled reverts the
//! forecast record, so the next trigger derives again instead of reporting
//! an unchanged forecast. The winning policy is stored as `Pending` and only
//! becomes `Selected` once the scheduler accepted it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use spd_core::{PriceModel, SystemConfiguration};
use spd_derivation::{DerivationContext, PolicyDispatcher, PolicyEvaluator};
use spd_forecast::{ForecastReconciler, Reconciliation, WindowDerivation, WindowStrategy};
use spd_state::{Policy, PolicyStatus, ProfileCatalogue, State, StateStore, new_object_id};

use spd_clients::{BoxFuture, ClientResult, PlanningSources};

use crate::error::{CycleError, CycleResult};

/// How a successful cycle ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// A policy was selected, stored and handed to the scheduler.
    Scheduled(Policy),
    /// The forecast carries no demand.
    NoScalingNeeded,
    /// The forecast did not change enough to derive again. Carries the most
    /// recently selected policy, if one exists.
    ForecastUnchanged(Option<Policy>),
}

pub struct Planner {
    config: SystemConfiguration,
    store: StateStore,
    sources: Arc<dyn PlanningSources>,
    reconciler: Arc<ForecastReconciler>,
    windows: WindowStrategy,
    evaluator: PolicyEvaluator,
}

impl Planner {
    pub fn new(
        config: SystemConfiguration,
        prices: Arc<PriceModel>,
        store: StateStore,
        sources: Arc<dyn PlanningSources>,
    ) -> Self {
        let reconciler = ForecastReconciler::new(store.clone(), config.derivation.rmse_threshold);
        let windows =
            WindowStrategy::from_settings(&config.derivation, config.forecasting.granularity);
        Self {
            reconciler: Arc::new(reconciler),
            windows,
            evaluator: PolicyEvaluator::new(prices),
            config,
            store,
            sources,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one derivation cycle end to end.
    pub async fn run_cycle(&self) -> CycleResult<CycleOutcome> {
        let catalogue = self
            .sources
            .performance_profiles()
            .await
            .map_err(|e| CycleError::fetch("performance profiles", e))?;
        let catalogue = self.persist_profiles(catalogue)?;
        if catalogue.service.name != self.config.main_service_name {
            warn!(
                configured = %self.config.main_service_name,
                profiled = %catalogue.service.name,
                "profile catalogue describes a different service"
            );
        }

        let forecast = self
            .sources
            .forecast()
            .await
            .map_err(|e| CycleError::fetch("forecast", e))?;
        let reconciliation = self.reconciler.reconcile(forecast).await?;
        if !reconciliation.needs_derivation() {
            info!("forecast unchanged, no derivation needed");
            return Ok(CycleOutcome::ForecastUnchanged(self.latest_selected()?));
        }

        let policy = match self.derive(&catalogue, &reconciliation).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return Ok(CycleOutcome::NoScalingNeeded),
            Err(e) => {
                revert(&self.reconciler, &reconciliation).await;
                return Err(e);
            }
        };

        let policy = self.hand_over(policy, reconciliation).await?;
        info!(
            id = %policy.id,
            algorithm = %policy.algorithm,
            cost = policy.metrics.cost,
            "derivation cycle complete"
        );
        Ok(CycleOutcome::Scheduled(policy))
    }

    /// Derive, evaluate and store the winning policy as `Pending`. `None`
    /// when the forecast carries no demand.
    async fn derive(
        &self,
        catalogue: &ProfileCatalogue,
        reconciliation: &Reconciliation,
    ) -> CycleResult<Option<Policy>> {
        let processed = self.windows.derive(&reconciliation.effective);
        if !processed.need_to_scale {
            info!("no demand in forecast window, nothing to scale");
            return Ok(None);
        }
        debug!(
            intervals = processed.critical_intervals.len(),
            conflict_time = ?reconciliation.conflict_time,
            "critical intervals derived"
        );

        let current_state = match self.sources.current_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "current state unavailable, deriving from scratch");
                State::default()
            }
        };
        let ctx = DerivationContext {
            catalogue: catalogue.vm_catalogue(),
            current_state,
            over_provision_percent: self.config.derivation.over_provision_percent,
        };

        let candidates = PolicyDispatcher::dispatch(
            &processed,
            &catalogue.service,
            &ctx,
            self.config.preferred_algorithm,
        )?;
        let mut policy = self.evaluator.select_policy(candidates)?;
        policy.status = PolicyStatus::Pending;
        self.store.insert(&policy)?;
        Ok(Some(policy))
    }

    /// Push `policy` to the scheduler and settle its status. The push and the
    /// bookkeeping after it run in their own task, so they complete even if
    /// this cycle's caller goes away.
    async fn hand_over(
        &self,
        policy: Policy,
        reconciliation: Reconciliation,
    ) -> CycleResult<Policy> {
        let push = self.sources.trigger_scheduler(policy.clone());
        let task = tokio::spawn(settle(
            push,
            self.store.clone(),
            self.reconciler.clone(),
            reconciliation,
            policy,
        ));
        task.await.map_err(|e| CycleError::Fetch {
            stage: "scheduler",
            endpoint: self.config.scheduler.endpoint.clone(),
            reason: e.to_string(),
        })?
    }

    /// Keep a single profile record: the first fetch is inserted, later
    /// fetches replace it under the same id.
    fn persist_profiles(&self, mut catalogue: ProfileCatalogue) -> CycleResult<ProfileCatalogue> {
        match self.store.find_all::<ProfileCatalogue>()?.into_iter().next() {
            Some(existing) => {
                catalogue.id = existing.id;
                self.store.update(&catalogue.id, &catalogue)?;
            }
            None => {
                catalogue.id = new_object_id();
                self.store.insert(&catalogue)?;
            }
        }
        Ok(catalogue)
    }

    /// The selected policy derived most recently.
    pub fn latest_selected(&self) -> CycleResult<Option<Policy>> {
        Ok(self
            .store
            .find_all::<Policy>()?
            .into_iter()
            .filter(|p| p.status == PolicyStatus::Selected)
            .max_by_key(|p| p.metrics.finish_time_derivation))
    }

    /// Run derivation cycles every `interval` until `shutdown` changes.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "derivation loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_cycle().await {
                        Ok(CycleOutcome::Scheduled(policy)) => {
                            info!(id = %policy.id, "scheduled policy from timer");
                        }
                        Ok(_) => debug!("timer cycle finished without a new policy"),
                        Err(e) => error!(stage = e.stage(), error = %e, "derivation cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("derivation loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Await the scheduler's answer. Accepted policies become `Selected`; a
/// rejected one stays `Pending` and its forecast is reverted.
async fn settle(
    push: BoxFuture<'static, ClientResult<usize>>,
    store: StateStore,
    reconciler: Arc<ForecastReconciler>,
    reconciliation: Reconciliation,
    mut policy: Policy,
) -> CycleResult<Policy> {
    match push.await {
        Ok(states) => {
            policy.status = PolicyStatus::Selected;
            store.update(&policy.id, &policy)?;
            debug!(id = %policy.id, states, "scheduler accepted policy");
            Ok(policy)
        }
        Err(e) => {
            warn!(id = %policy.id, error = %e, "scheduler rejected policy");
            revert(&reconciler, &reconciliation).await;
            Err(CycleError::fetch("scheduler", e))
        }
    }
}

/// Put the forecast back the way it was before a failed cycle.
async fn revert(reconciler: &ForecastReconciler, reconciliation: &Reconciliation) {
    if let Err(e) = reconciler.revert(reconciliation).await {
        error!(error = %e, "failed to revert forecast after a failed cycle");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use spd_clients::ClientError;
    use spd_core::{Algorithm, BillingUnit};
    use spd_state::{
        Forecast, ForecastPoint, Limit, PerformanceProfile, ServiceProfile, VmProfile, VmScale,
    };

    use super::*;

    #[derive(Default)]
    struct MockSources {
        forecast: Mutex<Vec<f64>>,
        vm_profiles: Vec<VmProfile>,
        running: Option<State>,
        profiles_down: bool,
        pushed: Arc<Mutex<Vec<Policy>>>,
        /// Pushes still to reject.
        fail_pushes: AtomicUsize,
        push_delay: Option<Duration>,
        push_panics: bool,
    }

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(hour)
    }

    fn vm(vm_type: &str, capacity: f64, price: f64) -> VmProfile {
        VmProfile {
            vm_type: vm_type.to_string(),
            cpu_cores: capacity,
            memory_gb: capacity,
            price,
        }
    }

    impl PlanningSources for MockSources {
        fn performance_profiles(&self) -> BoxFuture<'_, ClientResult<ProfileCatalogue>> {
            Box::pin(async move {
                if self.profiles_down {
                    return Err(ClientError::Timeout {
                        endpoint: "http://profiles".to_string(),
                    });
                }
                Ok(ProfileCatalogue {
                    id: String::new(),
                    service: ServiceProfile {
                        name: "api".to_string(),
                        performance_profiles: vec![PerformanceProfile {
                            trn: 100.0,
                            replicas_per_copy: 1,
                            limit: Limit { cpu_cores: 1.0, memory_gb: 1.0 },
                            boot_time_secs: 10.0,
                        }],
                    },
                    vm_profiles: self.vm_profiles.clone(),
                })
            })
        }

        fn forecast(&self) -> BoxFuture<'_, ClientResult<Forecast>> {
            Box::pin(async move {
                let values = self.forecast.lock().unwrap().clone();
                Ok(Forecast {
                    id: String::new(),
                    window_start: at(0),
                    points: values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| ForecastPoint {
                            timestamp: at(i as i64),
                            requests: *v,
                        })
                        .collect(),
                })
            })
        }

        fn current_state(&self) -> BoxFuture<'_, ClientResult<State>> {
            Box::pin(async move {
                self.running.clone().ok_or_else(|| ClientError::Status {
                    endpoint: "http://scheduler/current-state".to_string(),
                    status: 503,
                })
            })
        }

        fn trigger_scheduler(&self, policy: Policy) -> BoxFuture<'static, ClientResult<usize>> {
            let pushed = self.pushed.clone();
            let reject = self
                .fail_pushes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let delay = self.push_delay;
            let panics = self.push_panics;
            Box::pin(async move {
                if panics {
                    panic!("scheduler client crashed");
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if reject {
                    return Err(ClientError::Status {
                        endpoint: "http://scheduler/api/states".to_string(),
                        status: 500,
                    });
                }
                let n = policy.configurations.len();
                pushed.lock().unwrap().push(policy);
                Ok(n)
            })
        }
    }

    fn config(algorithm: &str) -> SystemConfiguration {
        SystemConfiguration::from_toml_str(
            &format!(
                r#"
main_service_name = "api"
preferred_algorithm = "{algorithm}"
[forecasting]
endpoint = "http://forecast"
[performance_profiles]
endpoint = "http://profiles"
[scheduler]
endpoint = "http://scheduler"
"#
            ),
            "inline",
        )
        .unwrap()
    }

    fn prices() -> Arc<PriceModel> {
        Arc::new(PriceModel {
            billing_unit: BillingUnit::Hour,
            prices: BTreeMap::from([("A".to_string(), 5.0), ("B".to_string(), 8.0)]),
        })
    }

    fn planner(algorithm: &str, sources: MockSources) -> (Planner, Arc<Mutex<Vec<Policy>>>) {
        let pushed = sources.pushed.clone();
        let planner = Planner::new(
            config(algorithm),
            prices(),
            StateStore::open_in_memory().unwrap(),
            Arc::new(sources),
        );
        (planner, pushed)
    }

    fn catalogue_sources(values: &[f64]) -> MockSources {
        MockSources {
            forecast: Mutex::new(values.to_vec()),
            vm_profiles: vec![vm("A", 2.0, 5.0), vm("B", 4.0, 8.0)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cycle_schedules_cheapest_policy() {
        let (planner, pushed) = planner("all", catalogue_sources(&[250.0, 260.0]));

        let outcome = planner.run_cycle().await.unwrap();
        let CycleOutcome::Scheduled(policy) = outcome else {
            panic!("expected a scheduled policy, got {outcome:?}");
        };

        assert_eq!(policy.status, PolicyStatus::Selected);
        assert_eq!(policy.configurations.len(), 1);
        assert_eq!(policy.configurations[0].state.vms, VmScale::from([("A".to_string(), 1)]));
        // 2 hours of one A at 5/h.
        assert_eq!(policy.metrics.cost, 10.0);

        assert_eq!(pushed.lock().unwrap().len(), 1);
        let stored: Vec<Policy> = planner.store().find_all().unwrap();
        assert_eq!(stored, vec![policy]);
    }

    #[tokio::test]
    async fn unchanged_forecast_returns_previous_policy() {
        let (planner, pushed) = planner("small-step-repacking", catalogue_sources(&[100.0]));
        let first = planner.run_cycle().await.unwrap();
        let CycleOutcome::Scheduled(first) = first else {
            panic!("expected a scheduled policy");
        };

        let second = planner.run_cycle().await.unwrap();
        assert!(matches!(
            second,
            CycleOutcome::ForecastUnchanged(Some(ref p)) if p.id == first.id
        ));
        assert_eq!(pushed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_forecast_derives_from_conflict_point() {
        let sources = catalogue_sources(&[100.0, 100.0, 100.0]);
        let (planner, _) = planner("small-step-repacking", sources);
        planner.run_cycle().await.unwrap();

        // Same store and reconciler, new forecast.
        let mock = MockSources {
            forecast: Mutex::new(vec![100.0, 900.0, 100.0]),
            vm_profiles: vec![vm("A", 2.0, 5.0)],
            ..Default::default()
        };
        let planner = Planner {
            sources: Arc::new(mock),
            ..planner
        };

        let CycleOutcome::Scheduled(policy) = planner.run_cycle().await.unwrap() else {
            panic!("expected a scheduled policy");
        };
        assert_eq!(policy.window_start, Some(at(1)));
        assert_eq!(policy.window_end, Some(at(3)));
    }

    #[tokio::test]
    async fn zero_demand_needs_no_scaling() {
        let (planner, pushed) = planner("naive", catalogue_sources(&[0.0, 0.0]));
        assert!(matches!(
            planner.run_cycle().await.unwrap(),
            CycleOutcome::NoScalingNeeded
        ));
        assert!(pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_profiles_fail_the_cycle() {
        let sources = MockSources {
            profiles_down: true,
            ..catalogue_sources(&[100.0])
        };
        let (planner, _) = planner("naive", sources);

        let err = planner.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch { stage: "performance profiles", .. }));
        assert_eq!(err.stage(), "performance profiles");
    }

    #[tokio::test]
    async fn infeasible_catalogue_fails_the_cycle() {
        let sources = MockSources {
            vm_profiles: vec![vm("A", 0.5, 5.0)],
            ..catalogue_sources(&[100.0])
        };
        let (planner, _) = planner("small-step-repacking", sources);

        let err = planner.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::InfeasibleAllocation(_)));
        assert!(planner.store().find_all::<Policy>().unwrap().is_empty());
        assert!(planner.store().find_all::<Forecast>().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_derivation_is_retried_on_next_trigger() {
        let sources = MockSources {
            vm_profiles: vec![vm("A", 0.5, 5.0)],
            ..catalogue_sources(&[100.0])
        };
        let (planner, _) = planner("small-step-repacking", sources);
        assert!(planner.run_cycle().await.is_err());

        // Same forecast, but the catalogue now has a type that fits.
        let planner = Planner {
            sources: Arc::new(catalogue_sources(&[100.0])),
            ..planner
        };
        let outcome = planner.run_cycle().await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Scheduled(_)), "got {outcome:?}");
    }

    #[tokio::test]
    async fn rejected_push_leaves_policy_pending() {
        let sources = MockSources {
            fail_pushes: AtomicUsize::new(1),
            ..catalogue_sources(&[250.0, 260.0])
        };
        let (planner, pushed) = planner("all", sources);

        let err = planner.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Fetch { stage: "scheduler", .. }));
        assert!(pushed.lock().unwrap().is_empty());
        assert!(planner.latest_selected().unwrap().is_none());
        let stored: Vec<Policy> = planner.store().find_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, PolicyStatus::Pending);
        assert!(planner.store().find_all::<Forecast>().unwrap().is_empty());

        // The same forecast is derived and pushed again.
        let CycleOutcome::Scheduled(policy) = planner.run_cycle().await.unwrap() else {
            panic!("expected a scheduled policy");
        };
        assert_eq!(pushed.lock().unwrap().len(), 1);
        assert_eq!(planner.latest_selected().unwrap(), Some(policy));
    }

    #[tokio::test]
    async fn crashed_push_reports_scheduler_endpoint() {
        let sources = MockSources {
            push_panics: true,
            ..catalogue_sources(&[100.0])
        };
        let (planner, _) = planner("small-step-repacking", sources);

        let err = planner.run_cycle().await.unwrap_err();
        let CycleError::Fetch { stage, endpoint, .. } = err else {
            panic!("expected a fetch error, got {err:?}");
        };
        assert_eq!(stage, "scheduler");
        assert_eq!(endpoint, "http://scheduler");
    }

    #[tokio::test]
    async fn push_completes_after_caller_gives_up() {
        let sources = MockSources {
            push_delay: Some(Duration::from_millis(300)),
            ..catalogue_sources(&[100.0])
        };
        let (planner, pushed) = planner("small-step-repacking", sources);

        let cycle = tokio::time::timeout(Duration::from_millis(100), planner.run_cycle()).await;
        assert!(cycle.is_err(), "cycle finished before the push did");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(pushed.lock().unwrap().len(), 1);
        let latest = planner.latest_selected().unwrap().expect("selected policy");
        assert_eq!(latest.status, PolicyStatus::Selected);
    }

    #[tokio::test]
    async fn integer_programming_is_reported_unimplemented() {
        let (planner, _) = planner("integer-programming", catalogue_sources(&[100.0]));
        let err = planner.run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::UnimplementedStrategy(Algorithm::IntegerProgramming)
        ));
    }

    #[tokio::test]
    async fn unpriced_vm_type_fails_evaluation() {
        let sources = MockSources {
            vm_profiles: vec![vm("C", 2.0, 1.0)],
            ..catalogue_sources(&[100.0])
        };
        let (planner, _) = planner("naive", sources);
        let err = planner.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::UnknownVmType(ref t) if t == "C"));
    }

    #[tokio::test]
    async fn unpriced_strategy_is_dropped_under_all() {
        // Naive stays on the running C, which has no price. Small step
        // repacks onto A.
        let sources = MockSources {
            vm_profiles: vec![vm("A", 2.0, 5.0), vm("C", 4.0, 100.0)],
            running: Some(State {
                services: BTreeMap::new(),
                vms: VmScale::from([("C".to_string(), 1)]),
            }),
            ..catalogue_sources(&[250.0, 260.0])
        };
        let (planner, _) = planner("all", sources);

        let CycleOutcome::Scheduled(policy) = planner.run_cycle().await.unwrap() else {
            panic!("expected a scheduled policy");
        };
        assert_eq!(policy.algorithm, Algorithm::SmallStepRepacking);
        assert_eq!(policy.configurations[0].state.vms, VmScale::from([("A".to_string(), 1)]));
    }

    #[tokio::test]
    async fn naive_uses_running_vm_type() {
        let sources = MockSources {
            running: Some(State {
                services: BTreeMap::new(),
                vms: VmScale::from([("B".to_string(), 1)]),
            }),
            ..catalogue_sources(&[500.0])
        };
        let (planner, _) = planner("naive", sources);

        let CycleOutcome::Scheduled(policy) = planner.run_cycle().await.unwrap() else {
            panic!("expected a scheduled policy");
        };
        // 5 replicas on B (capacity 4) → 2 instances.
        assert_eq!(policy.configurations[0].state.vms, VmScale::from([("B".to_string(), 2)]));
    }

    #[tokio::test]
    async fn profiles_are_kept_as_one_record() {
        let (planner, _) = planner("naive", catalogue_sources(&[0.0]));
        planner.run_cycle().await.unwrap();
        planner.run_cycle().await.unwrap();

        let catalogues: Vec<ProfileCatalogue> = planner.store().find_all().unwrap();
        assert_eq!(catalogues.len(), 1);
        assert!(!catalogues[0].id.is_empty());
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let (planner, _) = planner("naive", catalogue_sources(&[0.0]));
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(Arc::new(planner).run(Duration::from_secs(3600), rx));
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
