//! The seam between the planner and the outside world.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use spd_core::SystemConfiguration;
use spd_state::{Forecast, Policy, ProfileCatalogue, State};

use crate::error::ClientResult;
use crate::schedule::StateToSchedule;
use crate::transport::{get_json, post_json};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything a derivation cycle fetches from, or pushes to, other
/// components.
pub trait PlanningSources: Send + Sync {
    fn performance_profiles(&self) -> BoxFuture<'_, ClientResult<ProfileCatalogue>>;

    fn forecast(&self) -> BoxFuture<'_, ClientResult<Forecast>>;

    /// The state currently running, as the scheduler sees it.
    fn current_state(&self) -> BoxFuture<'_, ClientResult<State>>;

    /// Hand every configuration of `policy` to the scheduler. Returns the
    /// number of states pushed. The future owns its inputs so it can outlive
    /// the caller.
    fn trigger_scheduler(&self, policy: Policy) -> BoxFuture<'static, ClientResult<usize>>;
}

/// [`PlanningSources`] over HTTP, addressed by the configured endpoints.
#[derive(Debug, Clone)]
pub struct HttpSources {
    profiles_endpoint: String,
    profiles_timeout: Duration,
    forecast_endpoint: String,
    forecast_timeout: Duration,
    scheduler_endpoint: String,
    scheduler_timeout: Duration,
}

impl HttpSources {
    pub fn new(config: &SystemConfiguration) -> Self {
        Self {
            profiles_endpoint: config.performance_profiles.endpoint.clone(),
            profiles_timeout: Duration::from_secs(config.performance_profiles.timeout_secs),
            forecast_endpoint: config.forecasting.endpoint.clone(),
            forecast_timeout: Duration::from_secs(config.forecasting.timeout_secs),
            scheduler_endpoint: config.scheduler.endpoint.trim_end_matches('/').to_string(),
            scheduler_timeout: Duration::from_secs(config.scheduler.timeout_secs),
        }
    }
}

impl PlanningSources for HttpSources {
    fn performance_profiles(&self) -> BoxFuture<'_, ClientResult<ProfileCatalogue>> {
        Box::pin(async move {
            let catalogue: ProfileCatalogue =
                get_json(&self.profiles_endpoint, self.profiles_timeout).await?;
            debug!(
                service = %catalogue.service.name,
                vm_types = catalogue.vm_profiles.len(),
                "performance profiles fetched"
            );
            Ok(catalogue)
        })
    }

    fn forecast(&self) -> BoxFuture<'_, ClientResult<Forecast>> {
        Box::pin(async move {
            let forecast: Forecast =
                get_json(&self.forecast_endpoint, self.forecast_timeout).await?;
            debug!(points = forecast.points.len(), "forecast fetched");
            Ok(forecast)
        })
    }

    fn current_state(&self) -> BoxFuture<'_, ClientResult<State>> {
        Box::pin(async move {
            let url = format!("{}/current-state", self.scheduler_endpoint);
            get_json(&url, self.scheduler_timeout).await
        })
    }

    fn trigger_scheduler(&self, policy: Policy) -> BoxFuture<'static, ClientResult<usize>> {
        let url = format!("{}/api/states", self.scheduler_endpoint);
        let timeout = self.scheduler_timeout;
        Box::pin(async move {
            for config in &policy.configurations {
                let payload = StateToSchedule::from_configuration(config);
                post_json(&url, &payload, timeout).await?;
                debug!(name = %payload.name, launch_time = %payload.launch_time, "state pushed");
            }
            info!(
                policy = %policy.id,
                states = policy.configurations.len(),
                "policy handed to scheduler"
            );
            Ok(policy.configurations.len())
        })
    }
}
