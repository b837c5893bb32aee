//! Domain types for SPD.
//!
//! Forecasts, performance profiles and policies are persisted as JSON
//! documents; the remaining types travel inside them or over the wire to the
//! forecasting, profiling and scheduler components.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use spd_core::Algorithm;

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a fresh 12-byte, hex-encoded document identifier
/// (4 bytes of seconds, 5 random bytes, 3 bytes of a process counter).
pub fn new_object_id() -> String {
    let now = Utc::now();
    let mut buf = [0u8; 12];
    buf[..4].copy_from_slice(&(now.timestamp() as u32).to_be_bytes());
    if getrandom::getrandom(&mut buf[4..9]).is_err() {
        buf[4..8].copy_from_slice(&now.timestamp_subsec_nanos().to_be_bytes());
    }
    let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    buf[9..].copy_from_slice(&count.to_be_bytes()[1..]);
    hex::encode(buf)
}

// ── Forecast ───────────────────────────────────────────────────────

/// One predicted demand sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Predicted request count for the sample period.
    pub requests: f64,
}

/// Predicted request demand over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub id: String,
    pub window_start: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Check that points are strictly time-ascending (and therefore unique
    /// per timestamp) and carry finite, non-negative demand.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.points.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(format!(
                    "forecast points out of order at {}",
                    pair[1].timestamp.to_rfc3339()
                ));
            }
        }
        if let Some(p) = self
            .points
            .iter()
            .find(|p| !p.requests.is_finite() || p.requests < 0.0)
        {
            return Err(format!(
                "invalid request count {} at {}",
                p.requests,
                p.timestamp.to_rfc3339()
            ));
        }
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.requests)
    }
}

/// A span of the horizon served by one demand level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalInterval {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Representative request count for the whole span.
    pub requests: f64,
}

/// Output of a window derivation strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedForecast {
    pub need_to_scale: bool,
    pub critical_intervals: Vec<CriticalInterval>,
}

// ── Profiles ───────────────────────────────────────────────────────

/// Resource limit of one service replica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub cpu_cores: f64,
    pub memory_gb: f64,
}

/// Throughput and resource characteristics of one deployable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceProfile {
    /// Requests one profile copy can serve (throughput of the replica set).
    pub trn: f64,
    /// Replicas that make up one profile copy.
    pub replicas_per_copy: u32,
    pub limit: Limit,
    #[serde(default)]
    pub boot_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub name: String,
    pub performance_profiles: Vec<PerformanceProfile>,
}

/// A virtual machine type and its hourly price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmProfile {
    #[serde(rename = "type")]
    pub vm_type: String,
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub price: f64,
}

/// VM catalogue keyed by type name. Ordered so that ties resolve the same
/// way on every run.
pub type VmCatalogue = BTreeMap<String, VmProfile>;

/// Document returned by the performance-profile source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCatalogue {
    #[serde(default)]
    pub id: String,
    pub service: ServiceProfile,
    pub vm_profiles: Vec<VmProfile>,
}

impl ProfileCatalogue {
    /// Index the VM profiles by type. Later duplicates replace earlier ones.
    pub fn vm_catalogue(&self) -> VmCatalogue {
        self.vm_profiles
            .iter()
            .map(|vm| (vm.vm_type.clone(), vm.clone()))
            .collect()
    }
}

// ── Policies ───────────────────────────────────────────────────────

/// VM type → number of instances.
pub type VmScale = BTreeMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Number of identical replicas.
    pub scale: u32,
    /// CPU cores per replica.
    pub cpu: f64,
    /// Memory (GB) per replica.
    pub memory: f64,
}

/// Infrastructure state: service replicas and the VMs hosting them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceInfo>,
    #[serde(default)]
    pub vms: VmScale,
}

/// One state valid over `[time_start, time_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub state: State,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Seconds needed to boot the state before `time_start`.
    pub transition_lead_secs: f64,
    /// When the scheduler should begin provisioning.
    pub time_start_transition: DateTime<Utc>,
    /// Requests the state can serve.
    pub requests_capacity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    #[default]
    Discarded,
    /// Chosen by the evaluator but not yet accepted by the scheduler.
    Pending,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetrics {
    pub start_time_derivation: DateTime<Utc>,
    pub finish_time_derivation: DateTime<Utc>,
    pub derivation_duration_secs: f64,
    pub number_configurations: usize,
    /// Total cost under the active price model. Set by the evaluator.
    #[serde(default)]
    pub cost: f64,
}

/// A complete time-ordered scaling plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub status: PolicyStatus,
    pub configurations: Vec<Configuration>,
    pub metrics: PolicyMetrics,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}
