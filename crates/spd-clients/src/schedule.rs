//! Payload pushed to the scheduler for each configuration of a policy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use spd_state::{Configuration, ServiceInfo, State, VmScale};

/// One state the scheduler should bring up at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateToSchedule {
    /// Content hash of the state, so the scheduler can recognise repeats.
    pub name: String,
    /// When provisioning starts (ahead of `expected_start` by the boot time).
    pub launch_time: DateTime<Utc>,
    /// When the state must be serving.
    pub expected_start: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceInfo>,
    pub vms: VmScale,
}

impl StateToSchedule {
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            name: state_hash(&config.state),
            launch_time: config.time_start_transition,
            expected_start: config.time_start,
            services: config.state.services.clone(),
            vms: config.state.vms.clone(),
        }
    }
}

/// Hex SHA-256 of the state's canonical JSON. Maps are ordered, so equal
/// states hash equally.
fn state_hash(state: &State) -> String {
    let mut hasher = Sha256::new();
    // Serializing ordered maps of numbers and strings cannot fail.
    if let Ok(bytes) = serde_json::to_vec(state) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn config(vms: u32, start_hour: i64) -> Configuration {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + Duration::hours(start_hour);
        Configuration {
            state: State {
                services: BTreeMap::from([(
                    "api".to_string(),
                    ServiceInfo { scale: 2, cpu: 1.0, memory: 1.0 },
                )]),
                vms: VmScale::from([("t2.large".to_string(), vms)]),
            },
            time_start: start,
            time_end: start + Duration::hours(1),
            transition_lead_secs: 60.0,
            time_start_transition: start - Duration::seconds(60),
            requests_capacity: 200.0,
        }
    }

    #[test]
    fn payload_follows_configuration_timing() {
        let c = config(1, 3);
        let payload = StateToSchedule::from_configuration(&c);
        assert_eq!(payload.expected_start, c.time_start);
        assert_eq!(payload.launch_time, c.time_start_transition);
        assert_eq!(payload.vms["t2.large"], 1);
        assert_eq!(payload.name.len(), 64);
    }

    #[test]
    fn name_depends_only_on_state() {
        let a = StateToSchedule::from_configuration(&config(1, 0));
        let b = StateToSchedule::from_configuration(&config(1, 5));
        let c = StateToSchedule::from_configuration(&config(2, 0));
        assert_eq!(a.name, b.name);
        assert_ne!(a.name, c.name);
    }
}
