//! Forecast reconciliation.
//!
//! Exactly one forecast is authoritative at a time. An incoming forecast
//! either becomes that record (nothing stored yet), replaces it (the
//! difference is significant) or is ignored. The read of the stored record
//! and the conditional write run under one lock, so two cycles racing on the
//! same forecast cannot both see an empty store.
//!
//! A cycle that fails after reconciling hands its [`Reconciliation`] back to
//! [`ForecastReconciler::revert`], which restores the previous record so the
//! next cycle sees the forecast as new again.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use spd_state::{Forecast, StateStore, new_object_id};

use crate::error::{ForecastError, ForecastResult};

/// What reconciliation did with the incoming forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No forecast was stored; the incoming one was inserted verbatim.
    Stored,
    /// The stored forecast was replaced.
    Updated,
    /// The difference was below the threshold; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// True only when a stored forecast was replaced.
    pub changed: bool,
    /// The part of the forecast policies should be derived from.
    pub effective: Forecast,
    /// Timestamp of the first differing sample, set on `Updated`.
    pub conflict_time: Option<DateTime<Utc>>,
    pub outcome: ReconcileOutcome,
    /// The record before this reconciliation wrote, if any.
    previous: Option<Forecast>,
    /// The record this reconciliation wrote, if any.
    written: Option<Forecast>,
}

impl Reconciliation {
    /// Whether the effective forecast should go through derivation.
    pub fn needs_derivation(&self) -> bool {
        self.outcome != ReconcileOutcome::Unchanged
    }
}

pub struct ForecastReconciler {
    store: StateStore,
    lock: Mutex<()>,
    rmse_threshold: f64,
}

impl ForecastReconciler {
    pub fn new(store: StateStore, rmse_threshold: f64) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
            rmse_threshold,
        }
    }

    /// The currently authoritative forecast, if any.
    pub fn current(&self) -> ForecastResult<Option<Forecast>> {
        Ok(self.store.find_all::<Forecast>()?.into_iter().next())
    }

    /// Reconcile `incoming` against the stored forecast.
    pub async fn reconcile(&self, incoming: Forecast) -> ForecastResult<Reconciliation> {
        incoming.validate().map_err(ForecastError::Invalid)?;

        let _guard = self.lock.lock().await;

        let Some(stored) = self.current()? else {
            let mut forecast = incoming;
            forecast.id = new_object_id();
            self.store.insert(&forecast)?;
            info!(id = %forecast.id, points = forecast.points.len(), "forecast stored");
            return Ok(Reconciliation {
                changed: false,
                effective: forecast.clone(),
                conflict_time: None,
                outcome: ReconcileOutcome::Stored,
                previous: None,
                written: Some(forecast),
            });
        };

        let old: Vec<f64> = stored.values().collect();
        let new: Vec<f64> = incoming.values().collect();
        let error = rmse(&old, &new);

        if error <= self.rmse_threshold {
            debug!(id = %stored.id, rmse = error, "forecast unchanged");
            return Ok(Reconciliation {
                changed: false,
                effective: incoming,
                conflict_time: None,
                outcome: ReconcileOutcome::Unchanged,
                previous: None,
                written: None,
            });
        }

        let index = conflict_index(&stored, &incoming);
        let conflict_time = incoming.points.get(index).map(|p| p.timestamp);

        let mut replacement = incoming;
        replacement.id = stored.id.clone();
        self.store.update(&stored.id, &replacement)?;

        let effective = Forecast {
            id: replacement.id.clone(),
            window_start: conflict_time.unwrap_or(replacement.window_start),
            points: replacement.points[index.min(replacement.points.len())..].to_vec(),
        };
        info!(
            id = %stored.id,
            rmse = error,
            conflict_index = index,
            "forecast updated"
        );
        Ok(Reconciliation {
            changed: true,
            effective,
            conflict_time,
            outcome: ReconcileOutcome::Updated,
            previous: Some(stored),
            written: Some(replacement),
        })
    }

    /// Undo what `reconciliation` wrote: restore the previous record, or drop
    /// the record if there was none. Nothing happens when another cycle has
    /// replaced the forecast since, i.e. when the stored record is no longer
    /// within the threshold of the one written here.
    pub async fn revert(&self, reconciliation: &Reconciliation) -> ForecastResult<()> {
        let Some(written) = &reconciliation.written else {
            return Ok(());
        };

        let _guard = self.lock.lock().await;

        let Some(current) = self.store.find::<Forecast>(&written.id)? else {
            return Ok(());
        };
        let current_values: Vec<f64> = current.values().collect();
        let written_values: Vec<f64> = written.values().collect();
        if current.window_start != written.window_start
            || rmse(&current_values, &written_values) > self.rmse_threshold
        {
            debug!(id = %written.id, "forecast replaced since, not reverting");
            return Ok(());
        }

        match &reconciliation.previous {
            Some(previous) => self.store.update(&previous.id, previous)?,
            None => {
                self.store.remove::<Forecast>(&written.id)?;
            }
        }
        info!(id = %written.id, "forecast reverted");
        Ok(())
    }
}

/// First index at which the request counts differ. Only meaningful when both
/// forecasts cover the same window; any other shape yields 0.
fn conflict_index(old: &Forecast, new: &Forecast) -> usize {
    if old.points.len() != new.points.len() || old.window_start != new.window_start {
        return 0;
    }
    old.points
        .iter()
        .zip(&new.points)
        .position(|(a, b)| a.requests != b.requests)
        .unwrap_or(0)
}

/// Root-mean-square error between two demand curves. Values of the longer
/// curve without a counterpart are compared against zero.
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().max(b.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = (0..n)
        .map(|i| {
            let d = a.get(i).copied().unwrap_or(0.0) - b.get(i).copied().unwrap_or(0.0);
            d * d
        })
        .sum();
    (sum / n as f64).sqrt()
}
