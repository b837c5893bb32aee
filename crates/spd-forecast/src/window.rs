//! Window derivation — cutting a forecast into critical intervals.
//!
//! Every strategy produces intervals that are contiguous, non-overlapping
//! and together cover the forecast horizon exactly once. Sample `i` covers
//! `[t_i, t_{i+1})`; the last sample covers one granularity step.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use spd_core::{DerivationSettings, Granularity, WindowStrategyKind};
use spd_state::{CriticalInterval, Forecast, ProcessedForecast};

/// Turns a forecast into the demand intervals policies are built from.
pub trait WindowDerivation {
    fn derive(&self, forecast: &Forecast) -> ProcessedForecast;
}

/// Shift `t` by `factor` granularity steps.
pub fn adjust_time(t: DateTime<Utc>, factor: f64, granularity: Granularity) -> DateTime<Utc> {
    let millis = (factor * granularity.seconds() as f64 * 1000.0).round() as i64;
    t + Duration::milliseconds(millis)
}

/// One sample with the span it covers.
struct Span {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    requests: f64,
}

fn spans(forecast: &Forecast, granularity: Granularity) -> Vec<Span> {
    let points = &forecast.points;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| Span {
            start: p.timestamp,
            end: points
                .get(i + 1)
                .map(|next| next.timestamp)
                .unwrap_or_else(|| adjust_time(p.timestamp, 1.0, granularity)),
            requests: p.requests,
        })
        .collect()
}

fn need_to_scale(forecast: &Forecast) -> bool {
    forecast.values().any(|v| v > 0.0)
}

/// Build one interval from a non-empty run of spans, provisioned at its peak.
fn merge(run: &[Span]) -> CriticalInterval {
    CriticalInterval {
        time_start: run[0].start,
        time_end: run[run.len() - 1].end,
        requests: run.iter().map(|s| s.requests).fold(0.0, f64::max),
    }
}

// ── Small-step over-provisioning ──────────────────────────────────

/// Merges consecutive samples while they stay within `step_fraction` of the
/// first sample of the interval, and provisions each interval at its maximum.
#[derive(Debug, Clone)]
pub struct SmallStepOverProvision {
    pub granularity: Granularity,
    pub step_fraction: f64,
}

impl SmallStepOverProvision {
    fn within_step(&self, base: f64, value: f64) -> bool {
        (value - base).abs() <= self.step_fraction * base.abs()
    }
}

impl WindowDerivation for SmallStepOverProvision {
    fn derive(&self, forecast: &Forecast) -> ProcessedForecast {
        let spans = spans(forecast, self.granularity);
        let mut intervals = Vec::new();
        let mut first = 0;
        for i in 1..=spans.len() {
            let boundary = i == spans.len()
                || !self.within_step(spans[first].requests, spans[i].requests);
            if boundary && first < i {
                intervals.push(merge(&spans[first..i]));
                first = i;
            }
        }
        debug!(
            samples = spans.len(),
            intervals = intervals.len(),
            "small-step windows derived"
        );
        ProcessedForecast {
            need_to_scale: need_to_scale(forecast),
            critical_intervals: intervals,
        }
    }
}

// ── Peak / valley ─────────────────────────────────────────────────

/// Splits the horizon at prominent valleys. Each interval runs from one
/// valley to the next and is provisioned at the peak in between.
#[derive(Debug, Clone)]
pub struct PeakValley {
    pub granularity: Granularity,
    pub min_prominence: f64,
}

impl PeakValley {
    /// Indices of interior local minima whose prominence reaches the minimum.
    fn valleys(&self, values: &[f64]) -> Vec<usize> {
        let n = values.len();
        if n < 3 {
            return Vec::new();
        }
        (1..n - 1)
            .filter(|&i| values[i] < values[i - 1] && values[i] <= values[i + 1])
            .filter(|&i| prominence(values, i) >= self.min_prominence)
            .collect()
    }
}

/// Depth of the valley at `i`: how far the lower of the two surrounding
/// peaks rises above it before the curve drops below the valley again.
fn prominence(values: &[f64], i: usize) -> f64 {
    let v = values[i];
    let left = values[..i]
        .iter()
        .rev()
        .take_while(|&&x| x >= v)
        .fold(v, |m, &x| m.max(x));
    let right = values[i + 1..]
        .iter()
        .take_while(|&&x| x >= v)
        .fold(v, |m, &x| m.max(x));
    left.min(right) - v
}

impl WindowDerivation for PeakValley {
    fn derive(&self, forecast: &Forecast) -> ProcessedForecast {
        let spans = spans(forecast, self.granularity);
        let values: Vec<f64> = forecast.values().collect();
        let valleys = self.valleys(&values);

        let mut intervals = Vec::with_capacity(valleys.len() + 1);
        let mut first = 0;
        for &valley in &valleys {
            intervals.push(merge(&spans[first..valley]));
            first = valley;
        }
        if first < spans.len() {
            intervals.push(merge(&spans[first..]));
        }
        debug!(
            samples = spans.len(),
            valleys = valleys.len(),
            "peak/valley windows derived"
        );
        ProcessedForecast {
            need_to_scale: need_to_scale(forecast),
            critical_intervals: intervals,
        }
    }
}

// ── Selection ─────────────────────────────────────────────────────

/// The window strategy selected by configuration.
#[derive(Debug, Clone)]
pub enum WindowStrategy {
    SmallStep(SmallStepOverProvision),
    PeakValley(PeakValley),
}

impl WindowStrategy {
    pub fn from_settings(settings: &DerivationSettings, granularity: Granularity) -> Self {
        match settings.window_strategy {
            WindowStrategyKind::SmallStep => Self::SmallStep(SmallStepOverProvision {
                granularity,
                step_fraction: settings.step_fraction,
            }),
            WindowStrategyKind::PeakValley => Self::PeakValley(PeakValley {
                granularity,
                min_prominence: settings.min_prominence,
            }),
        }
    }
}

impl WindowDerivation for WindowStrategy {
    fn derive(&self, forecast: &Forecast) -> ProcessedForecast {
        match self {
            Self::SmallStep(s) => s.derive(forecast),
            Self::PeakValley(s) => s.derive(forecast),
        }
    }
}
