//! Policy evaluation — price every candidate and keep the best one.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use spd_core::PriceModel;
use spd_state::{Policy, PolicyStatus};

use crate::error::{DerivationError, DerivationResult};

pub struct PolicyEvaluator {
    prices: Arc<PriceModel>,
}

impl PolicyEvaluator {
    pub fn new(prices: Arc<PriceModel>) -> Self {
        Self { prices }
    }

    /// Total cost of a policy: for every configuration, its duration times
    /// the price of its VMs in the model's billing unit.
    pub fn cost(&self, policy: &Policy) -> DerivationResult<f64> {
        let mut total = 0.0;
        for config in &policy.configurations {
            let seconds = (config.time_end - config.time_start).num_milliseconds() as f64 / 1000.0;
            for (vm_type, count) in &config.state.vms {
                let price = self
                    .prices
                    .price_for(vm_type, seconds)
                    .ok_or_else(|| DerivationError::UnknownVmType(vm_type.clone()))?;
                total += *count as f64 * price;
            }
        }
        Ok(total)
    }

    /// Pick the winning candidate and mark it selected.
    ///
    /// A candidate that cannot be priced is dropped; the pricing error is
    /// only reported if no candidate is left. Policies with configurations
    /// beat empty ones, then the lower cost wins, then the earlier derivation
    /// finish, then fewer configurations.
    pub fn select_policy(&self, candidates: Vec<Policy>) -> DerivationResult<Policy> {
        let mut priced = Vec::with_capacity(candidates.len());
        let mut unpriced = None;
        for mut policy in candidates {
            match self.cost(&policy) {
                Ok(cost) => {
                    policy.metrics.cost = cost;
                    debug!(
                        algorithm = %policy.algorithm,
                        cost,
                        configurations = policy.configurations.len(),
                        "candidate priced"
                    );
                    priced.push(policy);
                }
                Err(e) => {
                    warn!(algorithm = %policy.algorithm, error = %e, "candidate dropped");
                    unpriced = Some(e);
                }
            }
        }
        if let Some(e) = unpriced
            && priced.is_empty()
        {
            return Err(e);
        }

        let mut winner = priced
            .into_iter()
            .min_by(rank)
            .ok_or(DerivationError::NoPolicy)?;
        winner.status = PolicyStatus::Selected;
        info!(
            id = %winner.id,
            algorithm = %winner.algorithm,
            cost = winner.metrics.cost,
            "policy selected"
        );
        Ok(winner)
    }
}

fn rank(a: &Policy, b: &Policy) -> Ordering {
    a.configurations
        .is_empty()
        .cmp(&b.configurations.is_empty())
        .then(a.metrics.cost.total_cmp(&b.metrics.cost))
        .then(
            a.metrics
                .finish_time_derivation
                .cmp(&b.metrics.finish_time_derivation),
        )
        .then(a.configurations.len().cmp(&b.configurations.len()))
}
