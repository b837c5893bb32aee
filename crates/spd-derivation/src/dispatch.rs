//! Runs the configured derivation strategies and collects their candidates.

use tracing::{info, warn};

use spd_core::Algorithm;
use spd_state::{Policy, ProcessedForecast, ServiceProfile};

use crate::error::{DerivationError, DerivationResult};
use crate::strategy::{DerivationContext, PolicyBuilder, Strategy};

pub struct PolicyDispatcher;

impl PolicyDispatcher {
    /// Build a candidate policy with every strategy `algorithm` selects.
    ///
    /// A single strategy's failure is returned as is. When several run, an
    /// unimplemented strategy is skipped and an infeasible candidate is
    /// dropped; the infeasibility is only reported if no candidate is left.
    pub fn dispatch(
        processed: &ProcessedForecast,
        service: &ServiceProfile,
        ctx: &DerivationContext,
        algorithm: Algorithm,
    ) -> DerivationResult<Vec<Policy>> {
        let strategies = Strategy::for_algorithm(algorithm);
        if let [single] = strategies.as_slice() {
            return Ok(vec![single.build(processed, service, ctx)?]);
        }

        let mut candidates = Vec::with_capacity(strategies.len());
        let mut infeasible = None;
        for strategy in &strategies {
            match strategy.build(processed, service, ctx) {
                Ok(policy) => candidates.push(policy),
                Err(DerivationError::UnimplementedStrategy(a)) => {
                    info!(algorithm = %a, "strategy not implemented, skipping");
                }
                Err(e @ DerivationError::InfeasibleAllocation(_)) => {
                    warn!(algorithm = %strategy.algorithm(), error = %e, "candidate dropped");
                    infeasible = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match infeasible {
            Some(e) if candidates.is_empty() => Err(e),
            _ => Ok(candidates),
        }
    }
}
