//! spd-api — REST API for SPD.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET, POST | `/api/v1/derive` | Run a derivation cycle, return the selected policy |
//! | GET | `/api/v1/forecast` | The authoritative forecast |
//! | GET | `/api/v1/policies` | Stored policies, pending and selected |
//! | GET | `/api/v1/policies/:id` | One policy |
//!
//! A derivation that ends without a new policy answers `204 No Content`,
//! unless the forecast is unchanged and an earlier policy exists, which is
//! returned instead.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use spd_planner::Planner;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub planner: Arc<Planner>,
}

/// Build the complete API router.
pub fn build_router(planner: Arc<Planner>) -> Router {
    let api_routes = Router::new()
        .route("/derive", get(handlers::derive).post(handlers::derive))
        .route("/forecast", get(handlers::get_forecast))
        .route("/policies", get(handlers::list_policies))
        .route("/policies/{id}", get(handlers::get_policy))
        .with_state(ApiState { planner });

    Router::new().nest("/api/v1", api_routes)
}
