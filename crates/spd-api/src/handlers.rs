//! REST API handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{error, info};

use spd_planner::{CycleError, CycleOutcome};
use spd_state::{Forecast, Policy};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// HTTP status a failed cycle is reported with.
pub fn cycle_status(err: &CycleError) -> StatusCode {
    match err {
        CycleError::Fetch { .. } => StatusCode::BAD_GATEWAY,
        CycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CycleError::InfeasibleAllocation(_)
        | CycleError::NoPolicy
        | CycleError::UnknownVmType(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CycleError::UnimplementedStrategy(_) => StatusCode::NOT_IMPLEMENTED,
    }
}

// ── Derivation ─────────────────────────────────────────────────

/// GET|POST /api/v1/derive
pub async fn derive(State(state): State<ApiState>) -> impl IntoResponse {
    info!("derivation requested over HTTP");
    match state.planner.run_cycle().await {
        Ok(CycleOutcome::Scheduled(policy)) => ApiResponse::ok(policy).into_response(),
        Ok(CycleOutcome::ForecastUnchanged(Some(policy))) => {
            ApiResponse::ok(policy).into_response()
        }
        Ok(CycleOutcome::ForecastUnchanged(None) | CycleOutcome::NoScalingNeeded) => {
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(stage = e.stage(), error = %e, "derivation cycle failed");
            error_response(&e.to_string(), cycle_status(&e)).into_response()
        }
    }
}

// ── Results ────────────────────────────────────────────────────

/// GET /api/v1/forecast
pub async fn get_forecast(State(state): State<ApiState>) -> impl IntoResponse {
    match state.planner.store().find_all::<Forecast>() {
        Ok(forecasts) => match forecasts.into_iter().next() {
            Some(forecast) => ApiResponse::ok(forecast).into_response(),
            None => error_response("no forecast stored", StatusCode::NOT_FOUND).into_response(),
        },
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/policies
pub async fn list_policies(State(state): State<ApiState>) -> impl IntoResponse {
    match state.planner.store().find_all::<Policy>() {
        Ok(mut policies) => {
            policies.sort_by_key(|p| p.metrics.finish_time_derivation);
            ApiResponse::ok(policies).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/policies/:id
pub async fn get_policy(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.planner.store().find::<Policy>(&id) {
        Ok(Some(policy)) => ApiResponse::ok(policy).into_response(),
        Ok(None) => error_response("policy not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
