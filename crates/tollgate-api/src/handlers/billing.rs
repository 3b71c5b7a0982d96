//! Billing handlers
//!
//! Thin pass-through to the real-time billing engine.

use crate::dto::{
    ApiResponse, FinalizeRequest, FinalizeResponse, StartResponse, TerminateRequest,
    TerminateResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use tollgate_core::models::CallRecord;
use tollgate_core::traits::CallRecordRepository;
use tollgate_core::AppError;
use tollgate_services::SettingsProvider;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

async fn load_call(state: &AppState, call_id: &str) -> Result<CallRecord, AppError> {
    state
        .calls
        .find_by_call_id(call_id)
        .await?
        .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))
}

/// Open a billing session for an answered call
///
/// POST /api/v1/billing/calls/{call_id}/start
#[instrument(skip(state))]
pub async fn start_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let call_id = path.into_inner();
    let record = load_call(&state, &call_id).await?;

    let started = state.engine.start_real_time_billing(&record).await?;
    let message = if started {
        "Real-time billing started"
    } else {
        "Call will be billed when it ends"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        StartResponse { call_id, started },
        message,
    )))
}

/// Evaluate every in-progress call once
///
/// POST /api/v1/billing/process
#[instrument(skip(state))]
pub async fn process_batch(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let report = state.engine.process_batch().await?;
    debug!(processed = report.processed, "Batch processed on request");
    Ok(HttpResponse::Ok().json(ApiResponse::success(report)))
}

/// Settle a call that has ended
///
/// POST /api/v1/billing/calls/{call_id}/finalize
///
/// With a `status` in the body the call is first marked ended at
/// `end_time` (or now). Without one the stored record is settled as is.
#[instrument(skip(state, req))]
pub async fn finalize_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: Option<web::Json<FinalizeRequest>>,
) -> Result<HttpResponse, AppError> {
    let call_id = path.into_inner();
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    req.validate().map_err(|e| {
        warn!("Finalize validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let record = match req.final_status()? {
        Some(status) => {
            let end_time = req.end_time.unwrap_or_else(Utc::now);
            state
                .calls
                .mark_ended(&call_id, status, end_time)
                .await?
                .ok_or_else(|| AppError::CallNotFound(call_id.clone()))?
        }
        None => load_call(&state, &call_id).await?,
    };

    let settled = state.engine.finalize_billing(&record).await?;
    let stored = load_call(&state, &call_id).await?;
    let message = if settled {
        "Call settled"
    } else {
        "Call could not be priced"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        FinalizeResponse::new(stored, settled),
        message,
    )))
}

/// Hang up a live call and settle it
///
/// POST /api/v1/billing/calls/{call_id}/terminate
#[instrument(skip(state, req))]
pub async fn terminate_call(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<TerminateRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Terminate validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;
    let call_id = path.into_inner();

    let terminated = if req.emergency {
        state.engine.emergency_terminate(&call_id, &req.reason).await?
    } else {
        state.engine.terminate_call(&call_id, &req.reason).await?
    };

    if terminated {
        info!(call_id = %call_id, reason = %req.reason, "Call terminated on request");
    }
    let message = if terminated {
        "Call terminated"
    } else {
        "Call was not terminated"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        TerminateResponse {
            call_id,
            terminated,
            emergency: req.emergency,
        },
        message,
    )))
}

/// Real-time billing statistics
///
/// GET /api/v1/billing/stats
#[instrument(skip(state))]
pub async fn statistics(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let stats = state.engine.statistics().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Drop cached operator settings and rate lookups
///
/// POST /api/v1/billing/settings/invalidate
#[instrument(skip(state))]
pub async fn invalidate_settings(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.settings.invalidate();
    state.rates.invalidate();
    info!("Settings and rate caches invalidated");

    let settings = state.settings.current().await;
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        settings,
        "Settings reloaded",
    )))
}

/// Configure billing routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing")
            .route("/process", web::post().to(process_batch))
            .route("/stats", web::get().to(statistics))
            .route("/settings/invalidate", web::post().to(invalidate_settings))
            .route("/calls/{call_id}/start", web::post().to(start_call))
            .route("/calls/{call_id}/finalize", web::post().to(finalize_call))
            .route("/calls/{call_id}/terminate", web::post().to(terminate_call)),
    );
}
