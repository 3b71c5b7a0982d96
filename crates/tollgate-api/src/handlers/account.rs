//! Account handlers
//!
//! Balance reads, ledger history and manual top-ups.

use crate::dto::{ApiResponse, BalanceResponse, HistoryParams, TopupRequest};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use tollgate_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Current balance
///
/// GET /api/v1/accounts/{user_id}/balance
#[instrument(skip(state))]
pub async fn get_balance(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let balance = state.ledger.balance(user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(BalanceResponse { user_id, balance })))
}

/// Most recent ledger entries first
///
/// GET /api/v1/accounts/{user_id}/ledger
#[instrument(skip(state))]
pub async fn get_ledger(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<HistoryParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Ledger query validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let entries = state.ledger.history(path.into_inner(), query.limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(entries)))
}

/// Add funds to an account
///
/// POST /api/v1/accounts/{user_id}/topup
#[instrument(skip(state, req))]
pub async fn topup(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<TopupRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Topup validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let user_id = path.into_inner();
    let balance = state
        .ledger
        .credit(user_id, req.amount, &req.description())
        .await?;

    info!(user_id, amount = %req.amount, "Account topped up");
    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        BalanceResponse { user_id, balance },
        "Balance updated",
    )))
}

/// Configure account routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/accounts/{user_id}")
            .route("/balance", web::get().to(get_balance))
            .route("/ledger", web::get().to(get_ledger))
            .route("/topup", web::post().to(topup)),
    );
}
