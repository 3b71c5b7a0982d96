//! HTTP request handlers

pub mod account;
pub mod billing;

use actix_web::{web, HttpResponse};

pub use account::configure as configure_accounts;
pub use billing::configure as configure_billing;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "tollgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_billing)
            .configure(configure_accounts),
    );
}
