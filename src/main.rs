//! Tollgate real-time billing server
//!
//! Wires the durable store, the billing session store and the FreeSWITCH
//! call-control client into the billing engine, runs the periodic billing
//! scheduler and serves the HTTP API.

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tollgate_api::{configure_routes, AppState};
use tollgate_core::config::{AppConfig, LoggingConfig, StoreBackend};
use tollgate_core::traits::{
    AccountRepository, CallRecordRepository, LedgerStore, RateRepository, SettingsRepository,
};
use tollgate_core::BillingSettings;
use tollgate_db::{
    create_pool, run_migrations, InMemoryStore, PgAccountRepository, PgCallRecordRepository,
    PgLedgerStore, PgRateRepository, PgSettingsRepository,
};
use tollgate_esl::EslCallControl;
use tollgate_services::{
    BalanceLedger, BillingScheduler, CachedSettingsProvider, RateResolver, RealtimeBillingEngine,
    SettingsProvider, SettlementService, TerminationCoordinator,
};
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Durable store handles, one per repository trait
struct Storage {
    rates: Arc<dyn RateRepository>,
    calls: Arc<dyn CallRecordRepository>,
    accounts: Arc<dyn AccountRepository>,
    ledger: Arc<dyn LedgerStore>,
    settings: Arc<dyn SettingsRepository>,
}

impl Storage {
    async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        match config.database.backend {
            StoreBackend::Postgres => {
                info!("Connecting to database...");
                let pool = create_pool(&config.database)
                    .await
                    .context("failed to create database pool")?;
                if config.database.run_migrations {
                    run_migrations(&pool)
                        .await
                        .context("failed to run migrations")?;
                }

                Ok(Self {
                    rates: Arc::new(PgRateRepository::new(pool.clone())),
                    calls: Arc::new(PgCallRecordRepository::new(pool.clone())),
                    accounts: Arc::new(PgAccountRepository::new(pool.clone())),
                    ledger: Arc::new(PgLedgerStore::new(pool.clone())),
                    settings: Arc::new(PgSettingsRepository::new(pool)),
                })
            }
            StoreBackend::Memory => {
                warn!("Using the in-memory store, nothing survives a restart");
                let store = Arc::new(InMemoryStore::new());
                Ok(Self {
                    rates: store.clone(),
                    calls: store.clone(),
                    accounts: store.clone(),
                    ledger: store.clone(),
                    settings: store,
                })
            }
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(config: &LoggingConfig) {
    let level = &config.level;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tollgate={level},tollgate_api={level},tollgate_services={level},\
             tollgate_db={level},tollgate_cache={level},tollgate_esl={level},\
             actix_web=info,sqlx=warn"
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting Tollgate v{}", env!("CARGO_PKG_VERSION"));

    let storage = Storage::open(&config).await?;
    let sessions = tollgate_cache::connect(&config.sessions)
        .await
        .context("failed to open session store")?;
    info!("Session store: {:?}", config.sessions.backend);

    let control = Arc::new(EslCallControl::from_config(&config.freeswitch));
    if config.freeswitch.servers.is_empty() {
        warn!("No FreeSWITCH servers configured, terminations will fail");
    }

    let billing = &config.billing;
    let settings: Arc<dyn SettingsProvider> = Arc::new(CachedSettingsProvider::new(
        storage.settings.clone(),
        BillingSettings::from_defaults(billing),
        Duration::from_secs(billing.settings_cache_ttl_secs),
    ));
    let rates = Arc::new(RateResolver::new(
        storage.rates.clone(),
        settings.clone(),
        Duration::from_secs(billing.rate_cache_ttl_secs),
    ));
    let settlement = Arc::new(
        SettlementService::new(
            storage.calls.clone(),
            storage.ledger.clone(),
            sessions.clone(),
            rates.clone(),
            settings.clone(),
        )
        .with_retry(
            billing.finalize_max_attempts,
            Duration::from_millis(billing.finalize_retry_backoff_ms),
        ),
    );
    let terminator = Arc::new(TerminationCoordinator::new(
        control,
        storage.calls.clone(),
        sessions.clone(),
        settlement.clone(),
        Duration::from_secs(config.freeswitch.hangup_timeout_secs),
        config.sessions.session_ttl_secs,
    ));
    let engine = Arc::new(
        RealtimeBillingEngine::new(
            rates.clone(),
            settings.clone(),
            sessions,
            storage.calls.clone(),
            storage.accounts.clone(),
            settlement,
            terminator,
            config.sessions.session_ttl_secs,
        )
        .with_concurrency(billing.scheduler_concurrency),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = BillingScheduler::new(
        engine.clone(),
        Duration::from_secs(billing.check_interval_secs.max(1)),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let state = AppState {
        engine,
        calls: storage.calls.clone(),
        ledger: Arc::new(BalanceLedger::new(
            storage.accounts.clone(),
            storage.ledger.clone(),
        )),
        rates,
        settings,
    };

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_json",
                        "message": message,
                        "status": 400,
                    })),
                )
                .into()
            }))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .workers(config.server.workers.max(1))
    .client_request_timeout(Duration::from_secs(config.server.timeout_secs))
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run();

    let result = server.await;

    info!("HTTP server stopped, shutting down scheduler");
    // Receiver may already be gone if the scheduler task ended
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        warn!("Billing scheduler task failed: {}", e);
    }

    result.context("HTTP server error")
}
