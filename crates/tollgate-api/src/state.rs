//! Shared handler state

use std::sync::Arc;
use tollgate_core::traits::CallRecordRepository;
use tollgate_services::{BalanceLedger, RateResolver, RealtimeBillingEngine, SettingsProvider};

/// Services the handlers delegate to, registered once as `web::Data`
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RealtimeBillingEngine>,
    pub calls: Arc<dyn CallRecordRepository>,
    pub ledger: Arc<BalanceLedger>,
    pub rates: Arc<RateResolver>,
    pub settings: Arc<dyn SettingsProvider>,
}
