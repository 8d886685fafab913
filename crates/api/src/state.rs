//! Application state

use std::sync::Arc;

use crewdesk_billing::{PgBillingStore, RecurringPaymentScheduler};
use sqlx::PgPool;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub scheduler: Arc<RecurringPaymentScheduler<PgBillingStore>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let scheduler = Arc::new(RecurringPaymentScheduler::new(PgBillingStore::new(
            pool.clone(),
        )));
        tracing::info!("Recurring payment scheduler initialized");

        Self {
            pool,
            config,
            scheduler,
        }
    }
}
