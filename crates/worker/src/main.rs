//! Crewdesk Background Worker
//!
//! Handles scheduled billing jobs:
//! - Recurring payment generation (daily at 06:00 UTC)
//! - Billing invariant checks (daily at 06:30 UTC)
//! - Health check heartbeat (hourly)
//!
//! The API server exposes the same billing run as an HTTP trigger for
//! deployments that prefer an external cron service over this process.

use std::sync::Arc;
use std::time::Duration;

use crewdesk_billing::{InvariantChecker, PgBillingStore, RecurringPaymentScheduler, RunReport};
use crewdesk_shared::create_pool;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Log results of a recurring billing run
fn log_run_report(report: &RunReport) {
    info!(
        processed = report.processed,
        created = report.created,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Recurring billing run complete"
    );

    // Log individual errors
    for run_error in &report.errors {
        error!(
            service_id = %run_error.service_id,
            message = %run_error.message,
            "Service failed during billing run"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Crewdesk Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url).await?;

    let billing = Arc::new(RecurringPaymentScheduler::new(PgBillingStore::new(
        pool.clone(),
    )));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Recurring payment generation (daily at 06:00 UTC)
    // Cron: 06:00 UTC - the due filter works on dates, so any once-a-day
    // tick after midnight UTC produces the same result
    let billing_job = billing.clone();
    scheduler
        .add(Job::new_async("0 0 6 * * *", move |_uuid, _l| {
            let service = billing_job.clone();
            Box::pin(async move {
                info!("Running scheduled recurring payment generation");
                let today = OffsetDateTime::now_utc().date();
                match service.run_once(today).await {
                    Ok(report) => log_run_report(&report),
                    Err(e) => error!(error = %e, "Recurring billing run failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Recurring payment generation (daily at 06:00 UTC)");

    // Job 2: Billing invariant checks (daily at 06:30 UTC)
    // Runs after the billing job so it validates that run's output too.
    let invariant_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 30 6 * * *", move |_uuid, _l| {
            let checker = InvariantChecker::new(invariant_pool.clone());
            Box::pin(async move {
                info!("Running billing invariant checks");
                match checker.run_all_checks().await {
                    Ok(summary) if summary.healthy => {
                        info!(checks_run = summary.checks_run, "All billing invariants hold");
                    }
                    Ok(summary) => {
                        for violation in &summary.violations {
                            warn!(
                                invariant = %violation.invariant,
                                severity = %violation.severity,
                                description = %violation.description,
                                "Billing invariant violated"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Invariant checks failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily at 06:30 UTC)");

    // Job 3: Health check heartbeat (hourly)
    scheduler
        .add(Job::new_async("0 0 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (hourly)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Crewdesk Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
