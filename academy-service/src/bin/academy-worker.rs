//! Academy background worker.
//!
//! Scheduled jobs (UTC):
//! - Guardian payment reminders, daily at 06:00
//! - Overdue sweep, daily at 00:30
//! - Email outbox drain, every 5 minutes
//!
//! `academy-worker --once` runs each job a single time and exits.

use academy_service::config::AcademyConfig;
use academy_service::services::charges::sweep_overdue;
use academy_service::services::email::EmailOutbox;
use academy_service::services::metrics::init_metrics;
use academy_service::services::reminders::ReminderScanner;
use academy_service::services::Store;
use academy_service::startup::{connect_store, email_provider};
use chrono::Utc;
use service_core::observability::init_tracing;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

const OUTBOX_BATCH: i64 = 100;

#[derive(Clone)]
struct Jobs {
    store: Arc<dyn Store>,
    outbox: EmailOutbox,
    reminders: Arc<ReminderScanner>,
}

impl Jobs {
    async fn send_reminders(&self) {
        let now = Utc::now();
        match self.reminders.scan(now.date_naive(), now).await {
            Ok(summary) => info!(
                scanned = summary.scanned,
                enqueued = summary.enqueued,
                skipped = summary.skipped,
                "Reminder job finished"
            ),
            Err(e) => error!(error = %e, "Reminder job failed"),
        }
    }

    async fn sweep_overdue(&self) {
        let now = Utc::now();
        match sweep_overdue(self.store.as_ref(), now.date_naive(), now).await {
            Ok(moved) => info!(moved = moved, "Overdue job finished"),
            Err(e) => error!(error = %e, "Overdue job failed"),
        }
    }

    async fn drain_outbox(&self) {
        match self.outbox.drain(OUTBOX_BATCH, Utc::now()).await {
            Ok(summary) if summary.attempted > 0 => info!(
                attempted = summary.attempted,
                sent = summary.sent,
                retried = summary.retried,
                failed = summary.failed,
                "Outbox drained"
            ),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Outbox drain failed"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AcademyConfig::from_env()?;

    init_tracing(
        "academy-worker",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    let store = connect_store(&config).await?;
    let outbox = EmailOutbox::new(
        store.clone(),
        email_provider(&config)?,
        config.billing.email_max_attempts,
    );
    let jobs = Jobs {
        reminders: Arc::new(ReminderScanner::new(
            store.clone(),
            outbox.clone(),
            config.billing.reminder_days_before,
        )),
        store,
        outbox,
    };

    if std::env::args().any(|arg| arg == "--once") {
        info!("Running all jobs once");
        jobs.sweep_overdue().await;
        jobs.send_reminders().await;
        jobs.drain_outbox().await;
        return Ok(());
    }

    let scheduler = JobScheduler::new().await?;

    let reminder_jobs = jobs.clone();
    scheduler
        .add(Job::new_async("0 0 6 * * *", move |_uuid, _l| {
            let jobs = reminder_jobs.clone();
            Box::pin(async move {
                jobs.send_reminders().await;
            })
        })?)
        .await?;
    info!("Scheduled: guardian reminders (06:00 UTC)");

    let overdue_jobs = jobs.clone();
    scheduler
        .add(Job::new_async("0 30 0 * * *", move |_uuid, _l| {
            let jobs = overdue_jobs.clone();
            Box::pin(async move {
                jobs.sweep_overdue().await;
            })
        })?)
        .await?;
    info!("Scheduled: overdue sweep (00:30 UTC)");

    let outbox_jobs = jobs.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let jobs = outbox_jobs.clone();
            Box::pin(async move {
                jobs.drain_outbox().await;
            })
        })?)
        .await?;
    info!("Scheduled: email outbox drain (every 5 minutes)");

    scheduler.start().await?;
    info!("Academy worker started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}
