//! Background scheduling of the billing sweeps
//!
//! The scheduler owns two tokio tasks:
//!
//! - the reminder job, which runs [`ReminderDispatcher::run_reminder_sweep`]
//!   every `reminder_interval` while the local hour is inside the business
//!   hours window
//! - the maintenance job, which runs the status sweep followed by missing
//!   renewal generation every `status_interval`
//!
//! Both jobs fire once immediately on start. Errors are logged and the job
//! waits for its next tick. [`BillingScheduler::shutdown`] signals both tasks
//! and waits for them to finish their current run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use core_kernel::{Clock, Timezone};

use crate::error::BillingError;
use crate::services::AutoGenerationService;
use crate::sweeps::{ReminderDispatcher, StatusSweeper};

/// Timer settings for the billing jobs
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub reminder_interval: Duration,
    /// Local hours `[start, end)` in which reminders may be sent;
    /// `None` sends around the clock
    pub business_hours: Option<(u32, u32)>,
    pub status_interval: Duration,
    /// Timezone the business hours are expressed in
    pub timezone: Timezone,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reminder_interval: Duration::from_secs(60 * 60),
            business_hours: Some((9, 18)),
            status_interval: Duration::from_secs(6 * 60 * 60),
            timezone: Timezone::default(),
        }
    }
}

impl SchedulerConfig {
    /// Whether reminders may go out at the given local hour
    pub fn within_business_hours(&self, hour: u32) -> bool {
        match self.business_hours {
            None => true,
            Some((start, end)) if start <= end => hour >= start && hour < end,
            // Window spanning midnight, e.g. (20, 2)
            Some((start, end)) => hour >= start || hour < end,
        }
    }
}

/// Handle to the running billing jobs
pub struct BillingScheduler {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BillingScheduler {
    /// Spawns the reminder and maintenance jobs on the current runtime
    pub fn start(
        config: SchedulerConfig,
        dispatcher: Arc<ReminderDispatcher>,
        sweeper: Arc<StatusSweeper>,
        generator: Arc<AutoGenerationService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reminder_task = tokio::spawn(reminder_job(config, dispatcher, clock, shutdown_rx.clone()));
        let maintenance_task = tokio::spawn(maintenance_job(config.status_interval, sweeper, generator, shutdown_rx));

        info!(
            reminder_interval_secs = config.reminder_interval.as_secs(),
            status_interval_secs = config.status_interval.as_secs(),
            timezone = %config.timezone,
            "Billing scheduler started"
        );

        Self {
            shutdown_tx,
            tasks: vec![reminder_task, maintenance_task],
        }
    }

    /// Stops both jobs and waits for them to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Billing job terminated abnormally");
            }
        }
        info!("Billing scheduler stopped");
    }
}

async fn reminder_job(
    config: SchedulerConfig,
    dispatcher: Arc<ReminderDispatcher>,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(config.reminder_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let hour = config.timezone.local_hour(clock.now());
        if !config.within_business_hours(hour) {
            debug!(hour, "Outside business hours, skipping reminder sweep");
            continue;
        }

        match dispatcher.run_reminder_sweep().await {
            Ok(_) => {}
            Err(BillingError::SweepInProgress(_)) => warn!("Previous reminder sweep still running"),
            Err(e) => error!(error = %e, "Reminder sweep failed"),
        }
    }
}

async fn maintenance_job(
    period: Duration,
    sweeper: Arc<StatusSweeper>,
    generator: Arc<AutoGenerationService>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        if let Err(e) = sweeper.run_status_sweep().await {
            error!(error = %e, "Status sweep failed");
        }
        if let Err(e) = generator.generate_missing_renewals().await {
            error!(error = %e, "Missing renewal generation failed");
        }
    }
}
