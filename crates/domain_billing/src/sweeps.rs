//! Periodic sweeps
//!
//! - [`ReminderDispatcher`] sends due renewal reminders, at most once per
//!   reminder per calendar day.
//! - [`StatusSweeper`] moves renewals and invoices to the status their dates
//!   imply.
//!
//! Both read "today" from the injected clock and never keep state between
//! runs other than what the store persists.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use core_kernel::temporal::DateRange;
use core_kernel::Clock;

use crate::error::BillingError;
use crate::ports::{BillingStore, Notifier};
use crate::reminder::ReminderDecision;

/// Time allowed for one outbound message
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Renewals expiring within this many days are marked expiring by the sweep
pub const EXPIRING_WINDOW_DAYS: u64 = 30;

/// Counts from one reminder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderSweepReport {
    pub examined: usize,
    pub sent: usize,
    pub not_due: usize,
    pub already_sent: usize,
    pub failed: usize,
    /// Delivered, but the send date could not be stored
    pub unrecorded: usize,
}

/// Sends renewal reminders whose day-offset matches today
pub struct ReminderDispatcher {
    store: Arc<dyn BillingStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    send_timeout: Duration,
    running: AtomicBool,
}

/// Clears the run flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReminderDispatcher {
    pub fn new(store: Arc<dyn BillingStore>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Runs one dispatch pass
    ///
    /// For each active reminder with a destination: skip it unless today is
    /// one of its offsets and it has not been sent today, render the message,
    /// send it, then record today as the last send date. A failed or timed
    /// out send is logged and left for the next matching offset; it is not
    /// retried on a later day. A failure to record the send is logged and
    /// counted in `unrecorded`: the message has already gone out, and since
    /// the last send date was not stored, the next run on the same day sends
    /// it again.
    ///
    /// # Errors
    ///
    /// - `SweepInProgress` when another run has not finished
    /// - `Port` when the reminders cannot be listed
    pub async fn run_reminder_sweep(&self) -> Result<ReminderSweepReport, BillingError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BillingError::SweepInProgress("reminder"));
        }
        let _guard = RunGuard(&self.running);

        let today = self.clock.today();
        let targets = self.store.active_reminder_targets().await?;
        let mut report = ReminderSweepReport {
            examined: targets.len(),
            ..Default::default()
        };

        for target in targets {
            let reminder = &target.reminder;
            let days_until_expiry = match reminder.decide(today) {
                ReminderDecision::Due { days_until_expiry } => days_until_expiry,
                ReminderDecision::AlreadySentToday => {
                    report.already_sent += 1;
                    continue;
                }
                ReminderDecision::NotAnOffset { .. } | ReminderDecision::Inactive => {
                    report.not_due += 1;
                    continue;
                }
            };

            let text = reminder.render(&target.customer_name);
            let outcome = tokio::time::timeout(self.send_timeout, self.notifier.send(&target.destination, &text)).await;

            match outcome {
                Ok(Ok(())) => {
                    report.sent += 1;
                    debug!(reminder_id = %reminder.id, days_until_expiry, "Reminder sent");
                    if let Err(e) = self.store.mark_reminder_sent(reminder.id, today).await {
                        report.unrecorded += 1;
                        warn!(reminder_id = %reminder.id, error = %e, "Reminder sent but not recorded");
                    }
                }
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(reminder_id = %reminder.id, customer_id = %reminder.customer_id, error = %e, "Reminder send failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(
                        reminder_id = %reminder.id,
                        customer_id = %reminder.customer_id,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "Reminder send timed out"
                    );
                }
            }
        }

        info!(
            examined = report.examined,
            sent = report.sent,
            failed = report.failed,
            unrecorded = report.unrecorded,
            "Reminder sweep finished"
        );
        Ok(report)
    }
}

/// Rows changed by one status sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSweepReport {
    pub renewals_expired: u64,
    pub renewals_expiring: u64,
    pub invoices_overdue: u64,
}

/// Moves renewals and invoices to the status their dates imply
pub struct StatusSweeper {
    store: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
    expiring_window_days: u64,
}

impl StatusSweeper {
    pub fn new(store: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            expiring_window_days: EXPIRING_WINDOW_DAYS,
        }
    }

    pub fn with_expiring_window_days(mut self, days: u64) -> Self {
        self.expiring_window_days = days;
        self
    }

    /// Runs the three transitions in order
    ///
    /// 1. renewals past their expiry date and not yet expired become expired
    /// 2. active renewals expiring within the window become expiring
    /// 3. sent invoices past their due date become overdue
    ///
    /// Expiring runs after expiry so a renewal that lapsed yesterday is
    /// expired rather than left expiring.
    pub async fn run_status_sweep(&self) -> Result<StatusSweepReport, BillingError> {
        let today = self.clock.today();

        let renewals_expired = self.store.expire_renewals(today).await?;
        let window = DateRange::days_from(today, self.expiring_window_days);
        let renewals_expiring = self.store.mark_expiring_renewals(window).await?;
        let invoices_overdue = self.store.mark_overdue_invoices(today).await?;

        let report = StatusSweepReport {
            renewals_expired,
            renewals_expiring,
            invoices_overdue,
        };
        info!(
            %today,
            renewals_expired,
            renewals_expiring,
            invoices_overdue,
            "Status sweep finished"
        );
        Ok(report)
    }
}
