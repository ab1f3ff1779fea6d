//! Billing Worker
//!
//! Runs the billing core as a background process:
//!
//! - hourly reminder sweeps inside the business-hours window
//! - periodic status sweeps followed by generation of missing auto renewals
//!
//! Reminders go out through [`whatsapp::WhatsAppNotifier`]. Settings come
//! from [`config::WorkerConfig`].

pub mod config;
pub mod whatsapp;

use std::sync::Arc;
use std::time::Duration;

use core_kernel::Clock;
use domain_billing::{
    AutoGenerationService, BillingScheduler, BillingStore, Notifier, ReminderDispatcher, SchedulerConfig,
    StatusSweeper,
};

pub use config::{ConfigError, LogFormat, WorkerConfig};
pub use whatsapp::{WhatsAppConfig, WhatsAppNotifier};

/// The billing services sharing one store and clock
pub struct BillingServices {
    pub generator: Arc<AutoGenerationService>,
    pub dispatcher: Arc<ReminderDispatcher>,
    pub sweeper: Arc<StatusSweeper>,
    pub clock: Arc<dyn Clock>,
}

impl BillingServices {
    pub fn wire(
        store: Arc<dyn BillingStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            generator: Arc::new(AutoGenerationService::new(store.clone(), clock.clone())),
            dispatcher: Arc::new(
                ReminderDispatcher::new(store.clone(), notifier, clock.clone()).with_send_timeout(send_timeout),
            ),
            sweeper: Arc::new(StatusSweeper::new(store, clock.clone())),
            clock,
        }
    }

    /// Spawns the scheduled jobs on the current runtime
    pub fn start(&self, config: SchedulerConfig) -> BillingScheduler {
        BillingScheduler::start(
            config,
            self.dispatcher.clone(),
            self.sweeper.clone(),
            self.generator.clone(),
            self.clock.clone(),
        )
    }
}
