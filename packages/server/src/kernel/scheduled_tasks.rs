//! Scheduled booking sweeps using tokio-cron-scheduler.
//!
//! This module drives the three time-based booking transitions:
//! - Expire requests nobody answered within the expiry window
//! - Start sessions whose start time has arrived
//! - End sessions whose end time has passed (plus a grace period)
//!
//! # Architecture
//!
//! The scheduler is an explicit value owned by the process: build it, call
//! [`BookingScheduler::start`] at startup and [`BookingScheduler::shutdown`]
//! before exit. It keeps nothing between runs; every run starts from a fresh
//! database read, so several instances can run side by side.
//!
//! ```text
//! Scheduler (cron per sweep)
//!     │
//!     └─► run_with_retry(kind)
//!             └─► SweepRunner::run(kind)
//!                     └─► per booking: lock → machine → commit → effects
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::SweepConfig;
use crate::domains::bookings::sweeps::{SweepKind, SweepRunner, SweepStats, SweepWindows};
use crate::kernel::ServerDeps;

/// Longest pause between attempts of one scheduled run
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

pub struct BookingScheduler {
    runner: SweepRunner,
    config: SweepConfig,
    scheduler: Option<JobScheduler>,
}

impl BookingScheduler {
    pub fn new(deps: ServerDeps, config: SweepConfig) -> Self {
        let runner = SweepRunner::new(deps, SweepWindows::from(&config));
        Self {
            runner,
            config,
            scheduler: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Register one cron job per sweep and start ticking
    pub async fn start(&mut self) -> Result<()> {
        if self.scheduler.is_some() {
            warn!("booking scheduler already started");
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;

        for kind in SweepKind::ALL {
            let job = self.sweep_job(kind)?;
            scheduler
                .add(job)
                .await
                .with_context(|| format!("Failed to register {} sweep", kind))?;
        }

        scheduler
            .start()
            .await
            .context("Failed to start job scheduler")?;

        info!(
            expire_requests = %self.config.expire_requests_cron,
            start_sessions = %self.config.start_sessions_cron,
            end_sessions = %self.config.end_sessions_cron,
            "booking scheduler started"
        );

        self.scheduler = Some(scheduler);
        Ok(())
    }

    /// Stop scheduling new runs. A run already in flight finishes its current
    /// booking transaction on its own.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler
                .shutdown()
                .await
                .context("Failed to shut down job scheduler")?;
            info!("booking scheduler stopped");
        }
        Ok(())
    }

    fn sweep_job(&self, kind: SweepKind) -> Result<Job> {
        let cron = match kind {
            SweepKind::ExpireRequests => &self.config.expire_requests_cron,
            SweepKind::StartSessions => &self.config.start_sessions_cron,
            SweepKind::EndSessions => &self.config.end_sessions_cron,
        };

        let runner = self.runner.clone();
        let max_attempts = self.config.max_attempts;
        let base_delay = self.config.retry_base_delay;

        Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let runner = runner.clone();
            Box::pin(async move {
                if let Err(e) = run_with_retry(&runner, kind, max_attempts, base_delay).await {
                    error!(sweep = %kind, error = %e, "booking sweep failed");
                }
            })
        })
        .with_context(|| format!("Invalid cron expression for {} sweep: {}", kind, cron))
    }
}

/// Run one sweep, retrying the whole run with exponential backoff when it
/// aborts on an infrastructure error.
pub async fn run_with_retry(
    runner: &SweepRunner,
    kind: SweepKind,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<SweepStats> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match runner.run(kind).await {
            Ok(stats) => return Ok(stats),
            Err(e) if attempt < max_attempts => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    sweep = %kind,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "sweep run failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("{} sweep failed after {} attempts", kind, max_attempts)
                })
            }
        }
    }
}

/// `base * 2^(attempt - 1)`, capped
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}
