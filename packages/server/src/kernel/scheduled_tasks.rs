//! Scheduled escalation sweep using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every minute)
//!     │
//!     └─► run_escalation_sweep(now)
//!             ├─► follow-up due  → claim slot (CAS) → send reminder
//!             └─► budget spent   → pending → escalated
//!     └─► stream_hub.cleanup()   (drop per-issue topics nobody listens to)
//! ```
//!
//! The sweep is restartable: `shutdown` cancels the token and stops the
//! scheduler, `start` builds a fresh one. A tick that fires while the previous
//! sweep is still running is skipped.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::domains::dispatch::DispatchOrchestrator;

/// Every minute, on the minute (seconds-resolution cron).
pub const DEFAULT_SWEEP_CRON: &str = "0 * * * * *";

pub struct EscalationScheduler {
    scheduler: JobScheduler,
    token: CancellationToken,
}

impl EscalationScheduler {
    pub async fn start(orchestrator: DispatchOrchestrator, cron: &str) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        let token = CancellationToken::new();
        let in_flight = Arc::new(Mutex::new(()));

        let job_token = token.clone();
        let sweep_job = Job::new_async(cron, move |_uuid, _lock| {
            let orchestrator = orchestrator.clone();
            let token = job_token.clone();
            let in_flight = in_flight.clone();
            Box::pin(async move {
                if token.is_cancelled() {
                    return;
                }
                let Ok(_guard) = in_flight.try_lock() else {
                    tracing::debug!("Previous escalation sweep still running, skipping tick");
                    return;
                };
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("Escalation sweep interrupted by shutdown");
                    }
                    _ = run_sweep(&orchestrator) => {}
                }
            })
        })?;

        scheduler.add(sweep_job).await?;
        scheduler.start().await?;

        tracing::info!(cron = %cron, "Escalation sweep scheduled");
        Ok(Self { scheduler, token })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.token.cancel();
        self.scheduler.shutdown().await?;
        tracing::info!("Escalation sweep stopped");
        Ok(())
    }
}

/// One sweep pass plus stream housekeeping. Errors are logged; the next tick tries again.
pub async fn run_sweep(orchestrator: &DispatchOrchestrator) {
    if let Err(e) = orchestrator.run_escalation_sweep(Utc::now()).await {
        tracing::error!(error = %e, "Escalation sweep failed");
    }

    let dropped = orchestrator.deps().stream_hub.cleanup().await;
    if dropped > 0 {
        tracing::debug!(topics = dropped, "Dropped idle event topics");
    }
}
