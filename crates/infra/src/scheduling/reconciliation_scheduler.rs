//! Cron-driven reconciliation of every entity kind.
//!
//! One job per enabled [`KindSchedule`], each calling
//! [`SyncService::reconcile`] under a timeout. Overlapping runs of the same
//! kind are skipped by the reconciler itself, so a slow run never queues
//! up a second one. When the fiscal status check is enabled, invoices and
//! credit notes also get a job calling [`SyncService::refresh_fiscal_status`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use clinisync_core::SyncService;
//! use clinisync_domain::SyncConfig;
//! use clinisync_infra::scheduling::{
//!     ReconciliationScheduler, ReconciliationSchedulerConfig, SchedulerResult,
//! };
//!
//! # async fn example(service: Arc<SyncService>) -> SchedulerResult<()> {
//! let config = ReconciliationSchedulerConfig::from_sync_config(&SyncConfig::default());
//! let mut scheduler = ReconciliationScheduler::new(config, service);
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use clinisync_core::{FiscalRefreshReport, RunReport, SyncService};
use clinisync_domain::{EntityKind, FiscalStatusSchedule, KindSchedule, SyncConfig};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the reconciliation scheduler.
#[derive(Debug, Clone)]
pub struct ReconciliationSchedulerConfig {
    /// Cadence and batch size per kind. Disabled entries are not registered.
    pub schedules: Vec<KindSchedule>,
    pub fiscal_status: FiscalStatusSchedule,
    /// Timeout applied to a single reconciliation run.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
}

impl Default for ReconciliationSchedulerConfig {
    fn default() -> Self {
        Self::from_sync_config(&SyncConfig::default())
    }
}

impl ReconciliationSchedulerConfig {
    pub fn from_sync_config(sync: &SyncConfig) -> Self {
        Self {
            schedules: sync.schedules.clone(),
            fiscal_status: sync.fiscal_status.clone(),
            job_timeout: Duration::from_secs(sync.job_timeout_secs.max(1)),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// Reconciliation scheduler with explicit lifecycle management.
pub struct ReconciliationScheduler {
    scheduler: Option<JobScheduler>,
    config: ReconciliationSchedulerConfig,
    cancellation: CancellationToken,
    service: Arc<SyncService>,
}

impl ReconciliationScheduler {
    pub fn new(config: ReconciliationSchedulerConfig, service: Arc<SyncService>) -> Self {
        Self {
            scheduler: None,
            config,
            cancellation: CancellationToken::new(),
            service,
        }
    }

    /// Register one job per enabled kind and start ticking.
    ///
    /// # Errors
    /// `JobRegistrationFailed` for an invalid cron expression, `Timeout`
    /// when the scheduler does not start in time.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        info!(
            scheduler = "reconciliation",
            event = "start",
            jobs = self.enabled_schedules().count(),
            fiscal_jobs = self.fiscal_kinds().len(),
            "Reconciliation scheduler started"
        );
        Ok(())
    }

    /// Cancel every job and shut the scheduler down. Runs already in flight
    /// finish or hit their timeout; no new run starts.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let Some(mut scheduler) = self.scheduler.take() else {
            return Err(SchedulerError::NotRunning);
        };

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        info!(scheduler = "reconciliation", event = "stop", "Reconciliation scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    fn enabled_schedules(&self) -> impl Iterator<Item = &KindSchedule> {
        self.config.schedules.iter().filter(|schedule| schedule.enabled)
    }

    fn fiscal_kinds(&self) -> &'static [EntityKind] {
        if self.config.fiscal_status.enabled {
            &[EntityKind::Invoice, EntityKind::CreditNote]
        } else {
            &[]
        }
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        for schedule in self.enabled_schedules() {
            let kind = schedule.kind;
            let batch_size = schedule.batch_size.max(1);
            let service = self.service.clone();
            let cancel = self.cancellation.clone();
            let job_timeout = self.config.job_timeout;

            let job = Job::new_async(schedule.cron.as_str(), move |_id, _lock| {
                let service = service.clone();
                let cancel = cancel.clone();
                Box::pin(async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    run_job(&service, kind, batch_size, job_timeout).await;
                })
            })
            .map_err(|e| SchedulerError::JobRegistrationFailed {
                kind: kind.to_string(),
                reason: e.to_string(),
            })?;

            let job_id = job.guid();
            scheduler.add(job).await.map_err(|e| SchedulerError::JobRegistrationFailed {
                kind: kind.to_string(),
                reason: e.to_string(),
            })?;
            debug!(%kind, cron = %schedule.cron, batch_size, job_id = %job_id, "Registered reconciliation job");
        }

        let fiscal = &self.config.fiscal_status;
        for &kind in self.fiscal_kinds() {
            let batch_size = fiscal.batch_size.max(1);
            let service = self.service.clone();
            let cancel = self.cancellation.clone();
            let job_timeout = self.config.job_timeout;
            let registration_failed = |e: tokio_cron_scheduler::JobSchedulerError| {
                SchedulerError::JobRegistrationFailed {
                    kind: format!("{kind} fiscal status"),
                    reason: e.to_string(),
                }
            };

            let job = Job::new_async(fiscal.cron.as_str(), move |_id, _lock| {
                let service = service.clone();
                let cancel = cancel.clone();
                Box::pin(async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    run_fiscal_job(&service, kind, batch_size, job_timeout).await;
                })
            })
            .map_err(registration_failed)?;

            let job_id = job.guid();
            scheduler.add(job).await.map_err(registration_failed)?;
            debug!(%kind, cron = %fiscal.cron, batch_size, job_id = %job_id, "Registered fiscal status job");
        }

        Ok(scheduler)
    }
}

/// One scheduled run. Failures are logged, never raised: the next tick
/// retries whatever is still pending.
async fn run_job(
    service: &SyncService,
    kind: EntityKind,
    batch_size: usize,
    job_timeout: Duration,
) -> Option<RunReport> {
    let started = Instant::now();

    match tokio::time::timeout(job_timeout, service.reconcile(kind, batch_size)).await {
        Ok(Ok(report)) => {
            debug!(
                scheduler = "reconciliation",
                %kind,
                event = "job_complete",
                duration_ms = started.elapsed().as_millis() as u64,
                skipped = ?report.skipped,
                "Reconciliation job finished"
            );
            Some(report)
        }
        Ok(Err(err)) => {
            error!(
                scheduler = "reconciliation",
                %kind,
                error = %err,
                error_kind = err.kind_code(),
                "Reconciliation job failed"
            );
            None
        }
        Err(_) => {
            warn!(
                scheduler = "reconciliation",
                %kind,
                event = "job_timeout",
                timeout_secs = job_timeout.as_secs(),
                "Reconciliation job timed out"
            );
            None
        }
    }
}

/// One scheduled fiscal status check, logged like [`run_job`].
async fn run_fiscal_job(
    service: &SyncService,
    kind: EntityKind,
    batch_size: usize,
    job_timeout: Duration,
) -> Option<FiscalRefreshReport> {
    match tokio::time::timeout(job_timeout, service.refresh_fiscal_status(kind, batch_size)).await {
        Ok(Ok(report)) => Some(report),
        Ok(Err(err)) => {
            error!(
                scheduler = "reconciliation",
                %kind,
                error = %err,
                error_kind = err.kind_code(),
                "Fiscal status job failed"
            );
            None
        }
        Err(_) => {
            warn!(
                scheduler = "reconciliation",
                %kind,
                event = "job_timeout",
                timeout_secs = job_timeout.as_secs(),
                "Fiscal status job timed out"
            );
            None
        }
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                scheduler = "reconciliation",
                event = "drop_cancel",
                "ReconciliationScheduler dropped while running; cancelling tasks"
            );
            self.cancellation.cancel();
        }
    }
}
