//! Typed query/update facade over a [`JobStore`].
//!
//! The tracker owns the retry *policy*: the store knows how to apply the
//! Failed→Pending reset, the tracker decides whether the bound allows it.
//! It is also where crash-orphaned `InProgress` jobs are recovered on
//! resume.

use std::sync::Arc;
use std::time::Duration;

use reelforge_core::job::{Job, JobStatus};
use reelforge_core::types::{AssetRef, JobId};
use reelforge_core::workflow::RetryPolicy;

use crate::error::StoreError;
use crate::job_store::{ClaimOutcome, JobStore};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What happened to a job after a retryable failure was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job was reset to `Pending`; re-dispatch after `delay`.
    RetryScheduled { attempt: u32, delay: Duration },
    /// The retry bound is exhausted; the job stays `Failed`.
    PermanentlyFailed,
}

/// Per-status job counts for one project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    /// `completed / (completed + failed + skipped)`.
    ///
    /// Skipped jobs count against the rate: their assets are missing from
    /// the deliverable. With no terminal jobs at all the rate is 1.0.
    pub fn success_rate(&self) -> f64 {
        let denominator = self.completed + self.failed + self.skipped;
        if denominator == 0 {
            return 1.0;
        }
        self.completed as f64 / denominator as f64
    }
}

/// Failed-job summary surfaced by `status()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailedJobSummary {
    pub job_id: JobId,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Typed API over the job ledger, shared by the orchestrator and driver.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    retry: RetryPolicy,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub async fn claim(&self, id: JobId) -> Result<ClaimOutcome, StoreError> {
        self.store.claim(id).await
    }

    pub async fn complete(&self, id: JobId, output: AssetRef) -> Result<(), StoreError> {
        self.store.complete(id, output).await
    }

    /// Record a permanent failure. Never retried.
    pub async fn fail_permanent(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        tracing::warn!(job_id = %id, error, "Job failed permanently");
        self.store.fail(id, error).await
    }

    /// Record a retryable failure and, if the bound allows, apply the
    /// retry reset. Returns the resulting disposition so the scheduler
    /// can arrange the backoff delay.
    pub async fn fail_retryable(
        &self,
        id: JobId,
        error: &str,
    ) -> Result<FailureDisposition, StoreError> {
        self.store.fail(id, error).await?;
        let job = self.store.get(id).await?;
        if !self.retry.allows_retry(job.attempt) {
            tracing::warn!(
                job_id = %id,
                attempt = job.attempt,
                max_retries = self.retry.max_retries,
                "Retry bound exhausted; job failed permanently",
            );
            return Ok(FailureDisposition::PermanentlyFailed);
        }
        self.store.reset_for_retry(id).await?;
        let attempt = job.attempt + 1;
        let delay = self.retry.jittered_delay_for(attempt);
        tracing::info!(
            job_id = %id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error,
            "Transient failure; retry scheduled",
        );
        Ok(FailureDisposition::RetryScheduled { attempt, delay })
    }

    /// Mark a pending job skipped because a dependency permanently failed.
    pub async fn skip(&self, id: JobId) -> Result<(), StoreError> {
        tracing::info!(job_id = %id, "Job skipped: dependency permanently failed");
        self.store.mark_skipped(id).await
    }

    /// All of a project's jobs, in creation order.
    pub async fn jobs(&self, project_id: &str) -> Result<Vec<Job>, StoreError> {
        self.store.list(project_id, None).await
    }

    /// Reset crash-orphaned `InProgress` jobs to `Pending` at resume.
    ///
    /// Counts against the retry bound like any other transient failure:
    /// a job that wedges the orchestrator on every attempt must still
    /// converge to `Failed`.
    pub async fn recover_orphans(&self, project_id: &str) -> Result<usize, StoreError> {
        let orphans = self
            .store
            .list(project_id, Some(JobStatus::InProgress))
            .await?;
        let mut recovered = 0;
        for job in orphans {
            match self
                .fail_retryable(job.id, "orchestrator stopped while job was in flight")
                .await?
            {
                FailureDisposition::RetryScheduled { .. } => recovered += 1,
                FailureDisposition::PermanentlyFailed => {}
            }
        }
        Ok(recovered)
    }

    /// Per-status counts for `status()` and the run gate.
    pub async fn counts(&self, project_id: &str) -> Result<StatusCounts, StoreError> {
        let jobs = self.jobs(project_id).await?;
        let mut counts = StatusCounts {
            total: jobs.len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Skipped => counts.skipped += 1,
            }
        }
        Ok(counts)
    }

    /// Ids and error summaries of permanently failed jobs.
    pub async fn failed_summaries(
        &self,
        project_id: &str,
    ) -> Result<Vec<FailedJobSummary>, StoreError> {
        let failed = self
            .store
            .list(project_id, Some(JobStatus::Failed))
            .await?;
        Ok(failed
            .into_iter()
            .map(|job| FailedJobSummary {
                job_id: job.id,
                error: job.error.unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
