//! The persistence port the orchestrator schedules against.

use async_trait::async_trait;

use reelforge_core::job::{Job, JobStatus};
use reelforge_core::state::PipelineState;
use reelforge_core::types::{AssetRef, JobId};

use crate::error::StoreError;

/// Result of attempting to claim a pending job.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The compare-and-set succeeded; this caller owns the job.
    Claimed(Job),
    /// The job was no longer `Pending` — another worker got there first
    /// or the job was skipped. Callers drop the job silently.
    Lost,
}

/// Durable CRUD for job records and pipeline snapshots.
///
/// `claim` is the only way a worker starts a job: the Pending→InProgress
/// transition is a compare-and-set, so no two workers ever run the same
/// job. `save_state` persists the snapshot *and* the touched job rows in
/// one transaction so a crash never leaves a torn snapshot.
///
/// Implementations enforce the status state machine
/// ([`reelforge_core::job::validate_transition`]) and reject illegal
/// transitions with [`StoreError::Conflict`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job record. The job must be `Pending`.
    async fn create(&self, job: Job) -> Result<JobId, StoreError>;

    /// Fetch one job. Unknown id → [`StoreError::NotFound`].
    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// List a project's jobs in creation order, optionally filtered by
    /// status.
    async fn list(
        &self,
        project_id: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StoreError>;

    /// Atomic Pending→InProgress compare-and-set.
    async fn claim(&self, id: JobId) -> Result<ClaimOutcome, StoreError>;

    /// InProgress→Completed with the output reference. Completed jobs are
    /// immutable afterwards.
    async fn complete(&self, id: JobId, output: AssetRef) -> Result<(), StoreError>;

    /// InProgress→Failed with the error message. Whether a retry reset
    /// follows is the tracker's policy decision.
    async fn fail(&self, id: JobId, error: &str) -> Result<(), StoreError>;

    /// The explicit retry reset: Failed→Pending with attempt + 1.
    async fn reset_for_retry(&self, id: JobId) -> Result<(), StoreError>;

    /// Pending→Skipped (dependency permanently failed).
    async fn mark_skipped(&self, id: JobId) -> Result<(), StoreError>;

    /// Persist a snapshot together with the job rows it reflects, in one
    /// transaction.
    async fn save_state(
        &self,
        state: &PipelineState,
        touched: &[Job],
    ) -> Result<(), StoreError>;

    /// Latest snapshot for a project, if any run was started.
    async fn load_state(&self, project_id: &str)
        -> Result<Option<PipelineState>, StoreError>;
}
