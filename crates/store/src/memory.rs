//! In-memory [`JobStore`] for tests and dry runs.
//!
//! A single `RwLock` over all state makes every operation — including the
//! snapshot-plus-job-rows write — trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use reelforge_core::job::{Job, JobStatus};
use reelforge_core::state::PipelineState;
use reelforge_core::types::{AssetRef, JobId};

use crate::error::StoreError;
use crate::job_store::{ClaimOutcome, JobStore};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Creation order, for stable listing.
    order: Vec<JobId>,
    /// Snapshot history per project, oldest first.
    states: HashMap<String, Vec<PipelineState>>,
}

/// Process-local job ledger.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots retained for a project (all revisions).
    pub async fn snapshot_count(&self, project_id: &str) -> usize {
        self.inner
            .read()
            .await
            .states
            .get(project_id)
            .map_or(0, Vec::len)
    }
}

fn get_mut<'a>(inner: &'a mut Inner, id: JobId) -> Result<&'a mut Job, StoreError> {
    inner
        .jobs
        .get_mut(&id)
        .ok_or_else(|| StoreError::not_found("job", id))
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: Job) -> Result<JobId, StoreError> {
        let mut inner = self.inner.write().await;
        let id = job.id;
        if inner.jobs.contains_key(&id) {
            return Err(StoreError::Conflict(format!("job {id} already exists")));
        }
        inner.order.push(id);
        inner.jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.inner
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job", id))
    }

    async fn list(
        &self,
        project_id: &str,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .filter(|job| job.project_id == project_id)
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect())
    }

    async fn claim(&self, id: JobId) -> Result<ClaimOutcome, StoreError> {
        let mut inner = self.inner.write().await;
        let job = get_mut(&mut inner, id)?;
        if job.status != JobStatus::Pending {
            return Ok(ClaimOutcome::Lost);
        }
        job.transition(JobStatus::InProgress)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(ClaimOutcome::Claimed(job.clone()))
    }

    async fn complete(&self, id: JobId, output: AssetRef) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = get_mut(&mut inner, id)?;
        job.transition(JobStatus::Completed)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        job.output = Some(output);
        job.error = None;
        Ok(())
    }

    async fn fail(&self, id: JobId, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = get_mut(&mut inner, id)?;
        job.transition(JobStatus::Failed)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        job.error = Some(error.to_string());
        Ok(())
    }

    async fn reset_for_retry(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = get_mut(&mut inner, id)?;
        job.reset_for_retry()
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn mark_skipped(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let job = get_mut(&mut inner, id)?;
        job.transition(JobStatus::Skipped)
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn save_state(
        &self,
        state: &PipelineState,
        touched: &[Job],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for job in touched {
            if !inner.jobs.contains_key(&job.id) {
                inner.order.push(job.id);
            }
            inner.jobs.insert(job.id, job.clone());
        }
        inner
            .states
            .entry(state.project_id.clone())
            .or_default()
            .push(state.clone());
        Ok(())
    }

    async fn load_state(
        &self,
        project_id: &str,
    ) -> Result<Option<PipelineState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .states
            .get(project_id)
            .and_then(|history| history.iter().max_by_key(|s| s.revision))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
