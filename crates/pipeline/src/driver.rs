//! The stage driver: composes stage runs over a [`PipelineState`],
//! snapshotting after each so a crashed run resumes exactly where it
//! stopped. Snapshots are written here and only here — workers never
//! touch pipeline state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use reelforge_core::manifest::Manifest;
use reelforge_core::metrics::MetricsCollector;
use reelforge_core::state::{PipelineState, Stage};
use reelforge_core::workflow::WorkflowConfig;
use reelforge_store::{FailedJobSummary, JobStore, JobTracker, StatusCounts};

use crate::cache::GenerationCache;
use crate::collaborator::{GenerationCollaborator, ReasoningCollaborator};
use crate::error::PipelineError;
use crate::orchestrator::AssetOrchestrator;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Whether the run cleared the continuation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    /// Success rate fell below the continuation threshold; some assets
    /// may exist but the run as a whole is reported failed.
    Failed,
}

/// Final report of a `run` or `resume`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: PipelineState,
    pub counts: StatusCounts,
    pub success_rate: f64,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }
}

/// Snapshot of a project's progress for `status()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStatus {
    pub counts: StatusCounts,
    /// Exactly what is incomplete, not a silently partial asset set.
    pub failed_jobs: Vec<FailedJobSummary>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Top-level operational surface of the orchestrator.
pub struct Pipeline {
    store: Arc<dyn JobStore>,
    tracker: JobTracker,
    orchestrator: AssetOrchestrator,
    config: WorkflowConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        collaborator: Arc<dyn GenerationCollaborator>,
        config: WorkflowConfig,
    ) -> Self {
        let tracker = JobTracker::new(Arc::clone(&store), config.retry.clone());
        let orchestrator =
            AssetOrchestrator::new(tracker.clone(), collaborator, config.clone());
        Self {
            store,
            tracker,
            orchestrator,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn ReasoningCollaborator>) -> Self {
        self.orchestrator = self.orchestrator.with_reasoner(reasoner);
        self
    }

    pub fn with_cache(mut self, cache: Arc<GenerationCache>) -> Self {
        self.orchestrator = self.orchestrator.with_cache(cache);
        self
    }

    /// Token that stops new dispatch when triggered. In-flight jobs
    /// finish (or hit their per-job timeout); the interrupted stage is
    /// not flagged complete, so `resume` picks it back up.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Per-workflow outcome ledger for this pipeline's runs.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.orchestrator.metrics()
    }

    /// Fresh run: materialize the manifest and drive every stage.
    ///
    /// Cycle or validation failures in the manifest abort here, before
    /// any job reaches `InProgress`.
    pub async fn run(&self, manifest: &Manifest) -> Result<RunReport, PipelineError> {
        let jobs = manifest.build_jobs()?;
        let job_ids = jobs.iter().map(|job| job.id).collect();

        tracing::info!(
            project_id = %manifest.project_id,
            jobs = jobs.len(),
            "Manifest materialized",
        );

        // Plan stage: the snapshot and every pending job row land in one
        // transaction.
        let state = PipelineState::new(
            manifest.project_id.clone(),
            job_ids,
            manifest.plan.clone(),
        )
        .with_stage_complete(Stage::Plan);
        self.store.save_state(&state, &jobs).await?;

        self.advance(state).await
    }

    /// Resume from the latest snapshot. `Completed` jobs are never
    /// re-dispatched; crash-orphaned `InProgress` jobs are reset first.
    pub async fn resume(&self, project_id: &str) -> Result<RunReport, PipelineError> {
        let state = self
            .store
            .load_state(project_id)
            .await?
            .ok_or_else(|| PipelineError::NothingToResume(project_id.to_string()))?;

        let recovered = self.tracker.recover_orphans(project_id).await?;
        if recovered > 0 {
            tracing::warn!(project_id, recovered, "Recovered orphaned in-flight jobs");
        }

        tracing::info!(
            project_id,
            revision = state.revision,
            next_stage = state.next_stage().map(Stage::as_str),
            "Resuming from snapshot",
        );
        self.advance(state).await
    }

    /// Current per-status counts plus failed-job summaries.
    pub async fn status(&self, project_id: &str) -> Result<PipelineStatus, PipelineError> {
        Ok(PipelineStatus {
            counts: self.tracker.counts(project_id).await?,
            failed_jobs: self.tracker.failed_summaries(project_id).await?,
        })
    }

    /// Drive stages in order, snapshotting after each.
    async fn advance(&self, mut state: PipelineState) -> Result<RunReport, PipelineError> {
        let project_id = state.project_id.clone();

        for stage in Stage::ALL {
            if state.is_stage_complete(stage) {
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let report = self
                .orchestrator
                .run_stage(&state, stage, &self.cancel)
                .await?;
            if report.interrupted {
                tracing::warn!(
                    project_id = %project_id,
                    stage = stage.as_str(),
                    "Stage interrupted by cancellation",
                );
                break;
            }

            state = state.with_stage_complete(stage);
            let touched = self.tracker.jobs(&project_id).await?;
            self.store.save_state(&state, &touched).await?;
        }

        let counts = self.tracker.counts(&project_id).await?;
        let success_rate = counts.success_rate();
        let outcome = if success_rate >= self.config.continuation_threshold {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };

        tracing::info!(
            project_id = %project_id,
            completed = counts.completed,
            failed = counts.failed,
            skipped = counts.skipped,
            success_rate,
            outcome = ?outcome,
            "Run finished",
        );
        Ok(RunReport {
            state,
            counts,
            success_rate,
            outcome,
        })
    }
}
