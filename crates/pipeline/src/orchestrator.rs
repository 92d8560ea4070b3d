//! The bounded-concurrency DAG scheduler.
//!
//! Jobs run when every dependency has reached a terminal-successful state
//! (`Completed` or `Skipped`). The walk is incremental rather than
//! pre-sorted: each completion or failure recomputes the ready set, which
//! is what lets failures prune branches dynamically — dependents of a
//! permanently failed job are marked `Skipped` instead of attempted.
//!
//! Ownership of truth: the store's claim compare-and-set decides who runs
//! a job; the in-memory job map here is the scheduler's working view and
//! is reconciled from worker outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use reelforge_core::job::{Job, JobPayload, JobStatus};
use reelforge_core::metrics::MetricsCollector;
use reelforge_core::params::{build_params, SceneAssets};
use reelforge_core::state::{PipelineState, Stage};
use reelforge_core::types::{AssetRef, JobId};
use reelforge_core::validator::validate_params;
use reelforge_core::workflow::{WorkflowConfig, WorkflowType};
use reelforge_store::tracker::FailureDisposition;
use reelforge_store::{ClaimOutcome, JobStore, JobTracker, StoreError};

use crate::cache::GenerationCache;
use crate::classify::classify_scene;
use crate::collaborator::{
    CollaboratorError, GenerationCollaborator, GenerationRequest, ReasoningCollaborator,
};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome counts for one stage run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Worker tasks spawned (includes re-dispatches after retry resets).
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Cancellation stopped dispatch while work remained; the stage must
    /// not be flagged complete.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// Worker plumbing
// ---------------------------------------------------------------------------

/// What a worker reports back to the scheduler loop.
enum WorkerOutcome {
    Completed {
        output: AssetRef,
        workflow: Option<WorkflowType>,
        latency_ms: u64,
    },
    FailedPermanent {
        error: String,
        workflow: Option<WorkflowType>,
        latency_ms: u64,
    },
    FailedRetryable {
        error: String,
        workflow: Option<WorkflowType>,
        latency_ms: u64,
    },
    /// The claim compare-and-set was lost; another worker owns the job.
    ClaimLost,
    /// The ledger itself failed — run-fatal, not a job failure.
    StoreFailed(StoreError),
}

/// Dependency outputs resolved before dispatch.
///
/// Dependencies are all terminal by the time a job is ready, so resolution
/// happens once, outside the worker.
#[derive(Default, Clone)]
struct ResolvedInputs {
    /// Keyframes and character references for classifier + builders.
    assets: SceneAssets,
    /// Finished clips (video + audio), for post-production.
    clips: Vec<AssetRef>,
    /// Roles of dependencies that ended without an output (skipped, or
    /// failed before producing one).
    missing: Vec<String>,
}

fn resolve_inputs(job: &Job, jobs: &HashMap<JobId, Job>) -> ResolvedInputs {
    use reelforge_core::job::FramePosition;

    let mut inputs = ResolvedInputs::default();
    for dep_id in &job.depends_on {
        let Some(dep) = jobs.get(dep_id) else {
            inputs.missing.push(format!("unknown dependency {dep_id}"));
            continue;
        };
        match (&dep.payload, &dep.output) {
            (JobPayload::Character { .. }, Some(output)) => {
                inputs.assets.character_refs.push(output.clone());
            }
            (JobPayload::Character { character_id, .. }, None) => {
                inputs
                    .missing
                    .push(format!("character reference \"{character_id}\""));
            }
            (JobPayload::Image { frame, .. }, Some(output)) => match frame {
                FramePosition::First => inputs.assets.first_frame = Some(output.clone()),
                FramePosition::Last => inputs.assets.last_frame = Some(output.clone()),
            },
            (JobPayload::Image { frame, scene_id, .. }, None) => {
                let position = match frame {
                    FramePosition::First => "first",
                    FramePosition::Last => "last",
                };
                inputs
                    .missing
                    .push(format!("{position} keyframe of scene \"{scene_id}\""));
            }
            (JobPayload::Video { .. }, Some(output)) => {
                inputs.clips.push(output.clone());
            }
            (JobPayload::Video { scene }, None) => {
                inputs
                    .missing
                    .push(format!("clip of scene \"{}\"", scene.scene_id));
            }
            (JobPayload::Audio { .. }, Some(output)) => {
                inputs.clips.push(output.clone());
            }
            (JobPayload::Audio { scene_id, .. }, None) => {
                inputs
                    .missing
                    .push(format!("audio of scene \"{scene_id}\""));
            }
            (JobPayload::PostProduction { .. }, _) => {}
        }
    }
    inputs
}

/// Everything a spawned worker needs, cheap to clone per dispatch.
#[derive(Clone)]
struct WorkerContext {
    tracker: JobTracker,
    collaborator: Arc<dyn GenerationCollaborator>,
    reasoner: Option<Arc<dyn ReasoningCollaborator>>,
    cache: Option<Arc<GenerationCache>>,
    config: Arc<WorkflowConfig>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Walks the job DAG for one stage at a time, dispatching ready jobs to a
/// bounded pool of workers and applying the retry/backoff policy.
pub struct AssetOrchestrator {
    tracker: JobTracker,
    collaborator: Arc<dyn GenerationCollaborator>,
    reasoner: Option<Arc<dyn ReasoningCollaborator>>,
    cache: Option<Arc<GenerationCache>>,
    config: Arc<WorkflowConfig>,
    metrics: Arc<MetricsCollector>,
}

impl AssetOrchestrator {
    pub fn new(
        tracker: JobTracker,
        collaborator: Arc<dyn GenerationCollaborator>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            tracker,
            collaborator,
            reasoner: None,
            cache: None,
            config: Arc::new(config),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn ReasoningCollaborator>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    pub fn with_cache(mut self, cache: Arc<GenerationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Run every job of one stage to a terminal state (or until
    /// cancellation stops dispatch).
    ///
    /// Jobs already `Completed` in the ledger are never re-dispatched —
    /// the ready set is derived purely from persisted statuses, which is
    /// what makes resume idempotent.
    pub async fn run_stage(
        &self,
        state: &PipelineState,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> Result<StageReport, PipelineError> {
        let project_id = state.project_id.as_str();
        let mut jobs: HashMap<JobId, Job> = self
            .tracker
            .jobs(project_id)
            .await?
            .into_iter()
            .map(|job| (job.id, job))
            .collect();

        // Stage jobs in manifest order.
        let stage_ids: Vec<JobId> = state
            .job_ids
            .iter()
            .copied()
            .filter(|id| {
                jobs.get(id)
                    .is_some_and(|job| stage.job_types().contains(&job.job_type))
            })
            .collect();

        tracing::info!(
            project_id,
            stage = stage.as_str(),
            jobs = stage_ids.len(),
            "Stage started",
        );

        let mut not_before: HashMap<JobId, Instant> = HashMap::new();
        let mut in_flight: JoinSet<(JobId, WorkerOutcome)> = JoinSet::new();
        let mut report = StageReport::default();

        loop {
            self.cascade_skips(&stage_ids, &mut jobs, &mut report).await?;

            if !cancel.is_cancelled() {
                self.dispatch_ready(
                    &stage_ids,
                    &mut jobs,
                    &not_before,
                    &mut in_flight,
                    &mut report,
                );
            }

            if in_flight.is_empty() {
                // Nothing running: wait out the earliest backoff, or stop.
                let now = Instant::now();
                let earliest = stage_ids
                    .iter()
                    .filter(|id| jobs.get(id).is_some_and(|j| j.status == JobStatus::Pending))
                    .filter_map(|id| not_before.get(id))
                    .filter(|at| **at > now)
                    .min()
                    .copied();
                match earliest {
                    Some(at) if !cancel.is_cancelled() => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(at.into()) => {}
                            _ = cancel.cancelled() => {}
                        }
                        continue;
                    }
                    _ => break,
                }
            }

            // In-flight jobs always run to completion; cancellation only
            // stops new dispatch.
            if let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((id, outcome)) => {
                        self.apply_outcome(id, outcome, &mut jobs, &mut not_before, &mut report)
                            .await?;
                    }
                    Err(e) => {
                        // The job stays InProgress in the ledger and is
                        // recovered as an orphan on the next resume.
                        tracing::error!(error = %e, "Worker task panicked");
                    }
                }
            }
        }

        report.interrupted = cancel.is_cancelled()
            && stage_ids
                .iter()
                .any(|id| jobs.get(id).is_some_and(|j| !j.status.is_terminal()));

        tracing::info!(
            project_id,
            stage = stage.as_str(),
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            interrupted = report.interrupted,
            "Stage finished",
        );
        Ok(report)
    }

    /// Mark pending stage jobs whose dependency permanently failed as
    /// `Skipped`, repeating until the cascade settles.
    async fn cascade_skips(
        &self,
        stage_ids: &[JobId],
        jobs: &mut HashMap<JobId, Job>,
        report: &mut StageReport,
    ) -> Result<(), PipelineError> {
        loop {
            let to_skip: Vec<JobId> = stage_ids
                .iter()
                .copied()
                .filter(|id| jobs.get(id).is_some_and(|j| j.status == JobStatus::Pending))
                .filter(|id| {
                    jobs[id].depends_on.iter().any(|dep| {
                        jobs.get(dep)
                            .is_some_and(|d| d.status == JobStatus::Failed)
                    })
                })
                .collect();
            if to_skip.is_empty() {
                return Ok(());
            }
            for id in to_skip {
                self.tracker.skip(id).await?;
                if let Some(job) = jobs.get_mut(&id) {
                    job.status = JobStatus::Skipped;
                }
                report.skipped += 1;
            }
        }
    }

    /// Spawn workers for ready jobs while pool capacity remains.
    fn dispatch_ready(
        &self,
        stage_ids: &[JobId],
        jobs: &mut HashMap<JobId, Job>,
        not_before: &HashMap<JobId, Instant>,
        in_flight: &mut JoinSet<(JobId, WorkerOutcome)>,
        report: &mut StageReport,
    ) {
        let now = Instant::now();
        let ready: Vec<JobId> = stage_ids
            .iter()
            .copied()
            .filter(|id| jobs.get(id).is_some_and(|j| j.status == JobStatus::Pending))
            .filter(|id| {
                jobs[id].depends_on.iter().all(|dep| {
                    jobs.get(dep)
                        .is_some_and(|d| d.status.satisfies_dependency())
                })
            })
            .filter(|id| not_before.get(id).is_none_or(|at| *at <= now))
            .collect();

        for id in ready {
            if in_flight.len() >= self.config.max_concurrency {
                break;
            }
            let job = jobs[&id].clone();
            let inputs = resolve_inputs(&job, jobs);
            let ctx = WorkerContext {
                tracker: self.tracker.clone(),
                collaborator: Arc::clone(&self.collaborator),
                reasoner: self.reasoner.clone(),
                cache: self.cache.clone(),
                config: Arc::clone(&self.config),
            };
            tracing::debug!(job_id = %id, job_type = job.job_type.as_str(), "Dispatching job");
            in_flight.spawn(async move {
                let outcome = execute_job(ctx, job, inputs).await;
                (id, outcome)
            });
            if let Some(job) = jobs.get_mut(&id) {
                job.status = JobStatus::InProgress;
            }
            report.dispatched += 1;
        }
    }

    /// Reconcile one worker outcome into the ledger and the working view.
    async fn apply_outcome(
        &self,
        id: JobId,
        outcome: WorkerOutcome,
        jobs: &mut HashMap<JobId, Job>,
        not_before: &mut HashMap<JobId, Instant>,
        report: &mut StageReport,
    ) -> Result<(), PipelineError> {
        let attempts = jobs.get(&id).map_or(0, |j| j.attempt);
        match outcome {
            WorkerOutcome::Completed {
                output,
                workflow,
                latency_ms,
            } => {
                self.tracker.complete(id, output.clone()).await?;
                if let Some(job) = jobs.get_mut(&id) {
                    job.status = JobStatus::Completed;
                    job.output = Some(output);
                }
                report.completed += 1;
                if let Some(workflow) = workflow {
                    self.metrics.record_success(workflow, attempts, latency_ms);
                }
            }
            WorkerOutcome::FailedPermanent {
                error,
                workflow,
                latency_ms,
            } => {
                self.tracker.fail_permanent(id, &error).await?;
                if let Some(job) = jobs.get_mut(&id) {
                    job.status = JobStatus::Failed;
                }
                report.failed += 1;
                if let Some(workflow) = workflow {
                    self.metrics.record_failure(workflow, attempts, latency_ms);
                }
            }
            WorkerOutcome::FailedRetryable {
                error,
                workflow,
                latency_ms,
            } => match self.tracker.fail_retryable(id, &error).await? {
                FailureDisposition::RetryScheduled { attempt, delay } => {
                    if let Some(job) = jobs.get_mut(&id) {
                        job.status = JobStatus::Pending;
                        job.attempt = attempt;
                    }
                    not_before.insert(id, Instant::now() + delay);
                }
                FailureDisposition::PermanentlyFailed => {
                    if let Some(job) = jobs.get_mut(&id) {
                        job.status = JobStatus::Failed;
                    }
                    report.failed += 1;
                    if let Some(workflow) = workflow {
                        self.metrics.record_failure(workflow, attempts, latency_ms);
                    }
                }
            },
            WorkerOutcome::ClaimLost => {
                // Another claimant owns the job; trust the ledger.
                let fresh = self.tracker.store().get(id).await?;
                jobs.insert(id, fresh);
            }
            WorkerOutcome::StoreFailed(e) => return Err(e.into()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Permanent request-construction failure.
struct BuildFailure {
    error: String,
    workflow: Option<WorkflowType>,
}

async fn execute_job(ctx: WorkerContext, job: Job, inputs: ResolvedInputs) -> WorkerOutcome {
    match ctx.tracker.claim(job.id).await {
        Ok(ClaimOutcome::Claimed(_)) => {}
        Ok(ClaimOutcome::Lost) => return WorkerOutcome::ClaimLost,
        Err(e) => return WorkerOutcome::StoreFailed(e),
    }

    let started = Instant::now();
    let (request, workflow) = match build_request(&ctx, &job, &inputs).await {
        Ok(pair) => pair,
        Err(BuildFailure { error, workflow }) => {
            return WorkerOutcome::FailedPermanent {
                error,
                workflow,
                latency_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    // Memo lookup: identical requests resolve to the first asset produced.
    let memo_key = match (&ctx.cache, serde_json::to_vec(&request)) {
        (Some(_), Ok(bytes)) => Some(GenerationCache::key_for(&bytes)),
        _ => None,
    };
    if let (Some(cache), Some(key)) = (&ctx.cache, &memo_key) {
        if let Some(asset) = cache.lookup(key).await {
            tracing::debug!(job_id = %job.id, key, "Generation memo hit");
            return WorkerOutcome::Completed {
                output: asset,
                workflow,
                latency_ms: started.elapsed().as_millis() as u64,
            };
        }
    }

    let timeout = Duration::from_secs(ctx.config.job_timeout_secs);
    let result = tokio::time::timeout(timeout, ctx.collaborator.generate(&request)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Err(_elapsed) => WorkerOutcome::FailedRetryable {
            error: CollaboratorError::Timeout.to_string(),
            workflow,
            latency_ms,
        },
        Ok(Err(e)) if e.is_retryable() => WorkerOutcome::FailedRetryable {
            error: e.to_string(),
            workflow,
            latency_ms,
        },
        Ok(Err(e)) => WorkerOutcome::FailedPermanent {
            error: e.to_string(),
            workflow,
            latency_ms,
        },
        Ok(Ok(asset)) => {
            if let (Some(cache), Some(key)) = (&ctx.cache, &memo_key) {
                if let Err(e) = cache.record(key, &asset).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Memo write failed");
                }
            }
            WorkerOutcome::Completed {
                output: asset,
                workflow,
                latency_ms,
            }
        }
    }
}

/// Turn a claimed job into a backend request.
///
/// Video jobs run Classifier → Builder → Validator here; any
/// [`reelforge_core::error::CoreError`] out of that chain is a permanent
/// failure routed through [`BuildFailure`].
async fn build_request(
    ctx: &WorkerContext,
    job: &Job,
    inputs: &ResolvedInputs,
) -> Result<(GenerationRequest, Option<WorkflowType>), BuildFailure> {
    let require_complete_inputs = |workflow: Option<WorkflowType>| -> Result<(), BuildFailure> {
        match inputs.missing.first() {
            Some(role) => Err(BuildFailure {
                error: format!("Missing required asset: {role}"),
                workflow,
            }),
            None => Ok(()),
        }
    };

    match &job.payload {
        JobPayload::Character {
            character_id,
            prompt,
            style,
        } => Ok((
            GenerationRequest::Character {
                character_id: character_id.clone(),
                prompt: prompt.clone(),
                style: style.clone(),
            },
            None,
        )),
        JobPayload::Image {
            scene_id,
            prompt,
            frame,
        } => {
            require_complete_inputs(None)?;
            Ok((
                GenerationRequest::Image {
                    scene_id: scene_id.clone(),
                    prompt: prompt.clone(),
                    frame: *frame,
                    character_refs: inputs.assets.character_refs.clone(),
                },
                None,
            ))
        }
        JobPayload::Video { scene } => {
            let classification = classify_scene(
                scene,
                &inputs.assets,
                &ctx.config,
                ctx.reasoner.as_deref(),
            )
            .await;
            tracing::info!(
                scene_id = %scene.scene_id,
                workflow = classification.workflow.as_str(),
                reason = %classification.reason,
                warnings = classification.warnings.len(),
                "Workflow classified",
            );
            let workflow = classification.workflow;

            let params = build_params(workflow, scene, &inputs.assets).map_err(|e| {
                BuildFailure {
                    error: e.to_string(),
                    workflow: Some(workflow),
                }
            })?;
            validate_params(&params).map_err(|e| BuildFailure {
                error: e.to_string(),
                workflow: Some(workflow),
            })?;
            Ok((
                GenerationRequest::Video {
                    scene_id: scene.scene_id.clone(),
                    params,
                },
                Some(workflow),
            ))
        }
        JobPayload::Audio {
            scene_id,
            dialogue,
            voice,
        } => Ok((
            GenerationRequest::Audio {
                scene_id: scene_id.clone(),
                dialogue: dialogue.clone(),
                voice: voice.clone(),
            },
            None,
        )),
        JobPayload::PostProduction { scene_ids } => {
            require_complete_inputs(None)?;
            Ok((
                GenerationRequest::PostProduction {
                    scene_ids: scene_ids.clone(),
                    clips: inputs.clips.clone(),
                },
                None,
            ))
        }
    }
}
