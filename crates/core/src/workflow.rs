//! Workflow types, selection configuration, and the retry policy.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Workflow type
// ---------------------------------------------------------------------------

/// The five mutually-exclusive video generation strategies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    /// Bridge between a first and last keyframe.
    Interpolation,
    /// Compose from subject reference images.
    Ingredients,
    /// Single prompt with concatenated timestamped segments.
    Timestamp,
    /// Animate a single starting image.
    ImageToVideo,
    /// Prompt-only generation.
    TextToVideo,
}

impl WorkflowType {
    /// All workflow types, in classifier precedence order.
    pub const ALL: [WorkflowType; 5] = [
        WorkflowType::Interpolation,
        WorkflowType::Ingredients,
        WorkflowType::Timestamp,
        WorkflowType::ImageToVideo,
        WorkflowType::TextToVideo,
    ];

    /// String representation for config, ledger, and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::Interpolation => "interpolation",
            WorkflowType::Ingredients => "ingredients",
            WorkflowType::Timestamp => "timestamp",
            WorkflowType::ImageToVideo => "image_to_video",
            WorkflowType::TextToVideo => "text_to_video",
        }
    }

    /// Parse a config string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "interpolation" => Some(WorkflowType::Interpolation),
            "ingredients" => Some(WorkflowType::Ingredients),
            "timestamp" => Some(WorkflowType::Timestamp),
            "image_to_video" => Some(WorkflowType::ImageToVideo),
            "text_to_video" => Some(WorkflowType::TextToVideo),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Selection mode
// ---------------------------------------------------------------------------

/// How the classifier chooses a workflow for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Structural eligibility, falling back to the configured default.
    ConfigDefault,
    /// Rubric evaluation by the reasoning collaborator when Interpolation
    /// and Ingredients are both structurally eligible.
    LlmIntelligent,
    /// Force Interpolation regardless of structural support.
    AlwaysInterpolation,
    /// Force Ingredients regardless of structural support.
    AlwaysIngredients,
}

impl SelectionMode {
    /// Parse a config string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "config_default" => Some(SelectionMode::ConfigDefault),
            "llm_intelligent" => Some(SelectionMode::LlmIntelligent),
            "always_interpolation" => Some(SelectionMode::AlwaysInterpolation),
            "always_ingredients" => Some(SelectionMode::AlwaysIngredients),
            _ => None,
        }
    }

    /// The workflow this mode forces, if it is a forced mode.
    pub fn forced_workflow(self) -> Option<WorkflowType> {
        match self {
            SelectionMode::AlwaysInterpolation => Some(WorkflowType::Interpolation),
            SelectionMode::AlwaysIngredients => Some(WorkflowType::Ingredients),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry resets per job.
    pub max_retries: u32,
    /// Base of the exponential delay, in seconds.
    pub backoff_base_secs: f64,
    /// Upper bound on any single delay, in seconds.
    pub max_backoff_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_secs: 2.0,
            max_backoff_secs: 60.0,
        }
    }
}

impl RetryPolicy {
    /// Whether a job at the given attempt count may be reset once more.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Deterministic delay before re-dispatching attempt `attempt`
    /// (1-based: the first retry waits `base^1`). Clamped to
    /// `max_backoff_secs`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let secs = self
            .backoff_base_secs
            .powi(attempt as i32)
            .min(self.max_backoff_secs);
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// `delay_for` with ±10% jitter to avoid retry herds.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let base = self.delay_for(attempt);
        let factor: f64 = rand::rng().random_range(0.9..=1.1);
        base.mul_f64(factor)
    }
}

// ---------------------------------------------------------------------------
// Workflow config
// ---------------------------------------------------------------------------

/// Default minimum success rate for a run to count as successful.
pub const DEFAULT_CONTINUATION_THRESHOLD: f64 = 0.7;

/// Default bounded worker pool size.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default per-job external-call timeout in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

/// Orchestrator-wide workflow selection and scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub selection_mode: SelectionMode,
    /// Returned by ConfigDefault when several workflows are eligible.
    pub default_workflow: WorkflowType,
    /// Workflows the deployment permits. Disabled workflows are excluded
    /// from structural eligibility.
    pub enabled: BTreeSet<WorkflowType>,
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Minimum `completed / (completed + failed + skipped)` for the run
    /// to report success.
    pub continuation_threshold: f64,
    pub job_timeout_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            selection_mode: SelectionMode::ConfigDefault,
            default_workflow: WorkflowType::TextToVideo,
            enabled: WorkflowType::ALL.into_iter().collect(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            continuation_threshold: DEFAULT_CONTINUATION_THRESHOLD,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

/// Non-fatal flags attached to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationWarning {
    /// A forced mode chose a workflow the scene cannot structurally
    /// support; the validator will reject the built payload.
    ForcedWithoutStructuralSupport,
    /// Several workflows were eligible but the configured default was not
    /// among them; precedence order decided instead.
    DefaultNotStructurallyEligible,
    /// The reasoning collaborator failed; ConfigDefault behavior was used.
    ReasoningUnavailable,
}

/// The classifier's decision for one scene, with its audit trail.
/// The reason is always populated — a choice is never silent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowClassification {
    pub scene_id: String,
    pub workflow: WorkflowType,
    pub reason: String,
    pub warnings: Vec<ClassificationWarning>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
