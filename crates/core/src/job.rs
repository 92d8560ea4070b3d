//! Job records and the status state machine.
//!
//! A job is one unit of generation work. Its status moves monotonically
//! through the state machine below; the only back-edge is the explicit
//! retry reset (`Failed -> Pending`, attempt + 1), applied by the tracker
//! and bounded by the configured retry policy.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::manifest::SceneMetadata;
use crate::types::{AssetRef, JobId, ProjectId, Timestamp};

// ---------------------------------------------------------------------------
// Job type
// ---------------------------------------------------------------------------

/// Kind of generation work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Character reference sheet generation.
    Character,
    /// Keyframe image generation.
    Image,
    /// Video clip generation.
    Video,
    /// Dialogue / narration audio generation.
    Audio,
    /// Final mux / grade over finished clips.
    PostProduction,
}

impl JobType {
    /// String representation for ledger storage and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Character => "character",
            JobType::Image => "image",
            JobType::Video => "video",
            JobType::Audio => "audio",
            JobType::PostProduction => "post_production",
        }
    }
}

// ---------------------------------------------------------------------------
// Job status + state machine
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    /// String representation for ledger storage.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    /// Parse a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "skipped" => Some(JobStatus::Skipped),
            _ => None,
        }
    }

    /// Whether the status admits no further transitions (except the
    /// explicit retry reset out of `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }

    /// Whether a dependency in this status unblocks its dependents for
    /// scheduling. `Skipped` satisfies *scheduling* readiness; a dependent
    /// that actually needs the missing output fails at parameter-build
    /// time instead.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Skipped)
    }
}

/// Valid target statuses reachable from `from`.
///
/// `Completed` and `Skipped` are strictly terminal. `Failed` lists
/// `Pending` because of the retry reset; whether that reset is *allowed*
/// is a policy decision made by the tracker, not encoded here.
pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
    match from {
        JobStatus::Pending => &[JobStatus::InProgress, JobStatus::Skipped],
        JobStatus::InProgress => &[JobStatus::Completed, JobStatus::Failed],
        JobStatus::Failed => &[JobStatus::Pending],
        JobStatus::Completed | JobStatus::Skipped => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    valid_transitions(from).contains(&to)
}

/// Validate a transition, returning a descriptive error for invalid ones.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid status transition: {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Which keyframe of a scene an image job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePosition {
    First,
    Last,
}

/// Typed, closed per-job-type payload.
///
/// Modeled as a tagged union rather than an open map so required fields
/// are structurally enforced at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Character {
        character_id: String,
        prompt: String,
        style: Option<String>,
    },
    Image {
        scene_id: String,
        prompt: String,
        frame: FramePosition,
    },
    Video {
        scene: SceneMetadata,
    },
    Audio {
        scene_id: String,
        dialogue: String,
        voice: Option<String>,
    },
    PostProduction {
        scene_ids: Vec<String>,
    },
}

impl JobPayload {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Character { .. } => JobType::Character,
            JobPayload::Image { .. } => JobType::Image,
            JobPayload::Video { .. } => JobType::Video,
            JobPayload::Audio { .. } => JobType::Audio,
            JobPayload::PostProduction { .. } => JobType::PostProduction,
        }
    }
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// One unit of generation work in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub project_id: ProjectId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Jobs that must reach a terminal-successful state first.
    pub depends_on: Vec<JobId>,
    /// Number of retry resets applied so far (0 on first dispatch).
    pub attempt: u32,
    pub payload: JobPayload,
    pub error: Option<String>,
    pub output: Option<AssetRef>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        project_id: impl Into<ProjectId>,
        payload: JobPayload,
        depends_on: Vec<JobId>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            project_id: project_id.into(),
            job_type: payload.job_type(),
            status: JobStatus::Pending,
            depends_on,
            attempt: 0,
            payload,
            error: None,
            output: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a validated status transition in place.
    pub fn transition(&mut self, to: JobStatus) -> Result<(), CoreError> {
        validate_transition(self.status, to)?;
        self.status = to;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Apply the retry reset: `Failed -> Pending` with attempt + 1.
    ///
    /// The caller is responsible for checking the retry bound first.
    pub fn reset_for_retry(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Pending)?;
        self.attempt += 1;
        self.error = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
