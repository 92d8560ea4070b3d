//! Immutable pipeline snapshots.
//!
//! A [`PipelineState`] is a value: every mutation produces a successor
//! with `revision + 1` and the prior snapshot stays in the store for
//! audit. Snapshots are written only by the stage driver, never by
//! individual workers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::job::JobType;
use crate::types::{JobId, ProjectId};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Manifest materialization; produces no generation jobs itself.
    Plan,
    Characters,
    Images,
    Video,
    Post,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Plan,
        Stage::Characters,
        Stage::Images,
        Stage::Video,
        Stage::Post,
    ];

    /// String representation for snapshots and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Characters => "characters",
            Stage::Images => "images",
            Stage::Video => "video",
            Stage::Post => "post",
        }
    }

    /// Job types dispatched during this stage. Audio clips run alongside
    /// video clips; both gate post-production the same way.
    pub fn job_types(self) -> &'static [JobType] {
        match self {
            Stage::Plan => &[],
            Stage::Characters => &[JobType::Character],
            Stage::Images => &[JobType::Image],
            Stage::Video => &[JobType::Video, JobType::Audio],
            Stage::Post => &[JobType::PostProduction],
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One persisted snapshot of a project's pipeline progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub project_id: ProjectId,
    /// Every job in the run, in manifest order.
    pub job_ids: Vec<JobId>,
    pub completed_stages: BTreeSet<Stage>,
    /// Opaque upstream plan payload, carried for audit.
    pub plan: serde_json::Value,
    /// Monotonic snapshot revision; the latest revision wins on load.
    pub revision: u32,
}

impl PipelineState {
    /// Initial snapshot for a freshly materialized manifest.
    pub fn new(
        project_id: impl Into<ProjectId>,
        job_ids: Vec<JobId>,
        plan: serde_json::Value,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            job_ids,
            completed_stages: BTreeSet::new(),
            plan,
            revision: 0,
        }
    }

    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Successor snapshot with `stage` flagged complete.
    pub fn with_stage_complete(&self, stage: Stage) -> Self {
        let mut next = self.clone();
        next.completed_stages.insert(stage);
        next.revision += 1;
        next
    }

    /// The first stage not yet flagged complete, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|stage| !self.is_stage_complete(*stage))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
