//! Manifest input and job materialization.
//!
//! The manifest is produced upstream (scene planning, prompt authoring) and
//! is read-only here. `Manifest::build_jobs` is the single place where job
//! records come into existence, and the single place the dependency
//! relation is checked for cycles — the scheduler assumes an acyclic graph
//! at runtime.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::job::{Job, JobPayload};
use crate::types::{JobId, ProjectId};

/// Default aspect ratio applied when a scene declares none.
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

// ---------------------------------------------------------------------------
// Scene metadata
// ---------------------------------------------------------------------------

/// Declared transition technique for a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTechnique {
    /// Hard cut; no in-scene transition semantics.
    Cut,
    /// Scene should be bridged between two keyframes.
    Interpolated,
    /// Scene is authored as explicit timestamped sub-segments.
    TimestampedSegments,
}

/// One authored sub-segment of a timestamped scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSegment {
    pub start_secs: f64,
    pub duration_secs: f64,
    pub prompt: String,
}

/// Everything the classifier and parameter builders need to know about a
/// scene. Asset *presence* (keyframes, character references) is resolved
/// at dispatch time from dependency outputs, not declared twice here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub scene_id: String,
    pub duration_secs: f64,
    pub prompt: String,
    pub has_dialogue: bool,
    pub transition: TransitionTechnique,
    /// Authored sub-segments; only meaningful for `TimestampedSegments`.
    #[serde(default)]
    pub segments: Vec<TimestampedSegment>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One job in the manifest, with dependencies expressed as manifest-local
/// keys (stable strings assigned upstream, e.g. `"image:s01:first"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub key: String,
    pub payload: JobPayload,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Upstream-produced, dependency-annotated list of work for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub project_id: ProjectId,
    /// Opaque upstream plan payload, carried through into snapshots.
    #[serde(default)]
    pub plan: serde_json::Value,
    pub jobs: Vec<JobSpec>,
}

impl Manifest {
    /// Materialize pending [`Job`] records from the manifest.
    ///
    /// Fails with [`CoreError::Validation`] on duplicate or unknown keys
    /// and with [`CoreError::CycleDetected`] if the dependency relation is
    /// cyclic. Either failure aborts the run before anything is dispatched.
    pub fn build_jobs(&self) -> Result<Vec<Job>, CoreError> {
        self.check_cycles()?;

        let mut ids: HashMap<&str, JobId> = HashMap::with_capacity(self.jobs.len());
        for spec in &self.jobs {
            let id = uuid::Uuid::new_v4();
            if ids.insert(spec.key.as_str(), id).is_some() {
                return Err(CoreError::Validation(format!(
                    "Duplicate job key in manifest: \"{}\"",
                    spec.key
                )));
            }
        }

        let mut jobs = Vec::with_capacity(self.jobs.len());
        for spec in &self.jobs {
            let mut depends_on = Vec::with_capacity(spec.depends_on.len());
            for dep_key in &spec.depends_on {
                let dep_id = ids.get(dep_key.as_str()).ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Job \"{}\" depends on unknown key \"{dep_key}\"",
                        spec.key
                    ))
                })?;
                depends_on.push(*dep_id);
            }
            let mut job = Job::new(self.project_id.clone(), spec.payload.clone(), depends_on);
            job.id = ids[spec.key.as_str()];
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Three-color DFS over the key graph.
    fn check_cycles(&self) -> Result<(), CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        let index: HashMap<&str, &JobSpec> =
            self.jobs.iter().map(|s| (s.key.as_str(), s)).collect();
        let mut marks: HashMap<&str, Mark> = self
            .jobs
            .iter()
            .map(|s| (s.key.as_str(), Mark::Unvisited))
            .collect();

        fn visit<'a>(
            key: &'a str,
            index: &HashMap<&'a str, &'a JobSpec>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), CoreError> {
            match marks.get(key).copied() {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::InStack) => {
                    return Err(CoreError::CycleDetected(format!(
                        "cycle through job \"{key}\""
                    )));
                }
                _ => {}
            }
            marks.insert(key, Mark::InStack);
            if let Some(spec) = index.get(key) {
                for dep in &spec.depends_on {
                    // Unknown keys are reported by build_jobs; skip here.
                    if index.contains_key(dep.as_str()) {
                        visit(dep.as_str(), index, marks)?;
                    }
                }
            }
            marks.insert(key, Mark::Done);
            Ok(())
        }

        for spec in &self.jobs {
            visit(spec.key.as_str(), &index, &mut marks)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
