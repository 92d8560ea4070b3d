//! Shared fixtures for orchestrator integration tests: a scripted
//! generation collaborator and manifest builders.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use reelforge_core::job::{FramePosition, JobPayload};
use reelforge_core::manifest::{JobSpec, Manifest, SceneMetadata, TransitionTechnique};
use reelforge_core::types::AssetRef;
use reelforge_core::workflow::{RetryPolicy, WorkflowConfig, WorkflowType};
use reelforge_pipeline::{CollaboratorError, GenerationCollaborator, GenerationRequest};

/// Install the test log subscriber once per binary.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ---------------------------------------------------------------------------
// Scripted collaborator
// ---------------------------------------------------------------------------

/// Stable label for scripting and call accounting.
pub fn request_label(request: &GenerationRequest) -> String {
    match request {
        GenerationRequest::Character { character_id, .. } => {
            format!("character:{character_id}")
        }
        GenerationRequest::Image {
            scene_id, frame, ..
        } => {
            let position = match frame {
                FramePosition::First => "first",
                FramePosition::Last => "last",
            };
            format!("image:{scene_id}:{position}")
        }
        GenerationRequest::Video { scene_id, .. } => format!("video:{scene_id}"),
        GenerationRequest::Audio { scene_id, .. } => format!("audio:{scene_id}"),
        GenerationRequest::PostProduction { .. } => "post".to_string(),
    }
}

enum Scripted {
    Fail(CollaboratorError),
    Hang,
}

/// Generation backend fake: succeeds with a deterministic asset path
/// unless a failure (or hang) was scripted for the request's label.
#[derive(Default)]
pub struct MockCollaborator {
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
}

impl MockCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `times` calls for `label` to fail with clones of
    /// `error`; later calls succeed again.
    pub fn fail_next(&self, label: &str, error: CollaboratorError, times: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(label.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(Scripted::Fail(error.clone()));
        }
    }

    /// Script the next `times` calls for `label` to hang until the
    /// per-job timeout fires.
    pub fn hang_next(&self, label: &str, times: usize) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(label.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(Scripted::Hang);
        }
    }

    pub fn call_count(&self, label: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.as_str() == label)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationCollaborator for MockCollaborator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<AssetRef, CollaboratorError> {
        let label = request_label(request);
        self.calls.lock().unwrap().push(label.clone());
        self.requests.lock().unwrap().push(request.clone());

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&label)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Hang) => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(CollaboratorError::Timeout)
            }
            None => Ok(AssetRef::from_path(format!("assets/{label}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest builders
// ---------------------------------------------------------------------------

pub fn scene(scene_id: &str, duration_secs: f64, has_dialogue: bool) -> SceneMetadata {
    SceneMetadata {
        scene_id: scene_id.to_string(),
        duration_secs,
        prompt: format!("scene {scene_id}"),
        has_dialogue,
        transition: TransitionTechnique::Cut,
        segments: vec![],
        aspect_ratio: "16:9".to_string(),
    }
}

pub fn character_spec(key: &str, character_id: &str) -> JobSpec {
    JobSpec {
        key: key.to_string(),
        payload: JobPayload::Character {
            character_id: character_id.to_string(),
            prompt: format!("reference sheet for {character_id}"),
            style: None,
        },
        depends_on: vec![],
    }
}

pub fn image_spec(
    key: &str,
    scene_id: &str,
    frame: FramePosition,
    deps: &[&str],
) -> JobSpec {
    JobSpec {
        key: key.to_string(),
        payload: JobPayload::Image {
            scene_id: scene_id.to_string(),
            prompt: format!("keyframe for {scene_id}"),
            frame,
        },
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn video_spec(key: &str, scene: SceneMetadata, deps: &[&str]) -> JobSpec {
    JobSpec {
        key: key.to_string(),
        payload: JobPayload::Video { scene },
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn audio_spec(key: &str, scene_id: &str) -> JobSpec {
    JobSpec {
        key: key.to_string(),
        payload: JobPayload::Audio {
            scene_id: scene_id.to_string(),
            dialogue: format!("dialogue for {scene_id}"),
            voice: None,
        },
        depends_on: vec![],
    }
}

pub fn post_spec(key: &str, scene_ids: &[&str], deps: &[&str]) -> JobSpec {
    JobSpec {
        key: key.to_string(),
        payload: JobPayload::PostProduction {
            scene_ids: scene_ids.iter().map(|s| s.to_string()).collect(),
        },
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
    }
}

pub fn manifest(project_id: &str, jobs: Vec<JobSpec>) -> Manifest {
    Manifest {
        project_id: project_id.to_string(),
        plan: serde_json::json!({"source": "test"}),
        jobs,
    }
}

/// Config with near-instant backoff so retry tests stay fast.
pub fn fast_config() -> WorkflowConfig {
    WorkflowConfig {
        default_workflow: WorkflowType::Ingredients,
        retry: RetryPolicy {
            max_retries: 3,
            backoff_base_secs: 0.01,
            max_backoff_secs: 0.05,
        },
        ..Default::default()
    }
}
