//! Seams to the external generative backends.
//!
//! The orchestrator never talks HTTP itself; it hands a typed request to
//! whatever [`GenerationCollaborator`] was injected and classifies the
//! failure it gets back. Production implementations wrap the actual
//! image/video/speech services; tests inject scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reelforge_core::classifier::RubricAssessment;
use reelforge_core::job::FramePosition;
use reelforge_core::manifest::SceneMetadata;
use reelforge_core::params::WorkflowParams;
use reelforge_core::types::AssetRef;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Classified failure from a collaborator call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("rate limited by generation backend")]
    RateLimited,

    #[error("backend rejected the request: {0}")]
    InvalidRequest(String),

    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("backend call timed out")]
    Timeout,
}

impl CollaboratorError {
    /// Whether the orchestrator should retry with backoff.
    /// `InvalidRequest` is permanent: retrying identical bad parameters
    /// cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CollaboratorError::RateLimited
            | CollaboratorError::Transient(_)
            | CollaboratorError::Timeout => true,
            CollaboratorError::InvalidRequest(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Typed request dispatched to the generation backend.
///
/// Serialized form doubles as the content key for the write-once
/// generation memo, so the representation must be deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationRequest {
    Character {
        character_id: String,
        prompt: String,
        style: Option<String>,
    },
    Image {
        scene_id: String,
        prompt: String,
        frame: FramePosition,
        character_refs: Vec<AssetRef>,
    },
    Video {
        scene_id: String,
        params: WorkflowParams,
    },
    Audio {
        scene_id: String,
        dialogue: String,
        voice: Option<String>,
    },
    PostProduction {
        scene_ids: Vec<String>,
        clips: Vec<AssetRef>,
    },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The generative backend. The awaited call is the orchestrator's sole
/// suspension point per worker; calls are assumed idempotent-enough that
/// retrying after a transient failure is safe.
#[async_trait]
pub trait GenerationCollaborator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<AssetRef, CollaboratorError>;
}

/// The reasoning backend consulted by `LlmIntelligent` classification.
/// Failure here is never fatal — the classifier falls back to its
/// deterministic rules.
#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    async fn assess_scene(
        &self,
        scene: &SceneMetadata,
    ) -> Result<RubricAssessment, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
