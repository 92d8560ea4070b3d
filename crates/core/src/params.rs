//! Per-workflow parameter builders.
//!
//! One pure, total builder per workflow type. Builders fail only when a
//! required asset is absent ([`CoreError::MissingAsset`]); constraint
//! checking (duration sets, reference counts, segment sums) is the
//! validator's job so that a bad payload is reported as a validation
//! failure, not a missing input.
//!
//! [`WorkflowParams`] is a closed tagged union: the Interpolation variant
//! has no reference-image field and the Ingredients variant has no
//! terminal-frame field, so the mutual-exclusion invariant between the two
//! is structural rather than checked.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::manifest::{SceneMetadata, TimestampedSegment};
use crate::types::AssetRef;
use crate::workflow::WorkflowType;

// ---------------------------------------------------------------------------
// Platform constraints
// ---------------------------------------------------------------------------

/// Clip durations the generation platform accepts for single-shot
/// workflows (Interpolation, Ingredients), in seconds.
pub const ALLOWED_CLIP_DURATIONS_SECS: &[f64] = &[4.0, 5.0, 6.0, 8.0];

/// Maximum number of subject/style reference images per request.
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// Tolerance when comparing a timestamped scene's segment sum to its
/// declared duration, in seconds.
pub const SEGMENT_SUM_EPSILON_SECS: f64 = 0.2;

/// Hard ceiling on a single generated clip, in seconds.
pub const PLATFORM_MAX_DURATION_SECS: f64 = 60.0;

// ---------------------------------------------------------------------------
// Resolved scene assets
// ---------------------------------------------------------------------------

/// Assets resolved from a video job's dependency outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneAssets {
    pub first_frame: Option<AssetRef>,
    pub last_frame: Option<AssetRef>,
    /// Character reference sheets, in manifest order.
    pub character_refs: Vec<AssetRef>,
    /// Optional style references (TextToVideo only).
    pub style_refs: Vec<AssetRef>,
}

impl SceneAssets {
    pub fn has_both_keyframes(&self) -> bool {
        self.first_frame.is_some() && self.last_frame.is_some()
    }

    pub fn has_character_refs(&self) -> bool {
        !self.character_refs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Built parameters
// ---------------------------------------------------------------------------

/// Strategy-specific request payload, ready for validation and dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum WorkflowParams {
    Interpolation {
        prompt: String,
        first_frame: AssetRef,
        last_frame: AssetRef,
        duration_secs: f64,
        aspect_ratio: String,
    },
    Ingredients {
        prompt: String,
        references: Vec<AssetRef>,
        duration_secs: f64,
        aspect_ratio: String,
    },
    Timestamp {
        /// Concatenated `[start-end] prompt` lines, one per segment.
        prompt: String,
        segments: Vec<TimestampedSegment>,
        scene_duration_secs: f64,
    },
    ImageToVideo {
        prompt: String,
        start_frame: AssetRef,
        duration_secs: f64,
    },
    TextToVideo {
        prompt: String,
        duration_secs: f64,
        /// Affect style only, never motion.
        style_references: Vec<AssetRef>,
    },
}

impl WorkflowParams {
    /// The workflow this payload was built for.
    pub fn workflow(&self) -> WorkflowType {
        match self {
            WorkflowParams::Interpolation { .. } => WorkflowType::Interpolation,
            WorkflowParams::Ingredients { .. } => WorkflowType::Ingredients,
            WorkflowParams::Timestamp { .. } => WorkflowType::Timestamp,
            WorkflowParams::ImageToVideo { .. } => WorkflowType::ImageToVideo,
            WorkflowParams::TextToVideo { .. } => WorkflowType::TextToVideo,
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Build the request payload for the chosen workflow.
pub fn build_params(
    workflow: WorkflowType,
    scene: &SceneMetadata,
    assets: &SceneAssets,
) -> Result<WorkflowParams, CoreError> {
    match workflow {
        WorkflowType::Interpolation => build_interpolation(scene, assets),
        WorkflowType::Ingredients => build_ingredients(scene, assets),
        WorkflowType::Timestamp => build_timestamp(scene),
        WorkflowType::ImageToVideo => build_image_to_video(scene, assets),
        WorkflowType::TextToVideo => Ok(build_text_to_video(scene, assets)),
    }
}

fn build_interpolation(
    scene: &SceneMetadata,
    assets: &SceneAssets,
) -> Result<WorkflowParams, CoreError> {
    let first_frame = assets
        .first_frame
        .clone()
        .ok_or_else(|| CoreError::missing("first keyframe"))?;
    let last_frame = assets
        .last_frame
        .clone()
        .ok_or_else(|| CoreError::missing("last keyframe"))?;
    Ok(WorkflowParams::Interpolation {
        prompt: scene.prompt.clone(),
        first_frame,
        last_frame,
        duration_secs: scene.duration_secs,
        aspect_ratio: scene.aspect_ratio.clone(),
    })
}

fn build_ingredients(
    scene: &SceneMetadata,
    assets: &SceneAssets,
) -> Result<WorkflowParams, CoreError> {
    if assets.character_refs.is_empty() {
        return Err(CoreError::missing("character reference images"));
    }
    Ok(WorkflowParams::Ingredients {
        prompt: scene.prompt.clone(),
        references: assets.character_refs.clone(),
        duration_secs: scene.duration_secs,
        aspect_ratio: scene.aspect_ratio.clone(),
    })
}

fn build_timestamp(scene: &SceneMetadata) -> Result<WorkflowParams, CoreError> {
    if scene.segments.is_empty() {
        return Err(CoreError::missing("timestamped segments"));
    }
    let prompt = scene
        .segments
        .iter()
        .map(|s| {
            format!(
                "[{:.1}s-{:.1}s] {}",
                s.start_secs,
                s.start_secs + s.duration_secs,
                s.prompt
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    Ok(WorkflowParams::Timestamp {
        prompt,
        segments: scene.segments.clone(),
        scene_duration_secs: scene.duration_secs,
    })
}

fn build_image_to_video(
    scene: &SceneMetadata,
    assets: &SceneAssets,
) -> Result<WorkflowParams, CoreError> {
    let start_frame = assets
        .first_frame
        .clone()
        .ok_or_else(|| CoreError::missing("starting keyframe"))?;
    Ok(WorkflowParams::ImageToVideo {
        prompt: scene.prompt.clone(),
        start_frame,
        duration_secs: scene.duration_secs,
    })
}

fn build_text_to_video(scene: &SceneMetadata, assets: &SceneAssets) -> WorkflowParams {
    WorkflowParams::TextToVideo {
        prompt: scene.prompt.clone(),
        duration_secs: scene.duration_secs,
        style_references: assets.style_refs.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::manifest::TransitionTechnique;

    fn scene(duration: f64) -> SceneMetadata {
        SceneMetadata {
            scene_id: "s01".to_string(),
            duration_secs: duration,
            prompt: "the hero walks into frame".to_string(),
            has_dialogue: false,
            transition: TransitionTechnique::Cut,
            segments: vec![],
            aspect_ratio: "16:9".to_string(),
        }
    }

    fn asset(path: &str) -> AssetRef {
        AssetRef::from_path(path)
    }

    #[test]
    fn interpolation_requires_both_keyframes() {
        let assets = SceneAssets {
            first_frame: Some(asset("first.png")),
            last_frame: None,
            ..Default::default()
        };
        let err = build_params(WorkflowType::Interpolation, &scene(6.0), &assets).unwrap_err();
        assert_matches!(err, CoreError::MissingAsset { ref role } if role.contains("last"));
    }

    #[test]
    fn interpolation_carries_scene_duration_and_aspect() {
        let assets = SceneAssets {
            first_frame: Some(asset("first.png")),
            last_frame: Some(asset("last.png")),
            ..Default::default()
        };
        let params = build_params(WorkflowType::Interpolation, &scene(6.0), &assets).unwrap();
        assert_matches!(
            params,
            WorkflowParams::Interpolation { duration_secs, ref aspect_ratio, .. }
                if duration_secs == 6.0 && aspect_ratio == "16:9"
        );
    }

    #[test]
    fn ingredients_requires_references() {
        let err =
            build_params(WorkflowType::Ingredients, &scene(5.0), &SceneAssets::default())
                .unwrap_err();
        assert_matches!(err, CoreError::MissingAsset { .. });
    }

    #[test]
    fn timestamp_concatenates_segment_prompts() {
        let mut s = scene(8.0);
        s.transition = TransitionTechnique::TimestampedSegments;
        s.segments = vec![
            TimestampedSegment {
                start_secs: 0.0,
                duration_secs: 4.0,
                prompt: "door opens".to_string(),
            },
            TimestampedSegment {
                start_secs: 4.0,
                duration_secs: 4.0,
                prompt: "lights flicker".to_string(),
            },
        ];
        let params = build_params(WorkflowType::Timestamp, &s, &SceneAssets::default()).unwrap();
        assert_matches!(params, WorkflowParams::Timestamp { ref prompt, .. } => {
            assert!(prompt.contains("[0.0s-4.0s] door opens"));
            assert!(prompt.contains("[4.0s-8.0s] lights flicker"));
        });
    }

    #[test]
    fn timestamp_without_segments_is_missing_asset() {
        let err =
            build_params(WorkflowType::Timestamp, &scene(8.0), &SceneAssets::default())
                .unwrap_err();
        assert_matches!(err, CoreError::MissingAsset { .. });
    }

    #[test]
    fn image_to_video_takes_exactly_the_first_frame() {
        let assets = SceneAssets {
            first_frame: Some(asset("seed.png")),
            ..Default::default()
        };
        let params = build_params(WorkflowType::ImageToVideo, &scene(4.0), &assets).unwrap();
        assert_matches!(
            params,
            WorkflowParams::ImageToVideo { ref start_frame, .. } if start_frame.path == "seed.png"
        );
    }

    #[test]
    fn text_to_video_is_total() {
        let params =
            build_params(WorkflowType::TextToVideo, &scene(5.0), &SceneAssets::default())
                .unwrap();
        assert_matches!(params, WorkflowParams::TextToVideo { ref style_references, .. }
            if style_references.is_empty());
    }
}
