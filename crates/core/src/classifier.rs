//! Workflow classification rules.
//!
//! Everything here is deterministic. The async half — asking the reasoning
//! collaborator to score the rubric in `LlmIntelligent` mode — lives in the
//! pipeline crate and feeds its answer back through
//! [`classify_from_rubric`]; the fallback paths all land in
//! [`classify_structural`].

use serde::{Deserialize, Serialize};

use crate::manifest::{SceneMetadata, TransitionTechnique};
use crate::params::SceneAssets;
use crate::workflow::{
    ClassificationWarning, SelectionMode, WorkflowClassification, WorkflowConfig, WorkflowType,
};

// ---------------------------------------------------------------------------
// Rubric
// ---------------------------------------------------------------------------

/// Number of criteria in the Interpolation-vs-Ingredients rubric.
pub const RUBRIC_CRITERIA_TOTAL: u8 = 5;

/// Minimum satisfied criteria for the rubric to choose Interpolation.
pub const RUBRIC_INTERPOLATION_THRESHOLD: u8 = 3;

/// The reasoning collaborator's verdict on the five rubric criteria for a
/// scene. Each criterion, when satisfied, favors frame interpolation over
/// reference-based composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricAssessment {
    /// Subject position is near-static between first and last frame.
    pub subject_static: bool,
    /// Framing change is gradual, not wide shot to extreme close-up.
    pub framing_gradual: bool,
    /// Both frames share the same location / spatial continuity holds.
    pub spatially_continuous: bool,
    /// Camera movement is explicitly described in the prompt.
    pub camera_movement_described: bool,
    /// Background is not excessively complex.
    pub background_simple: bool,
}

impl RubricAssessment {
    /// How many of the five criteria hold.
    pub fn satisfied_count(&self) -> u8 {
        [
            self.subject_static,
            self.framing_gradual,
            self.spatially_continuous,
            self.camera_movement_described,
            self.background_simple,
        ]
        .into_iter()
        .filter(|c| *c)
        .count() as u8
    }

    /// Whether the rubric favors Interpolation.
    pub fn favors_interpolation(&self) -> bool {
        self.satisfied_count() >= RUBRIC_INTERPOLATION_THRESHOLD
    }
}

// ---------------------------------------------------------------------------
// Structural eligibility
// ---------------------------------------------------------------------------

/// Whether the scene's available assets structurally support `workflow`.
///
/// TextToVideo is always constructible and therefore never *eligible* in
/// the structural sense; it is the fallback when nothing else is.
pub fn structurally_supports(
    workflow: WorkflowType,
    scene: &SceneMetadata,
    assets: &SceneAssets,
) -> bool {
    match workflow {
        WorkflowType::Interpolation => assets.has_both_keyframes(),
        WorkflowType::Ingredients => assets.has_character_refs() && scene.has_dialogue,
        WorkflowType::Timestamp => {
            scene.transition == TransitionTechnique::TimestampedSegments
                && !scene.segments.is_empty()
        }
        // A lone starting frame; when the last frame also exists the scene
        // is Interpolation territory, not ImageToVideo.
        WorkflowType::ImageToVideo => {
            assets.first_frame.is_some() && assets.last_frame.is_none()
        }
        WorkflowType::TextToVideo => false,
    }
}

/// Workflows structurally supported by the scene, intersected with the
/// enabled set, in precedence order.
pub fn eligible_workflows(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    config: &WorkflowConfig,
) -> Vec<WorkflowType> {
    WorkflowType::ALL
        .into_iter()
        .filter(|wf| config.enabled.contains(wf))
        .filter(|wf| structurally_supports(*wf, scene, assets))
        .collect()
}

/// Whether `LlmIntelligent` mode's rubric applies to this scene: both
/// Interpolation and Ingredients must be structurally eligible, which is
/// exactly the case where their mutually-exclusive parameter sets compete.
pub fn rubric_applies(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    config: &WorkflowConfig,
) -> bool {
    let eligible = eligible_workflows(scene, assets, config);
    eligible.contains(&WorkflowType::Interpolation)
        && eligible.contains(&WorkflowType::Ingredients)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a scene without consulting the reasoning collaborator.
///
/// Handles `ConfigDefault` and both forced modes directly; for
/// `LlmIntelligent` it produces the ConfigDefault answer, which is also
/// the documented fallback when the collaborator is unavailable.
pub fn classify_structural(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    config: &WorkflowConfig,
) -> WorkflowClassification {
    if let Some(forced) = config.selection_mode.forced_workflow() {
        return classify_forced(scene, assets, forced);
    }
    classify_config_default(scene, assets, config)
}

fn classify_forced(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    forced: WorkflowType,
) -> WorkflowClassification {
    let supported = structurally_supports(forced, scene, assets);
    let mut warnings = Vec::new();
    if !supported {
        warnings.push(ClassificationWarning::ForcedWithoutStructuralSupport);
    }
    WorkflowClassification {
        scene_id: scene.scene_id.clone(),
        workflow: forced,
        reason: format!(
            "selection mode forces {}{}",
            forced.as_str(),
            if supported {
                ""
            } else {
                "; scene lacks structural support"
            }
        ),
        warnings,
    }
}

fn classify_config_default(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    config: &WorkflowConfig,
) -> WorkflowClassification {
    let eligible = eligible_workflows(scene, assets, config);
    let scene_id = scene.scene_id.clone();
    match eligible.as_slice() {
        [] => WorkflowClassification {
            scene_id,
            workflow: WorkflowType::TextToVideo,
            reason: "no workflow structurally eligible; falling back to text_to_video"
                .to_string(),
            warnings: vec![],
        },
        [only] => WorkflowClassification {
            scene_id,
            workflow: *only,
            reason: format!("sole structural match: {}", only.as_str()),
            warnings: vec![],
        },
        several => {
            if several.contains(&config.default_workflow) {
                WorkflowClassification {
                    scene_id,
                    workflow: config.default_workflow,
                    reason: format!(
                        "{} workflows eligible; configured default {} applies",
                        several.len(),
                        config.default_workflow.as_str()
                    ),
                    warnings: vec![],
                }
            } else {
                // Precedence order decides rather than dispatching a
                // payload the validator is guaranteed to reject.
                WorkflowClassification {
                    scene_id,
                    workflow: several[0],
                    reason: format!(
                        "{} workflows eligible; default {} not among them, \
                         highest-precedence {} chosen",
                        several.len(),
                        config.default_workflow.as_str(),
                        several[0].as_str()
                    ),
                    warnings: vec![ClassificationWarning::DefaultNotStructurallyEligible],
                }
            }
        }
    }
}

/// Resolve an applicable rubric assessment into a classification.
///
/// ≥ [`RUBRIC_INTERPOLATION_THRESHOLD`] satisfied criteria choose
/// Interpolation, otherwise Ingredients.
pub fn classify_from_rubric(
    scene: &SceneMetadata,
    assessment: &RubricAssessment,
) -> WorkflowClassification {
    let satisfied = assessment.satisfied_count();
    let workflow = if assessment.favors_interpolation() {
        WorkflowType::Interpolation
    } else {
        WorkflowType::Ingredients
    };
    WorkflowClassification {
        scene_id: scene.scene_id.clone(),
        workflow,
        reason: format!(
            "rubric: {satisfied}/{RUBRIC_CRITERIA_TOTAL} criteria favor interpolation \
             (threshold {RUBRIC_INTERPOLATION_THRESHOLD})"
        ),
        warnings: vec![],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TimestampedSegment;
    use crate::types::AssetRef;

    fn scene() -> SceneMetadata {
        SceneMetadata {
            scene_id: "s01".to_string(),
            duration_secs: 6.0,
            prompt: "the hero crosses the bridge".to_string(),
            has_dialogue: false,
            transition: TransitionTechnique::Cut,
            segments: vec![],
            aspect_ratio: "16:9".to_string(),
        }
    }

    fn both_keyframes() -> SceneAssets {
        SceneAssets {
            first_frame: Some(AssetRef::from_path("first.png")),
            last_frame: Some(AssetRef::from_path("last.png")),
            ..Default::default()
        }
    }

    fn character_refs() -> SceneAssets {
        SceneAssets {
            character_refs: vec![AssetRef::from_path("hero.png")],
            ..Default::default()
        }
    }

    fn config_with_default(default: WorkflowType) -> WorkflowConfig {
        WorkflowConfig {
            default_workflow: default,
            ..Default::default()
        }
    }

    // -- Structural eligibility --

    #[test]
    fn both_keyframes_make_interpolation_the_sole_match() {
        // Default workflow deliberately points elsewhere: the sole
        // structural match must win regardless.
        let config = config_with_default(WorkflowType::Ingredients);
        let result = classify_structural(&scene(), &both_keyframes(), &config);
        assert_eq!(result.workflow, WorkflowType::Interpolation);
        assert!(result.warnings.is_empty());
        assert!(result.reason.contains("sole structural match"));
    }

    #[test]
    fn refs_plus_dialogue_classify_as_ingredients() {
        let mut s = scene();
        s.has_dialogue = true;
        let config = config_with_default(WorkflowType::TextToVideo);
        let result = classify_structural(&s, &character_refs(), &config);
        assert_eq!(result.workflow, WorkflowType::Ingredients);
    }

    #[test]
    fn refs_without_dialogue_do_not_support_ingredients() {
        let result = classify_structural(
            &scene(),
            &character_refs(),
            &WorkflowConfig::default(),
        );
        assert_eq!(result.workflow, WorkflowType::TextToVideo);
    }

    #[test]
    fn lone_first_frame_classifies_as_image_to_video() {
        let assets = SceneAssets {
            first_frame: Some(AssetRef::from_path("seed.png")),
            ..Default::default()
        };
        let result = classify_structural(&scene(), &assets, &WorkflowConfig::default());
        assert_eq!(result.workflow, WorkflowType::ImageToVideo);
    }

    #[test]
    fn timestamped_scene_classifies_as_timestamp() {
        let mut s = scene();
        s.transition = TransitionTechnique::TimestampedSegments;
        s.segments = vec![TimestampedSegment {
            start_secs: 0.0,
            duration_secs: 6.0,
            prompt: "pan across".to_string(),
        }];
        let result =
            classify_structural(&s, &SceneAssets::default(), &WorkflowConfig::default());
        assert_eq!(result.workflow, WorkflowType::Timestamp);
    }

    #[test]
    fn nothing_eligible_falls_back_to_text_to_video() {
        let result = classify_structural(
            &scene(),
            &SceneAssets::default(),
            &WorkflowConfig::default(),
        );
        assert_eq!(result.workflow, WorkflowType::TextToVideo);
        assert!(result.reason.contains("falling back"));
    }

    #[test]
    fn multiple_eligible_returns_configured_default() {
        let mut s = scene();
        s.has_dialogue = true;
        let mut assets = both_keyframes();
        assets.character_refs = vec![AssetRef::from_path("hero.png")];
        let config = config_with_default(WorkflowType::Ingredients);
        let result = classify_structural(&s, &assets, &config);
        assert_eq!(result.workflow, WorkflowType::Ingredients);
    }

    #[test]
    fn ineligible_default_falls_to_precedence_with_warning() {
        let mut s = scene();
        s.has_dialogue = true;
        let mut assets = both_keyframes();
        assets.character_refs = vec![AssetRef::from_path("hero.png")];
        // Default TextToVideo is never structurally eligible.
        let config = config_with_default(WorkflowType::TextToVideo);
        let result = classify_structural(&s, &assets, &config);
        assert_eq!(result.workflow, WorkflowType::Interpolation);
        assert!(result
            .warnings
            .contains(&ClassificationWarning::DefaultNotStructurallyEligible));
    }

    #[test]
    fn disabled_workflow_is_not_eligible() {
        let mut config = config_with_default(WorkflowType::Ingredients);
        config.enabled.remove(&WorkflowType::Interpolation);
        let result = classify_structural(&scene(), &both_keyframes(), &config);
        // Both keyframes present but interpolation disabled; the lone
        // first frame no longer counts either (last frame exists).
        assert_eq!(result.workflow, WorkflowType::TextToVideo);
    }

    // -- Forced modes --

    #[test]
    fn forced_mode_without_support_carries_warning() {
        let mut config = WorkflowConfig::default();
        config.selection_mode = SelectionMode::AlwaysIngredients;
        let result = classify_structural(&scene(), &SceneAssets::default(), &config);
        assert_eq!(result.workflow, WorkflowType::Ingredients);
        assert!(result
            .warnings
            .contains(&ClassificationWarning::ForcedWithoutStructuralSupport));
    }

    #[test]
    fn forced_mode_with_support_is_clean() {
        let mut config = WorkflowConfig::default();
        config.selection_mode = SelectionMode::AlwaysInterpolation;
        let result = classify_structural(&scene(), &both_keyframes(), &config);
        assert_eq!(result.workflow, WorkflowType::Interpolation);
        assert!(result.warnings.is_empty());
    }

    // -- Rubric --

    #[test]
    fn rubric_applies_only_when_both_strategies_compete() {
        let mut s = scene();
        s.has_dialogue = true;
        let mut assets = both_keyframes();
        assets.character_refs = vec![AssetRef::from_path("hero.png")];
        assert!(rubric_applies(&s, &assets, &WorkflowConfig::default()));
        assert!(!rubric_applies(&s, &both_keyframes(), &WorkflowConfig::default()));
    }

    #[test]
    fn three_of_five_criteria_choose_interpolation() {
        let assessment = RubricAssessment {
            subject_static: true,
            framing_gradual: true,
            spatially_continuous: true,
            ..Default::default()
        };
        let result = classify_from_rubric(&scene(), &assessment);
        assert_eq!(result.workflow, WorkflowType::Interpolation);
        assert!(result.reason.contains("3/5"));
    }

    #[test]
    fn two_of_five_criteria_choose_ingredients() {
        let assessment = RubricAssessment {
            subject_static: true,
            background_simple: true,
            ..Default::default()
        };
        let result = classify_from_rubric(&scene(), &assessment);
        assert_eq!(result.workflow, WorkflowType::Ingredients);
    }

    #[test]
    fn all_criteria_satisfied_counts_five() {
        let assessment = RubricAssessment {
            subject_static: true,
            framing_gradual: true,
            spatially_continuous: true,
            camera_movement_described: true,
            background_simple: true,
        };
        assert_eq!(assessment.satisfied_count(), 5);
        assert!(assessment.favors_interpolation());
    }
}
