//! Async workflow classification.
//!
//! `LlmIntelligent` mode needs a round-trip to the reasoning collaborator;
//! everything else — and every fallback path — is the deterministic logic
//! in [`reelforge_core::classifier`].

use reelforge_core::classifier::{classify_from_rubric, classify_structural, rubric_applies};
use reelforge_core::manifest::SceneMetadata;
use reelforge_core::params::SceneAssets;
use reelforge_core::workflow::{
    ClassificationWarning, SelectionMode, WorkflowClassification, WorkflowConfig,
};

use crate::collaborator::ReasoningCollaborator;

/// Classify a scene, consulting the reasoning collaborator when the mode
/// and the scene's structure call for it.
///
/// Collaborator failure (or absence) degrades to ConfigDefault behavior
/// with a [`ClassificationWarning::ReasoningUnavailable`] flag — the
/// choice is still explained, never silent.
pub async fn classify_scene(
    scene: &SceneMetadata,
    assets: &SceneAssets,
    config: &WorkflowConfig,
    reasoner: Option<&dyn ReasoningCollaborator>,
) -> WorkflowClassification {
    if config.selection_mode == SelectionMode::LlmIntelligent
        && rubric_applies(scene, assets, config)
    {
        match reasoner {
            Some(reasoner) => match reasoner.assess_scene(scene).await {
                Ok(assessment) => {
                    tracing::debug!(
                        scene_id = %scene.scene_id,
                        satisfied = assessment.satisfied_count(),
                        "Rubric assessment received",
                    );
                    return classify_from_rubric(scene, &assessment);
                }
                Err(e) => {
                    tracing::warn!(
                        scene_id = %scene.scene_id,
                        error = %e,
                        "Reasoning collaborator failed; using structural fallback",
                    );
                }
            },
            None => {
                tracing::warn!(
                    scene_id = %scene.scene_id,
                    "LlmIntelligent mode but no reasoning collaborator configured",
                );
            }
        }
        let mut fallback = classify_structural(scene, assets, config);
        fallback
            .warnings
            .push(ClassificationWarning::ReasoningUnavailable);
        return fallback;
    }

    classify_structural(scene, assets, config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::collaborator::CollaboratorError;
    use reelforge_core::classifier::RubricAssessment;
    use reelforge_core::manifest::TransitionTechnique;
    use reelforge_core::types::AssetRef;
    use reelforge_core::workflow::WorkflowType;

    struct FixedReasoner(Result<RubricAssessment, CollaboratorError>);

    #[async_trait]
    impl ReasoningCollaborator for FixedReasoner {
        async fn assess_scene(
            &self,
            _scene: &SceneMetadata,
        ) -> Result<RubricAssessment, CollaboratorError> {
            self.0.clone()
        }
    }

    fn competing_scene() -> (SceneMetadata, SceneAssets) {
        let scene = SceneMetadata {
            scene_id: "s01".to_string(),
            duration_secs: 6.0,
            prompt: "two figures in a doorway".to_string(),
            has_dialogue: true,
            transition: TransitionTechnique::Interpolated,
            segments: vec![],
            aspect_ratio: "16:9".to_string(),
        };
        let assets = SceneAssets {
            first_frame: Some(AssetRef::from_path("first.png")),
            last_frame: Some(AssetRef::from_path("last.png")),
            character_refs: vec![AssetRef::from_path("hero.png")],
            style_refs: vec![],
        };
        (scene, assets)
    }

    fn llm_config() -> WorkflowConfig {
        WorkflowConfig {
            selection_mode: SelectionMode::LlmIntelligent,
            default_workflow: WorkflowType::Ingredients,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rubric_majority_chooses_interpolation() {
        let (scene, assets) = competing_scene();
        let reasoner = FixedReasoner(Ok(RubricAssessment {
            subject_static: true,
            framing_gradual: true,
            spatially_continuous: true,
            camera_movement_described: false,
            background_simple: false,
        }));
        let result =
            classify_scene(&scene, &assets, &llm_config(), Some(&reasoner)).await;
        assert_eq!(result.workflow, WorkflowType::Interpolation);
    }

    #[tokio::test]
    async fn rubric_minority_chooses_ingredients() {
        let (scene, assets) = competing_scene();
        let reasoner = FixedReasoner(Ok(RubricAssessment {
            subject_static: true,
            ..Default::default()
        }));
        let result =
            classify_scene(&scene, &assets, &llm_config(), Some(&reasoner)).await;
        assert_eq!(result.workflow, WorkflowType::Ingredients);
    }

    #[tokio::test]
    async fn collaborator_failure_falls_back_with_warning() {
        let (scene, assets) = competing_scene();
        let reasoner = FixedReasoner(Err(CollaboratorError::Timeout));
        let result =
            classify_scene(&scene, &assets, &llm_config(), Some(&reasoner)).await;
        // ConfigDefault behavior: default Ingredients is eligible here.
        assert_eq!(result.workflow, WorkflowType::Ingredients);
        assert!(result
            .warnings
            .contains(&ClassificationWarning::ReasoningUnavailable));
    }

    #[tokio::test]
    async fn rubric_skipped_when_strategies_do_not_compete() {
        let (scene, mut assets) = competing_scene();
        assets.character_refs.clear();
        // Reasoner would pick Ingredients, but it must not be consulted.
        let reasoner = FixedReasoner(Ok(RubricAssessment::default()));
        let result =
            classify_scene(&scene, &assets, &llm_config(), Some(&reasoner)).await;
        assert_eq!(result.workflow, WorkflowType::Interpolation);
        assert!(result.warnings.is_empty());
    }
}
