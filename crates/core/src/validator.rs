//! Pre-dispatch payload validation.
//!
//! Re-derives the chosen workflow's structural requirements against the
//! built payload. The builders only guarantee asset *presence*; everything
//! quantitative is re-checked here so a bad payload fails as a permanent
//! [`CoreError::Validation`] before any external call is made. Forced
//! selection modes rely on this: they classify with a warning instead of
//! failing, and the validator is the gate that actually rejects.

use crate::error::CoreError;
use crate::manifest::TimestampedSegment;
use crate::params::{
    WorkflowParams, ALLOWED_CLIP_DURATIONS_SECS, MAX_REFERENCE_IMAGES,
    PLATFORM_MAX_DURATION_SECS, SEGMENT_SUM_EPSILON_SECS,
};

/// Validate a built payload against its workflow's constraints.
pub fn validate_params(params: &WorkflowParams) -> Result<(), CoreError> {
    match params {
        WorkflowParams::Interpolation {
            prompt,
            first_frame,
            last_frame,
            duration_secs,
            ..
        } => {
            require_prompt(prompt)?;
            require_allowed_duration(*duration_secs)?;
            if first_frame.path == last_frame.path {
                return Err(CoreError::Validation(
                    "Interpolation requires two distinct keyframes".to_string(),
                ));
            }
            Ok(())
        }
        WorkflowParams::Ingredients {
            prompt,
            references,
            duration_secs,
            ..
        } => {
            require_prompt(prompt)?;
            require_allowed_duration(*duration_secs)?;
            require_reference_count(references.len(), "subject reference")
        }
        WorkflowParams::Timestamp {
            prompt,
            segments,
            scene_duration_secs,
        } => {
            require_prompt(prompt)?;
            validate_segments(segments, *scene_duration_secs)
        }
        WorkflowParams::ImageToVideo {
            prompt,
            duration_secs,
            ..
        } => {
            require_prompt(prompt)?;
            require_positive_duration(*duration_secs)
        }
        WorkflowParams::TextToVideo {
            prompt,
            duration_secs,
            style_references,
        } => {
            require_prompt(prompt)?;
            require_positive_duration(*duration_secs)?;
            if style_references.len() > MAX_REFERENCE_IMAGES {
                return Err(CoreError::Validation(format!(
                    "At most {MAX_REFERENCE_IMAGES} style references allowed, got {}",
                    style_references.len()
                )));
            }
            Ok(())
        }
    }
}

fn require_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".to_string()));
    }
    Ok(())
}

fn require_positive_duration(duration_secs: f64) -> Result<(), CoreError> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(CoreError::Validation(format!(
            "Duration must be a positive number of seconds, got {duration_secs}"
        )));
    }
    if duration_secs > PLATFORM_MAX_DURATION_SECS {
        return Err(CoreError::Validation(format!(
            "Duration {duration_secs}s exceeds platform maximum {PLATFORM_MAX_DURATION_SECS}s"
        )));
    }
    Ok(())
}

fn require_allowed_duration(duration_secs: f64) -> Result<(), CoreError> {
    require_positive_duration(duration_secs)?;
    let allowed = ALLOWED_CLIP_DURATIONS_SECS
        .iter()
        .any(|d| (d - duration_secs).abs() < 1e-9);
    if !allowed {
        return Err(CoreError::Validation(format!(
            "Duration {duration_secs}s is not in the allowed set {ALLOWED_CLIP_DURATIONS_SECS:?}"
        )));
    }
    Ok(())
}

fn require_reference_count(count: usize, kind: &str) -> Result<(), CoreError> {
    if count == 0 {
        return Err(CoreError::Validation(format!(
            "At least one {kind} image required"
        )));
    }
    if count > MAX_REFERENCE_IMAGES {
        return Err(CoreError::Validation(format!(
            "At most {MAX_REFERENCE_IMAGES} {kind} images allowed, got {count}"
        )));
    }
    Ok(())
}

/// Segment durations must sum to the scene duration within
/// [`SEGMENT_SUM_EPSILON_SECS`], and the total must respect the platform
/// ceiling.
fn validate_segments(
    segments: &[TimestampedSegment],
    scene_duration_secs: f64,
) -> Result<(), CoreError> {
    if segments.is_empty() {
        return Err(CoreError::Validation(
            "Timestamp workflow requires at least one segment".to_string(),
        ));
    }
    let sum: f64 = segments.iter().map(|s| s.duration_secs).sum();
    if (sum - scene_duration_secs).abs() > SEGMENT_SUM_EPSILON_SECS {
        return Err(CoreError::Validation(format!(
            "Segment durations sum to {sum:.2}s but the scene is \
             {scene_duration_secs:.2}s (epsilon {SEGMENT_SUM_EPSILON_SECS}s)"
        )));
    }
    if scene_duration_secs > PLATFORM_MAX_DURATION_SECS {
        return Err(CoreError::Validation(format!(
            "Scene duration {scene_duration_secs}s exceeds platform maximum \
             {PLATFORM_MAX_DURATION_SECS}s"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
