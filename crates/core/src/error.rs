use crate::types::JobId;

/// Errors produced by the pure domain layer.
///
/// `Validation` and `MissingAsset` are *permanent* job-level failures:
/// retrying the same inputs cannot succeed, so the orchestrator must not
/// retry them. `CycleDetected` is fatal and is only ever raised during
/// manifest build, before any job is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Missing required asset: {role}")]
    MissingAsset { role: String },

    #[error("Dependency cycle detected: {0}")]
    CycleDetected(String),

    #[error("Unknown job referenced: {0}")]
    UnknownJob(JobId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::MissingAsset`] with the given role name.
    pub fn missing(role: impl Into<String>) -> Self {
        CoreError::MissingAsset { role: role.into() }
    }
}
