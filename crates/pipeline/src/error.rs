use reelforge_core::error::CoreError;
use reelforge_store::StoreError;

/// Run-fatal errors.
///
/// Job-level failures never surface here — they roll into the run's
/// success-rate gate. What does surface is everything that makes
/// continuing pointless: a cyclic manifest, a corrupt ledger, a missing
/// snapshot on resume.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No pipeline state found for project {0}; nothing to resume")]
    NothingToResume(String),
}
