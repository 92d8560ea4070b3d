/// Errors surfaced by the persistence layer.
///
/// `Corruption` is fatal for the whole run: it means the ledger no longer
/// deserializes and needs manual recovery, so callers must not treat it
/// as a per-job failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Store corruption: {0}")]
    Corruption(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
