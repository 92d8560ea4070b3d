//! Shared type aliases and small value types used across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a single generation job (UUIDv4).
pub type JobId = Uuid;

/// Identifier for a project. Assigned upstream, opaque here.
pub type ProjectId = String;

/// UTC timestamp used on all persisted records.
pub type Timestamp = DateTime<Utc>;

/// Reference to a produced asset.
///
/// `content_key` is the SHA-256 digest of the asset bytes when the asset
/// went through the content-addressed cache; collaborators that return a
/// plain path leave it unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Filesystem path (or collaborator-scoped locator) of the asset.
    pub path: String,
    /// Content hash of the asset bytes, when known.
    pub content_key: Option<String>,
}

impl AssetRef {
    /// An asset reference identified by path alone.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_key: None,
        }
    }
}
