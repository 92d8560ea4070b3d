//! Write-once generation memo, keyed by request content hash.
//!
//! One small JSON record per completed generation call, laid out as
//! `<root>/<first-2-hex>/<hash>.json`. Reads are unsynchronized;
//! the only write is an existence-check followed by a temp-file rename,
//! so no locking is needed. Records are never overwritten — identical
//! requests always resolve to the first asset produced.

use std::path::{Path, PathBuf};

use reelforge_core::hashing::{sha256_hex, shard_relpath};
use reelforge_core::types::AssetRef;

/// Content-addressed memo of generation results.
pub struct GenerationCache {
    root: PathBuf,
}

impl GenerationCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Content key for a serialized request payload.
    pub fn key_for(request_bytes: &[u8]) -> String {
        sha256_hex(request_bytes)
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(shard_relpath(key)).with_extension("json")
    }

    /// Whether a record exists for this key.
    pub async fn contains(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.record_path(key))
            .await
            .unwrap_or(false)
    }

    /// The asset previously produced for this key, if any.
    ///
    /// An unreadable record is treated as a miss — the caller regenerates
    /// and the bad record is left for manual inspection.
    pub async fn lookup(&self, key: &str) -> Option<AssetRef> {
        let path = self.record_path(key);
        let bytes = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(asset) => Some(asset),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable cache record; treating as miss",
                );
                None
            }
        }
    }

    /// Record the asset produced for this key. Write-once: if a record
    /// already exists it is kept and this call is a no-op.
    pub async fn record(&self, key: &str, asset: &AssetRef) -> std::io::Result<()> {
        let path = self.record_path(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(asset)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        // Temp file + rename keeps concurrent writers from ever exposing
        // a half-written record; last rename wins with identical content.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, GenerationCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = GenerationCache::new(dir.path());
        (dir, cache)
    }

    #[tokio::test]
    async fn lookup_miss_then_hit() {
        let (_dir, cache) = cache();
        let key = GenerationCache::key_for(b"request");
        assert!(cache.lookup(&key).await.is_none());

        let asset = AssetRef::from_path("clip.mp4");
        cache.record(&key, &asset).await.unwrap();
        assert!(cache.contains(&key).await);
        assert_eq!(cache.lookup(&key).await, Some(asset));
    }

    #[tokio::test]
    async fn records_are_write_once() {
        let (_dir, cache) = cache();
        let key = GenerationCache::key_for(b"request");
        cache
            .record(&key, &AssetRef::from_path("first.mp4"))
            .await
            .unwrap();
        cache
            .record(&key, &AssetRef::from_path("second.mp4"))
            .await
            .unwrap();
        assert_eq!(
            cache.lookup(&key).await.unwrap().path,
            "first.mp4"
        );
    }

    #[tokio::test]
    async fn keys_are_sharded_on_disk() {
        let (dir, cache) = cache();
        let key = GenerationCache::key_for(b"sharded");
        cache
            .record(&key, &AssetRef::from_path("a.png"))
            .await
            .unwrap();
        let shard = dir.path().join(&key[..2]);
        assert!(shard.is_dir());
    }

    #[tokio::test]
    async fn distinct_requests_get_distinct_keys() {
        let a = GenerationCache::key_for(b"request-a");
        let b = GenerationCache::key_for(b"request-b");
        assert_ne!(a, b);
    }
}
