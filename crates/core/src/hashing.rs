//! SHA-256 content hashing for cache keys.
//!
//! The asset cache and the generation memo are both keyed by content hash;
//! keys are fanned out into two-character shard directories to keep any
//! single directory small.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Relative path for a content key inside a cache root: `ab/abcdef…`.
///
/// Keys shorter than two characters are not sharded.
pub fn shard_relpath(key: &str) -> String {
    if key.len() < 2 {
        return key.to_string();
    }
    format!("{}/{}", &key[..2], key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_stable_and_hex_sized() {
        let data = b"scene-001 keyframe";
        assert_eq!(sha256_hex(data), sha256_hex(data));
        assert_eq!(sha256_hex(data).len(), 64);
    }

    #[test]
    fn shard_path_uses_two_char_prefix() {
        assert_eq!(shard_relpath("abcdef"), "ab/abcdef");
    }

    #[test]
    fn short_key_is_not_sharded() {
        assert_eq!(shard_relpath("a"), "a");
    }
}
