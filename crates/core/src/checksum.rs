//! SHA-256 digests for backup artifacts.
//!
//! Artifacts can be many gigabytes, so [`sha256_file`] streams the file in
//! fixed-size chunks and never holds more than one chunk in memory.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Read chunk size used while hashing files (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Errors produced while verifying an artifact against a stored checksum.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("artifact not found: {0}")]
    Missing(String),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual} (artifact corrupted)")]
    Mismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("no checksum recorded for {0}")]
    NotRecorded(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute the SHA-256 hex digest of a file, streaming it in [`CHUNK_SIZE`] reads.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Recompute the digest of `path` and compare it with `expected`.
///
/// Returns the freshly computed digest on success. A missing file and a
/// digest mismatch are reported as distinct errors.
pub async fn verify_file(path: &Path, expected: &str) -> Result<String, ChecksumError> {
    let display = path.to_string_lossy().to_string();

    if expected.trim().is_empty() {
        return Err(ChecksumError::NotRecorded(display));
    }
    if !tokio::fs::try_exists(path).await? {
        return Err(ChecksumError::Missing(display));
    }

    let actual = sha256_file(path).await?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(ChecksumError::Mismatch {
            path: display,
            expected: expected.to_string(),
            actual,
        });
    }

    Ok(actual)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("create temp file");
        f.write_all(bytes).expect("write bytes");
        f.flush().expect("flush");
        f
    }

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn streaming_matches_in_memory_digest() {
        // Spans several chunks plus a partial tail.
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let file = write_temp(&data);
        let streamed = sha256_file(file.path()).await.expect("hash file");
        assert_eq!(streamed, sha256_hex(&data));
    }

    #[tokio::test]
    async fn unchanged_file_verifies() {
        let file = write_temp(b"PGDMP custom archive bytes");
        let expected = sha256_file(file.path()).await.unwrap();
        let actual = verify_file(file.path(), &expected).await.unwrap();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn single_byte_mutation_is_detected() {
        let original = b"PGDMP custom archive bytes".to_vec();
        let expected = sha256_hex(&original);

        for index in [0, original.len() / 2, original.len() - 1] {
            let mut mutated = original.clone();
            mutated[index] ^= 0x01;
            let file = write_temp(&mutated);
            let result = verify_file(file.path(), &expected).await;
            assert!(
                matches!(result, Err(ChecksumError::Mismatch { .. })),
                "mutation at byte {index} must be detected"
            );
        }
    }

    #[tokio::test]
    async fn missing_file_is_reported_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.dump");
        let result = verify_file(&path, "abc").await;
        assert!(matches!(result, Err(ChecksumError::Missing(_))));
    }

    #[tokio::test]
    async fn empty_expected_checksum_is_rejected() {
        let file = write_temp(b"data");
        let result = verify_file(file.path(), "").await;
        assert!(matches!(result, Err(ChecksumError::NotRecorded(_))));
    }
}
