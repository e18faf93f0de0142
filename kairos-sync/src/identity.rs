//! Stable per-sender identity
//!
//! The receiver keys its per-sender state on a 128-bit opaque token,
//! rendered as 32 lowercase hex characters. Created once from the OS
//! CSPRNG on first run and never rotated.

use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use crate::errors::Result;

/// Read the identity at `path`, generating and persisting a fresh one if
/// the file does not exist. The first line is returned verbatim.
pub async fn get_or_create_identity(path: &Path) -> Result<String> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path).await?;
        let identity = content.lines().next().unwrap_or("").trim().to_string();
        return Ok(identity);
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let identity = generate_identity();
    tokio::fs::write(path, &identity).await?;
    info!("generated sender identity {}", identity);
    Ok(identity)
}

fn generate_identity() -> String {
    let mut raw = [0u8; 16];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_identity_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity");

        let first = get_or_create_identity(&path).await.unwrap();
        let second = get_or_create_identity(&path).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_deleted_identity_regenerates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity");

        let first = get_or_create_identity(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        let second = get_or_create_identity(&path).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_trailing_newline_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity");
        std::fs::write(&path, "00112233445566778899aabbccddeeff\n").unwrap();

        let identity = get_or_create_identity(&path).await.unwrap();
        assert_eq!(identity, "00112233445566778899aabbccddeeff");
    }
}
