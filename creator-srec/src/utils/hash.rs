//! Content hashing for recorded artifacts.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::Result;
use crate::utils::fs::io_error;

const READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Compute the hex-encoded SHA-256 of a file, streaming it in 1 MiB chunks.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| io_error("opening file for hashing", path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| io_error("reading file for hashing", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
