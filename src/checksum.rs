use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::error::BuildError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Stream `path` through SHA256 in fixed-size chunks and return the lowercase hex digest.
pub fn compute_digest(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).context(format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader
            .read(&mut buf)
            .context(format!("reading {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check `path` against `expected`.
///
/// An absent digest always passes: components without a pinned checksum are trusted as-is.
pub fn verify(path: impl AsRef<Path>, expected: Option<&str>) -> Result<bool> {
    let Some(expected) = expected else {
        return Ok(true);
    };
    Ok(compute_digest(path)?.eq_ignore_ascii_case(expected.trim()))
}

/// Like [`verify`] but a mismatch is an [`BuildError::Integrity`] error.
pub fn ensure_digest(path: impl AsRef<Path>, expected: Option<&str>) -> Result<()> {
    let path = path.as_ref();
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = compute_digest(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(BuildError::Integrity {
            path: path.to_path_buf(),
            expected: expected.trim().to_lowercase(),
            actual,
        }
        .into())
    }
}
