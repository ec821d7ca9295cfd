use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Error, Result};
use log::warn;

const COPY_RETRY_DELAY_MS: u64 = 100;

/// Copy `source` to `dest`, retrying transient failures with a doubling delay.
pub fn copy_with_retry(source: &Path, dest: &Path, retries: u32) -> Result<u64> {
    let mut delay = Duration::from_millis(COPY_RETRY_DELAY_MS);

    for attempt in 0..=retries {
        match fs::copy(source, dest) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < retries => {
                warn!(
                    "Attempt {}/{} failed to copy {:?} to {:?}: {}. Retrying in {:?}",
                    attempt + 1,
                    retries + 1,
                    source,
                    dest,
                    err,
                    delay,
                );
                sleep(delay);
                delay = delay.checked_mul(2).unwrap_or(delay);
            }
            Err(err) => {
                return Err(Error::new(err).context(format!(
                    "failed to copy {:?} to {:?} after {} attempts",
                    source,
                    dest,
                    retries + 1
                )));
            }
        }
    }

    unreachable!("copy_with_retry exhausted its attempts without returning")
}

/// Blake3 digest of a file as lowercase hex.
pub fn blake3_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 512 * 1024];

    loop {
        let n = file
            .read(&mut buffer)
            .with_context(|| format!("failed to read {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Remove a directory tree. A missing directory is not an error.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(err).context(format!("failed to remove {:?}", path))),
    }
}
