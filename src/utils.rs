use anyhow::{Context, Error, Result};
use log::warn;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    thread::sleep,
    time::Duration,
};

use crate::common::ASSET_EXTENSIONS;

const OPEN_FAIL_RETRY: usize = 3;
const OPEN_RETRY_DELAY_MS: u64 = 100;

const SIZE_POLL_INTERVAL_MS: u64 = 200;
const SIZE_POLL_ATTEMPTS: usize = 50;

pub trait PathExt {
    fn ext_lower(&self) -> String;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Open a file with retry logic for transient failures
pub fn open_file_with_retry(path: &Path) -> Result<File> {
    let mut delay = Duration::from_millis(OPEN_RETRY_DELAY_MS);

    for attempt in 0..=OPEN_FAIL_RETRY {
        match File::open(path) {
            Ok(file) => return Ok(file),
            Err(e) if attempt < OPEN_FAIL_RETRY => {
                warn!(
                    "Attempt {}/{} failed to open {:?}: {}. Retrying in {:?}…",
                    attempt + 1,
                    OPEN_FAIL_RETRY + 1,
                    path,
                    e,
                    delay,
                );
                sleep(delay);
                delay = delay.checked_mul(2).unwrap_or(delay);
            }
            Err(e) => {
                return Err(Error::new(e).context(format!(
                    "Failed to open file {:?} after {} attempts",
                    path,
                    OPEN_FAIL_RETRY + 1
                )));
            }
        }
    }

    unreachable!("open_file_with_retry logic error")
}

/// Block until the file's size is unchanged across two consecutive polls.
///
/// A creation notification can arrive while the producer is still writing;
/// processing only starts once the size settles. Gives up (returning the last
/// observed size) after a bounded number of polls so a file that grows
/// forever cannot wedge a worker.
pub fn wait_for_stable_size(path: &Path) -> Result<u64> {
    let mut last = fs::metadata(path)
        .context(format!("failed to stat {:?}", path))?
        .len();

    for _ in 0..SIZE_POLL_ATTEMPTS {
        sleep(Duration::from_millis(SIZE_POLL_INTERVAL_MS));
        let current = fs::metadata(path)
            .context(format!("failed to stat {:?}", path))?
            .len();
        if current == last {
            return Ok(current);
        }
        last = current;
    }

    warn!("size of {:?} never settled; proceeding at {} bytes", path, last);
    Ok(last)
}

/// List the image assets directly inside `dir`, sorted lexically by file
/// name. Subdirectories (including the rejection sink) are not descended
/// into, so a batch pass never reconsiders what it already rejected.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .context(format!("failed to read directory {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && ASSET_EXTENSIONS.contains(&path.ext_lower().as_str()))
        .collect();

    files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));
    Ok(files)
}
