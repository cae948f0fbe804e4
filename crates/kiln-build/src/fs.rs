//! Small file helpers shared by the cache, the graph builder and the runner

use crate::error::{BuildError, BuildResult};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Modification time in nanoseconds relative to the Unix epoch
pub type Mtime = i64;

/// Stat a file, `None` when it does not exist or cannot be read
pub fn modification_time(path: &Path) -> Option<Mtime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(to_mtime(modified))
}

pub fn to_mtime(time: SystemTime) -> Mtime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_nanos().min(i64::MAX as u128) as i64,
        Err(before) => -(before.duration().as_nanos().min(i64::MAX as u128) as i64),
    }
}

/// Create the parent directory of `path` if needed
pub fn ensure_parent(path: &Path) -> BuildResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Write `contents` to a temporary sibling and rename it over `path`
pub fn atomic_write(path: &Path, contents: &[u8]) -> BuildResult<()> {
    ensure_parent(path)?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp_file = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)
        .map_err(|e| BuildError::io(parent, e))?;

    let (mut file, temp_path) = temp_file.into_parts();
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| BuildError::io(&*temp_path, e))?;
    drop(file);

    temp_path
        .persist(path)
        .map_err(|e| BuildError::io(path, e.error))?;

    Ok(())
}

/// Write `contents` unless the file already holds exactly that.
/// Returns whether the file was (re)written.
pub fn write_if_changed(path: &Path, contents: &str) -> BuildResult<bool> {
    if let Ok(existing) = std::fs::read(path) {
        if existing == contents.as_bytes() {
            return Ok(false);
        }
    }

    ensure_parent(path)?;
    std::fs::write(path, contents).map_err(|e| BuildError::io(path, e))?;
    Ok(true)
}

/// Delete files, retrying quietly when the OS still holds a handle on them.
///
/// Missing files count as deleted. Only the last attempt reports failures,
/// which are returned as the list of paths that could not be removed.
pub fn remove_files<P: AsRef<Path>>(paths: &[P], attempts: usize, delay: Duration) -> Vec<String> {
    let mut pending: Vec<&Path> = paths.iter().map(|p| p.as_ref()).collect();

    for attempt in 0..attempts.max(1) {
        pending.retain(|path| match std::fs::remove_file(path) {
            Ok(()) => false,
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        });

        if pending.is_empty() {
            break;
        }
        if attempt + 1 < attempts {
            std::thread::sleep(delay);
        }
    }

    pending.iter().map(|p| p.display().to_string()).collect()
}
