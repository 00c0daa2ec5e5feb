//! Safe filesystem helpers shared by the pipeline and resolvers.

use crate::diagnostics::{BuildError, BuildResult};
use std::fs;
use std::path::Path;

/// Maximum size of a text file (page, layout, include) the engine will read.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Read a text file with the engine's safety checks: symlinks are refused,
/// only regular files are read, and the size cap applies before the read.
pub fn safe_read_file(path: &Path) -> BuildResult<String> {
    safe_read_file_with_limit(path, DEFAULT_MAX_FILE_SIZE)
}

pub fn safe_read_file_with_limit(path: &Path, limit: u64) -> BuildResult<String> {
    let metadata = fs::symlink_metadata(path).map_err(|source| BuildError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.file_type().is_symlink() {
        return Err(BuildError::FileSymlink {
            path: path.to_path_buf(),
        });
    }
    if !metadata.is_file() {
        return Err(BuildError::FileNotRegular {
            path: path.to_path_buf(),
        });
    }
    if metadata.len() > limit {
        return Err(BuildError::FileTooBig {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit,
        });
    }
    fs::read_to_string(path).map_err(|source| BuildError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `content` to `path`, creating parent directories as needed.
pub fn write_output(path: &Path, content: &str) -> BuildResult<()> {
    ensure_parent(path)?;
    fs::write(path, content).map_err(|source| BuildError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy `from` to `to` verbatim, creating parent directories as needed.
pub fn copy_file(from: &Path, to: &Path) -> BuildResult<()> {
    ensure_parent(to)?;
    fs::copy(from, to).map_err(|source| BuildError::FileWrite {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn ensure_parent(path: &Path) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| BuildError::OutputCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
