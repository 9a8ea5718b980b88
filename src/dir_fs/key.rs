//! Which strings can be used as file names inside a storage
//! directory.

use std::path::{Path, PathBuf};

use crate::io_utils::tempfile_utils::is_claim_dir_name;

use super::error::DirError;

/// Why `key` can't be the name of a direct child of a directory, or
/// `None` if it can. The result must not be empty, `.` or `..`, must
/// not contain the `/` or `\0` characters, and must be at most 255
/// bytes long.
pub fn key_problem(key: &str) -> Option<&'static str> {
    let bytes = key.as_bytes();
    if bytes.is_empty() {
        Some("empty key")
    } else if key == "." || key == ".." {
        Some("key refers to a directory itself")
    } else if bytes.len() > 255 {
        Some("key longer than 255 bytes")
    } else if bytes.contains(&b'/') {
        Some("key contains a '/'")
    } else if bytes.contains(&b'\0') {
        Some("key contains a NUL byte")
    } else {
        None
    }
}

/// The path of the entry for `key` in `base_dir`, or a `NotFound`
/// error if `key` is unusable as a file name.
pub fn key_path(base_dir: &Path, key: &str) -> Result<PathBuf, DirError> {
    if let Some(problem) = key_problem(key) {
        let shown = key.replace('\0', "\\0");
        return Err(DirError::not_found(
            base_dir,
            base_dir.join(shown),
            problem,
            None,
        ));
    }
    Ok(base_dir.join(key))
}

/// Names of the hidden files this library creates while writing or
/// dequeueing (see `io_utils::tempfile_utils`). They are never
/// reported as entries.
pub fn is_internal_file_name(file_name: &str) -> bool {
    file_name.starts_with(".tmp~") || is_claim_dir_name(file_name)
}
