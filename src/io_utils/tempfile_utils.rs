//! Writing a file completely under a hidden temporary name, then
//! moving it into place, so that readers never see partial contents.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use nix::unistd::{getpid, gettid};

use crate::dir_fs::sync::FsSync;

#[derive(Debug, thiserror::Error)]
pub enum TempfileError {
    #[error("path is missing parent directory part")]
    MissingParent,
    #[error("path is missing file name part")]
    MissingFileName,
    #[error("target path exists already")]
    TargetExists,
    #[error("IO error while {0}: {1:#}")]
    IOError(&'static str, std::io::Error),
}

impl TempfileError {
    pub fn into_io_error(self) -> Option<std::io::Error> {
        match self {
            TempfileError::IOError(_, e) => Some(e),
            _ => None,
        }
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `.tmp~<pid>-<tid>-<n>` next to `target_path`. The name doesn't
/// include the target's file name, so that targets up to the maximum
/// file name length can be written.
pub fn temp_path(target_path: impl AsRef<Path>) -> Result<PathBuf, TempfileError> {
    let target_path = target_path.as_ref();
    let dir = target_path.parent().ok_or(TempfileError::MissingParent)?;
    if target_path.file_name().is_none() {
        return Err(TempfileError::MissingFileName);
    }
    let pid = getpid();
    let tid = gettid();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(dir.join(format!(".tmp~{pid}-{tid}-{n}")))
}

/// Prefix of the per-thread directories that queue entries are moved
/// into while being dequeued.
pub const CLAIM_DIR_PREFIX: &str = ".claim~";

/// `.claim~<pid>-<tid>` in `dir`. Claimed entries keep their file
/// name inside it.
pub fn claim_dir(dir: &Path) -> PathBuf {
    let pid = getpid();
    let tid = gettid();
    dir.join(format!("{CLAIM_DIR_PREFIX}{pid}-{tid}"))
}

pub fn is_claim_dir_name(file_name: &str) -> bool {
    file_name.starts_with(CLAIM_DIR_PREFIX)
}

/// A fully written temporary file; it is deleted on drop unless
/// moved into place via one of the `finish` methods.
#[derive(Debug)]
pub struct Tempfile {
    pub target_path: PathBuf,
    pub temp_path: PathBuf,
    retain_tempfile: bool,
}

impl Tempfile {
    /// Write `contents` to a temporary file for `target_path`, and
    /// flush (and perhaps sync) it.
    pub fn write(
        target_path: PathBuf,
        contents: &[u8],
        sync: FsSync,
    ) -> Result<Tempfile, TempfileError> {
        let temp_path = temp_path(&target_path)?;
        let tempfile = Tempfile {
            target_path,
            temp_path,
            retain_tempfile: false,
        };
        let mut out = File::create(&tempfile.temp_path)
            .map_err(|e| TempfileError::IOError("creating temporary file", e))?;
        out.write_all(contents)
            .map_err(|e| TempfileError::IOError("writing to temporary file", e))?;
        sync.flush_and_perhaps_sync_file(&mut out)
            .map_err(|e| TempfileError::IOError("flushing temporary file", e))?;
        Ok(tempfile)
    }

    /// Move into place, replacing an existing file at the target.
    pub fn finish(mut self, sync: FsSync) -> Result<(), TempfileError> {
        std::fs::rename(&self.temp_path, &self.target_path)
            .map_err(|e| TempfileError::IOError("renaming to target", e))?;
        self.retain_tempfile = true;
        self.sync_dir(sync)
    }

    /// Move into place only if nothing exists at the target yet
    /// (via hard link, which fails atomically if the target exists).
    pub fn finish_exclusive(self, sync: FsSync) -> Result<(), TempfileError> {
        match std::fs::hard_link(&self.temp_path, &self.target_path) {
            Ok(()) => (),
            Err(e) => match e.kind() {
                std::io::ErrorKind::AlreadyExists => return Err(TempfileError::TargetExists),
                _ => return Err(TempfileError::IOError("linking to target", e)),
            },
        }
        // Drop removes the temporary name now that the target holds
        // the data.
        self.sync_dir(sync)
    }

    fn sync_dir(&self, sync: FsSync) -> Result<(), TempfileError> {
        let dir = self
            .target_path
            .parent()
            .ok_or(TempfileError::MissingParent)?;
        sync.perhaps_sync_dir(dir)
            .map_err(|e| TempfileError::IOError("syncing directory", e))
    }
}

impl Drop for Tempfile {
    fn drop(&mut self) {
        if !self.retain_tempfile {
            match std::fs::remove_file(&self.temp_path) {
                Ok(()) => (),
                Err(e) => match e.kind() {
                    std::io::ErrorKind::NotFound => (),
                    _ => log::info!(
                        "error deleting temporary file {:?}: {e:#}",
                        self.temp_path
                    ),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_temp_path() {
        let p = temp_path("/a/b/foo").unwrap();
        assert_eq!(p.parent().unwrap(), Path::new("/a/b"));
        let name = p.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".tmp~"));
        assert!(!name.contains("foo"));
        // unique within a thread, same length for any target
        let long = temp_path(Path::new("/a/b").join("x".repeat(255))).unwrap();
        assert_ne!(temp_path("/a/b/foo").unwrap(), p);
        assert!(long.file_name().unwrap().len() < 64);
        assert!(temp_path("/").is_err());
    }

    #[test]
    fn t_claim_dir() {
        let p = claim_dir(Path::new("/q"));
        assert_eq!(p.parent().unwrap(), Path::new("/q"));
        let name = p.file_name().unwrap().to_str().unwrap();
        assert!(is_claim_dir_name(name));
        assert_eq!(claim_dir(Path::new("/q")), p);
        assert!(!is_claim_dir_name("FSList-7"));
    }

    #[test]
    fn t_finish_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("v");

        let t = Tempfile::write(target.clone(), b"one", FsSync::No).unwrap();
        let temp = t.temp_path.clone();
        assert!(temp.exists());
        drop(t);
        assert!(!temp.exists());
        assert!(!target.exists());

        Tempfile::write(target.clone(), b"two", FsSync::All)
            .unwrap()
            .finish(FsSync::All)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    fn t_finish_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("v");
        Tempfile::write(target.clone(), b"first", FsSync::No)
            .unwrap()
            .finish_exclusive(FsSync::No)
            .unwrap();
        let err = Tempfile::write(target.clone(), b"second", FsSync::No)
            .unwrap()
            .finish_exclusive(FsSync::No)
            .unwrap_err();
        assert!(matches!(err, TempfileError::TargetExists));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "first");
        // only the target is left, temporaries are gone
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
