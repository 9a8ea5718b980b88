use std::path::{Path, PathBuf};

/// The kind of a `DirError`, for callers that only want to branch on
/// the category of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Collision,
}

/// All failures of `DirMap` and `DirQueue` operations. Different
/// underlying causes of a failed lookup, read, write or delete
/// (missing file, invalid name, permissions, wrong entry type) are
/// all reported as `NotFound`; the cause is kept for diagnostics
/// only.
#[derive(thiserror::Error, Debug)]
pub enum DirError {
    #[error("invalid argument for directory {base_dir:?}: {ctx}")]
    InvalidArgument {
        base_dir: PathBuf,
        ctx: &'static str,
        #[source]
        error: Option<std::io::Error>,
    },
    #[error("{ctx} {path:?} (in {base_dir:?})")]
    NotFound {
        base_dir: PathBuf,
        path: PathBuf,
        ctx: &'static str,
        #[source]
        error: Option<std::io::Error>,
    },
    #[error("queue entry {path:?} was created concurrently by another producer (in {base_dir:?})")]
    Collision { base_dir: PathBuf, path: PathBuf },
}

impl DirError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DirError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            DirError::NotFound { .. } => ErrorKind::NotFound,
            DirError::Collision { .. } => ErrorKind::Collision,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Only a `Collision` can succeed when the same operation is
    /// simply repeated.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Collision
    }

    pub(crate) fn not_found(
        base_dir: &Path,
        path: PathBuf,
        ctx: &'static str,
        error: Option<std::io::Error>,
    ) -> Self {
        match &error {
            Some(e) => log::debug!("{ctx} {path:?} (in {base_dir:?}): {e}"),
            None => log::debug!("{ctx} {path:?} (in {base_dir:?})"),
        }
        DirError::NotFound {
            base_dir: base_dir.to_owned(),
            path,
            ctx,
            error,
        }
    }
}
