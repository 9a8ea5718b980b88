use std::{fs::File, io::Write, path::Path};

use serde::{Deserialize, Serialize};

/// How much effort to spend on getting written values onto stable
/// storage before an operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FsSync {
    /// Do not call sync; fastest, but a crash may leave empty or
    /// truncated values behind
    No,
    /// Call fsync on files before moving them in place inside the
    /// directory. This should prevent the possibility for corrupt
    /// files, but does not guarantee that entries are persisted after
    /// returning from modifying functions.
    Files,
    /// Call fsync on files and then also on the containing dir. This
    /// should guarantee that changes are persisted by the time
    /// functions return.
    #[default]
    All,
}

impl FsSync {
    fn do_sync_files(self) -> bool {
        match self {
            FsSync::No => false,
            FsSync::Files => true,
            FsSync::All => true,
        }
    }

    fn do_sync_dirs(self) -> bool {
        match self {
            FsSync::No => false,
            FsSync::Files => false,
            FsSync::All => true,
        }
    }

    pub fn flush_and_perhaps_sync_file(self, file: &mut File) -> std::io::Result<()> {
        file.flush()?;
        if self.do_sync_files() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Opens `dir` to fsync it, if this level asks for it.
    pub fn perhaps_sync_dir(self, dir: &Path) -> std::io::Result<()> {
        if self.do_sync_dirs() {
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    }
}
