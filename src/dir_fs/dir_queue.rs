use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io_utils::tempfile_utils::{claim_dir, is_claim_dir_name, Tempfile, TempfileError};

use super::{
    error::DirError,
    key::{is_internal_file_name, key_problem},
    queue_name::{next_name, queue_order, QueueName},
    store::QueueStore,
    sync::FsSync,
};

pub const DEFAULT_FILE_PREFIX: &str = "FSList-";

fn default_file_prefix() -> String {
    DEFAULT_FILE_PREFIX.into()
}

/// Configuration for `DirQueue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirQueueConfig {
    /// Entries are named `<file_prefix><n>` (default: "FSList-")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Capacity for blocking wrappers, 0 is unbounded (default: 0)
    #[serde(default)]
    pub max_size: usize,
    /// Whether to call fsync on files and the containing directory
    /// when putting values (default: All).
    #[serde(default)]
    pub sync: FsSync,
}

impl Default for DirQueueConfig {
    fn default() -> Self {
        DirQueueConfig {
            file_prefix: default_file_prefix(),
            max_size: 0,
            sync: FsSync::default(),
        }
    }
}

/// A directory viewed as a FIFO queue. `put` writes a new file named
/// after the highest existing sequence number plus one, `get` removes
/// the file with the lowest one.
///
/// Concurrent producers racing for the same name: the loser gets a
/// `DirError::Collision` and may retry; nothing is overwritten.
/// Concurrent consumers: the front entry is claimed by moving it into
/// a hidden per-thread directory before reading, so each entry is
/// delivered at most once. If a consumer dies after claiming, the
/// entry stays hidden until `recover_claims` is called.
#[derive(Debug, Clone, PartialEq)]
pub struct DirQueue {
    config: DirQueueConfig,
    base_dir: PathBuf,
}

impl DirQueue {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, DirError> {
        Self::open(base_dir, DirQueueConfig::default())
    }

    pub fn open(base_dir: impl AsRef<Path>, config: DirQueueConfig) -> Result<Self, DirError> {
        let base_dir = base_dir.as_ref().to_owned();
        if let Some(problem) = prefix_problem(&config.file_prefix) {
            return Err(DirError::InvalidArgument {
                base_dir,
                ctx: problem,
                error: None,
            });
        }
        match std::fs::metadata(&base_dir) {
            Ok(m) if m.is_dir() => Ok(Self { config, base_dir }),
            Ok(_) => Err(DirError::InvalidArgument {
                base_dir,
                ctx: "not a directory",
                error: None,
            }),
            Err(error) => Err(DirError::InvalidArgument {
                base_dir,
                ctx: "directory must exist",
                error: Some(error),
            }),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_prefix(&self) -> &str {
        &self.config.file_prefix
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn config(&self) -> &DirQueueConfig {
        &self.config
    }

    fn list_dir(&self) -> Result<Vec<String>, DirError> {
        let dir = std::fs::read_dir(&self.base_dir).map_err(|error| {
            DirError::not_found(
                &self.base_dir,
                self.base_dir.clone(),
                "opening directory",
                Some(error),
            )
        })?;
        let mut names = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|error| {
                DirError::not_found(
                    &self.base_dir,
                    self.base_dir.clone(),
                    "reading directory entry",
                    Some(error),
                )
            })?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Entry names, without our own temporaries and claims.
    fn entry_names(&self) -> Result<Vec<String>, DirError> {
        let mut names = self.list_dir()?;
        names.retain(|name| !is_internal_file_name(name));
        Ok(names)
    }

    /// Entries sitting in the claim directories among `names`, as
    /// (current path, original file name).
    fn claimed_entries(&self, names: &[String]) -> Vec<(PathBuf, String)> {
        let mut claimed = Vec::new();
        for name in names.iter().filter(|name| is_claim_dir_name(name)) {
            let dir = self.base_dir.join(name);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) => {
                    // Usually the consumer finished and removed it
                    log::debug!("skipping claim directory {dir:?}: {error}");
                    continue;
                }
            };
            for entry in entries {
                match entry {
                    Ok(entry) => claimed.push((
                        entry.path(),
                        entry.file_name().to_string_lossy().into_owned(),
                    )),
                    Err(error) => log::warn!("reading claim directory {dir:?}: {error}"),
                }
            }
        }
        claimed
    }

    /// The entries in the order `get` would take them.
    pub fn sorted_entries(&self) -> Result<Vec<QueueName>, DirError> {
        Ok(queue_order(&self.config.file_prefix, self.entry_names()?))
    }

    /// Number of entries in the directory (of any type).
    pub fn size(&self) -> Result<usize, DirError> {
        Ok(self.entry_names()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DirError> {
        Ok(self.size()? == 0)
    }

    /// Append `value` to the queue.
    pub fn put(&self, value: &str) -> Result<(), DirError> {
        let mut names = self.list_dir()?;
        // Claimed entries keep their number, so that `recover_claims`
        // can put them back
        let claimed = self.claimed_entries(&names);
        names.retain(|name| !is_internal_file_name(name));
        names.extend(claimed.into_iter().map(|(_, name)| name));
        let name = next_name(&self.config.file_prefix, names.iter().map(|s| s.as_str()))
            .ok_or_else(|| {
                DirError::not_found(
                    &self.base_dir,
                    self.base_dir.clone(),
                    "no sequence numbers left for new entries in",
                    None,
                )
            })?;
        let target_path = self.base_dir.join(name.file_name());
        log::trace!("put: new entry {target_path:?}");
        let sync = self.config.sync;
        Tempfile::write(target_path.clone(), value.as_bytes(), sync)
            .and_then(|tempfile| tempfile.finish_exclusive(sync))
            .map_err(|error| match error {
                TempfileError::TargetExists => {
                    log::debug!("put: lost race for {target_path:?}");
                    DirError::Collision {
                        base_dir: self.base_dir.clone(),
                        path: target_path,
                    }
                }
                error => DirError::not_found(
                    &self.base_dir,
                    target_path,
                    "unable to write queue entry",
                    error.into_io_error(),
                ),
            })
    }

    /// Remove and return the front entry.
    pub fn get(&self) -> Result<String, DirError> {
        let entries = self.sorted_entries()?;
        if entries.is_empty() {
            return Err(DirError::not_found(
                &self.base_dir,
                self.base_dir.clone(),
                "queue is empty:",
                None,
            ));
        }
        let claim_dir = claim_dir(&self.base_dir);
        match std::fs::create_dir(&claim_dir) {
            Ok(()) => (),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => (),
            Err(error) => {
                return Err(DirError::not_found(
                    &self.base_dir,
                    claim_dir,
                    "creating claim directory",
                    Some(error),
                ))
            }
        }
        let result = self.claim_front(&entries, &claim_dir);
        // Fails if a claimed entry couldn't be consumed nor put back,
        // which leaves it for `recover_claims`
        if let Err(error) = std::fs::remove_dir(&claim_dir) {
            log::debug!("keeping claim directory {claim_dir:?}: {error}");
        }
        result
    }

    fn claim_front(&self, entries: &[QueueName], claim_dir: &Path) -> Result<String, DirError> {
        for name in entries {
            let path = self.base_dir.join(name.file_name());
            match std::fs::symlink_metadata(&path) {
                Ok(m) if m.file_type().is_file() => (),
                Ok(_) => return Err(self.not_a_file(&path)),
                Err(error) => match error.kind() {
                    std::io::ErrorKind::NotFound => continue,
                    _ => {
                        return Err(DirError::not_found(
                            &self.base_dir,
                            path,
                            "inspecting queue entry",
                            Some(error),
                        ))
                    }
                },
            }
            let claimed = claim_dir.join(name.file_name());
            match std::fs::rename(&path, &claimed) {
                Ok(()) => return self.consume_claimed(&path, &claimed),
                Err(error) => match error.kind() {
                    std::io::ErrorKind::NotFound => {
                        log::debug!("get: {path:?} taken by another consumer");
                        continue;
                    }
                    _ => {
                        return Err(DirError::not_found(
                            &self.base_dir,
                            path,
                            "unable to claim queue entry",
                            Some(error),
                        ))
                    }
                },
            }
        }
        Err(DirError::not_found(
            &self.base_dir,
            self.base_dir.clone(),
            "all entries were taken concurrently from",
            None,
        ))
    }

    /// The value of the front entry, without removing it.
    pub fn peek(&self) -> Result<String, DirError> {
        let entries = self.sorted_entries()?;
        let front = entries.first().ok_or_else(|| {
            DirError::not_found(
                &self.base_dir,
                self.base_dir.clone(),
                "queue is empty:",
                None,
            )
        })?;
        let path = self.base_dir.join(front.file_name());
        self.check_is_file(&path)?;
        std::fs::read_to_string(&path).map_err(|error| {
            DirError::not_found(&self.base_dir, path, "reading queue entry", Some(error))
        })
    }

    fn not_a_file(&self, path: &Path) -> DirError {
        DirError::not_found(
            &self.base_dir,
            path.to_owned(),
            "front of queue is not a regular file:",
            None,
        )
    }

    fn check_is_file(&self, path: &Path) -> Result<(), DirError> {
        match std::fs::symlink_metadata(path) {
            Ok(m) if m.file_type().is_file() => Ok(()),
            Ok(_) => Err(self.not_a_file(path)),
            Err(error) => Err(DirError::not_found(
                &self.base_dir,
                path.to_owned(),
                "reading queue entry",
                Some(error),
            )),
        }
    }

    fn consume_claimed(&self, path: &Path, claimed: &Path) -> Result<String, DirError> {
        let content = match std::fs::read_to_string(claimed) {
            Ok(s) => s,
            Err(error) => {
                // Put it back so that the value isn't lost
                if let Err(e) = std::fs::rename(claimed, path) {
                    log::warn!("could not restore claimed entry {claimed:?} to {path:?}: {e}");
                }
                return Err(DirError::not_found(
                    &self.base_dir,
                    path.to_owned(),
                    "reading queue entry",
                    Some(error),
                ));
            }
        };
        if let Err(error) = std::fs::remove_file(claimed) {
            // Already out of the queue, hence not an error for the caller
            log::warn!("could not delete claimed entry {claimed:?}: {error}");
        }
        if let Err(error) = self.config.sync.perhaps_sync_dir(&self.base_dir) {
            log::warn!("could not sync {:?}: {error}", self.base_dir);
        }
        Ok(content)
    }

    /// Move entries claimed by consumers that never finished (crashed
    /// processes) back into the queue. Only call this when no other
    /// consumer is active, otherwise entries being read right now get
    /// delivered twice. Returns how many entries were restored.
    pub fn recover_claims(&self) -> Result<usize, DirError> {
        let names = self.list_dir()?;
        let mut restored = 0;
        for (from, original) in self.claimed_entries(&names) {
            let to = self.base_dir.join(&original);
            // Link first, so that an entry of the same name is never
            // replaced
            match std::fs::hard_link(&from, &to) {
                Ok(()) => (),
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::warn!("not restoring {from:?}, {to:?} exists");
                    continue;
                }
                Err(error) => {
                    return Err(DirError::not_found(
                        &self.base_dir,
                        from,
                        "restoring claimed entry",
                        Some(error),
                    ))
                }
            }
            std::fs::remove_file(&from).map_err(|error| {
                DirError::not_found(&self.base_dir, from, "removing restored claim", Some(error))
            })?;
            log::info!("restored queue entry {to:?}");
            restored += 1;
        }
        for name in names.iter().filter(|name| is_claim_dir_name(name)) {
            let dir = self.base_dir.join(name);
            if let Err(error) = std::fs::remove_dir(&dir) {
                log::debug!("keeping claim directory {dir:?}: {error}");
            }
        }
        Ok(restored)
    }
}

/// The prefix becomes part of each entry's file name.
fn prefix_problem(prefix: &str) -> Option<&'static str> {
    if prefix.is_empty() {
        Some("file prefix must not be empty")
    } else if prefix.starts_with('.') {
        Some("file prefix must not start with a '.'")
    } else {
        key_problem(prefix)
    }
}

impl QueueStore for DirQueue {
    fn size(&self) -> Result<usize, DirError> {
        DirQueue::size(self)
    }

    fn get(&self) -> Result<String, DirError> {
        DirQueue::get(self)
    }

    fn put(&self, value: &str) -> Result<(), DirError> {
        DirQueue::put(self, value)
    }

    fn max_size(&self) -> usize {
        DirQueue::max_size(self)
    }
}
