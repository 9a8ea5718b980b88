use std::{
    ffi::OsStr,
    fs::{DirEntry, FileType},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::io_utils::tempfile_utils::Tempfile;

use super::{
    error::DirError,
    key::{is_internal_file_name, key_path},
    store::{MapStore, Value},
    sync::FsSync,
};

/// Configuration for `DirMap`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirMapConfig {
    /// Whether to call fsync on files and the containing directory
    /// when setting values (default: All).
    #[serde(default)]
    pub sync: FsSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Symlinks (not followed), devices, sockets and FIFOs are not
    /// entries.
    fn from_file_type(file_type: FileType) -> Option<Self> {
        if file_type.is_file() {
            Some(EntryKind::File)
        } else if file_type.is_dir() {
            Some(EntryKind::Directory)
        } else {
            None
        }
    }
}

/// A directory viewed as a mutable mapping: file names are the keys,
/// file contents the values, subdirectories are nested `DirMap`s.
#[derive(Debug, Clone, PartialEq)]
pub struct DirMap {
    pub config: DirMapConfig,
    base_dir: PathBuf,
}

impl DirMap {
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, DirError> {
        Self::open(base_dir, DirMapConfig::default())
    }

    /// Fails with `InvalidArgument` unless `base_dir` is an existing
    /// directory.
    pub fn open(base_dir: impl AsRef<Path>, config: DirMapConfig) -> Result<Self, DirError> {
        let base_dir = base_dir.as_ref().to_owned();
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

    /// The contents of the file `key` as text, or the subdirectory
    /// `key` as a nested map.
    pub fn get(&self, key: &str) -> Result<Value, DirError> {
        let target_path = key_path(&self.base_dir, key)?;
        let meta = std::fs::symlink_metadata(&target_path).map_err(|error| {
            DirError::not_found(&self.base_dir, target_path.clone(), "no entry", Some(error))
        })?;
        match EntryKind::from_file_type(meta.file_type()) {
            Some(EntryKind::File) => {
                let s = std::fs::read_to_string(&target_path).map_err(|error| {
                    DirError::not_found(
                        &self.base_dir,
                        target_path.clone(),
                        "reading/UTF-decoding value file",
                        Some(error),
                    )
                })?;
                Ok(Value::Text(s))
            }
            Some(EntryKind::Directory) => Ok(Value::Nested(DirMap {
                config: self.config.clone(),
                base_dir: target_path,
            })),
            None => Err(DirError::not_found(
                &self.base_dir,
                target_path,
                "neither a file nor a directory",
                None,
            )),
        }
    }

    /// Replace the whole contents of the file `key` with `value`,
    /// creating it if necessary. Readers see either the old or the
    /// new value, never a mix.
    pub fn set(&self, key: &str, value: &str) -> Result<(), DirError> {
        let target_path = key_path(&self.base_dir, key)?;
        let sync = self.config.sync;
        Tempfile::write(target_path.clone(), value.as_bytes(), sync)
            .and_then(|tempfile| tempfile.finish(sync))
            .map_err(|error| {
                DirError::not_found(
                    &self.base_dir,
                    target_path,
                    "unable to write file for",
                    error.into_io_error(),
                )
            })
    }

    /// Remove the file `key`. A directory is only removed if it is
    /// empty; otherwise this fails and nothing is deleted.
    pub fn delete(&self, key: &str) -> Result<(), DirError> {
        let target_path = key_path(&self.base_dir, key)?;
        let meta = std::fs::symlink_metadata(&target_path).map_err(|error| {
            DirError::not_found(&self.base_dir, target_path.clone(), "no entry", Some(error))
        })?;
        let (ctx, result) = if meta.is_dir() {
            ("deleting directory", std::fs::remove_dir(&target_path))
        } else {
            ("deleting file", std::fs::remove_file(&target_path))
        };
        result.map_err(|error| DirError::not_found(&self.base_dir, target_path, ctx, Some(error)))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let Ok(target_path) = key_path(&self.base_dir, key) else {
            return false;
        };
        match std::fs::symlink_metadata(target_path) {
            Ok(meta) => EntryKind::from_file_type(meta.file_type()).is_some(),
            Err(_) => false,
        }
    }

    fn entry_of(&self, entry: std::io::Result<DirEntry>) -> Result<Option<(String, EntryKind)>, DirError> {
        let entry = entry.map_err(|error| {
            DirError::not_found(
                &self.base_dir,
                self.base_dir.clone(),
                "reading directory entry",
                Some(error),
            )
        })?;
        let file_name = entry.file_name();
        let Some(key) = file_name_as_key(&file_name) else {
            return Ok(None);
        };
        let file_type = match entry.file_type() {
            Ok(t) => t,
            // Vanished since listing
            Err(_) => return Ok(None),
        };
        Ok(EntryKind::from_file_type(file_type).map(|kind| (key.to_owned(), kind)))
    }

    /// All files and subdirectories with their kind, from a listing
    /// taken now. Order is whatever the filesystem gives.
    pub fn entries<'s>(
        &'s self,
    ) -> Result<impl Iterator<Item = Result<(String, EntryKind), DirError>> + 's, DirError> {
        let dir = std::fs::read_dir(&self.base_dir).map_err(|error| {
            DirError::not_found(
                &self.base_dir,
                self.base_dir.clone(),
                "opening directory",
                Some(error),
            )
        })?;
        Ok(dir.filter_map(move |entry| self.entry_of(entry).transpose()))
    }

    /// The keys of `entries`. Each call lists the directory anew.
    pub fn keys<'s>(
        &'s self,
    ) -> Result<impl Iterator<Item = Result<String, DirError>> + 's, DirError> {
        Ok(self.entries()?.map(|entry| entry.map(|(key, _kind)| key)))
    }

    /// The number of items `keys` yields (links and special files
    /// are not counted).
    pub fn len(&self) -> Result<usize, DirError> {
        let mut n = 0;
        for key in self.keys()? {
            key?;
            n += 1;
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool, DirError> {
        Ok(self.len()? == 0)
    }
}

/// Names that aren't UTF-8 can't be looked up with a `&str` key, and
/// our own temporaries are not values.
fn file_name_as_key(file_name: &OsStr) -> Option<&str> {
    let s = file_name.to_str()?;
    if is_internal_file_name(s) {
        None
    } else {
        Some(s)
    }
}

impl MapStore for DirMap {
    type Nested = DirMap;

    fn get(&self, key: &str) -> Result<Value, DirError> {
        DirMap::get(self, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DirError> {
        DirMap::set(self, key, value)
    }

    fn delete(&self, key: &str) -> Result<(), DirError> {
        DirMap::delete(self, key)
    }

    fn len(&self) -> Result<usize, DirError> {
        DirMap::len(self)
    }

    fn keys(&self) -> Result<Box<dyn Iterator<Item = Result<String, DirError>> + '_>, DirError> {
        Ok(Box::new(DirMap::keys(self)?))
    }

    fn contains_key(&self, key: &str) -> bool {
        DirMap::contains_key(self, key)
    }
}
