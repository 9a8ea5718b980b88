//! Directories presented as a mapping (`DirMap`) and as a queue
//! (`DirQueue`), plus a blocking bounded queue wrapper usable over any
//! `QueueStore`.

pub mod bounded_queue;
pub mod ctx;
pub mod dir_fs;
pub mod io_utils;
pub mod utillib;

pub use bounded_queue::{BoundedQueue, PollConfig, QueueError};
pub use dir_fs::{
    dir_map::{DirMap, DirMapConfig, EntryKind},
    dir_queue::{DirQueue, DirQueueConfig},
    error::{DirError, ErrorKind},
    store::{MapStore, QueueStore, Value},
    sync::FsSync,
};
