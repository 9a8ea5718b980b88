//! Filesystem directories as data structures: one file per value,
//! with the file name as the key (`dir_map`) or as the ordering of a
//! queue (`dir_queue`). The goal is not speed, but durability and
//! ease of inspection of the state with standard command line tools.
//! There is no locking and no caching; every operation works on the
//! live directory contents.

pub mod dir_map;
pub mod dir_queue;
pub mod error;
pub mod key;
pub mod queue_name;
pub mod store;
pub mod sync;
