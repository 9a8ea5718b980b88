//! Blocking, optionally bounded queue on top of the non-blocking
//! primitives of a `QueueStore`.
//!
//! Changes made by other processes can't be signalled to us, so
//! waiting is done by polling the store, with a sleep time that grows
//! from `PollConfig::initial_sleep` up to `PollConfig::max_sleep`.

use std::{
    thread::sleep,
    time::{Duration, Instant},
};

use crate::dir_fs::{error::DirError, store::QueueStore};

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
    #[error("queue is full")]
    Full,
    #[error(transparent)]
    Store(#[from] DirError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub initial_sleep: Duration,
    pub max_sleep: Duration,
    /// Percentage by which the sleep time grows after each poll
    pub growth_percent: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            initial_sleep: Duration::from_millis(1),
            max_sleep: Duration::from_secs(2),
            growth_percent: 10,
        }
    }
}

/// Sleeps between polls until an optional deadline.
struct Poller {
    config: PollConfig,
    sleep_time: Duration,
    deadline: Option<Instant>,
}

impl Poller {
    fn new(config: PollConfig, timeout: Option<Duration>) -> Self {
        Poller {
            config,
            sleep_time: config.initial_sleep,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Returns false if the deadline has passed (without sleeping).
    fn sleep(&mut self) -> bool {
        let mut sleep_time = self.sleep_time;
        if let Some(deadline) = self.deadline {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep_time = sleep_time.min(deadline - now);
        }
        sleep(sleep_time);
        let grown = self.sleep_time + self.sleep_time * self.config.growth_percent / 100;
        // Make sure tiny durations still grow
        let grown = grown.max(self.sleep_time + Duration::from_micros(1));
        self.sleep_time = grown.min(self.config.max_sleep);
        true
    }
}

/// A FIFO queue with blocking `get`/`put`, over any `QueueStore`.
/// The capacity is the store's `max_size()` (0 is unbounded). Checking
/// the size and then putting is not atomic, so with several producers
/// the bound can be exceeded by up to the number of producers.
#[derive(Debug)]
pub struct BoundedQueue<Q: QueueStore> {
    store: Q,
    poll: PollConfig,
}

impl<Q: QueueStore> BoundedQueue<Q> {
    pub fn new(store: Q) -> Self {
        Self::with_poll_config(store, PollConfig::default())
    }

    pub fn with_poll_config(store: Q, poll: PollConfig) -> Self {
        Self { store, poll }
    }

    pub fn store(&self) -> &Q {
        &self.store
    }

    pub fn into_store(self) -> Q {
        self.store
    }

    pub fn maxsize(&self) -> usize {
        self.store.max_size()
    }

    pub fn qsize(&self) -> Result<usize, QueueError> {
        Ok(self.store.size()?)
    }

    pub fn empty(&self) -> Result<bool, QueueError> {
        Ok(self.qsize()? == 0)
    }

    pub fn full(&self) -> Result<bool, QueueError> {
        let max = self.maxsize();
        Ok(max > 0 && self.qsize()? >= max)
    }

    /// Add `value`. If the queue is full: with `block` false, fail
    /// with `Full` right away; otherwise wait until there is room, or
    /// fail with `Full` after `timeout` (None waits forever).
    /// Collisions with concurrent producers are retried.
    pub fn put(&self, value: &str, block: bool, timeout: Option<Duration>) -> Result<(), QueueError> {
        let mut poller = Poller::new(self.poll, timeout);
        loop {
            if !self.full()? {
                match self.store.put(value) {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_retryable() => {
                        log::debug!("retrying put after collision: {e}");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if !block || !poller.sleep() {
                return Err(QueueError::Full);
            }
        }
    }

    /// Remove and return the front value. If the queue is empty: with
    /// `block` false, fail with `Empty` right away; otherwise wait
    /// for a value, or fail with `Empty` after `timeout` (None waits
    /// forever). A `NotFound` from the store that is not explained by
    /// entries disappearing (e.g. a front entry that isn't a file) is
    /// returned as `QueueError::Store`.
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Result<String, QueueError> {
        let mut poller = Poller::new(self.poll, timeout);
        loop {
            let size = self.qsize()?;
            if size > 0 {
                match self.store.get() {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_not_found() => {
                        let size_now = self.qsize()?;
                        if size_now >= size {
                            return Err(e.into());
                        }
                        // Another consumer was faster
                        log::debug!("lost race for front entry: {e}");
                        if size_now > 0 {
                            continue;
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if !block || !poller.sleep() {
                return Err(QueueError::Empty);
            }
        }
    }

    pub fn put_nowait(&self, value: &str) -> Result<(), QueueError> {
        self.put(value, false, None)
    }

    pub fn get_nowait(&self) -> Result<String, QueueError> {
        self.get(false, None)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque, path::PathBuf};

    use super::*;

    /// In-memory store, fails `put` with a collision `collisions`
    /// times first. `lost_races` times, `get` drops the front value
    /// and fails as if another consumer took it; with `stuck_front`,
    /// `get` always fails without removing anything.
    #[derive(Default)]
    struct MemQueue {
        items: RefCell<VecDeque<String>>,
        max_size: usize,
        collisions: RefCell<usize>,
        lost_races: RefCell<usize>,
        stuck_front: bool,
    }

    fn not_found(ctx: &'static str) -> DirError {
        DirError::NotFound {
            base_dir: PathBuf::new(),
            path: PathBuf::new(),
            ctx,
            error: None,
        }
    }

    impl QueueStore for MemQueue {
        fn size(&self) -> Result<usize, DirError> {
            Ok(self.items.borrow().len())
        }

        fn get(&self) -> Result<String, DirError> {
            if self.stuck_front {
                return Err(not_found("stuck"));
            }
            let mut lost_races = self.lost_races.borrow_mut();
            if *lost_races > 0 {
                *lost_races -= 1;
                self.items.borrow_mut().pop_front();
                return Err(not_found("taken"));
            }
            self.items
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| not_found("empty"))
        }

        fn put(&self, value: &str) -> Result<(), DirError> {
            let mut collisions = self.collisions.borrow_mut();
            if *collisions > 0 {
                *collisions -= 1;
                return Err(DirError::Collision {
                    base_dir: PathBuf::new(),
                    path: PathBuf::new(),
                });
            }
            self.items.borrow_mut().push_back(value.into());
            Ok(())
        }

        fn max_size(&self) -> usize {
            self.max_size
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            initial_sleep: Duration::from_micros(100),
            max_sleep: Duration::from_millis(5),
            growth_percent: 50,
        }
    }

    #[test]
    fn t_nowait() {
        let q = BoundedQueue::with_poll_config(
            MemQueue {
                max_size: 2,
                ..Default::default()
            },
            fast(),
        );
        assert!(q.empty().unwrap());
        assert!(matches!(q.get_nowait(), Err(QueueError::Empty)));
        q.put_nowait("a").unwrap();
        q.put_nowait("b").unwrap();
        assert!(q.full().unwrap());
        assert!(matches!(q.put_nowait("c"), Err(QueueError::Full)));
        assert_eq!(q.get_nowait().unwrap(), "a");
        assert_eq!(q.qsize().unwrap(), 1);
    }

    #[test]
    fn t_unbounded_is_never_full() {
        let q = BoundedQueue::new(MemQueue::default());
        for i in 0..100 {
            q.put_nowait(&i.to_string()).unwrap();
        }
        assert!(!q.full().unwrap());
        assert_eq!(q.maxsize(), 0);
    }

    #[test]
    fn t_timeouts() {
        let q = BoundedQueue::with_poll_config(
            MemQueue {
                max_size: 1,
                ..Default::default()
            },
            fast(),
        );
        let start = Instant::now();
        assert!(matches!(
            q.get(true, Some(Duration::from_millis(30))),
            Err(QueueError::Empty)
        ));
        assert!(start.elapsed() >= Duration::from_millis(30));

        q.put("x", true, Some(Duration::from_millis(30))).unwrap();
        let start = Instant::now();
        assert!(matches!(
            q.put("y", true, Some(Duration::from_millis(30))),
            Err(QueueError::Full)
        ));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn t_collisions_are_retried() {
        let q = BoundedQueue::new(MemQueue {
            collisions: RefCell::new(3),
            ..Default::default()
        });
        q.put_nowait("v").unwrap();
        assert_eq!(q.get_nowait().unwrap(), "v");
        assert_eq!(*q.store().collisions.borrow(), 0);
    }

    #[test]
    fn t_lost_races_are_retried() {
        let q = BoundedQueue::new(MemQueue {
            lost_races: RefCell::new(2),
            ..Default::default()
        });
        for v in ["a", "b", "c"] {
            q.put_nowait(v).unwrap();
        }
        assert_eq!(q.get_nowait().unwrap(), "c");
        // the last value taken by someone else just means empty
        q.put_nowait("d").unwrap();
        *q.store().lost_races.borrow_mut() = 1;
        assert!(matches!(q.get_nowait(), Err(QueueError::Empty)));
    }

    #[test]
    fn t_permanent_not_found_is_returned() {
        let q = BoundedQueue::new(MemQueue {
            stuck_front: true,
            ..Default::default()
        });
        q.put_nowait("a").unwrap();
        match q.get(true, None) {
            Err(QueueError::Store(e)) => assert!(e.is_not_found()),
            other => panic!("expected a store error, got {other:?}"),
        }
        assert_eq!(q.qsize().unwrap(), 1);
    }

    #[test]
    fn t_poller_growth_is_capped() {
        let mut p = Poller::new(fast(), None);
        for _ in 0..30 {
            assert!(p.sleep());
        }
        assert_eq!(p.sleep_time, fast().max_sleep);
    }
}
