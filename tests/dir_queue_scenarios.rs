use std::{
    collections::BTreeSet,
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use persistent_structures::{
    BoundedQueue, DirError, DirQueue, DirQueueConfig, ErrorKind, FsSync, PollConfig, QueueError,
};

fn open(dir: &std::path::Path) -> DirQueue {
    DirQueue::open(
        dir,
        DirQueueConfig {
            sync: FsSync::No,
            ..Default::default()
        },
    )
    .unwrap()
}

#[test]
fn numbering_past_nine_is_numeric() {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=9 {
        std::fs::write(dir.path().join(format!("FSList-{i}")), format!("v{i}")).unwrap();
    }
    let q = open(dir.path());
    q.put("v10").unwrap();
    assert!(dir.path().join("FSList-10").is_file());
    q.put("v11").unwrap();
    assert!(dir.path().join("FSList-11").is_file());

    let got: Vec<String> = (1..=11).map(|_| q.get().unwrap()).collect();
    let expected: Vec<String> = (1..=11).map(|i| format!("v{i}")).collect();
    assert_eq!(got, expected);
    assert_eq!(q.size().unwrap(), 0);
    assert_eq!(q.get().unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn missing_directory_is_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    let err = DirQueue::new(dir.path().join("no-such-dir")).unwrap_err();
    assert!(matches!(err, DirError::InvalidArgument { .. }));
}

#[test]
fn concurrent_producers_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let n_threads = 8;
    let per_thread = 20;
    let barrier = Arc::new(Barrier::new(n_threads));

    let handles: Vec<_> = (0..n_threads)
        .map(|t| {
            let q = open(dir.path());
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut collisions = 0;
                for i in 0..per_thread {
                    let value = format!("{t}-{i}");
                    loop {
                        match q.put(&value) {
                            Ok(()) => break,
                            Err(e) => {
                                assert_eq!(e.kind(), ErrorKind::Collision);
                                collisions += 1;
                            }
                        }
                    }
                }
                collisions
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let q = open(dir.path());
    assert_eq!(q.size().unwrap(), n_threads * per_thread);
    let mut seen = BTreeSet::new();
    while let Ok(v) = q.get() {
        assert!(seen.insert(v));
    }
    assert_eq!(seen.len(), n_threads * per_thread);
}

#[test]
fn concurrent_consumers_get_each_value_once() {
    let dir = tempfile::tempdir().unwrap();
    let total = 200;
    {
        let q = open(dir.path());
        for i in 0..total {
            q.put(&i.to_string()).unwrap();
        }
    }

    let n_threads = 6;
    let barrier = Arc::new(Barrier::new(n_threads));
    let handles: Vec<_> = (0..n_threads)
        .map(|_| {
            let q = open(dir.path());
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut got = Vec::new();
                loop {
                    match q.get() {
                        Ok(v) => got.push(v),
                        Err(e) => {
                            assert_eq!(e.kind(), ErrorKind::NotFound);
                            if q.size().unwrap() == 0 {
                                break;
                            }
                        }
                    }
                }
                got
            })
        })
        .collect();

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.join().unwrap());
    }
    assert_eq!(all.len(), total);
    let distinct: BTreeSet<_> = all.iter().collect();
    assert_eq!(distinct.len(), total);
}

#[test]
fn bounded_queue_over_directory() {
    let dir = tempfile::tempdir().unwrap();
    let q = DirQueue::open(
        dir.path(),
        DirQueueConfig {
            max_size: 2,
            sync: FsSync::No,
            ..Default::default()
        },
    )
    .unwrap();
    let poll = PollConfig {
        initial_sleep: Duration::from_micros(200),
        max_sleep: Duration::from_millis(10),
        growth_percent: 20,
    };
    let bq = BoundedQueue::with_poll_config(q, poll);
    bq.put_nowait("a").unwrap();
    bq.put_nowait("b").unwrap();
    assert!(bq.full().unwrap());
    assert!(matches!(bq.put_nowait("c"), Err(QueueError::Full)));
    assert_eq!(bq.get_nowait().unwrap(), "a");
    assert_eq!(bq.get_nowait().unwrap(), "b");
    assert!(matches!(
        bq.get(true, Some(Duration::from_millis(20))),
        Err(QueueError::Empty)
    ));
}

#[test]
fn blocking_get_sees_put_from_other_thread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_owned();
    let consumer = thread::spawn(move || {
        let bq = BoundedQueue::with_poll_config(
            open(&path),
            PollConfig {
                initial_sleep: Duration::from_millis(1),
                max_sleep: Duration::from_millis(20),
                growth_percent: 10,
            },
        );
        bq.get(true, Some(Duration::from_secs(10)))
    });
    thread::sleep(Duration::from_millis(50));
    open(dir.path()).put("hello").unwrap();
    assert_eq!(consumer.join().unwrap().unwrap(), "hello");
}

#[test]
fn blocking_put_waits_for_room() {
    let dir = tempfile::tempdir().unwrap();
    let config = DirQueueConfig {
        max_size: 1,
        sync: FsSync::No,
        ..Default::default()
    };
    let q = DirQueue::open(dir.path(), config.clone()).unwrap();
    q.put("first").unwrap();

    let path = dir.path().to_owned();
    let producer = thread::spawn(move || {
        let bq = BoundedQueue::new(DirQueue::open(&path, config).unwrap());
        bq.put("second", true, Some(Duration::from_secs(10)))
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(q.get().unwrap(), "first");
    producer.join().unwrap().unwrap();
    assert_eq!(q.get().unwrap(), "second");
}

#[test]
fn crashed_consumer_recovered_after_later_puts() {
    let dir = tempfile::tempdir().unwrap();
    let q = open(dir.path());
    q.put("a").unwrap();
    q.put("b").unwrap();
    // a consumer that died holding the newest entry
    let claim_dir = dir.path().join(".claim~4242-4242");
    std::fs::create_dir(&claim_dir).unwrap();
    std::fs::rename(dir.path().join("FSList-2"), claim_dir.join("FSList-2")).unwrap();

    q.put("c").unwrap();
    q.put("d").unwrap();
    assert_eq!(q.size().unwrap(), 3);
    assert_eq!(q.recover_claims().unwrap(), 1);
    assert_eq!(q.size().unwrap(), 4);
    let got: Vec<String> = (0..4).map(|_| q.get().unwrap()).collect();
    assert_eq!(got, ["a", "b", "c", "d"]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn bounded_queue_reports_directory_at_front() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("FSList-1")).unwrap();
    let q = open(dir.path());
    q.put("x").unwrap();
    let bq = BoundedQueue::new(q);
    assert_eq!(bq.qsize().unwrap(), 2);
    match bq.get_nowait() {
        Err(QueueError::Store(e)) => assert_eq!(e.kind(), ErrorKind::NotFound),
        other => panic!("expected a store error, got {other:?}"),
    }
    match bq.get(true, Some(Duration::from_secs(10))) {
        Err(QueueError::Store(e)) => assert_eq!(e.kind(), ErrorKind::NotFound),
        other => panic!("expected a store error, got {other:?}"),
    }
    assert_eq!(bq.qsize().unwrap(), 2);
}
