use elastic_pool::{ExecutorService, ThreadPoolExecutor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_log::test;

use std::cell::RefCell;

use harness::{gated_counter, wait_for, Gate, TIMEOUT};

#[test]
fn test_idle_workers_time_out() {
    let keep_alive = Duration::from_millis(50);
    let pool = ThreadPoolExecutor::new(3, 3, keep_alive).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    for _ in 0..3 {
        let ran = ran.clone();
        pool.execute(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    assert!(wait_for(TIMEOUT, || pool.active_workers() == 0));
    assert!(start.elapsed() >= keep_alive);
    assert!(!pool.is_shutdown());
    assert_eq!(pool.completed_task_count(), 3);

    // the pool grows again on demand
    pool.execute(|| {}).unwrap();
    assert_eq!(pool.active_workers(), 1);
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
}

#[test]
fn test_panicking_task_only_ends_its_worker() {
    let pool = ThreadPoolExecutor::new(1, 5, Duration::ZERO).unwrap();
    let mut gate = Gate::new();
    let wait = gate.waiter();
    pool.execute(move || {
        wait();
        panic!("task failure");
    })
    .unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        pool.submit(Some(gated_counter(&gate, &ran))).unwrap();
    }
    gate.open();

    // a replacement worker drains the backlog
    assert!(wait_for(TIMEOUT, || ran.load(Ordering::SeqCst) == 3));
    assert_eq!(pool.active_workers(), 1);
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(pool.active_workers(), 0);
    assert_eq!(pool.completed_task_count(), 4);
}

#[test]
fn test_panic_with_empty_queue_frees_slot() {
    let pool = ThreadPoolExecutor::new(1, 1, Duration::ZERO).unwrap();
    pool.execute(|| panic!("boom")).unwrap();
    assert!(wait_for(TIMEOUT, || pool.active_workers() == 0));

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    pool.execute(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert!(wait_for(TIMEOUT, || ran.load(Ordering::SeqCst) == 1));
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(pool.completed_task_count(), 2);
}

#[test]
fn test_completed_count_matches_tasks_run() {
    let pool = ThreadPoolExecutor::new(4, 50, Duration::from_millis(20)).unwrap();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..50 {
        let ran = ran.clone();
        pool.execute(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }
    assert!(wait_for(TIMEOUT, || ran.load(Ordering::SeqCst) == 50));
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(pool.completed_task_count(), 50);
}

thread_local! {
    static ON_THREAD_EXIT: RefCell<Option<crossbeam::channel::Sender<()>>> = const { RefCell::new(None) };
}

#[test]
fn test_dropping_last_handle_stops_idle_workers() {
    let pool = ThreadPoolExecutor::new(1, 1, Duration::ZERO).unwrap();
    let (exit_tx, exited) = crossbeam::channel::bounded::<()>(0);
    let (ran_tx, ran) = crossbeam::channel::bounded(1);
    pool.execute(move || {
        ON_THREAD_EXIT.with(|slot| *slot.borrow_mut() = Some(exit_tx));
        let _ = ran_tx.send(());
    })
    .unwrap();
    ran.recv_timeout(TIMEOUT).unwrap();
    assert!(wait_for(TIMEOUT, || pool.busy_workers() == 0));
    assert_eq!(
        exited.recv_timeout(Duration::from_millis(50)),
        Err(crossbeam::channel::RecvTimeoutError::Timeout)
    );
    assert_eq!(pool.active_workers(), 1);

    drop(pool);
    assert_eq!(
        exited.recv_timeout(TIMEOUT),
        Err(crossbeam::channel::RecvTimeoutError::Disconnected)
    );
}

#[test]
fn test_dropping_last_handle_cancels_running_task() {
    let pool = ThreadPoolExecutor::new(1, 1, Duration::ZERO).unwrap();
    let (started_tx, started) = crossbeam::channel::bounded(1);
    let (seen_tx, seen) = crossbeam::channel::bounded(1);
    pool.execute_cancellable(move |token| {
        let _ = started_tx.send(());
        let _ = seen_tx.send(token.wait_timeout(TIMEOUT));
    })
    .unwrap();
    started.recv().unwrap();
    drop(pool);
    assert_eq!(seen.recv_timeout(TIMEOUT), Ok(true));
}
