//! Pool Manager Tests
//!
//! These tests verify:
//! - Start opens `pool_size` workers, or fails and closes what it opened
//! - At most `pool_size` workers are ever leased at once
//! - Lease timeouts, FIFO ordering of waiters
//! - Return paths (explicit release, drop, panic unwinding)
//! - A worker whose request panicked mid-flight is replaced, never reused
//! - Stop semantics

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use common::{memory_config, FaultyClient};
use kvpool::{Command, ErrorKind, MemoryClient, Pool, Reply, WorkerState};

// =============================================================================
// Helper Functions
// =============================================================================

fn start(size: usize) -> Pool<MemoryClient> {
    Pool::start(memory_config(size), MemoryClient::new()).unwrap()
}

// =============================================================================
// Start / Stop Tests
// =============================================================================

#[test]
fn test_start_opens_every_worker() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(4), client.clone()).unwrap();

    assert_eq!(client.opens(), 4);
    let stats = pool.stats();
    assert_eq!(stats.pool_size, 4);
    assert_eq!(stats.idle, 4);
    assert_eq!(stats.leased, 0);
    assert!(pool.worker_states().iter().all(|s| *s == WorkerState::Idle));
    assert_eq!(pool.name(), "test");
    assert_eq!(pool.endpoint().port, 6379);
}

#[test]
fn test_start_failure_closes_opened_workers() {
    let client = FaultyClient::new();
    client.refuse_opens_after(2);

    let err = Pool::start(memory_config(3), client.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(client.opens(), 2);
    assert_eq!(client.closes(), 2);
}

#[test]
fn test_start_failure_on_first_worker() {
    let client = FaultyClient::new();
    client.fail_next_opens(1);

    let err = Pool::start(memory_config(3), client.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(client.opens(), 0);
    assert_eq!(client.closes(), 0);
}

#[test]
fn test_start_authentication_failure() {
    let client = FaultyClient::new();
    client.reject_auth();
    let err = Pool::start(memory_config(2), client).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[test]
fn test_stop_is_idempotent_and_closes_workers() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(3), client.clone()).unwrap();

    pool.stop();
    pool.stop();

    assert!(pool.is_stopped());
    assert_eq!(client.closes(), 3);
    assert_eq!(pool.stats().idle, 0);
}

#[test]
fn test_lease_after_stop_is_pool_error() {
    let pool = start(1);
    pool.stop();
    let err = pool.lease("after-stop", Duration::from_millis(10)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pool);
}

#[test]
fn test_stop_closes_leased_worker_on_return() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(2), client.clone()).unwrap();

    let lease = pool.lease("held", Duration::from_millis(100)).unwrap();
    pool.stop();
    assert_eq!(client.closes(), 1);

    drop(lease);
    assert_eq!(client.closes(), 2);
    assert_eq!(pool.stats().idle, 0);
}

#[test]
fn test_stop_wakes_blocked_waiters() {
    let pool = start(1);
    let held = pool.lease("held", Duration::from_millis(100)).unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.lease("blocked", Duration::from_secs(10)))
    };

    while pool.stats().waiting == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    let started = Instant::now();
    pool.stop();

    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Pool);
    assert!(started.elapsed() < Duration::from_secs(5));
    drop(held);
}

// =============================================================================
// Lease Tests
// =============================================================================

#[test]
fn test_lease_and_release() {
    let pool = start(2);

    let mut lease = pool.lease("write", Duration::from_millis(100)).unwrap();
    assert_eq!(lease.purpose(), "write");
    assert_eq!(pool.stats().leased, 1);
    assert_eq!(pool.worker_states()[lease.slot()], WorkerState::Leased);

    let reply = lease.send(&Command::new(["SET", "k", "v"])).unwrap();
    assert_eq!(reply, Reply::status("OK"));

    pool.release(lease);
    let stats = pool.stats();
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.leases_total, 1);
}

#[test]
fn test_lease_send_maps_error_reply_to_command_error() {
    let pool = start(1);
    let mut lease = pool.lease("bad", Duration::from_millis(100)).unwrap();
    let err = lease.send(&Command::new(["NOPE"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Command);
}

#[test]
fn test_lease_timeout_leaves_idle_count_unchanged() {
    let pool = start(1);
    let held = pool.lease("held", Duration::from_millis(100)).unwrap();
    let idle_before = pool.stats().idle;

    let timeout = Duration::from_millis(50);
    let started = Instant::now();
    let err = pool.lease("late", timeout).unwrap_err();

    assert!(started.elapsed() >= timeout);
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let stats = pool.stats();
    assert_eq!(stats.idle, idle_before);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.lease_timeouts, 1);

    drop(held);
    assert_eq!(pool.stats().idle, 1);
}

#[test]
fn test_zero_timeout_succeeds_when_idle() {
    let pool = start(1);
    let lease = pool.lease("now", Duration::ZERO).unwrap();
    assert!(pool.lease("now", Duration::ZERO).is_err());
    drop(lease);
}

#[test]
fn test_waiter_gets_returned_worker() {
    let pool = start(1);
    let held = pool.lease("held", Duration::from_millis(100)).unwrap();
    let held_id = held.worker_id();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            pool.lease("waiting", Duration::from_secs(5))
                .map(|lease| lease.worker_id())
        })
    };

    while pool.stats().waiting == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    drop(held);

    assert_eq!(waiter.join().unwrap().unwrap(), held_id);
}

#[test]
fn test_waiters_are_served_in_fifo_order() {
    let pool = start(1);
    let held = pool.lease("held", Duration::from_millis(100)).unwrap();
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::new();
    for i in 0..4 {
        let queued = pool.clone();
        let tx = tx.clone();
        handles.push(thread::spawn(move || {
            let lease = queued.lease("queued", Duration::from_secs(10)).unwrap();
            tx.send(i).unwrap();
            thread::sleep(Duration::from_millis(5));
            drop(lease);
        }));
        // Enqueue deterministically, one waiter at a time.
        while pool.stats().waiting < i + 1 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    drop(held);
    for handle in handles {
        handle.join().unwrap();
    }

    let order: Vec<usize> = rx.try_iter().collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn test_timed_out_waiter_does_not_block_queue() {
    let pool = start(1);
    let held = pool.lease("held", Duration::from_millis(100)).unwrap();

    let impatient = {
        let pool = pool.clone();
        thread::spawn(move || pool.lease("impatient", Duration::from_millis(20)))
    };
    while pool.stats().waiting == 0 {
        thread::sleep(Duration::from_millis(1));
    }

    let patient = {
        let pool = pool.clone();
        thread::spawn(move || pool.lease("patient", Duration::from_secs(5)).map(|_| ()))
    };

    assert_eq!(impatient.join().unwrap().unwrap_err().kind(), ErrorKind::Timeout);
    drop(held);
    patient.join().unwrap().unwrap();
}

#[test]
fn test_never_more_than_pool_size_leased() {
    let size = 3;
    let pool = start(size);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(12));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let pool = pool.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    let lease = pool.lease("load", Duration::from_secs(10)).unwrap();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    assert!(pool.stats().leased <= size);
                    thread::yield_now();
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    drop(lease);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= size);
    let stats = pool.stats();
    assert_eq!(stats.idle, size);
    assert_eq!(stats.leases_total, 240);
}

#[test]
fn test_worker_returned_when_holder_panics() {
    let pool = start(1);

    let crashed = {
        let pool = pool.clone();
        thread::spawn(move || {
            let _lease = pool.lease("doomed", Duration::from_millis(100)).unwrap();
            panic!("caller failed mid-lease");
        })
    };
    assert!(crashed.join().is_err());

    assert_eq!(pool.stats().idle, 1);
    pool.lease("after", Duration::from_millis(100)).unwrap();
}

#[test]
fn test_transport_fault_probes_worker_on_return() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(1), client.clone()).unwrap();

    let mut lease = pool.lease("faulty", Duration::from_millis(100)).unwrap();
    client.fail_next_sends(1);
    let err = lease.send(&Command::new(["GET", "k"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);

    // Probe passes, the same worker goes back to idle.
    let id = lease.worker_id();
    drop(lease);
    assert_eq!(client.pings(), 1);
    assert_eq!(pool.lease("again", Duration::from_millis(100)).unwrap().worker_id(), id);
}

#[test]
fn test_broken_worker_replaced_on_return() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(1), client.clone()).unwrap();

    let mut lease = pool.lease("faulty", Duration::from_millis(100)).unwrap();
    let old_id = lease.worker_id();
    client.fail_next_sends(1);
    client.fail_next_pings(1);
    assert!(lease.send(&Command::new(["GET", "k"])).is_err());
    drop(lease);

    let stats = pool.stats();
    assert_eq!(stats.workers_removed, 1);
    assert_eq!(stats.workers_replaced, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(client.opens(), 2);

    let fresh = pool.lease("fresh", Duration::from_millis(100)).unwrap();
    assert_ne!(fresh.worker_id(), old_id);
}

#[test]
fn test_worker_replaced_when_client_panics_mid_request() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(1), client.clone()).unwrap();
    let old_id = pool.lease("peek", Duration::from_millis(100)).unwrap().worker_id();

    client.panic_next_sends(1);
    let crashed = {
        let pool = pool.clone();
        thread::spawn(move || {
            let mut lease = pool.lease("doomed", Duration::from_millis(100)).unwrap();
            let _ = lease.send(&Command::new(["GET", "k"]));
        })
    };
    assert!(crashed.join().is_err());

    let stats = pool.stats();
    assert_eq!(stats.workers_removed, 1);
    assert_eq!(stats.workers_replaced, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(client.closes(), 1);
    assert_eq!(client.opens(), 2);

    let mut fresh = pool.lease("fresh", Duration::from_millis(100)).unwrap();
    assert_ne!(fresh.worker_id(), old_id);
    assert_eq!(fresh.send(&Command::new(["PING", "ok"])).unwrap(), Reply::bulk("ok"));
}

#[test]
fn test_holder_panic_outside_request_keeps_worker() {
    let client = FaultyClient::new();
    let pool = Pool::start(memory_config(1), client.clone()).unwrap();

    let crashed = {
        let pool = pool.clone();
        thread::spawn(move || {
            let mut lease = pool.lease("doomed", Duration::from_millis(100)).unwrap();
            lease.send(&Command::new(["SET", "k", "v"])).unwrap();
            panic!("caller failed after its request");
        })
    };
    assert!(crashed.join().is_err());

    assert_eq!(pool.stats().workers_removed, 0);
    assert_eq!(client.closes(), 0);
    assert_eq!(pool.stats().idle, 1);
}
