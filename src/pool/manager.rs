//! Pool Manager
//!
//! Keeps exactly `pool_size` workers alive and arbitrates exclusive access
//! to them.
//!
//! ## Concurrency
//! - `state`: one `parking_lot::Mutex` guards the idle queue, the per-slot
//!   state table and the wait-queue, so lease / return / health transitions
//!   are linearizable.
//! - `available`: waiters sleep on this condvar; every return notifies all,
//!   and only the waiter at the head of the queue may take an idle worker.
//! - Network I/O (open, probe, close) always happens outside the lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::classify::{classify, Failure};
use crate::config::{Endpoint, PoolConfig};
use crate::error::Result;
use crate::protocol::ProtocolClient;

use super::health::{HealthMonitor, HealthReport, HealthStatus};
use super::lease::Lease;
use super::worker::{Worker, WorkerState};

/// Point-in-time view of the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pool_size: usize,
    pub idle: usize,
    pub leased: usize,
    pub checking: usize,
    pub connecting: usize,
    pub closing: usize,
    /// Lease requests currently queued
    pub waiting: usize,
    pub leases_total: u64,
    pub lease_timeouts: u64,
    pub workers_removed: u64,
    pub workers_replaced: u64,
    pub replace_failures: u64,
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    pub(super) leases: u64,
    pub(super) timeouts: u64,
    pub(super) removed: u64,
    pub(super) replaced: u64,
    pub(super) replace_failures: u64,
}

pub(super) struct PoolState<H> {
    pub(super) idle: VecDeque<Worker<H>>,
    pub(super) slots: Vec<WorkerState>,
    /// FIFO tickets of blocked lease requests
    pub(super) waiters: VecDeque<u64>,
    pub(super) next_ticket: u64,
    pub(super) stopping: bool,
    pub(super) counters: Counters,
}

impl<H> PoolState<H> {
    /// Hand the oldest idle worker to a caller
    fn grant(&mut self) -> Option<Worker<H>> {
        let worker = self.idle.pop_front()?;
        self.slots[worker.slot] = WorkerState::Leased;
        self.counters.leases += 1;
        Some(worker)
    }

    fn remove_waiter(&mut self, ticket: u64) {
        self.waiters.retain(|t| *t != ticket);
    }

    fn count(&self, state: WorkerState) -> usize {
        self.slots.iter().filter(|s| **s == state).count()
    }
}

pub(super) struct PoolInner<C: ProtocolClient> {
    pub(super) config: PoolConfig,
    pub(super) endpoint: Endpoint,
    pub(super) client: C,
    pub(super) state: Mutex<PoolState<C::Handle>>,
    pub(super) available: Condvar,
    next_worker_id: AtomicU64,
    monitor: Mutex<Option<HealthMonitor>>,
}

/// Handle to a running pool
///
/// Cheap to clone; all clones drive the same workers.
pub struct Pool<C: ProtocolClient> {
    pub(super) inner: Arc<PoolInner<C>>,
}

impl<C: ProtocolClient> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ProtocolClient> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: ProtocolClient> Pool<C> {
    /// Validate the configuration, open every worker and start the health
    /// monitor.
    ///
    /// Fails before any worker is created when the configuration is invalid.
    /// If any connection fails to open, the ones already opened are closed
    /// and the classified open error is returned.
    pub fn start(config: PoolConfig, client: C) -> Result<Self> {
        let endpoint = config.validate().map_err(classify)?;
        let size = config.pool_size;

        tracing::info!(
            "Starting pool {} with {} workers for {}",
            config.name,
            size,
            endpoint.address()
        );

        let inner = PoolInner {
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(size),
                slots: vec![WorkerState::Connecting; size],
                waiters: VecDeque::new(),
                next_ticket: 0,
                stopping: false,
                counters: Counters::default(),
            }),
            available: Condvar::new(),
            next_worker_id: AtomicU64::new(1),
            monitor: Mutex::new(None),
            config,
            endpoint,
            client,
        };

        let mut opened = Vec::with_capacity(size);
        for slot in 0..size {
            match inner.open_worker(slot) {
                Ok(worker) => opened.push(worker),
                Err(err) => {
                    tracing::error!(
                        "Pool {}: worker {} failed to connect: {}",
                        inner.config.name,
                        slot,
                        err
                    );
                    for worker in opened {
                        inner.close_worker(worker);
                    }
                    inner.state.lock().stopping = true;
                    return Err(err);
                }
            }
        }

        {
            let mut state = inner.state.lock();
            for worker in opened {
                state.slots[worker.slot] = WorkerState::Idle;
                state.idle.push_back(worker);
            }
        }

        let inner = Arc::new(inner);
        if let Some(interval) = inner.config.health_check_interval() {
            let monitor = HealthMonitor::spawn(Arc::downgrade(&inner), interval);
            *inner.monitor.lock() = Some(monitor);
        }

        Ok(Self { inner })
    }

    /// Close every connection and release pool resources.
    ///
    /// Idempotent. Blocked lease requests fail with `pool_error`; workers
    /// still leased are closed when their lease is returned.
    pub fn stop(&self) {
        let idle: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.stopping {
                return;
            }
            state.stopping = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            for worker in &idle {
                state.slots[worker.slot] = WorkerState::Closing;
            }
            idle
        };
        self.inner.available.notify_all();

        for worker in idle {
            self.inner.close_worker(worker);
        }

        let monitor = self.inner.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown();
        }

        tracing::info!("Pool {} stopped", self.inner.config.name);
    }

    /// Lease an idle worker, waiting up to `timeout` for one to free up.
    ///
    /// Requests are served in FIFO order. A request that times out is removed
    /// from the queue before returning, so it can never be granted late.
    pub fn lease(&self, purpose: &str, timeout: Duration) -> Result<Lease<C>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();

        if state.stopping {
            return Err(classify(Failure::PoolStopped(self.inner.config.name.clone())));
        }

        // Fast path: nobody queued ahead of us.
        if state.waiters.is_empty() {
            if let Some(worker) = state.grant() {
                drop(state);
                return Ok(self.granted(worker, purpose));
            }
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        loop {
            if state.stopping {
                state.remove_waiter(ticket);
                return Err(classify(Failure::PoolStopped(self.inner.config.name.clone())));
            }

            if state.waiters.front() == Some(&ticket) {
                if let Some(worker) = state.grant() {
                    state.waiters.pop_front();
                    let wake_next = !state.idle.is_empty() && !state.waiters.is_empty();
                    drop(state);
                    if wake_next {
                        self.inner.available.notify_all();
                    }
                    return Ok(self.granted(worker, purpose));
                }
            }

            if Instant::now() >= deadline {
                state.remove_waiter(ticket);
                state.counters.timeouts += 1;
                let wake_next = !state.idle.is_empty() && !state.waiters.is_empty();
                drop(state);
                if wake_next {
                    self.inner.available.notify_all();
                }
                tracing::debug!(
                    "Pool {}: lease for {} timed out after {:?}",
                    self.inner.config.name,
                    purpose,
                    timeout
                );
                return Err(classify(Failure::LeaseTimeout(timeout)));
            }

            self.inner.available.wait_until(&mut state, deadline);
        }
    }

    fn granted(&self, worker: Worker<C::Handle>, purpose: &str) -> Lease<C> {
        tracing::trace!(
            "Pool {}: leased worker {} (slot {}) for {}",
            self.inner.config.name,
            worker.id,
            worker.slot,
            purpose
        );
        Lease::new(Arc::clone(&self.inner), worker, purpose)
    }

    /// Return a leased worker to the pool.
    ///
    /// Equivalent to dropping the lease.
    pub fn release(&self, lease: Lease<C>) {
        drop(lease);
    }

    /// Probe idle workers and replace the ones that fail.
    ///
    /// Without `force`, only workers whose last probe is older than the
    /// configured interval are checked. Slots whose earlier replacement
    /// failed are retried on every pass.
    pub fn check_idle_workers(&self, force: bool) -> HealthReport {
        self.inner.check_idle_workers(force)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            pool_size: state.slots.len(),
            idle: state.count(WorkerState::Idle),
            leased: state.count(WorkerState::Leased),
            checking: state.count(WorkerState::Checking),
            connecting: state.count(WorkerState::Connecting),
            closing: state.count(WorkerState::Closing),
            waiting: state.waiters.len(),
            leases_total: state.counters.leases,
            lease_timeouts: state.counters.timeouts,
            workers_removed: state.counters.removed,
            workers_replaced: state.counters.replaced,
            replace_failures: state.counters.replace_failures,
        }
    }

    /// Current state of every slot, indexed by slot
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.inner.state.lock().slots.clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopping
    }
}

impl<C: ProtocolClient> PoolInner<C> {
    pub(super) fn open_worker(&self, slot: usize) -> Result<Worker<C::Handle>> {
        let handle = self.client.open(&self.endpoint).map_err(classify)?;
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Pool {}: opened worker {} in slot {}",
            self.config.name,
            id,
            slot
        );
        Ok(Worker::new(slot, id, handle))
    }

    pub(super) fn close_worker(&self, worker: Worker<C::Handle>) {
        tracing::debug!(
            "Pool {}: closing worker {} (slot {})",
            self.config.name,
            worker.id,
            worker.slot
        );
        self.client.close(worker.handle);
    }

    /// Put a worker back into the idle set, or close it if the pool stopped
    pub(super) fn checkin(&self, worker: Worker<C::Handle>) {
        let mut state = self.state.lock();
        if state.stopping {
            state.slots[worker.slot] = WorkerState::Closing;
            drop(state);
            self.close_worker(worker);
            return;
        }
        state.slots[worker.slot] = WorkerState::Idle;
        state.idle.push_back(worker);
        drop(state);
        self.available.notify_all();
    }

    /// Return path for leases. Workers that saw a transport fault are
    /// probed first and retired if the probe fails.
    pub(super) fn return_worker(&self, mut worker: Worker<C::Handle>, suspect: bool) {
        if suspect {
            self.state.lock().slots[worker.slot] = WorkerState::Checking;
            if let HealthStatus::Remove(err) = self.probe(&mut worker) {
                tracing::warn!(
                    "Pool {}: worker {} failed probe after transport fault: {}",
                    self.config.name,
                    worker.id,
                    err
                );
                let slot = worker.slot;
                self.retire(worker);
                self.replace(slot);
                return;
            }
        }
        self.checkin(worker);
    }

    /// Return path for a lease whose request panicked mid-flight. The
    /// connection is never reused; the slot gets a fresh worker.
    pub(super) fn discard_worker(&self, worker: Worker<C::Handle>) {
        tracing::warn!(
            "Pool {}: worker {} (slot {}) interrupted by a panic, replacing it",
            self.config.name,
            worker.id,
            worker.slot
        );
        let slot = worker.slot;
        self.retire(worker);
        self.replace(slot);
    }

    /// Close a worker that failed its health check
    pub(super) fn retire(&self, worker: Worker<C::Handle>) {
        {
            let mut state = self.state.lock();
            state.slots[worker.slot] = WorkerState::Closing;
            state.counters.removed += 1;
        }
        self.close_worker(worker);
    }

    /// Open a replacement for a `Closing` slot. Returns true when the slot
    /// is back in the idle set.
    pub(super) fn replace(&self, slot: usize) -> bool {
        {
            let mut state = self.state.lock();
            if state.stopping || state.slots[slot] != WorkerState::Closing {
                return false;
            }
            state.slots[slot] = WorkerState::Connecting;
        }

        match self.open_worker(slot) {
            Ok(worker) => {
                let mut state = self.state.lock();
                if state.stopping {
                    state.slots[slot] = WorkerState::Closing;
                    drop(state);
                    self.close_worker(worker);
                    return false;
                }
                state.slots[slot] = WorkerState::Idle;
                state.idle.push_back(worker);
                state.counters.replaced += 1;
                drop(state);
                self.available.notify_all();
                true
            }
            Err(err) => {
                {
                    let mut state = self.state.lock();
                    state.slots[slot] = WorkerState::Closing;
                    state.counters.replace_failures += 1;
                }
                tracing::error!(
                    "Pool {}: could not replace worker in slot {}: {}",
                    self.config.name,
                    slot,
                    err
                );
                false
            }
        }
    }
}

impl<C: ProtocolClient> Drop for PoolInner<C> {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            // May run on the monitor thread itself, so never join here.
            monitor.signal();
        }
        let state = self.state.get_mut();
        if state.stopping {
            return;
        }
        state.stopping = true;
        for worker in state.idle.drain(..) {
            self.client.close(worker.handle);
        }
    }
}
