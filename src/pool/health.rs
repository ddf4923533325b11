//! Health checks
//!
//! Idle workers are probed with `PING`; anything other than a `PONG` status
//! retires the worker and a replacement is opened before the slot is reused.
//! Leased workers are never probed by the monitor.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use thiserror::Error;

use crate::classify::{classify, Failure};
use crate::error::StructuredError;
use crate::protocol::{Command, ProtocolClient, Reply};

use super::manager::{Pool, PoolInner};
use super::worker::{Worker, WorkerState};

/// Outcome of one liveness probe
#[derive(Debug, Clone)]
pub enum HealthStatus {
    Healthy,
    /// The worker must be retired, with the reason
    Remove(StructuredError),
}

/// Summary of one health-check pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    /// Workers probed
    pub checked: usize,
    /// Workers that failed and were retired
    pub removed: usize,
    /// Slots that got a fresh worker
    pub replaced: usize,
}

#[derive(Debug, Error)]
enum ProbeFault {
    #[error("unexpected liveness reply {0:?}")]
    UnexpectedReply(Reply),

    #[error("liveness probe panicked")]
    Panicked,
}

impl<C: ProtocolClient> PoolInner<C> {
    /// Send a liveness probe through the worker's connection
    pub(super) fn probe(&self, worker: &mut Worker<C::Handle>) -> HealthStatus {
        let ping = Command::new(["PING"]);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.client.send(&mut worker.handle, &ping)
        }));

        let failure = match outcome {
            Ok(Ok(Reply::Status(text))) if text == "PONG" => {
                worker.mark_checked();
                return HealthStatus::Healthy;
            }
            Ok(Ok(Reply::Error(message))) => Failure::Reply(message),
            Ok(Ok(other)) => Failure::Other(Arc::new(ProbeFault::UnexpectedReply(other))),
            Ok(Err(err)) => Failure::Conn(err),
            Err(_) => Failure::Other(Arc::new(ProbeFault::Panicked)),
        };
        HealthStatus::Remove(classify(failure))
    }

    pub(super) fn check_idle_workers(&self, force: bool) -> HealthReport {
        let interval = self.config.health_check_interval();
        let mut report = HealthReport::default();

        // Workers idle when the pass starts, and slots a previous pass
        // failed to refill. Replacements opened below are not probed again.
        let (mut candidates, pending) = {
            let state = self.state.lock();
            if state.stopping {
                return report;
            }
            let candidates: HashSet<u64> = state.idle.iter().map(|worker| worker.id).collect();
            let pending: Vec<usize> = state
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == WorkerState::Closing)
                .map(|(slot, _)| slot)
                .collect();
            (candidates, pending)
        };

        // One worker out of the idle set at a time, so the rest stay leasable
        // while a slow probe is in flight.
        while let Some(mut worker) = self.take_due_worker(force, interval, &mut candidates) {
            report.checked += 1;
            match self.probe(&mut worker) {
                HealthStatus::Healthy => self.checkin(worker),
                HealthStatus::Remove(err) => {
                    tracing::warn!(
                        "Pool {}: worker {} (slot {}) failed health check: {}",
                        self.config.name,
                        worker.id,
                        worker.slot,
                        err
                    );
                    let slot = worker.slot;
                    self.retire(worker);
                    report.removed += 1;
                    if self.replace(slot) {
                        report.replaced += 1;
                    }
                }
            }
        }

        for slot in pending {
            if self.replace(slot) {
                report.replaced += 1;
            }
        }

        if report.removed > 0 || report.replaced > 0 {
            tracing::info!(
                "Pool {}: health check probed {}, removed {}, replaced {}",
                self.config.name,
                report.checked,
                report.removed,
                report.replaced
            );
        }
        report
    }

    /// Pull the next due candidate out of the idle set and mark its slot
    /// `Checking`. Candidates leased meanwhile are skipped.
    fn take_due_worker(
        &self,
        force: bool,
        interval: Option<Duration>,
        candidates: &mut HashSet<u64>,
    ) -> Option<Worker<C::Handle>> {
        let mut state = self.state.lock();
        if state.stopping {
            return None;
        }
        let position = state.idle.iter().position(|worker| {
            candidates.contains(&worker.id)
                && (force || interval.map_or(true, |every| worker.check_due(every)))
        })?;
        let worker = state.idle.remove(position)?;
        candidates.remove(&worker.id);
        state.slots[worker.slot] = WorkerState::Checking;
        Some(worker)
    }
}

/// Background thread running health checks on a fixed cadence
pub(super) struct HealthMonitor {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Spawn the monitor. It only holds a weak reference, so it never keeps
    /// a dropped pool alive.
    pub(super) fn spawn<C: ProtocolClient>(pool: Weak<PoolInner<C>>, interval: Duration) -> Self {
        let (shutdown, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);

        let handle = thread::spawn(move || loop {
            channel::select! {
                recv(shutdown_rx) -> _ => break,
                recv(ticker) -> _ => {
                    let Some(inner) = pool.upgrade() else { break };
                    Pool { inner }.check_idle_workers(false);
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Ask the thread to exit without waiting for it
    pub(super) fn signal(self) {
        let _ = self.shutdown.try_send(());
    }

    /// Ask the thread to exit and wait for it
    pub(super) fn shutdown(self) {
        let _ = self.shutdown.try_send(());
        if self.handle.join().is_err() {
            tracing::error!("Health monitor thread panicked");
        }
    }
}
