//! Lease guard
//!
//! A lease is the exclusive grant of one worker to one caller. Dropping the
//! guard returns the worker, so every exit path returns it exactly once.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use crate::classify::{classify, Failure};
use crate::error::Result;
use crate::protocol::{Command, ConnError, ProtocolClient, Reply};

use super::manager::PoolInner;
use super::worker::Worker;

/// RAII wrapper returning a worker to the pool on drop
pub struct Lease<C: ProtocolClient> {
    pool: Arc<PoolInner<C>>,
    worker: ManuallyDrop<Worker<C::Handle>>,
    purpose: String,
    // Set when the connection saw a transport fault while leased.
    suspect: bool,
    // Set while a call into the protocol client is running. Still set on
    // drop only if that call panicked.
    in_flight: bool,
}

impl<C: ProtocolClient> Lease<C> {
    pub(super) fn new(pool: Arc<PoolInner<C>>, worker: Worker<C::Handle>, purpose: &str) -> Self {
        Self {
            pool,
            worker: ManuallyDrop::new(worker),
            purpose: purpose.to_string(),
            suspect: false,
            in_flight: false,
        }
    }

    /// Unique id of the leased worker (a replacement gets a new id)
    pub fn worker_id(&self) -> u64 {
        self.worker.id
    }

    /// Pool slot the worker occupies
    pub fn slot(&self) -> usize {
        self.worker.slot
    }

    /// Tag given when the lease was requested
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Send one command over the leased connection.
    ///
    /// Server error replies come back as `command_error`; connection faults
    /// are classified and the worker is probed when the lease is returned.
    pub fn send(&mut self, command: &Command) -> Result<Reply> {
        match self.send_raw(command) {
            Ok(Reply::Error(message)) => Err(classify(Failure::Reply(message))),
            Ok(reply) => Ok(reply),
            Err(err) => Err(classify(err)),
        }
    }

    pub(crate) fn send_raw(&mut self, command: &Command) -> std::result::Result<Reply, ConnError> {
        self.in_flight = true;
        let result = self.pool.client.send(&mut self.worker.handle, command);
        self.in_flight = false;
        self.suspect |= result.is_err();
        result
    }

    pub(crate) fn send_batch_raw(
        &mut self,
        commands: &[Command],
    ) -> std::result::Result<Vec<Reply>, ConnError> {
        self.in_flight = true;
        let result = self.pool.client.send_batch(&mut self.worker.handle, commands);
        self.in_flight = false;
        self.suspect |= result.is_err();
        result
    }
}

impl<C: ProtocolClient> std::fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("worker_id", &self.worker.id)
            .field("slot", &self.worker.slot)
            .field("purpose", &self.purpose)
            .finish()
    }
}

impl<C: ProtocolClient> Drop for Lease<C> {
    fn drop(&mut self) {
        // SAFETY: the worker is taken exactly once, here, and the field is
        // never touched again.
        let worker = unsafe { ManuallyDrop::take(&mut self.worker) };
        tracing::trace!(
            "Returning worker {} (slot {}) after {}",
            worker.id,
            worker.slot,
            self.purpose
        );
        if self.in_flight {
            // A panic cut a request short, so the stream may be mid-reply.
            self.pool.discard_worker(worker);
        } else {
            self.pool.return_worker(worker, self.suspect);
        }
    }
}
