//! Command Executor
//!
//! Runs one command or one pipeline against a leased worker.
//!
//! ## Algorithm
//! 1. Lease a worker (`lease_timeout_ms`). A lease timeout is returned as is,
//!    never retried.
//! 2. Send the command(s) over the worker's connection.
//! 3. Server error replies become `command_error`; never retried.
//! 4. Transport faults are retried on a fresh lease while `retry_count`
//!    allows, then classified and returned.
//! 5. The lease guard returns the worker on every path.

use crate::classify::{classify, Failure};
use crate::config::ExecOptions;
use crate::error::Result;
use crate::pool::{Lease, Pool};
use crate::protocol::{Command, ConnError, ProtocolClient, Reply};

/// Purpose tag used for executor leases
const EXECUTE_PURPOSE: &str = "execute";

impl<C: ProtocolClient> Pool<C> {
    /// Execute one command.
    ///
    /// A missing key comes back as `Ok(Reply::Nil)`.
    pub fn execute(&self, command: &Command, options: &ExecOptions) -> Result<Reply> {
        if command.is_empty() {
            return Err(classify(Failure::InvalidCommand(
                "command must have at least one argument".to_string(),
            )));
        }

        match self.run(options, |lease| lease.send_raw(command))? {
            Reply::Error(message) => Err(classify(Failure::Reply(message))),
            reply => Ok(reply),
        }
    }

    /// Execute a pipeline in one round trip.
    ///
    /// Replies come back in command order. If any command is rejected by the
    /// server, the call fails with `command_error` naming the first failing
    /// index.
    pub fn execute_batch(&self, commands: &[Command], options: &ExecOptions) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Err(classify(Failure::InvalidCommand(
                "pipeline must contain at least one command".to_string(),
            )));
        }
        if let Some(index) = commands.iter().position(Command::is_empty) {
            return Err(classify(Failure::InvalidCommand(format!(
                "pipeline command {} has no arguments",
                index
            ))));
        }

        let replies = self.run(options, |lease| lease.send_batch_raw(commands))?;

        if replies.len() != commands.len() {
            return Err(classify(Failure::Conn(ConnError::Protocol(format!(
                "pipeline of {} commands got {} replies",
                commands.len(),
                replies.len()
            )))));
        }

        if let Some((index, Reply::Error(message))) =
            replies.iter().enumerate().find(|(_, reply)| reply.is_error())
        {
            return Err(classify(Failure::Reply(format!(
                "{} (pipeline command {})",
                message, index
            ))));
        }

        Ok(replies)
    }

    fn run<T>(
        &self,
        options: &ExecOptions,
        mut send: impl FnMut(&mut Lease<C>) -> std::result::Result<T, ConnError>,
    ) -> Result<T> {
        let mut retries_left = options.retry_count;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut lease = self.lease(EXECUTE_PURPOSE, options.lease_timeout())?;

            let outcome = send(&mut lease);
            let worker_id = lease.worker_id();
            drop(lease);

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if retries_left > 0 => {
                    retries_left -= 1;
                    tracing::warn!(
                        "Pool {}: transport fault on worker {} (attempt {}), retrying: {}",
                        self.name(),
                        worker_id,
                        attempt,
                        err
                    );
                }
                Err(err) => {
                    let error = classify(err);
                    tracing::warn!(
                        "Pool {}: transport fault on worker {} (attempt {}): {}",
                        self.name(),
                        worker_id,
                        attempt,
                        error
                    );
                    return Err(error);
                }
            }
        }
    }
}
