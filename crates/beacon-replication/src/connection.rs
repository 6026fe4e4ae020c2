//! # Retryable Connection
//!
//! Re-runs a session program on a fresh channel after every termination.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Retryable Connection Loop                           │
//! │                                                                         │
//! │   ┌───────────────┐   ok    ┌──────────────┐   ended / failed           │
//! │   │ new_channel() │ ──────► │ program.run  │ ─────────────┐             │
//! │   └───────┬───────┘         └──────────────┘              │             │
//! │           │ failed                                        ▼             │
//! │           │                                    ┌──────────────────┐     │
//! │           └──────────────────────────────────► │ channel closed   │     │
//! │                                                │ policy.next_delay│     │
//! │            ▲                                   └────────┬─────────┘     │
//! │            │            sleep(delay)                    │ Some(delay)   │
//! │            └────────────────────────────────────────────┘               │
//! │                                                                         │
//! │   close() cancels the run in progress, the sleep, and any further      │
//! │   channel request.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelFactory, ReplicationChannel};
use crate::error::{ReplicationError, ReplicationResult};
use crate::retry::RetryPolicy;

/// What runs on each channel the connection opens.
#[async_trait]
pub trait SessionProgram: Send + Sync {
    /// Runs one session. `Ok` means the session ended without a failure.
    async fn run(&self, channel: &dyn ReplicationChannel) -> ReplicationResult<()>;
}

/// Closes the channel when the attempt ends, however it ends.
struct ChannelGuard(Arc<dyn ReplicationChannel>);

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// A connection that keeps re-establishing channels to one peer.
pub struct RetryableConnection {
    factory: Arc<dyn ChannelFactory>,
    program: Arc<dyn SessionProgram>,
    cancel: CancellationToken,
}

impl RetryableConnection {
    pub fn new(factory: Arc<dyn ChannelFactory>, program: Arc<dyn SessionProgram>) -> Self {
        RetryableConnection {
            factory,
            program,
            cancel: CancellationToken::new(),
        }
    }

    /// One attempt: open a channel, run the program, close the channel.
    pub async fn run_once(&self) -> ReplicationResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ReplicationError::ShuttingDown);
        }

        let channel = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ReplicationError::ShuttingDown),
            result = self.factory.new_channel() => result?,
        };
        let guard = ChannelGuard(channel);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReplicationError::ShuttingDown),
            result = self.program.run(guard.0.as_ref()) => result,
        };
        result
    }

    /// Runs attempts until `policy` gives up or the connection is closed.
    ///
    /// Returns `Ok` when closed, `RetriesExhausted` when the policy gives up.
    pub async fn run_with_retry(&self, mut policy: Box<dyn RetryPolicy>) -> ReplicationResult<()> {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let outcome = self.run_once().await;

            if self.cancel.is_cancelled() {
                debug!(attempt, "Replication connection closed");
                return Ok(());
            }

            match &outcome {
                Ok(()) => info!(attempt, "Replication session completed"),
                Err(e) => warn!(
                    attempt,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Replication session failed"
                ),
            }

            let delay = match policy.next_delay(outcome.as_ref().err()) {
                Some(delay) => delay,
                None => {
                    let last_error = match outcome {
                        Ok(()) => "session completed".to_string(),
                        Err(e) => e.to_string(),
                    };
                    return Err(ReplicationError::RetriesExhausted {
                        attempts: attempt,
                        last_error,
                    });
                }
            };

            debug!(?delay, attempt, "Waiting before next replication channel");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Replication connection closed during retry wait");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Stops the loop. No channel is requested after this returns. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
