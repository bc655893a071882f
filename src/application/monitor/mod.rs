//! Position-close monitoring sessions.
//!
//! A batch of placed orders gets exactly one monitor session, owned by an
//! explicit handle rather than ambient timer/socket state: the caller can
//! observe the session's state, abort it, or join it for the terminal
//! result.

pub mod polling;
pub mod streaming;

use crate::domain::errors::MonitorError;
use crate::domain::ports::ExchangeGateway;
use crate::domain::types::AccountCredential;
use futures::future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use polling::{PollState, PositionPoller};
pub use streaming::{PriceBounds, PriceWatcher, StreamState};

/// Which close-detection strategy a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorStrategy {
    #[default]
    Polling,
    Streaming,
}

impl FromStr for MonitorStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polling" => Ok(MonitorStrategy::Polling),
            "streaming" => Ok(MonitorStrategy::Streaming),
            _ => anyhow::bail!(
                "Invalid MONITOR_STRATEGY: {}. Must be 'polling' or 'streaming'",
                s
            ),
        }
    }
}

/// Handle to a spawned monitor task: shared state for observation plus the
/// join handle for the terminal result.
pub struct MonitorHandle<S> {
    state: Arc<RwLock<S>>,
    task: JoinHandle<Result<(), MonitorError>>,
}

impl<S: Clone> MonitorHandle<S> {
    pub(crate) fn new(state: Arc<RwLock<S>>, task: JoinHandle<Result<(), MonitorError>>) -> Self {
        Self { state, task }
    }

    pub async fn state(&self) -> S {
        self.state.read().await.clone()
    }

    /// Caller-driven shutdown; the underlying task is cancelled at its next
    /// await point.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub async fn join(self) -> Result<(), MonitorError> {
        match self.task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_cancelled() => Ok(()),
            Err(join_error) => std::panic::resume_unwind(join_error.into_panic()),
        }
    }
}

/// One live monitor session, 1:1 with a placed batch.
pub enum MonitorSession {
    Polling(MonitorHandle<PollState>),
    Streaming(MonitorHandle<StreamState>),
}

impl MonitorSession {
    pub fn strategy(&self) -> MonitorStrategy {
        match self {
            MonitorSession::Polling(_) => MonitorStrategy::Polling,
            MonitorSession::Streaming(_) => MonitorStrategy::Streaming,
        }
    }

    pub fn abort(&self) {
        match self {
            MonitorSession::Polling(handle) => handle.abort(),
            MonitorSession::Streaming(handle) => handle.abort(),
        }
    }

    pub async fn join(self) -> Result<(), MonitorError> {
        match self {
            MonitorSession::Polling(handle) => handle.join().await,
            MonitorSession::Streaming(handle) => handle.join().await,
        }
    }
}

/// Best-effort cancel-all fan-out across every account in the batch. Calls
/// run concurrently; individual failures are logged and dropped.
pub(crate) async fn cancel_resting_orders(
    gateway: &Arc<dyn ExchangeGateway>,
    targets: &[AccountCredential],
) {
    let calls = targets.iter().map(|credential| {
        let gateway = gateway.clone();
        async move {
            match gateway.cancel_all(credential).await {
                Ok(ack) => info!(
                    "Monitor: cancelled {} resting orders for {}",
                    ack.count, credential.account_id
                ),
                Err(e) => warn!(
                    "Monitor: cancel-all failed for {}: {}",
                    credential.account_id, e
                ),
            }
        }
    });
    future::join_all(calls).await;
}
