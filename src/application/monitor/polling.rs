use crate::application::monitor::{cancel_resting_orders, MonitorHandle};
use crate::domain::errors::MonitorError;
use crate::domain::ports::ExchangeGateway;
use crate::domain::types::AccountCredential;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Watching,
    Closed,
}

/// Polls open positions on a fixed period until the tracked position has
/// been seen and then disappears, then cancels all resting orders across
/// the batch exactly once.
pub struct PositionPoller {
    gateway: Arc<dyn ExchangeGateway>,
    /// Credential owning the tracked entry order; positions are polled here.
    watch_credential: AccountCredential,
    tracked_txid: String,
    cancel_targets: Vec<AccountCredential>,
    period: Duration,
    position_found: bool,
    state: Arc<RwLock<PollState>>,
}

impl PositionPoller {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        watch_credential: AccountCredential,
        tracked_txid: String,
        cancel_targets: Vec<AccountCredential>,
        period: Duration,
    ) -> Self {
        Self {
            gateway,
            watch_credential,
            tracked_txid,
            cancel_targets,
            period,
            position_found: false,
            state: Arc::new(RwLock::new(PollState::Idle)),
        }
    }

    pub fn spawn(self) -> MonitorHandle<PollState> {
        let state = self.state.clone();
        let task = tokio::spawn(self.run());
        MonitorHandle::new(state, task)
    }

    async fn run(mut self) -> Result<(), MonitorError> {
        *self.state.write().await = PollState::Watching;
        info!(
            "PositionPoller: watching order {} every {:?}",
            self.tracked_txid, self.period
        );

        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The interval fires immediately; the first real check happens one
        // period after the batch was placed.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if self.tick().await {
                return Ok(());
            }
        }
    }

    /// One polling pass. Returns true once the session is closed; forced
    /// calls after that are no-ops. A failed pass keeps the session alive;
    /// the next tick is the retry.
    pub async fn tick(&mut self) -> bool {
        if *self.state.read().await == PollState::Closed {
            return true;
        }

        let positions = match self.gateway.open_positions(&self.watch_credential).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!("PositionPoller: open positions check failed: {}", e);
                return false;
            }
        };

        if positions
            .values()
            .any(|position| position.ordertxid == self.tracked_txid)
        {
            if !self.position_found {
                info!(
                    "PositionPoller: position open for order {}",
                    self.tracked_txid
                );
            }
            self.position_found = true;
        } else {
            debug!(
                "PositionPoller: {} open positions, tracked order {} not among them",
                positions.len(),
                self.tracked_txid
            );
        }

        if positions.is_empty() && self.position_found {
            info!(
                "PositionPoller: position for order {} closed; cancelling resting orders",
                self.tracked_txid
            );
            cancel_resting_orders(&self.gateway, &self.cancel_targets).await;
            *self.state.write().await = PollState::Closed;
            return true;
        }

        false
    }

    pub async fn state(&self) -> PollState {
        *self.state.read().await
    }
}
