use crate::application::monitor::{cancel_resting_orders, MonitorHandle};
use crate::domain::errors::MonitorError;
use crate::domain::ports::{ExchangeGateway, PriceFeed};
use crate::domain::types::AccountCredential;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Subscribed,
    Triggered,
}

/// The resting exit prices of a batch, ordered. A position is considered
/// closed once the market trades outside them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub low: f64,
    pub high: f64,
}

impl PriceBounds {
    pub fn from_exit_prices(take_profit: f64, stop_loss: f64) -> Self {
        if take_profit <= stop_loss {
            Self {
                low: take_profit,
                high: stop_loss,
            }
        } else {
            Self {
                low: stop_loss,
                high: take_profit,
            }
        }
    }

    pub fn is_breached(&self, price: f64) -> bool {
        price > self.high || price < self.low
    }
}

/// Watches the streaming price feed and, on the first update outside the
/// bounds, cancels every account's resting orders once and drops the
/// subscription. Updates are handled strictly in arrival order, so the
/// one-shot trigger decision is race-free.
pub struct PriceWatcher {
    feed: Arc<dyn PriceFeed>,
    gateway: Arc<dyn ExchangeGateway>,
    pair: String,
    bounds: PriceBounds,
    cancel_targets: Vec<AccountCredential>,
    state: Arc<RwLock<StreamState>>,
}

impl PriceWatcher {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        gateway: Arc<dyn ExchangeGateway>,
        pair: String,
        bounds: PriceBounds,
        cancel_targets: Vec<AccountCredential>,
    ) -> Self {
        Self {
            feed,
            gateway,
            pair,
            bounds,
            cancel_targets,
            state: Arc::new(RwLock::new(StreamState::Connecting)),
        }
    }

    pub fn spawn(self) -> MonitorHandle<StreamState> {
        let state = self.state.clone();
        let task = tokio::spawn(self.run());
        MonitorHandle::new(state, task)
    }

    /// Connection loss before the trigger is terminal for the session; there
    /// is no reconnect here.
    pub async fn run(self) -> Result<(), MonitorError> {
        let mut updates = self.feed.subscribe(&self.pair).await?;
        *self.state.write().await = StreamState::Subscribed;
        info!(
            "PriceWatcher: watching {} against bounds [{}, {}]",
            self.pair, self.bounds.low, self.bounds.high
        );

        while let Some(update) = updates.recv().await {
            if self.bounds.is_breached(update.last) {
                info!(
                    "PriceWatcher: {} traded at {} outside [{}, {}]; cancelling all orders",
                    self.pair, update.last, self.bounds.low, self.bounds.high
                );
                cancel_resting_orders(&self.gateway, &self.cancel_targets).await;
                *self.state.write().await = StreamState::Triggered;
                // Dropping the receiver closes the subscription; no further
                // updates are evaluated.
                return Ok(());
            }
            debug!("PriceWatcher: {} at {}, within bounds", self.pair, update.last);
        }

        Err(MonitorError::FeedClosed)
    }

    pub async fn state(&self) -> StreamState {
        *self.state.read().await
    }
}
