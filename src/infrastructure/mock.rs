//! In-memory exchange doubles.
//!
//! `MockExchangeGateway` backs both `Mode::Mock` runs and the test suite:
//! balances, scripted open-position responses and injected failures are all
//! set per account, and every submission and cancellation is recorded.

use crate::domain::errors::{GatewayError, MonitorError};
use crate::domain::ports::{ExchangeGateway, PriceFeed};
use crate::domain::types::{
    AccountCredential, AmendRequest, Balances, CancelAck, OpenPosition, OrderAck, OrderRequest,
    PriceUpdate,
};
use async_trait::async_trait;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct MockExchangeGateway {
    balances: RwLock<HashMap<String, Balances>>,
    failing_balance: RwLock<HashSet<String>>,
    failing_orders: RwLock<HashSet<String>>,
    failing_entries: RwLock<HashSet<String>>,
    /// Scripted open-positions responses, consumed front-first, one per
    /// poll. An exhausted script reads as no open positions.
    position_script: RwLock<VecDeque<Result<HashMap<String, OpenPosition>, String>>>,
    submitted: RwLock<Vec<(String, OrderRequest)>>,
    resting: RwLock<HashMap<String, Vec<String>>>,
    cancel_all_log: RwLock<Vec<String>>,
    pnl: RwLock<HashMap<String, f64>>,
    balance_lookups: AtomicUsize,
    next_txid: AtomicU64,
}

impl MockExchangeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, account_id: &str, currency: &str, amount: &str) {
        self.balances
            .write()
            .await
            .entry(account_id.to_string())
            .or_default()
            .insert(currency.to_string(), amount.to_string());
    }

    pub async fn set_pnl(&self, account_id: &str, value: f64) {
        self.pnl.write().await.insert(account_id.to_string(), value);
    }

    pub async fn fail_balance_for(&self, account_id: &str) {
        self.failing_balance
            .write()
            .await
            .insert(account_id.to_string());
    }

    pub async fn fail_orders_for(&self, account_id: &str) {
        self.failing_orders
            .write()
            .await
            .insert(account_id.to_string());
    }

    /// Reject only entry legs (orders carrying a close leg) for one account.
    pub async fn fail_entry_orders_for(&self, account_id: &str) {
        self.failing_entries
            .write()
            .await
            .insert(account_id.to_string());
    }

    /// Queue one open-positions response: `(position_id, ordertxid, pair)`.
    pub async fn push_open_positions(&self, positions: &[(&str, &str, &str)]) {
        let map = positions
            .iter()
            .map(|(position_id, ordertxid, pair)| {
                (
                    position_id.to_string(),
                    OpenPosition {
                        ordertxid: ordertxid.to_string(),
                        pair: pair.to_string(),
                        vol: "0.0069".to_string(),
                    },
                )
            })
            .collect();
        self.position_script.write().await.push_back(Ok(map));
    }

    /// Queue one failing open-positions poll.
    pub async fn push_open_positions_error(&self, message: &str) {
        self.position_script
            .write()
            .await
            .push_back(Err(message.to_string()));
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_lookups.load(Ordering::Relaxed)
    }

    /// Every accepted submission, in arrival order.
    pub async fn submitted(&self) -> Vec<(String, OrderRequest)> {
        self.submitted.read().await.clone()
    }

    /// Account ids of every cancel-all call, in arrival order.
    pub async fn cancel_all_calls(&self) -> Vec<String> {
        self.cancel_all_log.read().await.clone()
    }

    pub async fn cancel_all_count(&self, account_id: &str) -> usize {
        self.cancel_all_log
            .read()
            .await
            .iter()
            .filter(|id| id.as_str() == account_id)
            .count()
    }
}

#[async_trait]
impl ExchangeGateway for MockExchangeGateway {
    async fn balance(&self, credential: &AccountCredential) -> Result<Balances, GatewayError> {
        self.balance_lookups.fetch_add(1, Ordering::Relaxed);
        if self
            .failing_balance
            .read()
            .await
            .contains(&credential.account_id)
        {
            return Err(GatewayError::Transport(
                "simulated balance outage".to_string(),
            ));
        }
        Ok(self
            .balances
            .read()
            .await
            .get(&credential.account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_order(
        &self,
        order: &OrderRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError> {
        if self
            .failing_orders
            .read()
            .await
            .contains(&credential.account_id)
        {
            return Err(GatewayError::Rejected(
                "EOrder:Insufficient initial margin".to_string(),
            ));
        }

        if order.close_stop_price.is_some()
            && self
                .failing_entries
                .read()
                .await
                .contains(&credential.account_id)
        {
            return Err(GatewayError::Rejected(
                "EOrder:Insufficient initial margin".to_string(),
            ));
        }

        self.submitted
            .write()
            .await
            .push((credential.account_id.clone(), order.clone()));

        if order.validate_only {
            return Ok(OrderAck { txid: Vec::new() });
        }

        let txid = format!("OMOCK-{}", self.next_txid.fetch_add(1, Ordering::Relaxed) + 1);
        self.resting
            .write()
            .await
            .entry(credential.account_id.clone())
            .or_default()
            .push(txid.clone());
        debug!(
            "MockExchangeGateway: booked {} for {}",
            txid, credential.account_id
        );
        Ok(OrderAck { txid: vec![txid] })
    }

    async fn open_positions(
        &self,
        _credential: &AccountCredential,
    ) -> Result<HashMap<String, OpenPosition>, GatewayError> {
        match self.position_script.write().await.pop_front() {
            Some(Ok(positions)) => Ok(positions),
            Some(Err(message)) => Err(GatewayError::Transport(message)),
            None => Ok(HashMap::new()),
        }
    }

    async fn open_orders(
        &self,
        credential: &AccountCredential,
    ) -> Result<HashMap<String, serde_json::Value>, GatewayError> {
        Ok(self
            .resting
            .read()
            .await
            .get(&credential.account_id)
            .map(|txids| {
                txids
                    .iter()
                    .map(|txid| (txid.clone(), serde_json::json!({"status": "open"})))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn edit_order(
        &self,
        amendment: &AmendRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError> {
        let mut resting = self.resting.write().await;
        let txids = resting
            .get_mut(&credential.account_id)
            .filter(|txids| txids.iter().any(|txid| *txid == amendment.txid))
            .ok_or_else(|| GatewayError::NotFound("EOrder:Unknown order".to_string()))?;

        let replacement = format!(
            "OMOCK-{}",
            self.next_txid.fetch_add(1, Ordering::Relaxed) + 1
        );
        txids.retain(|txid| *txid != amendment.txid);
        txids.push(replacement.clone());
        Ok(OrderAck {
            txid: vec![replacement],
        })
    }

    async fn cancel_order(
        &self,
        txid: &str,
        credential: &AccountCredential,
    ) -> Result<CancelAck, GatewayError> {
        let mut resting = self.resting.write().await;
        let Some(txids) = resting.get_mut(&credential.account_id) else {
            return Ok(CancelAck { count: 0 });
        };
        let before = txids.len();
        txids.retain(|resting_txid| resting_txid != txid);
        Ok(CancelAck {
            count: (before - txids.len()) as u32,
        })
    }

    async fn cancel_all(&self, credential: &AccountCredential) -> Result<CancelAck, GatewayError> {
        self.cancel_all_log
            .write()
            .await
            .push(credential.account_id.clone());
        let removed = self
            .resting
            .write()
            .await
            .remove(&credential.account_id)
            .map(|txids| txids.len())
            .unwrap_or(0);
        Ok(CancelAck {
            count: removed as u32,
        })
    }

    async fn unrealized_pnl(&self, credential: &AccountCredential) -> Result<f64, GatewayError> {
        Ok(self
            .pnl
            .read()
            .await
            .get(&credential.account_id)
            .copied()
            .unwrap_or(0.0))
    }
}

/// Replays a fixed price sequence, then closes the channel. Capacity one,
/// so delivery tracks the subscriber's consumption.
pub struct ScriptedPriceFeed {
    script: RwLock<Vec<PriceUpdate>>,
    fail_subscribe: std::sync::atomic::AtomicBool,
}

impl ScriptedPriceFeed {
    pub fn new(updates: Vec<PriceUpdate>) -> Self {
        Self {
            script: RwLock::new(updates),
            fail_subscribe: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: RwLock::new(Vec::new()),
            fail_subscribe: std::sync::atomic::AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl PriceFeed for ScriptedPriceFeed {
    async fn subscribe(&self, _pair: &str) -> Result<Receiver<PriceUpdate>, MonitorError> {
        if self.fail_subscribe.load(Ordering::Relaxed) {
            return Err(MonitorError::Subscribe(
                "scripted subscribe failure".to_string(),
            ));
        }

        let updates = self.script.read().await.clone();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for update in updates {
                if tx.send(update).await.is_err() {
                    // Subscriber triggered and dropped the receiver.
                    break;
                }
            }
            // Dropping the sender closes the channel.
        });
        Ok(rx)
    }
}

/// Endless random-walk prices for offline mock runs.
pub struct RandomWalkFeed {
    start_price: f64,
    period: Duration,
}

impl RandomWalkFeed {
    pub fn new(start_price: f64, period: Duration) -> Self {
        Self {
            start_price,
            period,
        }
    }
}

#[async_trait]
impl PriceFeed for RandomWalkFeed {
    async fn subscribe(&self, pair: &str) -> Result<Receiver<PriceUpdate>, MonitorError> {
        let (tx, rx) = mpsc::channel(16);
        let pair = pair.to_string();
        let period = self.period;
        let mut price = self.start_price;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let drift = {
                    let mut rng = rand::rng();
                    rng.random_range(-0.002..0.002)
                };
                price *= 1.0 + drift;
                let update = PriceUpdate {
                    pair: pair.clone(),
                    last: price,
                };
                if tx.send(update).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
