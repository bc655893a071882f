use crate::domain::errors::{GatewayError, MonitorError};
use crate::domain::types::{
    AccountCredential, AmendRequest, Balances, CancelAck, OpenPosition, OrderAck, OrderRequest,
    PriceUpdate,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc::Receiver;

/// Signed request execution against the trading venue. Every call is scoped
/// to the credential it is given; the gateway holds no account state.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn balance(&self, credential: &AccountCredential) -> Result<Balances, GatewayError>;

    async fn add_order(
        &self,
        order: &OrderRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError>;

    async fn open_positions(
        &self,
        credential: &AccountCredential,
    ) -> Result<HashMap<String, OpenPosition>, GatewayError>;

    async fn open_orders(
        &self,
        credential: &AccountCredential,
    ) -> Result<HashMap<String, serde_json::Value>, GatewayError>;

    async fn edit_order(
        &self,
        amendment: &AmendRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError>;

    /// Idempotent: cancelling an unknown or already-closed order yields a
    /// zero count from the venue, not an error.
    async fn cancel_order(
        &self,
        txid: &str,
        credential: &AccountCredential,
    ) -> Result<CancelAck, GatewayError>;

    /// Idempotent: a zero count when nothing is resting.
    async fn cancel_all(&self, credential: &AccountCredential) -> Result<CancelAck, GatewayError>;

    /// Unrealized profit/loss of open positions.
    async fn unrealized_pnl(&self, credential: &AccountCredential) -> Result<f64, GatewayError>;
}

/// Streaming market price subscription. One subscription per call; the
/// channel closing signals the feed is gone.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn subscribe(&self, pair: &str) -> Result<Receiver<PriceUpdate>, MonitorError>;
}
