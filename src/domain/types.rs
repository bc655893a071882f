use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::ValidationError;

/// Fixed leverage applied to every order this engine places.
pub const LEVERAGE: &str = "3:1";

/// Relative offset used as the take-profit order's secondary price.
pub const TAKE_PROFIT_OFFSET: &str = "#5.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that closes a position opened on `self`.
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_exchange_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_exchange_str())
    }
}

impl FromStr for OrderSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            _ => Err(ValidationError::InvalidDirection),
        }
    }
}

/// One account's exchange credentials. Immutable once loaded; the engine
/// only ever borrows these to parameterize gateway calls.
#[derive(Clone, Deserialize)]
pub struct AccountCredential {
    pub account_id: String,
    pub api_key: String,
    /// Base64-encoded private key, decoded only inside the gateway signer.
    pub api_secret: String,
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets stay out of logs.
        f.debug_struct("AccountCredential")
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// A single incoming trade request. Read-only throughout the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub side: OrderSide,
    pub pair: String,
    pub entry_price: f64,
    pub stop_price: f64,
    pub take_profit_price: f64,
    /// Forwarded to the exchange as a validate-only flag; nothing is booked.
    pub dry_run: bool,
}

/// A trade intent scoped to one account with its computed volume.
/// Derived per account, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedOrderRequest {
    pub account_id: String,
    pub intent: TradeIntent,
    pub volume: f64,
}

/// Exchange-facing shape of a single order. Built by the bracket order
/// builder, serialized by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    /// Exchange order type, e.g. "limit" or "take-profit-limit".
    pub order_type: &'static str,
    pub side: OrderSide,
    pub volume: f64,
    pub pair: String,
    pub price: f64,
    /// Secondary price field, e.g. the "#5.0" relative take-profit offset.
    pub secondary_price: Option<&'static str>,
    /// Attached stop-loss close leg price, entry orders only.
    pub close_stop_price: Option<f64>,
    pub leverage: &'static str,
    pub reduce_only: bool,
    pub validate_only: bool,
}

/// Price amendment for a resting order.
#[derive(Debug, Clone, PartialEq)]
pub struct AmendRequest {
    pub txid: String,
    pub pair: String,
    pub price: f64,
}

/// Outcome of one order submission within a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Placed { txid: String },
    Rejected { reason: String },
}

impl OrderOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, OrderOutcome::Placed { .. })
    }

    pub fn txid(&self) -> Option<&str> {
        match self {
            OrderOutcome::Placed { txid } => Some(txid),
            OrderOutcome::Rejected { .. } => None,
        }
    }
}

/// Per-account result of a batch placement. A batch response always carries
/// one of these per requested account, success or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub account_id: String,
    pub entry: OrderOutcome,
    pub take_profit: OrderOutcome,
}

/// Currency code -> decimal string, as the exchange reports balances.
pub type Balances = HashMap<String, String>;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OrderAck {
    pub txid: Vec<String>,
}

impl OrderAck {
    /// Primary transaction id of the booked order, if any. Validate-only
    /// submissions come back without one.
    pub fn primary_txid(&self) -> Option<&str> {
        self.txid.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CancelAck {
    pub count: u32,
}

/// One open margin position as reported by the exchange.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OpenPosition {
    /// Transaction id of the order that opened the position.
    pub ordertxid: String,
    pub pair: String,
    #[serde(default)]
    pub vol: String,
}

/// A single ticker observation from the streaming price feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub pair: String,
    pub last: f64,
}
