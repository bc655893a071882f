//! Signed REST gateway for Kraken's private API.
//!
//! Every call signs its own form-encoded body:
//! `API-Sign = base64(HMAC-SHA512(base64decode(secret), path + SHA256(nonce + postdata)))`
//! with the nonce serialized first in the body so signature and payload
//! always agree.

use crate::domain::errors::GatewayError;
use crate::domain::ports::ExchangeGateway;
use crate::domain::types::{
    AccountCredential, AmendRequest, Balances, CancelAck, OpenPosition, OrderAck, OrderRequest,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use tracing::debug;

const BALANCE_PATH: &str = "/0/private/Balance";
const ADD_ORDER_PATH: &str = "/0/private/AddOrder";
const OPEN_POSITIONS_PATH: &str = "/0/private/OpenPositions";
const OPEN_ORDERS_PATH: &str = "/0/private/OpenOrders";
const EDIT_ORDER_PATH: &str = "/0/private/EditOrder";
const CANCEL_ORDER_PATH: &str = "/0/private/CancelOrder";
const CANCEL_ALL_PATH: &str = "/0/private/CancelAll";
const TRADE_BALANCE_PATH: &str = "/0/private/TradeBalance";

pub struct KrakenGateway {
    client: Client,
    base_url: String,
}

/// Every private response arrives in this envelope; a non-empty `error`
/// array means the request was refused even when HTTP said 200.
#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

impl KrakenGateway {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, base_url }
    }

    fn nonce() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64 * 1000
    }

    async fn private_call<T: DeserializeOwned>(
        &self,
        path: &str,
        params: Vec<(String, String)>,
        credential: &AccountCredential,
    ) -> Result<T, GatewayError> {
        let nonce = Self::nonce().to_string();
        let body = encode_body(&nonce, &params);
        let signature = sign(path, &body, &nonce, &credential.api_secret)?;

        debug!("KrakenGateway: POST {} for {}", path, credential.account_id);

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header("API-Key", &credential.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "{path}: HTTP {status}: {text}"
            )));
        }

        let envelope: KrakenResponse<T> = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(format!("{path}: decode failed: {e}")))?;

        if !envelope.error.is_empty() {
            return Err(classify_exchange_errors(&envelope.error));
        }

        envelope
            .result
            .ok_or_else(|| GatewayError::Transport(format!("{path}: response carried no result")))
    }
}

#[async_trait]
impl ExchangeGateway for KrakenGateway {
    async fn balance(&self, credential: &AccountCredential) -> Result<Balances, GatewayError> {
        self.private_call(BALANCE_PATH, Vec::new(), credential).await
    }

    async fn add_order(
        &self,
        order: &OrderRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError> {
        // Validate-only submissions come back without transaction ids.
        #[derive(Debug, Deserialize)]
        struct AddOrderResult {
            #[serde(default)]
            txid: Vec<String>,
        }

        let result: AddOrderResult = self
            .private_call(ADD_ORDER_PATH, order_params(order), credential)
            .await?;
        Ok(OrderAck { txid: result.txid })
    }

    async fn open_positions(
        &self,
        credential: &AccountCredential,
    ) -> Result<HashMap<String, OpenPosition>, GatewayError> {
        self.private_call(OPEN_POSITIONS_PATH, Vec::new(), credential)
            .await
    }

    async fn open_orders(
        &self,
        credential: &AccountCredential,
    ) -> Result<HashMap<String, serde_json::Value>, GatewayError> {
        #[derive(Debug, Deserialize)]
        struct OpenOrdersResult {
            open: HashMap<String, serde_json::Value>,
        }

        let result: OpenOrdersResult = self
            .private_call(OPEN_ORDERS_PATH, Vec::new(), credential)
            .await?;
        Ok(result.open)
    }

    async fn edit_order(
        &self,
        amendment: &AmendRequest,
        credential: &AccountCredential,
    ) -> Result<OrderAck, GatewayError> {
        // EditOrder reports the replacement id as a single string.
        #[derive(Debug, Deserialize)]
        struct EditOrderResult {
            txid: Option<String>,
        }

        let params = vec![
            ("txid".to_string(), amendment.txid.clone()),
            ("pair".to_string(), amendment.pair.clone()),
            ("price".to_string(), amendment.price.to_string()),
        ];
        let result: EditOrderResult = self
            .private_call(EDIT_ORDER_PATH, params, credential)
            .await?;
        Ok(OrderAck {
            txid: result.txid.into_iter().collect(),
        })
    }

    async fn cancel_order(
        &self,
        txid: &str,
        credential: &AccountCredential,
    ) -> Result<CancelAck, GatewayError> {
        let params = vec![("txid".to_string(), txid.to_string())];
        self.private_call(CANCEL_ORDER_PATH, params, credential)
            .await
    }

    async fn cancel_all(&self, credential: &AccountCredential) -> Result<CancelAck, GatewayError> {
        self.private_call(CANCEL_ALL_PATH, Vec::new(), credential)
            .await
    }

    async fn unrealized_pnl(&self, credential: &AccountCredential) -> Result<f64, GatewayError> {
        #[derive(Debug, Deserialize)]
        struct TradeBalanceResult {
            v: String,
        }

        let result: TradeBalanceResult = self
            .private_call(TRADE_BALANCE_PATH, Vec::new(), credential)
            .await?;
        result.v.parse().map_err(|_| {
            GatewayError::Transport(format!(
                "{TRADE_BALANCE_PATH}: unparseable floating valuation: {}",
                result.v
            ))
        })
    }
}

/// Form-encode the signed body, nonce first.
fn encode_body(nonce: &str, params: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.append_pair("nonce", nonce);
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn sign(
    path: &str,
    post_data: &str,
    nonce: &str,
    api_secret: &str,
) -> Result<String, GatewayError> {
    let secret = BASE64
        .decode(api_secret)
        .map_err(|e| GatewayError::Unauthorized(format!("API secret is not valid base64: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(post_data.as_bytes());
    let digest = hasher.finalize();

    let mut mac = Hmac::<Sha512>::new_from_slice(&secret)
        .map_err(|e| GatewayError::Unauthorized(format!("API secret rejected: {e}")))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// The venue reports errors as strings like "EAPI:Invalid key"; sort them
/// into the typed taxonomy by content.
fn classify_exchange_errors(errors: &[String]) -> GatewayError {
    let message = errors.join(", ");
    let lowered = message.to_lowercase();

    if lowered.contains("permission denied")
        || lowered.contains("invalid key")
        || lowered.contains("invalid signature")
        || lowered.contains("invalid nonce")
    {
        GatewayError::Unauthorized(message)
    } else if lowered.contains("unknown order") || lowered.contains("unknown position") {
        GatewayError::NotFound(message)
    } else {
        GatewayError::Rejected(message)
    }
}

fn order_params(order: &OrderRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("ordertype".to_string(), order.order_type.to_string()),
        ("type".to_string(), order.side.as_exchange_str().to_string()),
        ("volume".to_string(), order.volume.to_string()),
        ("pair".to_string(), order.pair.clone()),
        ("price".to_string(), order.price.to_string()),
    ];
    if let Some(stop_price) = order.close_stop_price {
        params.push(("close[ordertype]".to_string(), "stop-loss".to_string()));
        params.push(("close[price]".to_string(), stop_price.to_string()));
    }
    if let Some(secondary) = order.secondary_price {
        params.push(("price2".to_string(), secondary.to_string()));
    }
    params.push(("leverage".to_string(), order.leverage.to_string()));
    if order.reduce_only {
        params.push(("reduce_only".to_string(), "true".to_string()));
    }
    if order.validate_only {
        params.push(("validate".to_string(), "true".to_string()));
    }
    params
}
