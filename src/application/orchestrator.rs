use crate::application::monitor::{
    MonitorSession, MonitorStrategy, PositionPoller, PriceBounds, PriceWatcher,
};
use crate::application::orders::{build_entry_order, build_take_profit_order};
use crate::application::sizing::{PositionSizer, SizingVariant};
use crate::domain::ports::{ExchangeGateway, PriceFeed};
use crate::domain::types::{
    AccountCredential, OrderOutcome, OrderRequest, OrderResult, SizedOrderRequest, TradeIntent,
};
use futures::future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PlacementSettings {
    pub risk_fraction: f64,
    pub base_currency: String,
    pub sizing_variant: SizingVariant,
    pub monitor_strategy: MonitorStrategy,
    pub poll_interval: Duration,
}

/// Outcome of one batch: a result per requested account, plus the monitor
/// session watching the batch when one was started.
pub struct PlacementReport {
    pub results: Vec<OrderResult>,
    pub monitor: Option<MonitorSession>,
}

/// Fans one trade intent out across every account concurrently. Each
/// account's pipeline (size, entry, take-profit) is fully isolated; one
/// account failing never touches another's.
pub struct OrderPlacer {
    gateway: Arc<dyn ExchangeGateway>,
    feed: Arc<dyn PriceFeed>,
    settings: PlacementSettings,
}

impl OrderPlacer {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        feed: Arc<dyn PriceFeed>,
        settings: PlacementSettings,
    ) -> Self {
        Self {
            gateway,
            feed,
            settings,
        }
    }

    /// Joins every account's pipeline before returning; callers get one
    /// result per requested account, never all-or-nothing semantics. When
    /// the intent is live (not a dry run), exactly one monitor session is
    /// started for the whole batch.
    pub async fn place_for_accounts(
        &self,
        accounts: &[AccountCredential],
        intent: &TradeIntent,
    ) -> PlacementReport {
        let batch_id = Uuid::new_v4();
        info!(
            "OrderPlacer: batch {} {} {} entry={} stop={} target={} dry_run={} across {} accounts",
            batch_id,
            intent.side,
            intent.pair,
            intent.entry_price,
            intent.stop_price,
            intent.take_profit_price,
            intent.dry_run,
            accounts.len()
        );

        let results = future::join_all(
            accounts
                .iter()
                .map(|account| self.place_for_account(account, intent)),
        )
        .await;

        let placed = results.iter().filter(|r| r.entry.is_placed()).count();
        info!(
            "OrderPlacer: batch {} complete, {}/{} entries placed",
            batch_id,
            placed,
            results.len()
        );

        let monitor = if intent.dry_run {
            None
        } else {
            self.start_monitor(accounts, intent, &results)
        };

        PlacementReport { results, monitor }
    }

    async fn place_for_account(
        &self,
        account: &AccountCredential,
        intent: &TradeIntent,
    ) -> OrderResult {
        let sizer = PositionSizer::new(self.gateway.clone(), self.settings.sizing_variant);
        let volume = match sizer
            .size(
                intent.entry_price,
                intent.stop_price,
                self.settings.risk_fraction,
                &self.settings.base_currency,
                account,
            )
            .await
        {
            Ok(volume) => volume,
            Err(e) => {
                warn!(
                    "OrderPlacer: sizing failed for {}: {}",
                    account.account_id, e
                );
                let reason = e.to_string();
                return OrderResult {
                    account_id: account.account_id.clone(),
                    entry: OrderOutcome::Rejected {
                        reason: reason.clone(),
                    },
                    take_profit: OrderOutcome::Rejected { reason },
                };
            }
        };

        let sized = SizedOrderRequest {
            account_id: account.account_id.clone(),
            intent: intent.clone(),
            volume,
        };

        let entry = self.submit_entry(&sized, account).await;
        // The take-profit depends only on the computed volume, not on the
        // entry's outcome, and is always submitted after it.
        let take_profit = self.submit_take_profit(&sized, account).await;

        OrderResult {
            account_id: account.account_id.clone(),
            entry,
            take_profit,
        }
    }

    async fn submit_entry(
        &self,
        sized: &SizedOrderRequest,
        account: &AccountCredential,
    ) -> OrderOutcome {
        let request = match build_entry_order(
            sized.intent.side,
            sized.volume,
            &sized.intent.pair,
            sized.intent.entry_price,
            sized.intent.stop_price,
            sized.intent.dry_run,
        ) {
            Ok(request) => request,
            Err(e) => {
                return OrderOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };
        self.submit(&request, account).await
    }

    async fn submit_take_profit(
        &self,
        sized: &SizedOrderRequest,
        account: &AccountCredential,
    ) -> OrderOutcome {
        let request = match build_take_profit_order(
            sized.intent.side,
            sized.volume,
            &sized.intent.pair,
            sized.intent.take_profit_price,
            sized.intent.dry_run,
        ) {
            Ok(request) => request,
            Err(e) => {
                return OrderOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };
        self.submit(&request, account).await
    }

    async fn submit(&self, request: &OrderRequest, account: &AccountCredential) -> OrderOutcome {
        match self.gateway.add_order(request, account).await {
            Ok(ack) => {
                let txid = ack.primary_txid().unwrap_or_default().to_string();
                info!(
                    "OrderPlacer: {} {} order for {} accepted ({})",
                    request.side,
                    request.order_type,
                    account.account_id,
                    if txid.is_empty() { "validated" } else { &txid }
                );
                OrderOutcome::Placed { txid }
            }
            Err(e) => {
                warn!(
                    "OrderPlacer: {} order for {} failed: {}",
                    request.order_type, account.account_id, e
                );
                OrderOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn start_monitor(
        &self,
        accounts: &[AccountCredential],
        intent: &TradeIntent,
        results: &[OrderResult],
    ) -> Option<MonitorSession> {
        match self.settings.monitor_strategy {
            MonitorStrategy::Polling => {
                // Track the first entry order that actually booked; its
                // account is the one whose positions we poll.
                let tracked = results
                    .iter()
                    .zip(accounts)
                    .find_map(|(result, account)| {
                        result
                            .entry
                            .txid()
                            .filter(|txid| !txid.is_empty())
                            .map(|txid| (txid.to_string(), account.clone()))
                    });
                let Some((txid, credential)) = tracked else {
                    warn!("OrderPlacer: no entry order booked; skipping close monitor");
                    return None;
                };
                let poller = PositionPoller::new(
                    self.gateway.clone(),
                    credential,
                    txid,
                    accounts.to_vec(),
                    self.settings.poll_interval,
                );
                Some(MonitorSession::Polling(poller.spawn()))
            }
            MonitorStrategy::Streaming => {
                let bounds =
                    PriceBounds::from_exit_prices(intent.take_profit_price, intent.stop_price);
                let watcher = PriceWatcher::new(
                    self.feed.clone(),
                    self.gateway.clone(),
                    intent.pair.clone(),
                    bounds,
                    accounts.to_vec(),
                );
                Some(MonitorSession::Streaming(watcher.spawn()))
            }
        }
    }
}
