//! Batch fan-out behaviour: per-account isolation, intra-account ordering,
//! and the monitor spawn rules.

use fleettrade::application::monitor::MonitorStrategy;
use fleettrade::application::orchestrator::{OrderPlacer, PlacementSettings};
use fleettrade::application::sizing::SizingVariant;
use fleettrade::domain::ports::ExchangeGateway;
use fleettrade::domain::types::{AccountCredential, OrderOutcome, OrderSide, TradeIntent};
use fleettrade::infrastructure::mock::{MockExchangeGateway, ScriptedPriceFeed};
use std::sync::Arc;
use std::time::Duration;

const FIXTURE_BALANCE: &str = "124.11134543";

fn account(id: &str) -> AccountCredential {
    AccountCredential {
        account_id: id.to_string(),
        api_key: format!("{id}-key"),
        api_secret: "c2VjcmV0".to_string(),
    }
}

fn intent(dry_run: bool) -> TradeIntent {
    TradeIntent {
        side: OrderSide::Buy,
        pair: "XBTUSDT".to_string(),
        entry_price: 30000.0,
        stop_price: 29000.0,
        take_profit_price: 31000.0,
        dry_run,
    }
}

fn settings(monitor_strategy: MonitorStrategy) -> PlacementSettings {
    PlacementSettings {
        risk_fraction: 0.05,
        base_currency: "USDT".to_string(),
        sizing_variant: SizingVariant::RoundedRatio,
        monitor_strategy,
        poll_interval: Duration::from_secs(60),
    }
}

fn placer(gateway: &Arc<MockExchangeGateway>, monitor_strategy: MonitorStrategy) -> OrderPlacer {
    OrderPlacer::new(
        gateway.clone(),
        Arc::new(ScriptedPriceFeed::new(Vec::new())),
        settings(monitor_strategy),
    )
}

#[tokio::test]
async fn one_failing_account_does_not_affect_the_others() {
    let gateway = Arc::new(MockExchangeGateway::new());
    gateway.set_balance("acct-1", "USDT", FIXTURE_BALANCE).await;
    gateway.set_balance("acct-3", "USDT", FIXTURE_BALANCE).await;
    gateway.fail_balance_for("acct-2").await;

    let accounts = vec![account("acct-1"), account("acct-2"), account("acct-3")];
    let report = placer(&gateway, MonitorStrategy::Polling)
        .place_for_accounts(&accounts, &intent(false))
        .await;

    assert_eq!(report.results.len(), 3);

    let by_id = |id: &str| {
        report
            .results
            .iter()
            .find(|result| result.account_id == id)
            .unwrap()
    };

    assert!(by_id("acct-1").entry.is_placed());
    assert!(by_id("acct-1").take_profit.is_placed());
    assert!(by_id("acct-3").entry.is_placed());
    assert!(by_id("acct-3").take_profit.is_placed());

    let failed = by_id("acct-2");
    match (&failed.entry, &failed.take_profit) {
        (
            OrderOutcome::Rejected { reason: entry_reason },
            OrderOutcome::Rejected {
                reason: take_profit_reason,
            },
        ) => {
            assert!(entry_reason.contains("balance outage"));
            assert_eq!(entry_reason, take_profit_reason);
        }
        other => panic!("expected both legs rejected, got {other:?}"),
    }

    // Healthy accounts still got both orders through.
    let submitted = gateway.submitted().await;
    assert_eq!(
        submitted
            .iter()
            .filter(|(account_id, _)| account_id == "acct-2")
            .count(),
        0
    );
    assert_eq!(submitted.len(), 4);

    let session = report.monitor.expect("live batch starts a monitor");
    session.abort();
}

#[tokio::test]
async fn entry_precedes_take_profit_within_each_account() {
    let gateway = Arc::new(MockExchangeGateway::new());
    gateway.set_balance("acct-1", "USDT", FIXTURE_BALANCE).await;
    gateway.set_balance("acct-2", "USDT", FIXTURE_BALANCE).await;

    let accounts = vec![account("acct-1"), account("acct-2")];
    let report = placer(&gateway, MonitorStrategy::Polling)
        .place_for_accounts(&accounts, &intent(false))
        .await;

    let submitted = gateway.submitted().await;
    for account_id in ["acct-1", "acct-2"] {
        let orders: Vec<_> = submitted
            .iter()
            .filter(|(id, _)| id == account_id)
            .map(|(_, order)| order)
            .collect();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_type, "limit");
        assert_eq!(orders[1].order_type, "take-profit-limit");
        // Same freshly computed volume on both legs, opposite sides.
        assert_eq!(orders[0].volume, 0.0069);
        assert_eq!(orders[1].volume, 0.0069);
        assert_eq!(orders[1].side, orders[0].side.opposite());
    }

    if let Some(session) = report.monitor {
        session.abort();
    }
}

#[tokio::test]
async fn dry_run_validates_without_booking_or_monitoring() {
    let gateway = Arc::new(MockExchangeGateway::new());
    gateway.set_balance("acct-1", "USDT", FIXTURE_BALANCE).await;

    let accounts = vec![account("acct-1")];
    let report = placer(&gateway, MonitorStrategy::Polling)
        .place_for_accounts(&accounts, &intent(true))
        .await;

    assert!(report.monitor.is_none());
    assert!(report.results[0].entry.is_placed());
    assert!(report.results[0].take_profit.is_placed());

    let submitted = gateway.submitted().await;
    assert_eq!(submitted.len(), 2);
    assert!(submitted.iter().all(|(_, order)| order.validate_only));

    // Nothing booked, nothing cancelled.
    assert!(gateway
        .open_orders(&account("acct-1"))
        .await
        .unwrap()
        .is_empty());
    assert!(gateway.cancel_all_calls().await.is_empty());
}

#[tokio::test]
async fn batch_with_no_booked_entry_skips_the_polling_monitor() {
    let gateway = Arc::new(MockExchangeGateway::new());
    gateway.set_balance("acct-1", "USDT", FIXTURE_BALANCE).await;
    gateway.fail_orders_for("acct-1").await;

    let accounts = vec![account("acct-1")];
    let report = placer(&gateway, MonitorStrategy::Polling)
        .place_for_accounts(&accounts, &intent(false))
        .await;

    assert!(report.monitor.is_none());
    match &report.results[0].entry {
        OrderOutcome::Rejected { reason } => {
            assert!(reason.contains("Insufficient initial margin"));
        }
        other => panic!("expected rejected entry, got {other:?}"),
    }
}

#[tokio::test]
async fn take_profit_is_still_submitted_when_the_entry_is_rejected() {
    // The take-profit leg depends on the computed volume, not on the entry
    // outcome; an exchange-side entry rejection must not suppress it.
    let gateway = Arc::new(MockExchangeGateway::new());
    gateway.set_balance("acct-1", "USDT", FIXTURE_BALANCE).await;
    gateway.fail_entry_orders_for("acct-1").await;

    let accounts = vec![account("acct-1")];
    let report = placer(&gateway, MonitorStrategy::Polling)
        .place_for_accounts(&accounts, &intent(false))
        .await;

    let result = &report.results[0];
    match &result.entry {
        OrderOutcome::Rejected { reason } => {
            assert!(reason.contains("Insufficient initial margin"));
        }
        other => panic!("expected rejected entry, got {other:?}"),
    }
    assert!(result.take_profit.is_placed());

    // No booked entry to track, so no polling session either.
    assert!(report.monitor.is_none());
}
