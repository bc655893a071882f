use clap::{Parser, Subcommand};
use fleettrade::application::orchestrator::OrderPlacer;
use fleettrade::application::orders::build_amendment;
use fleettrade::config::{load_accounts, Config, Mode};
use fleettrade::domain::errors::ValidationError;
use fleettrade::domain::ports::{ExchangeGateway, PriceFeed};
use fleettrade::domain::types::{AccountCredential, OrderOutcome, OrderSide, TradeIntent};
use fleettrade::infrastructure::kraken::KrakenGateway;
use fleettrade::infrastructure::kraken_websocket::KrakenTickerFeed;
use fleettrade::infrastructure::mock::{MockExchangeGateway, RandomWalkFeed};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(
    name = "fleettrade",
    version,
    about = "Risk-managed bracket orders across a fleet of Kraken accounts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a bracket order for every configured account and monitor for close
    Place {
        #[arg(long, value_parser = parse_side)]
        side: OrderSide,
        #[arg(long, default_value = "XBTUSDT")]
        pair: String,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        stop: f64,
        #[arg(long)]
        take_profit: f64,
        /// Run the exchange's validation only; nothing is booked
        #[arg(long)]
        dry_run: bool,
    },
    /// Cancel one order by transaction id on every account
    Cancel { txid: String },
    /// Cancel all resting orders across every account
    CancelAll,
    /// Amend a resting order's price
    Edit {
        txid: String,
        #[arg(long, default_value = "XBTUSDT")]
        pair: String,
        #[arg(long)]
        price: f64,
    },
    /// Show each account's balances
    Balance,
    /// Show each account's open orders
    OpenOrders,
    /// Show each account's unrealized PnL
    Pnl,
}

fn parse_side(s: &str) -> Result<OrderSide, String> {
    s.parse().map_err(|e: ValidationError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        "Fleettrade {} starting in {:?} mode",
        env!("CARGO_PKG_VERSION"),
        config.mode
    );

    let accounts = match config.mode {
        // Mock mode runs offline even without a credentials file.
        Mode::Mock => load_accounts(Path::new(&config.accounts_file))
            .unwrap_or_else(|_| demo_accounts()),
        Mode::Kraken => load_accounts(Path::new(&config.accounts_file))?,
    };
    info!("Loaded {} account(s)", accounts.len());

    let (gateway, feed): (Arc<dyn ExchangeGateway>, Arc<dyn PriceFeed>) = match config.mode {
        Mode::Mock => {
            let mock = Arc::new(MockExchangeGateway::new());
            for account in &accounts {
                mock.set_balance(&account.account_id, &config.base_currency, "1000.00")
                    .await;
            }
            (
                mock,
                Arc::new(RandomWalkFeed::new(30000.0, Duration::from_millis(500))),
            )
        }
        Mode::Kraken => (
            Arc::new(KrakenGateway::new(config.kraken_api_url.clone())),
            Arc::new(KrakenTickerFeed::new(config.kraken_ws_url.clone())),
        ),
    };

    match cli.command {
        Command::Place {
            side,
            pair,
            entry,
            stop,
            take_profit,
            dry_run,
        } => {
            let intent = TradeIntent {
                side,
                pair,
                entry_price: entry,
                stop_price: stop,
                take_profit_price: take_profit,
                dry_run,
            };

            let placer = OrderPlacer::new(gateway, feed, config.placement_settings());
            let report = placer.place_for_accounts(&accounts, &intent).await;

            for result in &report.results {
                report_outcome(&result.account_id, "entry", &result.entry);
                report_outcome(&result.account_id, "take-profit", &result.take_profit);
            }

            if let Some(session) = report.monitor {
                info!(
                    "Close monitor running ({:?}); Ctrl+C to stop",
                    session.strategy()
                );
                tokio::select! {
                    result = session.join() => match result {
                        Ok(()) => info!("Monitor finished: batch closed out"),
                        Err(e) => error!("Monitor failed: {}", e),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received. Exiting...");
                    }
                }
            }
        }
        Command::Cancel { txid } => {
            for account in &accounts {
                match gateway.cancel_order(&txid, account).await {
                    Ok(ack) => info!("{}: removed {} order(s)", account.account_id, ack.count),
                    Err(e) => error!("{}: cancel failed: {}", account.account_id, e),
                }
            }
        }
        Command::CancelAll => {
            for account in &accounts {
                match gateway.cancel_all(account).await {
                    Ok(ack) => info!("{}: removed {} order(s)", account.account_id, ack.count),
                    Err(e) => error!("{}: cancel-all failed: {}", account.account_id, e),
                }
            }
        }
        Command::Edit { txid, pair, price } => {
            let amendment = build_amendment(&txid, &pair, price)?;
            for account in &accounts {
                match gateway.edit_order(&amendment, account).await {
                    Ok(ack) => info!(
                        "{}: order amended ({})",
                        account.account_id,
                        ack.primary_txid().unwrap_or("no replacement id")
                    ),
                    Err(e) => error!("{}: edit failed: {}", account.account_id, e),
                }
            }
        }
        Command::Balance => {
            for account in &accounts {
                match gateway.balance(account).await {
                    Ok(balances) => {
                        info!("{}:", account.account_id);
                        let mut entries: Vec<_> = balances.iter().collect();
                        entries.sort();
                        for (currency, amount) in entries {
                            info!("  {} {}", currency, amount);
                        }
                    }
                    Err(e) => error!("{}: balance fetch failed: {}", account.account_id, e),
                }
            }
        }
        Command::OpenOrders => {
            for account in &accounts {
                match gateway.open_orders(account).await {
                    Ok(open) => info!("{}: {} open order(s)", account.account_id, open.len()),
                    Err(e) => error!("{}: open orders fetch failed: {}", account.account_id, e),
                }
            }
        }
        Command::Pnl => {
            for account in &accounts {
                match gateway.unrealized_pnl(account).await {
                    Ok(value) => info!("{}: unrealized PnL {}", account.account_id, value),
                    Err(e) => error!("{}: PnL fetch failed: {}", account.account_id, e),
                }
            }
        }
    }

    Ok(())
}

fn report_outcome(account_id: &str, leg: &str, outcome: &OrderOutcome) {
    match outcome {
        OrderOutcome::Placed { txid } if txid.is_empty() => {
            info!("{}: {} validated (dry run)", account_id, leg);
        }
        OrderOutcome::Placed { txid } => info!("{}: {} placed ({})", account_id, leg, txid),
        OrderOutcome::Rejected { reason } => error!("{}: {} failed: {}", account_id, leg, reason),
    }
}

fn demo_accounts() -> Vec<AccountCredential> {
    vec![
        AccountCredential {
            account_id: "demo-1".to_string(),
            api_key: "demo-key-1".to_string(),
            api_secret: "ZGVtby1zZWNyZXQtMQ==".to_string(),
        },
        AccountCredential {
            account_id: "demo-2".to_string(),
            api_key: "demo-key-2".to_string(),
            api_secret: "ZGVtby1zZWNyZXQtMg==".to_string(),
        },
    ]
}
