use crate::application::monitor::MonitorStrategy;
use crate::application::orchestrator::PlacementSettings;
use crate::application::sizing::SizingVariant;
use crate::domain::types::AccountCredential;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mock,
    Kraken,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "kraken" => Ok(Mode::Kraken),
            _ => anyhow::bail!("Invalid MODE: {}. Must be 'mock' or 'kraken'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub kraken_api_url: String,
    pub kraken_ws_url: String,
    pub accounts_file: String,
    pub base_currency: String,
    pub risk_per_trade: f64,
    pub sizing_variant: SizingVariant,
    pub monitor_strategy: MonitorStrategy,
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mode_str = env::var("MODE").unwrap_or_else(|_| "mock".to_string());
        let mode = Mode::from_str(&mode_str)?;

        let kraken_api_url =
            env::var("KRAKEN_API_URL").unwrap_or_else(|_| "https://api.kraken.com".to_string());
        let kraken_ws_url =
            env::var("KRAKEN_WS_URL").unwrap_or_else(|_| "wss://ws.kraken.com/v2".to_string());
        url::Url::parse(&kraken_ws_url)
            .with_context(|| format!("Invalid KRAKEN_WS_URL: {kraken_ws_url}"))?;

        let accounts_file =
            env::var("ACCOUNTS_FILE").unwrap_or_else(|_| "accounts.json".to_string());
        let base_currency = env::var("BASE_CURRENCY").unwrap_or_else(|_| "USDT".to_string());

        let risk_per_trade = env::var("RISK_PER_TRADE")
            .unwrap_or_else(|_| "0.03".to_string())
            .parse::<f64>()
            .context("Invalid RISK_PER_TRADE")?;
        if !(risk_per_trade > 0.0 && risk_per_trade <= 1.0) {
            anyhow::bail!("RISK_PER_TRADE must be in (0, 1], got {risk_per_trade}");
        }

        let sizing_variant =
            SizingVariant::from_str(&env::var("SIZING_VARIANT").unwrap_or_else(|_| "rounded".to_string()))?;
        let monitor_strategy = MonitorStrategy::from_str(
            &env::var("MONITOR_STRATEGY").unwrap_or_else(|_| "polling".to_string()),
        )?;

        let poll_interval_secs = env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .context("Invalid POLL_INTERVAL_SECS")?;
        if poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            mode,
            kraken_api_url,
            kraken_ws_url,
            accounts_file,
            base_currency,
            risk_per_trade,
            sizing_variant,
            monitor_strategy,
            poll_interval_secs,
        })
    }

    pub fn placement_settings(&self) -> PlacementSettings {
        PlacementSettings {
            risk_fraction: self.risk_per_trade,
            base_currency: self.base_currency.clone(),
            sizing_variant: self.sizing_variant,
            monitor_strategy: self.monitor_strategy,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

/// Load account credentials from a JSON file: an array of
/// `{account_id, api_key, api_secret}` objects. Stands in for the
/// credential store this engine deliberately does not own.
pub fn load_accounts(path: &Path) -> Result<Vec<AccountCredential>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
    let accounts: Vec<AccountCredential> = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed accounts file {}", path.display()))?;
    if accounts.is_empty() {
        anyhow::bail!("Accounts file {} lists no accounts", path.display());
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(Mode::from_str("mock").unwrap(), Mode::Mock);
        assert_eq!(Mode::from_str("KRAKEN").unwrap(), Mode::Kraken);
        assert!(Mode::from_str("paper").is_err());
    }

    #[test]
    fn strategy_and_variant_parsing() {
        assert_eq!(
            MonitorStrategy::from_str("streaming").unwrap(),
            MonitorStrategy::Streaming
        );
        assert!(MonitorStrategy::from_str("webhook").is_err());
        assert_eq!(
            SizingVariant::from_str("exact").unwrap(),
            SizingVariant::Exact
        );
        assert!(SizingVariant::from_str("banker").is_err());
    }

    #[test]
    fn accounts_file_round_trips() {
        let path = std::env::temp_dir().join("fleettrade_accounts_test.json");
        std::fs::write(
            &path,
            r#"[{"account_id": "alice", "api_key": "k1", "api_secret": "czE="},
                {"account_id": "bob", "api_key": "k2", "api_secret": "czI="}]"#,
        )
        .unwrap();

        let accounts = load_accounts(&path).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].account_id, "alice");
        assert_eq!(accounts[1].api_key, "k2");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn empty_accounts_file_is_rejected() {
        let path = std::env::temp_dir().join("fleettrade_accounts_empty.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(load_accounts(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
