use crate::domain::errors::PlacementError;
use crate::domain::ports::ExchangeGateway;
use crate::domain::types::AccountCredential;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Two observed renditions of the sizing formula differ in whether the stop
/// ratio is rounded to two decimals before dividing. Both are kept; the
/// calling context picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizingVariant {
    /// Round the stop ratio to two decimals first. Matches the volumes the
    /// original account fixtures document (0.0069 on a 30000/29000 long).
    #[default]
    RoundedRatio,
    /// Divide by the raw stop ratio.
    Exact,
}

impl FromStr for SizingVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rounded" => Ok(SizingVariant::RoundedRatio),
            "exact" => Ok(SizingVariant::Exact),
            _ => anyhow::bail!("Invalid SIZING_VARIANT: {}. Must be 'rounded' or 'exact'", s),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure sizing math: balance + risk inputs -> trade volume.
///
/// `entry == stop` leaves no stop distance and is rejected rather than
/// returning an infinite volume, as is a ratio that rounds away to zero
/// under `RoundedRatio`.
pub fn volume_for(
    entry_price: f64,
    stop_price: f64,
    risk_fraction: f64,
    balance: f64,
    variant: SizingVariant,
) -> Result<f64, PlacementError> {
    if entry_price == stop_price {
        return Err(PlacementError::DegenerateStop);
    }

    let balance = round2(balance);
    let risk_amount = round2(balance * risk_fraction);

    let stop_distance = entry_price - stop_price;
    let stop_midpoint = (entry_price + stop_price) / 2.0;
    let mut stop_ratio = stop_distance / stop_midpoint;
    if variant == SizingVariant::RoundedRatio {
        stop_ratio = round2(stop_ratio);
        if stop_ratio == 0.0 {
            return Err(PlacementError::DegenerateStop);
        }
    }

    Ok((risk_amount / stop_ratio / entry_price).abs())
}

/// Sizes one account's order from that account's own balance. Volume is
/// computed freshly per call; nothing is cached or shared across accounts.
pub struct PositionSizer {
    gateway: Arc<dyn ExchangeGateway>,
    variant: SizingVariant,
}

impl PositionSizer {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, variant: SizingVariant) -> Self {
        Self { gateway, variant }
    }

    /// Balance-retrieval failures propagate unchanged; there is no retry at
    /// this layer.
    pub async fn size(
        &self,
        entry_price: f64,
        stop_price: f64,
        risk_fraction: f64,
        base_currency: &str,
        credential: &AccountCredential,
    ) -> Result<f64, PlacementError> {
        let balances = self.gateway.balance(credential).await?;

        let raw = balances
            .get(base_currency)
            .ok_or_else(|| PlacementError::MissingBalance {
                currency: base_currency.to_string(),
            })?;
        let balance: f64 = raw.parse().map_err(|_| PlacementError::BadBalance {
            currency: base_currency.to_string(),
            raw: raw.clone(),
        })?;

        let volume = volume_for(entry_price, stop_price, risk_fraction, balance, self.variant)?;
        debug!(
            "PositionSizer: {} {}={} risk={} -> volume {}",
            credential.account_id, base_currency, balance, risk_fraction, volume
        );
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockExchangeGateway;

    const FIXTURE_BALANCE: f64 = 124.11134543;

    #[test]
    fn rounded_ratio_matches_documented_long_volume() {
        let volume =
            volume_for(30000.0, 29000.0, 0.05, FIXTURE_BALANCE, SizingVariant::RoundedRatio)
                .unwrap();
        assert_eq!(volume, 0.0069);
    }

    #[test]
    fn rounded_ratio_matches_documented_short_volume() {
        let volume =
            volume_for(29000.0, 30000.0, 0.05, FIXTURE_BALANCE, SizingVariant::RoundedRatio)
                .unwrap();
        assert_eq!(volume, 0.007137931034482759);
    }

    #[test]
    fn exact_variant_divides_by_raw_ratio() {
        let long =
            volume_for(30000.0, 29000.0, 0.05, FIXTURE_BALANCE, SizingVariant::Exact).unwrap();
        assert_eq!(long, 0.0061065);

        let short =
            volume_for(29000.0, 30000.0, 0.05, FIXTURE_BALANCE, SizingVariant::Exact).unwrap();
        assert_eq!(short, 0.006317068965517241);
    }

    #[test]
    fn volume_is_non_negative_for_either_direction() {
        for (entry, stop) in [(30000.0, 29000.0), (29000.0, 30000.0)] {
            for variant in [SizingVariant::Exact, SizingVariant::RoundedRatio] {
                let volume = volume_for(entry, stop, 0.01, FIXTURE_BALANCE, variant).unwrap();
                assert!(volume.is_finite());
                assert!(volume >= 0.0);
            }
        }
    }

    #[test]
    fn equal_entry_and_stop_is_rejected() {
        let err = volume_for(30000.0, 30000.0, 0.05, FIXTURE_BALANCE, SizingVariant::Exact)
            .unwrap_err();
        assert!(matches!(err, PlacementError::DegenerateStop));
    }

    #[test]
    fn ratio_that_rounds_to_zero_is_rejected() {
        // 30000 vs 29999: raw ratio ~0.000033 rounds to 0.00.
        let err = volume_for(
            30000.0,
            29999.0,
            0.05,
            FIXTURE_BALANCE,
            SizingVariant::RoundedRatio,
        )
        .unwrap_err();
        assert!(matches!(err, PlacementError::DegenerateStop));

        // The exact variant still sizes it.
        assert!(
            volume_for(30000.0, 29999.0, 0.05, FIXTURE_BALANCE, SizingVariant::Exact).is_ok()
        );
    }

    fn credential() -> crate::domain::types::AccountCredential {
        crate::domain::types::AccountCredential {
            account_id: "acct-1".to_string(),
            api_key: "key".to_string(),
            api_secret: "c2VjcmV0".to_string(),
        }
    }

    #[tokio::test]
    async fn sizer_reads_the_accounts_own_balance() {
        let gateway = Arc::new(MockExchangeGateway::new());
        gateway.set_balance("acct-1", "USDT", "124.11134543").await;

        let sizer = PositionSizer::new(gateway.clone(), SizingVariant::RoundedRatio);
        let volume = sizer
            .size(30000.0, 29000.0, 0.05, "USDT", &credential())
            .await
            .unwrap();
        assert_eq!(volume, 0.0069);
        assert_eq!(gateway.balance_calls(), 1);
    }

    #[tokio::test]
    async fn missing_base_currency_is_an_error() {
        let gateway = Arc::new(MockExchangeGateway::new());
        gateway.set_balance("acct-1", "XXBT", "0.5").await;

        let sizer = PositionSizer::new(gateway, SizingVariant::RoundedRatio);
        let err = sizer
            .size(30000.0, 29000.0, 0.05, "USDT", &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::MissingBalance { .. }));
    }

    #[tokio::test]
    async fn balance_failure_propagates_unchanged() {
        let gateway = Arc::new(MockExchangeGateway::new());
        gateway.fail_balance_for("acct-1").await;

        let sizer = PositionSizer::new(gateway, SizingVariant::RoundedRatio);
        let err = sizer
            .size(30000.0, 29000.0, 0.05, "USDT", &credential())
            .await
            .unwrap_err();
        assert!(matches!(err, PlacementError::Gateway(_)));
    }
}
