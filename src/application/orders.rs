use crate::domain::errors::ValidationError;
use crate::domain::types::{
    AmendRequest, OrderRequest, OrderSide, LEVERAGE, TAKE_PROFIT_OFFSET,
};

fn validate_volume(volume: f64) -> Result<(), ValidationError> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(ValidationError::InvalidVolume);
    }
    Ok(())
}

fn validate_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ValidationError::InvalidPrice);
    }
    Ok(())
}

fn validate_stop(stop_price: f64) -> Result<(), ValidationError> {
    if !stop_price.is_finite() || stop_price <= 0.0 {
        return Err(ValidationError::InvalidStopLoss);
    }
    Ok(())
}

/// Limit entry order carrying its attached stop-loss close leg. Fail-fast:
/// nothing leaves this function until every field validates.
pub fn build_entry_order(
    side: OrderSide,
    volume: f64,
    pair: &str,
    price: f64,
    stop_price: f64,
    validate_only: bool,
) -> Result<OrderRequest, ValidationError> {
    validate_volume(volume)?;
    validate_price(price)?;
    validate_stop(stop_price)?;

    Ok(OrderRequest {
        order_type: "limit",
        side,
        volume,
        pair: pair.to_string(),
        price,
        secondary_price: None,
        close_stop_price: Some(stop_price),
        leverage: LEVERAGE,
        reduce_only: false,
        validate_only,
    })
}

/// Take-profit order closing the entry: opposite side, reduce-only, with a
/// fixed relative offset as its secondary price.
pub fn build_take_profit_order(
    side: OrderSide,
    volume: f64,
    pair: &str,
    target_price: f64,
    validate_only: bool,
) -> Result<OrderRequest, ValidationError> {
    validate_volume(volume)?;
    validate_price(target_price)?;

    Ok(OrderRequest {
        order_type: "take-profit-limit",
        side: side.opposite(),
        volume,
        pair: pair.to_string(),
        price: target_price,
        secondary_price: Some(TAKE_PROFIT_OFFSET),
        close_stop_price: None,
        leverage: LEVERAGE,
        reduce_only: true,
        validate_only,
    })
}

/// Price amendment for a resting order.
pub fn build_amendment(
    txid: &str,
    pair: &str,
    new_price: f64,
) -> Result<AmendRequest, ValidationError> {
    validate_price(new_price)?;

    Ok(AmendRequest {
        txid: txid.to_string(),
        pair: pair.to_string(),
        price: new_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_order_carries_stop_leg_and_leverage() {
        let order =
            build_entry_order(OrderSide::Buy, 0.0069, "XBTUSDT", 30000.0, 29000.0, false).unwrap();
        assert_eq!(order.order_type, "limit");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.close_stop_price, Some(29000.0));
        assert_eq!(order.leverage, "3:1");
        assert!(!order.reduce_only);
        assert!(!order.validate_only);
    }

    #[test]
    fn take_profit_closes_with_opposite_side_and_offset() {
        let entry =
            build_entry_order(OrderSide::Buy, 0.0069, "XBTUSDT", 30000.0, 29000.0, true).unwrap();
        let take_profit =
            build_take_profit_order(OrderSide::Buy, 0.0069, "XBTUSDT", 31000.0, true).unwrap();

        assert_eq!(take_profit.side, entry.side.opposite());
        assert_eq!(take_profit.volume, entry.volume);
        assert_eq!(take_profit.order_type, "take-profit-limit");
        assert_eq!(take_profit.secondary_price, Some("#5.0"));
        assert_eq!(take_profit.leverage, entry.leverage);
        assert!(take_profit.reduce_only);
        // The validate-only flag is forwarded verbatim on both legs.
        assert!(entry.validate_only);
        assert!(take_profit.validate_only);
    }

    #[test]
    fn zero_negative_and_nan_volumes_are_rejected() {
        for volume in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = build_entry_order(OrderSide::Sell, volume, "XBTUSDT", 30000.0, 31000.0, false)
                .unwrap_err();
            assert_eq!(err, ValidationError::InvalidVolume);

            let err = build_take_profit_order(OrderSide::Sell, volume, "XBTUSDT", 29000.0, false)
                .unwrap_err();
            assert_eq!(err, ValidationError::InvalidVolume);
        }
    }

    #[test]
    fn bad_prices_are_rejected_per_field() {
        for price in [0.0, -30000.0, f64::NAN] {
            let err = build_entry_order(OrderSide::Buy, 0.01, "XBTUSDT", price, 29000.0, false)
                .unwrap_err();
            assert_eq!(err, ValidationError::InvalidPrice);
        }

        for stop in [0.0, -29000.0, f64::NAN] {
            let err = build_entry_order(OrderSide::Buy, 0.01, "XBTUSDT", 30000.0, stop, false)
                .unwrap_err();
            assert_eq!(err, ValidationError::InvalidStopLoss);
        }
    }

    #[test]
    fn amendment_validates_its_price() {
        let amend = build_amendment("OTX-1", "XBTUSDT", 30500.0).unwrap();
        assert_eq!(amend.txid, "OTX-1");
        assert_eq!(amend.price, 30500.0);

        let err = build_amendment("OTX-1", "XBTUSDT", f64::NAN).unwrap_err();
        assert_eq!(err, ValidationError::InvalidPrice);
    }
}
