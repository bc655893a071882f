use thiserror::Error;

/// Pre-flight order validation failures. Raised synchronously before any
/// network call and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid order type")]
    InvalidDirection,

    #[error("Invalid volume specified")]
    InvalidVolume,

    #[error("Invalid price specified")]
    InvalidPrice,

    #[error("Invalid stop loss specified")]
    InvalidStopLoss,
}

impl ValidationError {
    pub fn status(&self) -> u16 {
        400
    }
}

/// Failures surfaced by the exchange gateway. The exchange reports errors as
/// bare message strings; classification into variants is by message content.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Exchange transport failure: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Exchange rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::Transport(_) => 502,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::NotFound(_) => 404,
            GatewayError::Rejected(_) => 422,
        }
    }
}

/// Everything that can go wrong in one account's placement pipeline.
/// Captured into that account's `OrderResult`; never crosses the batch
/// boundary.
#[derive(Debug, Clone, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Entry and stop price leave no stop distance")]
    DegenerateStop,

    #[error("Account holds no {currency} balance")]
    MissingBalance { currency: String },

    #[error("Unparseable {currency} balance: {raw}")]
    BadBalance { currency: String, raw: String },
}

/// Terminal failures of a streaming monitor session. Polling tick errors are
/// logged and retried by the next tick, so they never take this shape.
#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("Price feed subscription failed: {0}")]
    Subscribe(String),

    #[error("Price feed connection lost before the exit condition fired")]
    FeedClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_exchange_wording() {
        assert_eq!(
            ValidationError::InvalidVolume.to_string(),
            "Invalid volume specified"
        );
        assert_eq!(ValidationError::InvalidVolume.status(), 400);
    }

    #[test]
    fn gateway_status_codes() {
        assert_eq!(GatewayError::Transport("t".into()).status(), 502);
        assert_eq!(GatewayError::Unauthorized("u".into()).status(), 401);
        assert_eq!(GatewayError::NotFound("n".into()).status(), 404);
        assert_eq!(GatewayError::Rejected("r".into()).status(), 422);
    }

    #[test]
    fn placement_error_wraps_validation_transparently() {
        let err: PlacementError = ValidationError::InvalidPrice.into();
        assert_eq!(err.to_string(), "Invalid price specified");
    }
}
