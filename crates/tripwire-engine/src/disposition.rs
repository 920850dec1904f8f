//! Classification of one placement attempt.

use crate::config::EngineConfig;
use tripwire_exchange::{ExchangeError, ExchangeResult, PlaceOrderResponse};
use tripwire_telemetry::PlacementOutcome;

/// What the engine does with a processing order after one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Venue took the order. The id may be absent if the reply omitted it.
    Accepted { order_id: Option<String> },
    /// Busy or unreachable; eligible for a damped retry.
    Damp { reason: String },
    InsufficientBalance { code: i64 },
    /// Any other business code.
    Rejected { code: i64, message: String },
    AuthFailed(String),
    /// Outcome unknown (unreadable reply or closed connector). The order stays
    /// PROCESSING so it is never submitted twice.
    Unresolved(String),
}

impl Disposition {
    pub fn classify(config: &EngineConfig, result: &ExchangeResult<PlaceOrderResponse>) -> Self {
        match result {
            Ok(response) if response.is_accepted() => Self::Accepted {
                order_id: response.order_id.clone(),
            },
            Ok(response) if config.damping_codes.contains(&response.code) => Self::Damp {
                reason: format!("code {}", response.code),
            },
            Ok(response) if config.insufficient_balance_codes.contains(&response.code) => {
                Self::InsufficientBalance {
                    code: response.code,
                }
            }
            Ok(response) => Self::Rejected {
                code: response.code,
                message: response.message.clone().unwrap_or_default(),
            },
            Err(ExchangeError::Auth(msg)) => Self::AuthFailed(msg.clone()),
            Err(e) if e.is_transient() => Self::Damp {
                reason: e.to_string(),
            },
            Err(e) => Self::Unresolved(e.to_string()),
        }
    }

    pub fn outcome(&self) -> PlacementOutcome {
        match self {
            Self::Accepted { .. } => PlacementOutcome::Accepted,
            Self::Damp { .. } => PlacementOutcome::Damped,
            Self::InsufficientBalance { .. } => PlacementOutcome::InsufficientBalance,
            Self::Rejected { .. } | Self::Unresolved(_) => PlacementOutcome::Rejected,
            Self::AuthFailed(_) => PlacementOutcome::AuthFailed,
        }
    }
}
