use crate::domain::balance::Cents;
use crate::domain::luhn;
use crate::error::LoyaltyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a submitted order.
///
/// Transitions are monotonic: `New -> Processing -> {Processed, Invalid}`.
/// `Processed` and `Invalid` are terminal; the user's balance is credited
/// only on the transition into `Processed`, and at most once per order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    /// Orders still awaiting a verdict from the accrual service.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

/// A Luhn-validated order identifier.
///
/// Construction is the only validation point; everything downstream can rely
/// on the id being a non-empty digit string with a correct checksum.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Result<Self, LoyaltyError> {
        let id = id.into();
        if luhn::is_valid(&id) {
            Ok(Self(id))
        } else {
            Err(LoyaltyError::Validation(format!("invalid order id: {id}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A purchase order submitted for reward evaluation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    /// Login of the owning user.
    pub login: String,
    pub status: OrderStatus,
    /// Reward amount in minor currency units; stays 0 until `Processed`.
    pub accrual: Cents,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: OrderId, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            status: OrderStatus::New,
            accrual: Cents::ZERO,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_validation() {
        assert!(OrderId::new("79927398713").is_ok());
        assert!(matches!(
            OrderId::new("1234567812345678"),
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            OrderId::new(""),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processed).unwrap(),
            "\"PROCESSED\""
        );
        let status: OrderStatus = serde_json::from_str("\"PROCESSING\"").unwrap();
        assert_eq!(status, OrderStatus::Processing);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Processed.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::New.is_pending());
        assert!(OrderStatus::Processing.is_pending());
    }

    #[test]
    fn test_new_order_defaults() {
        let id = OrderId::new("79927398713").unwrap();
        let order = Order::new(id, "alice");
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.accrual, Cents::ZERO);
    }
}
