use crate::domain::balance::{Cents, UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

/// Storage abstraction consumed by the engine.
///
/// Implementations are interchangeable (in-memory, RocksDB) and selected at
/// startup. `set_balance` and `user_withdraw` must be atomic: either every
/// affected row changes or none does.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Registers a user and opens their balance at zero.
    async fn create_user(&self, login: &str) -> Result<()>;

    /// Inserts a new order with status `New`. Fails with `Duplicate` when the
    /// id is already known.
    async fn save_order(&self, login: &str, order_id: &OrderId) -> Result<()>;

    /// Login of the user who uploaded the order, or `NotFound`.
    async fn get_order_login(&self, order_id: &OrderId) -> Result<String>;

    /// All orders of a user, oldest first.
    async fn get_user_orders(&self, login: &str) -> Result<Vec<Order>>;

    /// Orders still awaiting a verdict (`New` or `Processing`), oldest
    /// created first, at most `limit` of them.
    async fn get_pending_orders(&self, limit: usize) -> Result<Vec<Order>>;

    /// Persists a status change without touching any balance. No-op when the
    /// order is already terminal.
    async fn update_order(&self, order_id: &OrderId, status: OrderStatus) -> Result<()>;

    /// Atomically sets the order's status and accrued amount and credits the
    /// owning user's balance. No-op when the order is already terminal, so a
    /// retried pass can never credit twice.
    async fn set_balance(&self, order_id: &OrderId, status: OrderStatus, amount: Cents)
    -> Result<()>;

    async fn get_user_balance(&self, login: &str) -> Result<UserBalance>;

    /// Atomically debits the balance and records the withdrawal. Fails whole
    /// with `InsufficientFunds` or `Duplicate` without any effect.
    async fn user_withdraw(&self, login: &str, withdrawal: Withdrawal) -> Result<()>;

    /// All withdrawals of a user, oldest first.
    async fn get_user_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>>;
}

pub type SharedRepository = Arc<dyn Repository>;

/// Verdict states reported by the external accrual service.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl AccrualStatus {
    /// Maps the service's verdict onto our order lifecycle. `Registered`
    /// means the evaluation has merely been queued, which is still
    /// `Processing` from the user's point of view.
    pub fn as_order_status(self) -> OrderStatus {
        match self {
            Self::Registered | Self::Processing => OrderStatus::Processing,
            Self::Invalid => OrderStatus::Invalid,
            Self::Processed => OrderStatus::Processed,
        }
    }
}

/// Successful accrual-service response body.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct AccrualReply {
    pub order: String,
    pub status: AccrualStatus,
    /// Fractional reward amount, present only once evaluation finished.
    pub accrual: Option<Decimal>,
}

/// Adapter to the external accrual service; a single query operation.
///
/// The distinguished outcomes `OrderNotRegistered` and `TooManyRequests`
/// travel as errors so that callers can pattern-match them apart from real
/// failures.
#[async_trait]
pub trait AccrualApi: Send + Sync {
    async fn order_status(&self, order_id: &OrderId) -> Result<AccrualReply>;
}

pub type SharedAccrualApi = Arc<dyn AccrualApi>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reply_deserialization() {
        let body = r#"{"order":"79927398713","status":"PROCESSED","accrual":50.0}"#;
        let reply: AccrualReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.status, AccrualStatus::Processed);
        assert_eq!(reply.accrual, Some(dec!(50.0)));
    }

    #[test]
    fn test_reply_without_accrual() {
        let body = r#"{"order":"79927398713","status":"REGISTERED"}"#;
        let reply: AccrualReply = serde_json::from_str(body).unwrap();
        assert_eq!(reply.status, AccrualStatus::Registered);
        assert_eq!(reply.accrual, None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AccrualStatus::Registered.as_order_status(),
            OrderStatus::Processing
        );
        assert_eq!(
            AccrualStatus::Processing.as_order_status(),
            OrderStatus::Processing
        );
        assert_eq!(
            AccrualStatus::Invalid.as_order_status(),
            OrderStatus::Invalid
        );
        assert_eq!(
            AccrualStatus::Processed.as_order_status(),
            OrderStatus::Processed
        );
    }
}
