use crate::domain::balance::{Cents, Withdrawal};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::SharedRepository;
use crate::error::{LoyaltyError, Result};
use chrono::Utc;
use rust_decimal::Decimal;

/// Boundary operations of the loyalty service.
///
/// The HTTP front-end lives elsewhere; this is what it calls into. All
/// monetary amounts cross this boundary as decimals and are stored as minor
/// units.
pub struct LoyaltyEngine {
    repo: SharedRepository,
}

/// Major-unit view of a user's balance for API responses.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BalanceSummary {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl LoyaltyEngine {
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }

    /// Registers a user with a zero balance.
    pub async fn register_user(&self, login: &str) -> Result<()> {
        self.repo.create_user(login).await
    }

    /// Accepts an order number for reward evaluation.
    ///
    /// Resubmission by the same user and submission of an order owned by
    /// someone else are reported as distinct conditions, as the front-end
    /// answers them differently.
    pub async fn submit_order(&self, login: &str, order_id: &str) -> Result<()> {
        let order_id = OrderId::new(order_id)?;

        match self.repo.save_order(login, &order_id).await {
            Ok(()) => Ok(()),
            Err(LoyaltyError::Duplicate) => {
                let owner = self.repo.get_order_login(&order_id).await?;
                if owner == login {
                    Err(LoyaltyError::OrderAlreadyUploaded)
                } else {
                    Err(LoyaltyError::OrderOwnedByAnotherUser)
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn user_orders(&self, login: &str) -> Result<Vec<Order>> {
        self.repo.get_user_orders(login).await
    }

    pub async fn user_balance(&self, login: &str) -> Result<BalanceSummary> {
        let balance = self.repo.get_user_balance(login).await?;
        Ok(BalanceSummary {
            current: balance.current.to_decimal(),
            withdrawn: balance.withdrawn.to_decimal(),
        })
    }

    /// Spends reward points against a (new) order number.
    pub async fn user_withdraw(&self, login: &str, order_id: &str, sum: Decimal) -> Result<()> {
        let order_id = OrderId::new(order_id)?;
        if sum <= Decimal::ZERO {
            return Err(LoyaltyError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }

        let withdrawal = Withdrawal {
            order_id,
            amount: Cents::from_decimal(sum)?,
            processed_at: Utc::now(),
        };
        self.repo.user_withdraw(login, withdrawal).await
    }

    pub async fn user_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>> {
        self.repo.get_user_withdrawals(login).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> LoyaltyEngine {
        LoyaltyEngine::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_submit_order_validates_checksum() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();

        assert!(matches!(
            engine.submit_order("alice", "1234567812345678").await,
            Err(LoyaltyError::Validation(_))
        ));
        engine.submit_order("alice", "79927398713").await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_order_duplicate_same_user() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();
        engine.submit_order("alice", "79927398713").await.unwrap();

        assert!(matches!(
            engine.submit_order("alice", "79927398713").await,
            Err(LoyaltyError::OrderAlreadyUploaded)
        ));
    }

    #[tokio::test]
    async fn test_submit_order_owned_by_another_user() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();
        engine.register_user("bob").await.unwrap();
        engine.submit_order("alice", "79927398713").await.unwrap();

        assert!(matches!(
            engine.submit_order("bob", "79927398713").await,
            Err(LoyaltyError::OrderOwnedByAnotherUser)
        ));
    }

    #[tokio::test]
    async fn test_balance_summary_in_major_units() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();
        engine.submit_order("alice", "79927398713").await.unwrap();
        engine
            .repo
            .set_balance(
                &OrderId::new("79927398713").unwrap(),
                crate::domain::order::OrderStatus::Processed,
                Cents(5000),
            )
            .await
            .unwrap();

        let summary = engine.user_balance("alice").await.unwrap();
        assert_eq!(summary.current, dec!(50));
        assert_eq!(summary.withdrawn, dec!(0));
    }

    #[tokio::test]
    async fn test_withdraw_rejects_invalid_id_and_amount() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();

        assert!(matches!(
            engine.user_withdraw("alice", "123", dec!(1)).await,
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            engine.user_withdraw("alice", "79927398713", dec!(0)).await,
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_and_history() {
        let engine = engine();
        engine.register_user("alice").await.unwrap();
        engine.submit_order("alice", "79927398713").await.unwrap();
        engine
            .repo
            .set_balance(
                &OrderId::new("79927398713").unwrap(),
                crate::domain::order::OrderStatus::Processed,
                Cents(5000),
            )
            .await
            .unwrap();

        engine
            .user_withdraw("alice", "2377225624", dec!(20))
            .await
            .unwrap();

        let summary = engine.user_balance("alice").await.unwrap();
        assert_eq!(summary.current, dec!(30));
        assert_eq!(summary.withdrawn, dec!(20));

        let history = engine.user_withdrawals("alice").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, Cents(2000));
    }
}
