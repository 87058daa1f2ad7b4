use crate::domain::balance::{Cents, UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::Repository;
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory repository.
///
/// A single `RwLock` guards all tables, so the multi-row operations
/// (`set_balance`, `user_withdraw`) are atomic without any further
/// coordination. Ideal for tests and for running the engine without a
/// persistent backend.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    /// Login -> balance; a row exists for every registered user.
    balances: HashMap<String, UserBalance>,
    /// Order id -> order.
    orders: HashMap<String, Order>,
    /// Withdrawal order id -> (login, record).
    withdrawals: HashMap<String, (String, Withdrawal)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn create_user(&self, login: &str) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.balances.contains_key(login) {
            return Err(LoyaltyError::Duplicate);
        }
        tables
            .balances
            .insert(login.to_string(), UserBalance::default());
        Ok(())
    }

    async fn save_order(&self, login: &str, order_id: &OrderId) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.orders.contains_key(order_id.as_str()) {
            return Err(LoyaltyError::Duplicate);
        }
        tables.orders.insert(
            order_id.as_str().to_string(),
            Order::new(order_id.clone(), login),
        );
        Ok(())
    }

    async fn get_order_login(&self, order_id: &OrderId) -> Result<String> {
        let tables = self.inner.read().await;
        tables
            .orders
            .get(order_id.as_str())
            .map(|order| order.login.clone())
            .ok_or(LoyaltyError::NotFound)
    }

    async fn get_user_orders(&self, login: &str) -> Result<Vec<Order>> {
        let tables = self.inner.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.login == login)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn get_pending_orders(&self, limit: usize) -> Result<Vec<Order>> {
        let tables = self.inner.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| order.status.is_pending())
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn update_order(&self, order_id: &OrderId, status: OrderStatus) -> Result<()> {
        let mut tables = self.inner.write().await;
        let order = tables
            .orders
            .get_mut(order_id.as_str())
            .ok_or(LoyaltyError::NotFound)?;
        if order.status.is_terminal() {
            return Ok(());
        }
        order.status = status;
        Ok(())
    }

    async fn set_balance(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        amount: Cents,
    ) -> Result<()> {
        let mut tables = self.inner.write().await;
        let Tables {
            balances, orders, ..
        } = &mut *tables;

        let order = orders
            .get_mut(order_id.as_str())
            .ok_or(LoyaltyError::NotFound)?;
        // Terminal orders are settled; a stale batch entry must not
        // re-credit.
        if order.status.is_terminal() {
            return Ok(());
        }

        if status == OrderStatus::Processed {
            let balance = balances
                .get_mut(&order.login)
                .ok_or(LoyaltyError::NotFound)?;
            balance.credit(amount);
        }
        order.status = status;
        order.accrual = amount;
        Ok(())
    }

    async fn get_user_balance(&self, login: &str) -> Result<UserBalance> {
        let tables = self.inner.read().await;
        tables
            .balances
            .get(login)
            .copied()
            .ok_or(LoyaltyError::NotFound)
    }

    async fn user_withdraw(&self, login: &str, withdrawal: Withdrawal) -> Result<()> {
        let mut tables = self.inner.write().await;
        if tables.withdrawals.contains_key(withdrawal.order_id.as_str()) {
            return Err(LoyaltyError::Duplicate);
        }

        let balance = tables
            .balances
            .get_mut(login)
            .ok_or(LoyaltyError::NotFound)?;
        balance.withdraw(withdrawal.amount)?;

        tables.withdrawals.insert(
            withdrawal.order_id.as_str().to_string(),
            (login.to_string(), withdrawal),
        );
        Ok(())
    }

    async fn get_user_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>> {
        let tables = self.inner.read().await;
        let mut withdrawals: Vec<Withdrawal> = tables
            .withdrawals
            .values()
            .filter(|(owner, _)| owner == login)
            .map(|(_, withdrawal)| withdrawal.clone())
            .collect();
        withdrawals.sort_by_key(|withdrawal| withdrawal.processed_at);
        Ok(withdrawals)
    }
}
