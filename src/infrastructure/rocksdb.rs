use crate::domain::balance::{Cents, UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::ports::Repository;
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for user balances, keyed by login.
pub const CF_BALANCES: &str = "balances";
/// Column Family for orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for withdrawals, keyed by the withdrawal's order id.
pub const CF_WITHDRAWALS: &str = "withdrawals";

/// A persistent repository backed by RocksDB.
///
/// Entities live in separate Column Families as JSON values. RocksDB gives
/// no cross-key transactions, so every read-modify-write section runs under
/// a store-level mutex and commits through a single `WriteBatch`; either all
/// puts of an operation land or none do.
///
/// `Clone` shares the underlying `Arc<DB>` and the write lock.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

#[derive(Serialize, Deserialize)]
struct WithdrawalRecord {
    login: String,
    withdrawal: Withdrawal,
}

fn internal<E: std::error::Error + Send + Sync + 'static>(e: E) -> LoyaltyError {
    LoyaltyError::Internal(Box::new(e))
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Options::default()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_WITHDRAWALS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LoyaltyError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, cf: &str, key: &str) -> Result<Option<T>> {
        let handle = self.cf(cf)?;
        match self.db.get_cf(handle, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(internal)?)),
            None => Ok(None),
        }
    }

    fn all_orders(&self) -> Result<Vec<Order>> {
        let handle = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice(&value).map_err(internal)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl Repository for RocksDbStore {
    async fn create_user(&self, login: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.get_json::<UserBalance>(CF_BALANCES, login)?.is_some() {
            return Err(LoyaltyError::Duplicate);
        }

        let handle = self.cf(CF_BALANCES)?;
        let value = serde_json::to_vec(&UserBalance::default()).map_err(internal)?;
        self.db.put_cf(handle, login.as_bytes(), value)?;
        Ok(())
    }

    async fn save_order(&self, login: &str, order_id: &OrderId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self
            .get_json::<Order>(CF_ORDERS, order_id.as_str())?
            .is_some()
        {
            return Err(LoyaltyError::Duplicate);
        }

        let order = Order::new(order_id.clone(), login);
        let handle = self.cf(CF_ORDERS)?;
        let value = serde_json::to_vec(&order).map_err(internal)?;
        self.db.put_cf(handle, order_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    async fn get_order_login(&self, order_id: &OrderId) -> Result<String> {
        self.get_json::<Order>(CF_ORDERS, order_id.as_str())?
            .map(|order| order.login)
            .ok_or(LoyaltyError::NotFound)
    }

    async fn get_user_orders(&self, login: &str) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .all_orders()?
            .into_iter()
            .filter(|order| order.login == login)
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn get_pending_orders(&self, limit: usize) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .all_orders()?
            .into_iter()
            .filter(|order| order.status.is_pending())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders.truncate(limit);
        Ok(orders)
    }

    async fn update_order(&self, order_id: &OrderId, status: OrderStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut order = self
            .get_json::<Order>(CF_ORDERS, order_id.as_str())?
            .ok_or(LoyaltyError::NotFound)?;
        if order.status.is_terminal() {
            return Ok(());
        }
        order.status = status;

        let handle = self.cf(CF_ORDERS)?;
        let value = serde_json::to_vec(&order).map_err(internal)?;
        self.db.put_cf(handle, order_id.as_str().as_bytes(), value)?;
        Ok(())
    }

    async fn set_balance(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
        amount: Cents,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut order = self
            .get_json::<Order>(CF_ORDERS, order_id.as_str())?
            .ok_or(LoyaltyError::NotFound)?;
        if order.status.is_terminal() {
            return Ok(());
        }
        order.status = status;
        order.accrual = amount;

        let mut batch = WriteBatch::default();
        let orders = self.cf(CF_ORDERS)?;
        batch.put_cf(
            orders,
            order_id.as_str().as_bytes(),
            serde_json::to_vec(&order).map_err(internal)?,
        );

        if status == OrderStatus::Processed {
            let mut balance = self
                .get_json::<UserBalance>(CF_BALANCES, &order.login)?
                .ok_or(LoyaltyError::NotFound)?;
            balance.credit(amount);

            let balances = self.cf(CF_BALANCES)?;
            batch.put_cf(
                balances,
                order.login.as_bytes(),
                serde_json::to_vec(&balance).map_err(internal)?,
            );
        }

        self.db.write(batch)?;
        Ok(())
    }

    async fn get_user_balance(&self, login: &str) -> Result<UserBalance> {
        self.get_json::<UserBalance>(CF_BALANCES, login)?
            .ok_or(LoyaltyError::NotFound)
    }

    async fn user_withdraw(&self, login: &str, withdrawal: Withdrawal) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self
            .get_json::<WithdrawalRecord>(CF_WITHDRAWALS, withdrawal.order_id.as_str())?
            .is_some()
        {
            return Err(LoyaltyError::Duplicate);
        }

        let mut balance = self
            .get_json::<UserBalance>(CF_BALANCES, login)?
            .ok_or(LoyaltyError::NotFound)?;
        balance.withdraw(withdrawal.amount)?;

        let mut batch = WriteBatch::default();
        let balances = self.cf(CF_BALANCES)?;
        batch.put_cf(
            balances,
            login.as_bytes(),
            serde_json::to_vec(&balance).map_err(internal)?,
        );

        let record = WithdrawalRecord {
            login: login.to_string(),
            withdrawal,
        };
        let withdrawals = self.cf(CF_WITHDRAWALS)?;
        batch.put_cf(
            withdrawals,
            record.withdrawal.order_id.as_str().as_bytes(),
            serde_json::to_vec(&record).map_err(internal)?,
        );

        self.db.write(batch)?;
        Ok(())
    }

    async fn get_user_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>> {
        let handle = self.cf(CF_WITHDRAWALS)?;
        let mut withdrawals = Vec::new();
        for item in self.db.iterator_cf(handle, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let record: WithdrawalRecord = serde_json::from_slice(&value).map_err(internal)?;
            if record.login == login {
                withdrawals.push(record.withdrawal);
            }
        }
        withdrawals.sort_by_key(|withdrawal| withdrawal.processed_at);
        Ok(withdrawals)
    }
}
