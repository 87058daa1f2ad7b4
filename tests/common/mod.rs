use async_trait::async_trait;
use loyalty_engine::domain::luhn;
use loyalty_engine::domain::order::OrderId;
use loyalty_engine::domain::ports::{AccrualApi, AccrualReply, AccrualStatus, SharedRepository};
use loyalty_engine::error::{LoyaltyError, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted accrual-service response.
#[allow(dead_code)]
pub enum AccrualOutcome {
    Reply(AccrualStatus, Option<Decimal>),
    NotRegistered,
    RateLimited(Duration),
    Failure,
}

/// Accrual-service stand-in replaying scripted outcomes per order.
///
/// Unscripted (or exhausted) orders answer "not registered", mirroring the
/// real service's 204. Every query is recorded for assertions.
#[derive(Default)]
pub struct ScriptedAccrual {
    scripts: Mutex<HashMap<String, VecDeque<AccrualOutcome>>>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedAccrual {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn script(&self, order_id: &str, outcome: AccrualOutcome) {
        self.scripts
            .lock()
            .await
            .entry(order_id.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub async fn calls_for(&self, order_id: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|id| id.as_str() == order_id)
            .count()
    }
}

#[async_trait]
impl AccrualApi for ScriptedAccrual {
    async fn order_status(&self, order_id: &OrderId) -> Result<AccrualReply> {
        self.calls.lock().await.push(order_id.to_string());

        let outcome = self
            .scripts
            .lock()
            .await
            .get_mut(order_id.as_str())
            .and_then(|queue| queue.pop_front());

        match outcome {
            Some(AccrualOutcome::Reply(status, accrual)) => Ok(AccrualReply {
                order: order_id.to_string(),
                status,
                accrual,
            }),
            Some(AccrualOutcome::NotRegistered) | None => Err(LoyaltyError::OrderNotRegistered),
            Some(AccrualOutcome::RateLimited(delay)) => {
                Err(LoyaltyError::TooManyRequests(delay))
            }
            Some(AccrualOutcome::Failure) => {
                Err(LoyaltyError::Accrual("scripted failure".to_string()))
            }
        }
    }
}

/// Generates a distinct Luhn-valid order id from a seed.
#[allow(dead_code)]
pub fn luhn_id(seed: u64) -> String {
    let base = format!("{seed:010}");
    for check in 0..10 {
        let candidate = format!("{base}{check}");
        if luhn::is_valid(&candidate) {
            return candidate;
        }
    }
    unreachable!("one of ten check digits always satisfies the checksum")
}

/// Registers a user and uploads an order for them.
#[allow(dead_code)]
pub async fn seed_user_order(repo: &SharedRepository, login: &str, order_id: &str) -> OrderId {
    // Seeding the same user twice across helpers is fine.
    let _ = repo.create_user(login).await;
    let id = OrderId::new(order_id).expect("seed order id must be Luhn-valid");
    repo.save_order(login, &id).await.expect("seed order");
    id
}
