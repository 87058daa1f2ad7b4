use crate::domain::balance::Cents;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{AccrualApi, Repository, SharedAccrualApi, SharedRepository};
use crate::error::{LoyaltyError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Concurrent workers per reconciliation pass.
    pub workers: usize,
    /// Maximum pending orders pulled per pass.
    pub batch_limit: usize,
    /// Sleep between passes when there was nothing to do.
    pub idle_delay: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            batch_limit: 10,
            idle_delay: Duration::from_secs(1),
        }
    }
}

/// Background reconciliation loop.
///
/// Repeatedly pulls a batch of pending orders from the repository and fans
/// it out to a bounded set of workers querying the accrual service. Each
/// pass is synchronous with respect to its own batch: all workers join
/// before the next batch starts, so successive passes always observe the
/// repository's current state.
pub struct Reconciler {
    repo: SharedRepository,
    accrual: SharedAccrualApi,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(repo: SharedRepository, accrual: SharedAccrualApi, config: ReconcilerConfig) -> Self {
        Self {
            repo,
            accrual,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// The token is checked before every pass and before every order within
    /// a pass; a cancellation lets the in-flight requests complete but takes
    /// no new work. No error in here is fatal: storage hiccups are logged
    /// and retried on the next pass.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!("reconciliation loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let processed = match self.run_pass(&shutdown).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!("reconciliation pass failed: {e}");
                    0
                }
            };

            if processed == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.idle_delay) => {}
                }
            }
        }

        tracing::info!("reconciliation loop stopped");
    }

    /// Executes a single pass and returns how many orders it dispatched.
    ///
    /// The batch is preloaded into a queue drained by `workers` concurrent
    /// tasks. A worker that hits the accrual service's rate limit stops
    /// taking further work; the others keep draining, so backpressure is
    /// honored per worker without aborting the pass. Workers also stop
    /// between orders once `shutdown` fires. Rate-limit and cancellation
    /// errors are suppressed from the log, everything else is reported.
    pub async fn run_pass(&self, shutdown: &CancellationToken) -> Result<usize> {
        let orders = self.repo.get_pending_orders(self.config.batch_limit).await?;
        if orders.is_empty() {
            return Ok(0);
        }
        let count = orders.len();

        let (queue_tx, queue_rx) = mpsc::channel(count);
        for order in orders {
            // Capacity equals the batch size and the receiver is alive, so
            // this never blocks or fails.
            if queue_tx.send(order).await.is_err() {
                break;
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let mut workers = JoinSet::new();
        for _ in 0..self.config.workers.max(1) {
            let queue = queue.clone();
            let repo = self.repo.clone();
            let accrual = self.accrual.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move { worker_loop(queue, repo, accrual, shutdown).await });
        }

        let mut errors = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_errors) => errors.extend(worker_errors),
                Err(e) => tracing::error!("reconciliation worker panicked: {e}"),
            }
        }

        for error in &errors {
            if !error.is_backpressure() && !matches!(error, LoyaltyError::Cancelled) {
                tracing::error!("can't process order: {error}");
            }
        }

        Ok(count)
    }
}

async fn worker_loop(
    queue: Arc<Mutex<mpsc::Receiver<Order>>>,
    repo: SharedRepository,
    accrual: SharedAccrualApi,
    shutdown: CancellationToken,
) -> Vec<LoyaltyError> {
    let mut errors = Vec::new();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        // The queue was fully loaded before the workers started and the
        // sender is gone, so an empty queue means the batch is drained;
        // try_recv keeps the lock from being held across an await.
        let order = queue.lock().await.try_recv().ok();
        let Some(order) = order else {
            break;
        };

        if let Err(e) = process_order(&*repo, &*accrual, &order).await {
            let backpressure = e.is_backpressure();
            errors.push(e);
            if backpressure {
                // Honor the rate limit: stop taking work this pass and
                // leave the rest of the queue to the other workers.
                break;
            }
        }
    }

    errors
}

/// Advances a single order's lifecycle from the accrual service's verdict.
///
/// Every status change is persisted; the balance is credited only on the
/// transition into `Processed`, with the fractional reward truncated to
/// minor units.
async fn process_order(
    repo: &dyn Repository,
    accrual: &dyn AccrualApi,
    order: &Order,
) -> Result<()> {
    // A stale batch entry may already be settled; leave it alone.
    if order.status.is_terminal() {
        return Ok(());
    }

    let reply = match accrual.order_status(&order.id).await {
        Ok(reply) => reply,
        // Not registered upstream yet: nothing to do until a later pass.
        Err(LoyaltyError::OrderNotRegistered) => return Ok(()),
        Err(e) => return Err(e),
    };

    match reply.status.as_order_status() {
        OrderStatus::Processed => {
            let amount = Cents::from_decimal(reply.accrual.unwrap_or_default())?;
            repo.set_balance(&order.id, OrderStatus::Processed, amount)
                .await
        }
        status => repo.update_order(&order.id, status).await,
    }
}
