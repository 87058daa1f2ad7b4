use crate::domain::order::OrderId;
use crate::domain::ports::{AccrualApi, AccrualReply};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Used when a 429 arrives without a parseable Retry-After header; the
/// backpressure signal still counts even if the delay is missing.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Rate-limited client for the external accrual service.
///
/// All clones share one permit pool and one resume-not-before deadline, so
/// the concurrency limit and the backpressure wait are process-wide no matter
/// how many workers hold a handle. The deadline is written by whichever
/// caller receives a 429 and read by every subsequent caller, hence the
/// mutex rather than a plain field.
#[derive(Clone)]
pub struct AccrualClient {
    http: reqwest::Client,
    base_url: String,
    permits: Arc<Semaphore>,
    resume_at: Arc<Mutex<Option<Instant>>>,
    shutdown: CancellationToken,
}

impl AccrualClient {
    /// Creates a client for `base_url` (e.g. `http://host:port/api/orders`)
    /// allowing at most `request_limit` in-flight requests.
    pub fn new(base_url: impl Into<String>, request_limit: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(request_limit)),
            resume_at: Arc::new(Mutex::new(None)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Ties the client's backoff waits to `shutdown`, so a rate-limit delay
    /// (which can run to a minute) does not outlive a shutdown request.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Sleeps out a previously recorded rate-limit deadline, then clears it.
    /// Aborts with `Cancelled` when shutdown fires mid-wait.
    ///
    /// The lock is not held across the sleep; whoever wakes first clears the
    /// deadline for everyone.
    async fn wait_for_backoff(&self) -> Result<()> {
        let deadline = *self.resume_at.lock().await;
        let Some(deadline) = deadline else {
            return Ok(());
        };

        if deadline > Instant::now() {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(LoyaltyError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }

        let mut resume_at = self.resume_at.lock().await;
        if resume_at.is_some_and(|at| at <= Instant::now()) {
            *resume_at = None;
        }
        Ok(())
    }

    async fn record_backoff(&self, delay: Duration) {
        let mut resume_at = self.resume_at.lock().await;
        *resume_at = Some(Instant::now() + delay);
    }
}

/// Parses the whole-seconds `Retry-After` value of a 429 response.
fn retry_after_delay(header: Option<&str>) -> Duration {
    header
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[async_trait]
impl AccrualApi for AccrualClient {
    async fn order_status(&self, order_id: &OrderId) -> Result<AccrualReply> {
        self.wait_for_backoff().await?;

        // RAII permit: released on every exit path, including errors, so the
        // pool can never leak a slot.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LoyaltyError::Internal(Box::new(e)))?;

        let url = format!("{}/{}", self.base_url, order_id);
        let response = self.http.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<AccrualReply>().await?),
            StatusCode::NO_CONTENT => Err(LoyaltyError::OrderNotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                let delay = retry_after_delay(
                    response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok()),
                );
                self.record_backoff(delay).await;
                Err(LoyaltyError::TooManyRequests(delay))
            }
            status => Err(LoyaltyError::Accrual(format!(
                "unexpected status {status} for order {order_id}"
            ))),
        }
    }
}
