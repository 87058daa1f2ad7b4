use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoyaltyError>;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("duplicate entry")]
    Duplicate,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("order already uploaded by this user")]
    OrderAlreadyUploaded,
    #[error("order already uploaded by another user")]
    OrderOwnedByAnotherUser,
    /// The accrual service has not registered the order yet (HTTP 204).
    /// Benign: the order is simply not ready, nothing to log.
    #[error("order not registered in accrual service")]
    OrderNotRegistered,
    /// Backpressure signal from the accrual service (HTTP 429).
    /// Carries the delay the service asked us to wait before retrying.
    #[error("accrual service rate limit, retry after {0:?}")]
    TooManyRequests(Duration),
    #[error("accrual service error: {0}")]
    Accrual(String),
    /// Shutdown was requested while the operation was waiting; the work is
    /// abandoned, not failed.
    #[error("operation cancelled by shutdown")]
    Cancelled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LoyaltyError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Internal(Box::new(e))
    }
}

impl LoyaltyError {
    /// True for the rate-limit condition a reconciliation worker treats as
    /// backpressure rather than reporting to the operator.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::TooManyRequests(_))
    }
}
