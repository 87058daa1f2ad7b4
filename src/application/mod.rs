//! Application layer orchestrating the domain over the ports.
//!
//! `engine` holds the operations the surrounding API consumes (order
//! submission, balances, withdrawals); `reconciler` is the background loop
//! that drives pending orders through the accrual service.

pub mod engine;
pub mod reconciler;
