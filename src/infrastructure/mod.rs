//! Adapters behind the domain ports: storage backends and the HTTP client
//! for the external accrual service.

pub mod accrual;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
