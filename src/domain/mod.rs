//! Domain layer: entities, value objects and the ports the engine consumes.

pub mod balance;
pub mod luhn;
pub mod order;
pub mod ports;
