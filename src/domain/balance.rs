use crate::domain::order::OrderId;
use crate::error::LoyaltyError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A monetary amount in minor currency units (e.g. cents).
///
/// Storage and arithmetic stay on integers; fractional values only appear at
/// the accrual-service boundary and are truncated on conversion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Cents(pub i64);

const MINOR_UNITS_PER_MAJOR: i64 = 100;

impl Cents {
    pub const ZERO: Self = Self(0);

    /// Converts a fractional major-unit amount to minor units, truncating
    /// anything beyond two decimal places. Amounts whose minor-unit value
    /// does not fit an `i64` are rejected rather than mangled.
    pub fn from_decimal(amount: Decimal) -> Result<Self, LoyaltyError> {
        amount
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|minor| minor.trunc().to_i64())
            .map(Self)
            .ok_or_else(|| LoyaltyError::Validation(format!("amount out of range: {amount}")))
    }

    /// The major-unit view used by the boundary API responses.
    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(MINOR_UNITS_PER_MAJOR)
    }
}

impl Add for Cents {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Cents {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Cents {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// A user's reward balance.
///
/// `current` is the sum of credited order amounts minus everything withdrawn;
/// it never goes negative. `withdrawn` is the lifetime total of debits.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct UserBalance {
    pub current: Cents,
    pub withdrawn: Cents,
}

impl UserBalance {
    /// Credits a completed order's reward.
    pub fn credit(&mut self, amount: Cents) {
        self.current += amount;
    }

    /// Debits the balance, rejecting the whole operation when funds are
    /// insufficient.
    pub fn withdraw(&mut self, amount: Cents) -> Result<(), LoyaltyError> {
        if self.current < amount {
            return Err(LoyaltyError::InsufficientFunds);
        }
        self.current -= amount;
        self.withdrawn += amount;
        Ok(())
    }
}

/// A completed debit against a user's balance.
///
/// The order id names the purchase the points were spent on and is validated
/// like any other order identifier.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Withdrawal {
    pub order_id: OrderId,
    pub amount: Cents,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cents_from_decimal_truncates() {
        assert_eq!(Cents::from_decimal(dec!(50.0)).unwrap(), Cents(5000));
        assert_eq!(Cents::from_decimal(dec!(49.999)).unwrap(), Cents(4999));
        assert_eq!(Cents::from_decimal(dec!(0.009)).unwrap(), Cents(0));
    }

    #[test]
    fn test_cents_from_decimal_rejects_out_of_range() {
        assert!(matches!(
            Cents::from_decimal(Decimal::MAX),
            Err(LoyaltyError::Validation(_))
        ));
        assert!(matches!(
            Cents::from_decimal(Decimal::from(i64::MAX)),
            Err(LoyaltyError::Validation(_))
        ));
    }

    #[test]
    fn test_cents_to_decimal() {
        assert_eq!(Cents(5000).to_decimal(), dec!(50));
        assert_eq!(Cents(4999).to_decimal(), dec!(49.99));
    }

    #[test]
    fn test_credit_accumulates() {
        let mut balance = UserBalance::default();
        balance.credit(Cents(100));
        balance.credit(Cents(250));
        assert_eq!(balance.current, Cents(350));
        assert_eq!(balance.withdrawn, Cents::ZERO);
    }

    #[test]
    fn test_withdraw_insufficient_leaves_balance_untouched() {
        let mut balance = UserBalance {
            current: Cents(100),
            withdrawn: Cents::ZERO,
        };
        let result = balance.withdraw(Cents(101));
        assert!(matches!(result, Err(LoyaltyError::InsufficientFunds)));
        assert_eq!(balance.current, Cents(100));
        assert_eq!(balance.withdrawn, Cents::ZERO);
    }

    #[test]
    fn test_withdraw_exact_balance() {
        let mut balance = UserBalance {
            current: Cents(100),
            withdrawn: Cents::ZERO,
        };
        balance.withdraw(Cents(100)).unwrap();
        assert_eq!(balance.current, Cents::ZERO);
        assert_eq!(balance.withdrawn, Cents(100));
    }
}
