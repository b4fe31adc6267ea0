//! Conversions between display amounts and native integer units.
//!
//! Ledger amounts are `u64` in each coin's smallest unit. Everything that
//! lands in a plan goes through `Decimal` so `0.1 SUI` becomes exactly
//! `100_000_000`, never `99_999_999`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::errors::EngineError;

/// `10^decimals` as a `Decimal`. Coin precision is capped at 18 by config
/// validation.
fn pow10(decimals: u8) -> Result<Decimal, EngineError> {
    10u64
        .checked_pow(decimals as u32)
        .map(Decimal::from)
        .ok_or_else(|| EngineError::invalid(format!("unsupported precision: {decimals}")))
}

/// Exact native-to-display conversion.
pub fn native_to_decimal(raw: u64, decimals: u8) -> Result<Decimal, EngineError> {
    Decimal::try_from_i128_with_scale(raw as i128, decimals as u32)
        .map_err(|e| EngineError::decode(format!("cannot scale {raw} by 10^{decimals}: {e}")))
}

/// Native units to a display `f64`. Used for discovered balances and oracle
/// prices, where the value feeds float risk math.
pub fn native_to_f64(raw: u64, decimals: u8) -> Result<f64, EngineError> {
    native_to_decimal(raw, decimals)?
        .to_f64()
        .ok_or_else(|| EngineError::decode(format!("{raw} is not representable as f64")))
}

/// Display amount to native units, truncating sub-unit dust.
pub fn to_native(amount: Decimal, decimals: u8) -> Result<u64, EngineError> {
    scaled(amount, decimals)?
        .trunc()
        .to_u64()
        .ok_or_else(|| EngineError::invalid(format!("amount {amount} out of range")))
}

/// Display amount to native units, rounding any fraction up.
pub fn to_native_ceil(amount: Decimal, decimals: u8) -> Result<u64, EngineError> {
    scaled(amount, decimals)?
        .ceil()
        .to_u64()
        .ok_or_else(|| EngineError::invalid(format!("amount {amount} out of range")))
}

fn scaled(amount: Decimal, decimals: u8) -> Result<Decimal, EngineError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(EngineError::invalid(format!("negative amount: {amount}")));
    }
    amount
        .checked_mul(pow10(decimals)?)
        .ok_or_else(|| EngineError::invalid(format!("amount {amount} overflows")))
}

/// Finite `f64` to `Decimal`.
pub fn decimal_from_f64(value: f64) -> Result<Decimal, EngineError> {
    if !value.is_finite() {
        return Err(EngineError::invalid(format!("non-finite amount: {value}")));
    }
    Decimal::from_f64(value).ok_or_else(|| EngineError::invalid(format!("amount {value} out of range")))
}

/// Round `quantity` down to a multiple of `increment`.
pub fn floor_to_increment(quantity: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return quantity;
    }
    (quantity / increment).floor() * increment
}

/// Round `quantity` up to a multiple of `increment`.
pub fn ceil_to_increment(quantity: Decimal, increment: Decimal) -> Decimal {
    if increment <= Decimal::ZERO {
        return quantity;
    }
    (quantity / increment).ceil() * increment
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_native_is_exact() {
        assert_eq!(to_native(dec!(0.1), 9).unwrap(), 100_000_000);
        assert_eq!(to_native(dec!(12.345678), 6).unwrap(), 12_345_678);
    }

    #[test]
    fn test_to_native_truncates_and_ceil_rounds_up() {
        assert_eq!(to_native(dec!(1.0000005), 6).unwrap(), 1_000_000);
        assert_eq!(to_native_ceil(dec!(1.0000005), 6).unwrap(), 1_000_001);
    }

    #[test]
    fn test_to_native_rejects_negative() {
        assert!(to_native(dec!(-1), 6).is_err());
        assert_eq!(to_native(dec!(0), 6).unwrap(), 0);
    }

    #[test]
    fn test_native_to_f64() {
        assert_eq!(native_to_f64(1_500_000_000, 9).unwrap(), 1.5);
        assert_eq!(native_to_f64(123_456_789, 0).unwrap(), 123_456_789.0);
        assert_eq!(native_to_decimal(u64::MAX, 18).unwrap().trunc(), dec!(18));
    }

    #[test]
    fn test_increment_rounding() {
        assert_eq!(floor_to_increment(dec!(12.37), dec!(0.1)), dec!(12.3));
        assert_eq!(ceil_to_increment(dec!(12.31), dec!(0.1)), dec!(12.4));
        assert_eq!(ceil_to_increment(dec!(12.3), dec!(0.1)), dec!(12.3));
        assert_eq!(floor_to_increment(dec!(7), dec!(0)), dec!(7));
    }

    #[test]
    fn test_decimal_from_f64_rejects_non_finite() {
        assert!(decimal_from_f64(f64::NAN).is_err());
        assert!(decimal_from_f64(f64::INFINITY).is_err());
        assert_eq!(decimal_from_f64(2.5).unwrap(), dec!(2.5));
    }
}
