//! Decimal-safe fixed-point arithmetic.
//!
//! Every multiplication is checked: a product that does not fit in u128
//! surfaces as `QueueError::Overflow` before any division runs. Divisions
//! floor. Callers that cannot tolerate the lost remainder must check the
//! result, not the inputs.

use crate::error::QueueError;

/// Denominator for basis-point fractions.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Returns `10^decimals`, or `Overflow` past the u128 range (decimals > 38).
pub fn pow10(decimals: u8) -> Result<u128, QueueError> {
    10u128
        .checked_pow(decimals as u32)
        .ok_or(QueueError::Overflow)
}

/// Computes `floor(a * b / denominator)`.
///
/// The denominator must be nonzero; all callers in this crate divide by a
/// power of ten or by `BPS_DENOMINATOR`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, QueueError> {
    let product = a.checked_mul(b).ok_or(QueueError::Overflow)?;
    Ok(product / denominator)
}

/// Rescales `amount` from one decimal precision to another.
///
/// Scaling up multiplies (checked), scaling down floor-divides. Converting
/// 1000 units of a 6-decimal asset to 18 decimals yields `1000 * 10^12`.
pub fn convert_decimals(amount: u128, from_decimals: u8, to_decimals: u8) -> Result<u128, QueueError> {
    if to_decimals >= from_decimals {
        amount
            .checked_mul(pow10(to_decimals - from_decimals)?)
            .ok_or(QueueError::Overflow)
    } else {
        Ok(amount / pow10(from_decimals - to_decimals)?)
    }
}

/// Converts an offer amount to the want amount a limit price demands.
///
/// `limit_price` is the number of want base units per whole offer unit
/// (per `10^offer_decimals` offer base units), so:
///
/// `want = floor(offer_amount * limit_price / 10^offer_decimals)`
///
/// The intermediate product must fit in u128. For two 18-decimal assets that
/// holds for any offer below ~3.4e20 whole units at a 1:1 price, which is far
/// beyond any real token supply.
pub fn apply_price(offer_amount: u128, limit_price: u128, offer_decimals: u8) -> Result<u128, QueueError> {
    mul_div(offer_amount, limit_price, pow10(offer_decimals)?)
}

/// Computes `floor(amount * bps / 10_000)`.
pub fn bps_of(amount: u128, bps: u128) -> Result<u128, QueueError> {
    mul_div(amount, bps, BPS_DENOMINATOR)
}
