// Concentrated-liquidity math: tick conversions and per-bucket swap steps.
//
// Ticks map to prices through a decade-partitioned additive scheme: each
// span of 9,000,000 ticks covers one order of magnitude, and within a span
// the price grows by a fixed additive increment. Prices therefore derive
// from ticks exactly, without a fractional power approximation; √prices
// come from a Newton square root at 36-digit precision.

use cosmwasm_std::{CheckedFromRatioError, Uint512};

use crate::bigdec::BigDec;
use crate::errors::QuoterError;

const EXPONENT_AT_PRICE_ONE: i32 = -6;
const TICKS_PER_DECADE: i64 = 9_000_000;

pub const MIN_TICK: i64 = -108_000_000;
pub const MAX_TICK: i64 = 342_000_000;

/// `10^exponent` as a `BigDec`; exact for any exponent this tick range can
/// produce.
fn pow10(exponent: i32) -> Result<BigDec, QuoterError> {
    if exponent >= 0 {
        let mut atoms = BigDec::one().atomics();
        let ten = Uint512::from(10u128);
        for _ in 0..exponent {
            atoms = atoms.checked_mul(ten)?;
        }
        Ok(BigDec::from_atomics(atoms))
    } else {
        let mut atoms = BigDec::one().atomics();
        let ten = Uint512::from(10u128);
        for _ in 0..(-exponent) {
            atoms = atoms.checked_div(ten)?;
        }
        Ok(BigDec::from_atomics(atoms))
    }
}

/// Price at `tick`.
pub fn tick_to_price(tick: i64) -> Result<BigDec, QuoterError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(CheckedFromRatioError::Overflow.into());
    }
    if tick == 0 {
        return Ok(BigDec::one());
    }

    let decade = tick.div_euclid(TICKS_PER_DECADE);
    let additive_ticks = tick.rem_euclid(TICKS_PER_DECADE);
    let exponent_at_tick = EXPONENT_AT_PRICE_ONE + decade as i32;

    let decade_price = pow10(decade as i32)?;
    let increment = pow10(exponent_at_tick)?;
    let additive = increment.checked_mul(BigDec::from_u64(additive_ticks as u64))?;
    decade_price.checked_add(additive)
}

/// √price at `tick`.
pub fn tick_to_sqrt_price(tick: i64) -> Result<BigDec, QuoterError> {
    tick_to_price(tick)?.checked_sqrt()
}

/// Token0 amount moved between √prices `sqrt_a` and `sqrt_b` at constant
/// `liquidity`: `L * (b - a) / (a * b)`.
pub fn amount0_delta(
    sqrt_a: BigDec,
    sqrt_b: BigDec,
    liquidity: BigDec,
    round_up: bool,
) -> Result<BigDec, QuoterError> {
    let (lo, hi) = if sqrt_a <= sqrt_b {
        (sqrt_a, sqrt_b)
    } else {
        (sqrt_b, sqrt_a)
    };
    let diff = hi.checked_sub(lo)?;
    if round_up {
        liquidity
            .checked_mul_ceil(diff)?
            .checked_div_ceil(lo.checked_mul(hi)?)
    } else {
        liquidity.checked_mul(diff)?.checked_div(hi.checked_mul(lo)?)
    }
}

/// Token1 amount moved between √prices: `L * (b - a)`.
pub fn amount1_delta(
    sqrt_a: BigDec,
    sqrt_b: BigDec,
    liquidity: BigDec,
    round_up: bool,
) -> Result<BigDec, QuoterError> {
    let diff = sqrt_a.abs_diff(sqrt_b);
    if round_up {
        liquidity.checked_mul_ceil(diff)
    } else {
        liquidity.checked_mul(diff)
    }
}

/// Next √price after swapping `amount_in` of token0 into the bucket
/// (price decreases). Rounds up so the price moves no further than the
/// input strictly pays for.
pub fn next_sqrt_price_from_amount0_in(
    sqrt_price: BigDec,
    liquidity: BigDec,
    amount_in: BigDec,
) -> Result<BigDec, QuoterError> {
    // L * p / (L + in * p)
    let numerator = liquidity.checked_mul_ceil(sqrt_price)?;
    let denominator = liquidity.checked_add(amount_in.checked_mul(sqrt_price)?)?;
    numerator.checked_div_ceil(denominator)
}

/// Next √price after swapping `amount_in` of token1 into the bucket
/// (price increases). Rounds down.
pub fn next_sqrt_price_from_amount1_in(
    sqrt_price: BigDec,
    liquidity: BigDec,
    amount_in: BigDec,
) -> Result<BigDec, QuoterError> {
    // p + in / L
    sqrt_price.checked_add(amount_in.checked_div(liquidity)?)
}

/// Next √price after withdrawing `amount_out` of token1 (price decreases).
pub fn next_sqrt_price_from_amount1_out(
    sqrt_price: BigDec,
    liquidity: BigDec,
    amount_out: BigDec,
) -> Result<BigDec, QuoterError> {
    // p - out / L
    sqrt_price.checked_sub(amount_out.checked_div_ceil(liquidity)?)
}

/// Next √price after withdrawing `amount_out` of token0 (price increases).
pub fn next_sqrt_price_from_amount0_out(
    sqrt_price: BigDec,
    liquidity: BigDec,
    amount_out: BigDec,
) -> Result<BigDec, QuoterError> {
    // L * p / (L - out * p)
    let numerator = liquidity.checked_mul_ceil(sqrt_price)?;
    let denominator = liquidity.checked_sub(amount_out.checked_mul(sqrt_price)?)?;
    numerator.checked_div_ceil(denominator)
}
