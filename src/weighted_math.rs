// Weighted constant-product swap math (Balancer-style CPMM).
//
// out = bal_out * (1 - (bal_in / (bal_in + in*(1-spread)))^(w_in/w_out))
//
// Fractional powers use a truncated binomial series; rounding always favors
// the pool: amount-out truncates, amount-in rounds up.

use cosmwasm_std::{CheckedFromRatioError, Decimal, Decimal256, Uint128, Uint256};

use crate::bigdec::BigDec;
use crate::errors::QuoterError;

/// Tolerance at which the power series is cut off.
fn pow_precision() -> Decimal256 {
    Decimal256::from_ratio(1u128, 100_000_000u128)
}

const MAX_POW_ITERATIONS: u32 = 288;

fn dec(value: Uint128) -> Decimal256 {
    Decimal256::from_ratio(value, 1u128)
}

fn to_uint128_floor(value: Decimal256) -> Result<Uint128, QuoterError> {
    let floored: Uint256 = value.to_uint_floor();
    Ok(floored.try_into()?)
}

fn to_uint128_ceil(value: Decimal256) -> Result<Uint128, QuoterError> {
    let ceiled: Uint256 = value.to_uint_ceil();
    Ok(ceiled.try_into()?)
}

/// |a - b| with a flag for `a < b`.
fn abs_diff_with_sign(a: Decimal256, b: Decimal256) -> (Decimal256, bool) {
    if a >= b {
        (a - b, false)
    } else {
        (b - a, true)
    }
}

/// Truncated binomial expansion of `base^exp` for `base` in (0, 2) and
/// `exp` in [0, 1).
fn pow_approx(base: Decimal256, exp: Decimal256) -> Result<Decimal256, QuoterError> {
    if exp.is_zero() {
        return Ok(Decimal256::one());
    }
    let one = Decimal256::one();
    let precision = pow_precision();
    let (x, x_neg) = abs_diff_with_sign(base, one);

    let mut term = one;
    let mut positive_sum = one;
    let mut negative_sum = Decimal256::zero();
    let mut term_negative = false;

    for i in 1..=MAX_POW_ITERATIONS {
        let big_i = Decimal256::from_ratio(i as u128, 1u128);
        // factor (exp - (i - 1)) tracked as magnitude plus sign
        let (c, c_neg) = abs_diff_with_sign(exp, big_i - one);
        term = term
            .checked_mul(c)?
            .checked_mul(x)?
            .checked_div(big_i)?;
        term_negative ^= x_neg ^ c_neg;
        if term < precision {
            break;
        }
        if term_negative {
            negative_sum = negative_sum.checked_add(term)?;
        } else {
            positive_sum = positive_sum.checked_add(term)?;
        }
    }

    Ok(positive_sum.checked_sub(negative_sum)?)
}

/// `base^exp` for positive `base` and non-negative `exp`. Bases at or above
/// 2 are inverted into the series' convergence region.
pub fn pow(base: Decimal256, exp: Decimal256) -> Result<Decimal256, QuoterError> {
    if base.is_zero() {
        return if exp.is_zero() {
            Ok(Decimal256::one())
        } else {
            Ok(Decimal256::zero())
        };
    }
    let two = Decimal256::from_ratio(2u128, 1u128);
    if base >= two {
        let inverted = Decimal256::one().checked_div(base)?;
        let result = pow(inverted, exp)?;
        return Ok(Decimal256::one().checked_div(result)?);
    }

    let integer_part = exp.to_uint_floor();
    let integer_exp: u32 = Uint128::try_from(integer_part)?
        .u128()
        .try_into()
        .map_err(|_| QuoterError::from(CheckedFromRatioError::Overflow))?;
    let fractional = exp.checked_sub(Decimal256::from_ratio(integer_part, 1u128))?;

    let integer_pow = base.checked_pow(integer_exp)?;
    let fractional_pow = pow_approx(base, fractional)?;
    Ok(integer_pow.checked_mul(fractional_pow)?)
}

/// Amount of `token_out` received for `amount_in`, truncated toward zero.
///
/// The caller guarantees both balances are non-zero.
pub fn calc_out_given_in(
    balance_in: Uint128,
    weight_in: Uint128,
    balance_out: Uint128,
    weight_out: Uint128,
    amount_in: Uint128,
    spread_factor: Decimal,
) -> Result<Uint128, QuoterError> {
    let one = Decimal256::one();
    let spread = Decimal256::from(spread_factor);
    let net_in = dec(amount_in).checked_mul(one.checked_sub(spread)?)?;

    let balance_in = dec(balance_in);
    let denominator = balance_in.checked_add(net_in)?;
    let base = balance_in.checked_div(denominator)?;
    let weight_ratio = Decimal256::from_ratio(weight_in, weight_out);

    let power = pow(base, weight_ratio)?;
    // base <= 1 so power <= 1
    let multiplier = one.checked_sub(power)?;
    let amount_out = dec(balance_out).checked_mul(multiplier)?;
    to_uint128_floor(amount_out)
}

/// Amount of `token_in` required to receive `amount_out`, rounded up.
///
/// The caller guarantees `amount_out < balance_out`.
pub fn calc_in_given_out(
    balance_in: Uint128,
    weight_in: Uint128,
    balance_out: Uint128,
    weight_out: Uint128,
    amount_out: Uint128,
    spread_factor: Decimal,
) -> Result<Uint128, QuoterError> {
    let one = Decimal256::one();
    let balance_out = dec(balance_out);
    let remaining_out = balance_out.checked_sub(dec(amount_out))?;
    let base = balance_out.checked_div(remaining_out)?;
    let weight_ratio = Decimal256::from_ratio(weight_out, weight_in);

    let power = pow(base, weight_ratio)?;
    // base >= 1 so power >= 1
    let multiplier = power.checked_sub(one)?;
    let amount_in = dec(balance_in).checked_mul(multiplier)?;

    let spread = Decimal256::from(spread_factor);
    let gross_in = amount_in.checked_div(one.checked_sub(spread)?)?;
    to_uint128_ceil(gross_in)
}

/// Price of one unit of the base asset denominated in the quote asset:
/// `(bal_quote / w_quote) / (bal_base / w_base)`.
pub fn spot_price(
    balance_base: Uint128,
    weight_base: Uint128,
    balance_quote: Uint128,
    weight_quote: Uint128,
) -> Result<BigDec, QuoterError> {
    let numerator = BigDec::from_uint128(balance_quote)
        .checked_mul(BigDec::from_uint128(weight_base))?;
    let denominator = BigDec::from_uint128(balance_base)
        .checked_mul(BigDec::from_uint128(weight_quote))?;
    numerator.checked_div(denominator)
}
