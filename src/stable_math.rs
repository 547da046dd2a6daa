// Stableswap invariant math over scaled balances.
//
// The curve is the solidly-style constant function
//
//   k = x * y * (x^2 + y^2 + w)
//
// where x and y are the scaled balances of the swapped pair and w is the
// sum of squares of the remaining scaled balances. The counter-asset
// balance after a swap is found with a Newton iteration that converges
// monotonically from the pre-swap balance.

use cosmwasm_std::Decimal256;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;

const MAX_ITERATIONS: usize = 255;

/// Newton convergence tolerance: one 18-digit atom.
fn tolerance() -> Decimal256 {
    Decimal256::from_ratio(1u128, 1_000_000_000_000_000_000u128)
}

/// `x * y * (x^2 + y^2 + w)`.
pub fn cfmm_constant(
    x: Decimal256,
    y: Decimal256,
    w_sum_squares: Decimal256,
) -> Result<Decimal256, QuoterError> {
    let x_sq = x.checked_mul(x)?;
    let y_sq = y.checked_mul(y)?;
    let inner = x_sq.checked_add(y_sq)?.checked_add(w_sum_squares)?;
    Ok(x.checked_mul(y)?.checked_mul(inner)?)
}

/// Solves `x * y * (x^2 + y^2 + w) = k` for `y`, iterating from `y_start`.
///
/// The fixed-point step is the Newton update rewritten without signed
/// intermediates:
///
///   y' = (2*x*y^3 + k) / (3*x*y^2 + x^3 + x*w)
fn solve_counter_balance(
    x: Decimal256,
    y_start: Decimal256,
    w_sum_squares: Decimal256,
    k: Decimal256,
) -> Result<Decimal256, QuoterError> {
    let two = Decimal256::from_ratio(2u128, 1u128);
    let three = Decimal256::from_ratio(3u128, 1u128);
    let x_cubed = x.checked_mul(x)?.checked_mul(x)?;
    let xw = x.checked_mul(w_sum_squares)?;
    let tol = tolerance();

    let mut y = y_start;
    for _ in 0..MAX_ITERATIONS {
        let y_sq = y.checked_mul(y)?;
        let y_cubed = y_sq.checked_mul(y)?;

        let numerator = two
            .checked_mul(x)?
            .checked_mul(y_cubed)?
            .checked_add(k)?;
        let denominator = three
            .checked_mul(x)?
            .checked_mul(y_sq)?
            .checked_add(x_cubed)?
            .checked_add(xw)?;
        let next = numerator.checked_div(denominator)?;

        let diff = if next > y { next - y } else { y - next };
        y = next;
        if diff <= tol {
            break;
        }
    }
    Ok(y)
}

/// Scaled amount out for a scaled amount in.
///
/// The caller guarantees positive balances; the result is left at full
/// precision so the adapter controls final truncation.
pub fn calc_out_given_in(
    balance_in: Decimal256,
    balance_out: Decimal256,
    w_sum_squares: Decimal256,
    amount_in: Decimal256,
) -> Result<Decimal256, QuoterError> {
    let k = cfmm_constant(balance_in, balance_out, w_sum_squares)?;
    let x_new = balance_in.checked_add(amount_in)?;
    let y_new = solve_counter_balance(x_new, balance_out, w_sum_squares, k)?;
    Ok(balance_out.checked_sub(y_new)?)
}

/// Scaled amount in required for a scaled amount out.
///
/// The caller guarantees `amount_out < balance_out`.
pub fn calc_in_given_out(
    balance_in: Decimal256,
    balance_out: Decimal256,
    w_sum_squares: Decimal256,
    amount_out: Decimal256,
) -> Result<Decimal256, QuoterError> {
    let k = cfmm_constant(balance_in, balance_out, w_sum_squares)?;
    let y_new = balance_out.checked_sub(amount_out)?;
    let x_new = solve_counter_balance(y_new, balance_in, w_sum_squares, k)?;
    Ok(x_new.checked_sub(balance_in)?)
}

/// Marginal price of the base asset in the quote asset at the current
/// point on the curve: `∂k/∂x_base / ∂k/∂x_quote`.
pub fn spot_price(
    balance_base: Decimal256,
    balance_quote: Decimal256,
    w_sum_squares: Decimal256,
) -> Result<BigDec, QuoterError> {
    let three = Decimal256::from_ratio(3u128, 1u128);
    let x = balance_base;
    let y = balance_quote;
    let x_sq = x.checked_mul(x)?;
    let y_sq = y.checked_mul(y)?;

    // f_x = y*(3x^2 + y^2 + w), f_y = x*(x^2 + 3y^2 + w)
    let f_x = y.checked_mul(
        three
            .checked_mul(x_sq)?
            .checked_add(y_sq)?
            .checked_add(w_sum_squares)?,
    )?;
    let f_y = x.checked_mul(
        x_sq.checked_add(three.checked_mul(y_sq)?)?
            .checked_add(w_sum_squares)?,
    )?;

    BigDec::from_decimal256(f_x).checked_div(BigDec::from_decimal256(f_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal256 {
        Decimal256::from_str(s).unwrap()
    }

    #[test]
    fn solve_preserves_invariant() {
        let x = d("1000000");
        let y = d("1000000");
        let w = Decimal256::zero();
        let out = calc_out_given_in(x, y, w, d("1000")).unwrap();

        let k_before = cfmm_constant(x, y, w).unwrap();
        let k_after =
            cfmm_constant(x + d("1000"), y.checked_sub(out).unwrap(), w).unwrap();
        let diff = if k_after > k_before {
            k_after - k_before
        } else {
            k_before - k_after
        };
        // relative drift below 1e-12
        assert!(diff.checked_div(k_before).unwrap() < d("0.000000000001"));
    }

    #[test]
    fn near_balanced_pool_trades_near_parity() {
        let out = calc_out_given_in(d("1000000"), d("1000000"), Decimal256::zero(), d("100"))
            .unwrap();
        // the stable curve is nearly flat around the balanced point
        assert!(out > d("99.99"));
        assert!(out < d("100"));
    }

    #[test]
    fn out_given_in_then_in_given_out_round_trips() {
        let x = d("500000");
        let y = d("700000");
        let w = d("250000000000"); // a third asset of scaled balance 500k
        let amount_in = d("1234");

        let out = calc_out_given_in(x, y, w, amount_in).unwrap();
        let back = calc_in_given_out(x, y, w, out).unwrap();

        let diff = if back > amount_in {
            back - amount_in
        } else {
            amount_in - back
        };
        assert!(diff < d("0.0001"), "round trip drift: {diff}");
    }

    #[test]
    fn spot_price_of_balanced_pool_is_one() {
        let price = spot_price(d("1000000"), d("1000000"), Decimal256::zero()).unwrap();
        assert_eq!(price, BigDec::one());
    }

    #[test]
    fn imbalanced_pool_prices_scarce_side_higher() {
        // base is scarce: selling base should fetch more than one quote
        let price = spot_price(d("500000"), d("1500000"), Decimal256::zero()).unwrap();
        assert!(price > BigDec::one());
    }
}
