//! Wide fixed-point decimal used by the pool math kernels.
//!
//! Rates are 18-fractional-digit [`Decimal`]s, but √prices and kernel
//! intermediates need more headroom than 18 digits can offer: a √price for
//! a pair with mismatched exponents can sit near 1e-20, far below one
//! `Decimal` atom. [`BigDec`] stores values as `Uint512` atoms scaled by
//! 10^36, with explicit truncating and ceiling variants on every lossy
//! operation so the caller picks the rounding direction.

use std::fmt;
use std::str::FromStr;

use cosmwasm_std::{Decimal, Decimal256, Uint128, Uint256, Uint512};
use once_cell::sync::Lazy;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::QuoterError;

/// Number of fractional digits carried by [`BigDec`].
pub const PRECISION: u32 = 36;

static ONE_ATOMS: Lazy<Uint512> = Lazy::new(|| pow10(PRECISION));

fn pow10(n: u32) -> Uint512 {
    let ten = Uint512::from(10u128);
    let mut result = Uint512::one();
    for _ in 0..n {
        result *= ten;
    }
    result
}

/// Unsigned fixed-point decimal with 36 fractional digits over `Uint512`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct BigDec(Uint512);

impl BigDec {
    pub fn zero() -> Self {
        BigDec(Uint512::zero())
    }

    pub fn one() -> Self {
        BigDec(*ONE_ATOMS)
    }

    /// Smallest positive value (one atom, 1e-36).
    pub fn atom() -> Self {
        BigDec(Uint512::one())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn atomics(&self) -> Uint512 {
        self.0
    }

    pub fn from_atomics(atomics: Uint512) -> Self {
        BigDec(atomics)
    }

    pub fn from_uint128(value: Uint128) -> Self {
        BigDec(Uint512::from(value) * *ONE_ATOMS)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_uint128(Uint128::from(value))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        // Decimal carries 18 fractional digits; widen by the remaining 18.
        BigDec(Uint512::from(value.atomics()) * pow10(PRECISION - Decimal::DECIMAL_PLACES))
    }

    pub fn from_decimal256(value: Decimal256) -> Self {
        BigDec(Uint512::from(value.atomics()) * pow10(PRECISION - Decimal256::DECIMAL_PLACES))
    }

    pub fn from_ratio(numerator: Uint128, denominator: Uint128) -> Result<Self, QuoterError> {
        let numerator = Uint512::from(numerator).checked_mul(*ONE_ATOMS)?;
        let atoms = numerator.checked_div(Uint512::from(denominator))?;
        Ok(BigDec(atoms))
    }

    pub fn checked_add(&self, other: Self) -> Result<Self, QuoterError> {
        Ok(BigDec(self.0.checked_add(other.0)?))
    }

    pub fn checked_sub(&self, other: Self) -> Result<Self, QuoterError> {
        Ok(BigDec(self.0.checked_sub(other.0)?))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        BigDec(self.0.saturating_sub(other.0))
    }

    pub fn abs_diff(&self, other: Self) -> Self {
        if self.0 >= other.0 {
            BigDec(self.0 - other.0)
        } else {
            BigDec(other.0 - self.0)
        }
    }

    /// Multiplication truncating toward zero.
    pub fn checked_mul(&self, other: Self) -> Result<Self, QuoterError> {
        let product = self.0.checked_mul(other.0)?;
        Ok(BigDec(product / *ONE_ATOMS))
    }

    /// Multiplication rounding away from zero.
    pub fn checked_mul_ceil(&self, other: Self) -> Result<Self, QuoterError> {
        let product = self.0.checked_mul(other.0)?;
        let floor = product / *ONE_ATOMS;
        let rem = product - floor * *ONE_ATOMS;
        if rem.is_zero() {
            Ok(BigDec(floor))
        } else {
            Ok(BigDec(floor.checked_add(Uint512::one())?))
        }
    }

    /// Division truncating toward zero.
    pub fn checked_div(&self, other: Self) -> Result<Self, QuoterError> {
        let numerator = self.0.checked_mul(*ONE_ATOMS)?;
        Ok(BigDec(numerator.checked_div(other.0)?))
    }

    /// Division rounding away from zero.
    pub fn checked_div_ceil(&self, other: Self) -> Result<Self, QuoterError> {
        let numerator = self.0.checked_mul(*ONE_ATOMS)?;
        let floor = numerator.checked_div(other.0)?;
        let rem = numerator - floor * other.0;
        if rem.is_zero() {
            Ok(BigDec(floor))
        } else {
            Ok(BigDec(floor.checked_add(Uint512::one())?))
        }
    }

    /// Integer power by squaring, truncating on each multiply.
    pub fn checked_pow_int(&self, mut exp: u64) -> Result<Self, QuoterError> {
        let mut base = *self;
        let mut result = Self::one();
        while exp > 0 {
            if exp & 1 == 1 {
                result = result.checked_mul(base)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.checked_mul(base)?;
            }
        }
        Ok(result)
    }

    /// Newton-iteration square root seeded from a lossy f64 estimate.
    pub fn checked_sqrt(&self) -> Result<Self, QuoterError> {
        if self.is_zero() {
            return Ok(Self::zero());
        }
        let seed = Self::from_f64_lossy(self.to_f64_lossy().sqrt()).unwrap_or_else(Self::one);
        let mut x = if seed.is_zero() { Self::atom() } else { seed };
        for _ in 0..64 {
            let next_sum = x.checked_add(self.checked_div(x)?)?;
            let next = BigDec(next_sum.0 / Uint512::from(2u128));
            let diff = next.abs_diff(x);
            x = next;
            if diff.0 <= Uint512::one() {
                break;
            }
        }
        Ok(x)
    }

    /// Truncates the fractional part and narrows to `Uint128`.
    pub fn to_uint128_floor(&self) -> Result<Uint128, QuoterError> {
        let floored = self.0 / *ONE_ATOMS;
        let narrowed: Uint256 = floored.try_into()?;
        Ok(narrowed.try_into()?)
    }

    /// Rounds the fractional part up and narrows to `Uint128`.
    pub fn to_uint128_ceil(&self) -> Result<Uint128, QuoterError> {
        let floor = self.0 / *ONE_ATOMS;
        let rem = self.0 - floor * *ONE_ATOMS;
        let rounded = if rem.is_zero() {
            floor
        } else {
            floor.checked_add(Uint512::one())?
        };
        let narrowed: Uint256 = rounded.try_into()?;
        Ok(narrowed.try_into()?)
    }

    /// Truncates to an 18-digit [`Decimal`].
    pub fn to_decimal_floor(&self) -> Result<Decimal, QuoterError> {
        let atomics18 = self.0 / pow10(PRECISION - Decimal::DECIMAL_PLACES);
        let narrowed: Uint256 = atomics18.try_into()?;
        let narrowed: Uint128 = narrowed.try_into()?;
        Ok(Decimal::from_atomics(narrowed, Decimal::DECIMAL_PLACES)?)
    }

    /// Lossy conversion via decimal digits, mantissa capped at 18 digits.
    pub fn to_f64_lossy(&self) -> f64 {
        if self.is_zero() {
            return 0.0;
        }
        let s = self.0.to_string();
        let len = s.len();
        let take = len.min(18);
        let mantissa: f64 = s[..take].parse().unwrap_or(0.0);
        let exp10 = (len - take) as i32 - PRECISION as i32;
        mantissa * 10f64.powi(exp10)
    }

    /// Lossy construction from a non-negative finite f64.
    pub fn from_f64_lossy(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        if value == 0.0 {
            return Some(Self::zero());
        }
        let formatted = format!("{value:e}");
        let (mantissa, exp) = formatted.split_once('e')?;
        let exp: i32 = exp.parse().ok()?;
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        let digits: u128 = format!("{int_part}{frac_part}").parse().ok()?;
        let shift = PRECISION as i32 + exp - frac_part.len() as i32;
        let m = Uint512::from(digits);
        let atoms = if shift >= 0 {
            m.checked_mul(pow10(shift as u32)).ok()?
        } else if (-shift) as u32 > PRECISION + 40 {
            Uint512::zero()
        } else {
            m / pow10((-shift) as u32)
        };
        Some(BigDec(atoms))
    }
}

impl fmt::Display for BigDec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / *ONE_ATOMS;
        let frac = self.0 - whole * *ONE_ATOMS;
        if frac.is_zero() {
            return write!(f, "{whole}");
        }
        let frac = format!("{frac:0>width$}", width = PRECISION as usize);
        write!(f, "{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl FromStr for BigDec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid decimal: {s}"));
        }
        if frac_part.len() > PRECISION as usize {
            return Err(format!("too many fractional digits in {s}"));
        }
        let mut atoms = Uint512::zero();
        let ten = Uint512::from(10u128);
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10).ok_or_else(|| format!("invalid digit in {s}"))?;
            atoms = atoms
                .checked_mul(ten)
                .and_then(|v| v.checked_add(Uint512::from(digit as u128)))
                .map_err(|_| format!("value out of range: {s}"))?;
        }
        let shift = PRECISION as usize - frac_part.len();
        atoms = atoms
            .checked_mul(pow10(shift as u32))
            .map_err(|_| format!("value out of range: {s}"))?;
        Ok(BigDec(atoms))
    }
}

impl Serialize for BigDec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BigDec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigDec::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_display() {
        assert_eq!(BigDec::from_u64(5).to_string(), "5");
        assert_eq!(
            BigDec::from_ratio(Uint128::new(1), Uint128::new(4)).unwrap().to_string(),
            "0.25"
        );
        assert_eq!(BigDec::from_str("1.5").unwrap(), BigDec::from_ratio(Uint128::new(3), Uint128::new(2)).unwrap());
    }

    #[test]
    fn mul_and_div_rounding() {
        let half = BigDec::from_str("0.5").unwrap();
        let third = BigDec::from_ratio(Uint128::new(1), Uint128::new(3)).unwrap();

        // 0.5 * 1/3 truncates; the ceiling variant is one atom larger.
        let down = half.checked_mul(third).unwrap();
        let up = half.checked_mul_ceil(third).unwrap();
        assert_eq!(up.atomics() - down.atomics(), Uint512::one());

        let div_down = BigDec::one().checked_div(BigDec::from_u64(3)).unwrap();
        let div_up = BigDec::one().checked_div_ceil(BigDec::from_u64(3)).unwrap();
        assert_eq!(div_up.atomics() - div_down.atomics(), Uint512::one());
    }

    #[test]
    fn uint128_narrowing() {
        let v = BigDec::from_str("123.000000000000000000000000000000000001").unwrap();
        assert_eq!(v.to_uint128_floor().unwrap(), Uint128::new(123));
        assert_eq!(v.to_uint128_ceil().unwrap(), Uint128::new(124));
    }

    #[test]
    fn sqrt_converges() {
        let four = BigDec::from_u64(4);
        let root = four.checked_sqrt().unwrap();
        assert_eq!(root.to_uint128_floor().unwrap(), Uint128::new(2));

        let two = BigDec::from_u64(2);
        let root = two.checked_sqrt().unwrap();
        let squared = root.checked_mul(root).unwrap();
        assert!(squared.abs_diff(two) < BigDec::from_str("0.000000000000000001").unwrap());
    }

    #[test]
    fn f64_round_trips_are_close() {
        let v = BigDec::from_f64_lossy(1.0001).unwrap();
        let back = v.to_f64_lossy();
        assert!((back - 1.0001).abs() < 1e-12);

        let tiny = BigDec::from_f64_lossy(5e-20).unwrap();
        assert!(!tiny.is_zero());
        assert!((tiny.to_f64_lossy() - 5e-20).abs() < 1e-32);
    }

    #[test]
    fn pow_int() {
        let base = BigDec::from_str("1.0001").unwrap();
        let p = base.checked_pow_int(2).unwrap();
        assert_eq!(p.to_string(), "1.00020001");
    }
}
