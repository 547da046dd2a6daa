//! Adapter for stableswap pools.
//!
//! Balances are divided by their configured scaling factors before the
//! invariant solve, and results scaled back. The exit fee is a
//! proportional reduction of the output.

use std::sync::Arc;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal, Decimal256, Uint128, Uint256};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{PoolFamily, PoolRecord, PoolState, StableswapPoolData};
use crate::stable_math;

use super::{coin, ensure_not_cancelled, RoutablePool};

pub struct RoutableStableswapPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
}

impl RoutableStableswapPool {
    pub fn new(
        pool: Arc<PoolRecord>,
        token_in_denom: String,
        token_out_denom: String,
        taker_fee: Decimal,
    ) -> Self {
        Self {
            pool,
            token_in_denom,
            token_out_denom,
            taker_fee,
        }
    }

    fn data(&self) -> Result<&StableswapPoolData, QuoterError> {
        match &self.pool.state {
            PoolState::Stableswap(data) => Ok(data),
            _ => Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            }),
        }
    }

    fn scaling_factor(&self, denom: &str) -> Result<u64, QuoterError> {
        let factor = self
            .data()?
            .scaling_factors
            .get(denom)
            .copied()
            .unwrap_or(0);
        if factor == 0 {
            return Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            });
        }
        Ok(factor)
    }

    fn scaled_balance(&self, denom: &str) -> Result<Decimal256, QuoterError> {
        let balance = self.pool.balance_of(denom);
        if balance.is_zero() {
            return Err(QuoterError::NoLiquidity {
                pool_id: self.pool.id,
            });
        }
        let factor = self.scaling_factor(denom)?;
        Ok(Decimal256::from_ratio(balance, factor as u128))
    }

    /// Sum of squares of every scaled balance other than the swapped pair.
    fn rest_sum_squares(&self, denom_a: &str, denom_b: &str) -> Result<Decimal256, QuoterError> {
        let mut sum = Decimal256::zero();
        for denom in &self.pool.denoms {
            if denom == denom_a || denom == denom_b {
                continue;
            }
            let scaled = self.scaled_balance(denom)?;
            sum = sum.checked_add(scaled.checked_mul(scaled)?)?;
        }
        Ok(sum)
    }
}

#[async_trait]
impl RoutablePool for RoutableStableswapPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        self.pool.denoms.clone()
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::Stableswap
    }

    fn get_code_id(&self) -> Option<u64> {
        None
    }

    fn get_spread_factor(&self) -> Decimal {
        self.pool.spread_factor
    }

    fn get_taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn get_token_in_denom(&self) -> &str {
        &self.token_in_denom
    }

    fn get_token_out_denom(&self) -> &str {
        &self.token_out_denom
    }

    fn set_token_in_denom(&mut self, token_in_denom: String) {
        self.token_in_denom = token_in_denom;
    }

    fn set_token_out_denom(&mut self, token_out_denom: String) {
        self.token_out_denom = token_out_denom;
    }

    fn get_balances(&self) -> Vec<Coin> {
        self.pool.balances.clone()
    }

    async fn calculate_token_out_by_token_in(
        &self,
        token_in: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        let data = self.data()?;

        let balance_in = self.scaled_balance(&token_in.denom)?;
        let balance_out = self.scaled_balance(&self.token_out_denom)?;
        let rest = self.rest_sum_squares(&token_in.denom, &self.token_out_denom)?;

        let factor_in = self.scaling_factor(&token_in.denom)?;
        let factor_out = self.scaling_factor(&self.token_out_denom)?;

        let one = Decimal256::one();
        let net_factor = one.checked_sub(Decimal256::from(self.pool.spread_factor))?;
        let amount_in_scaled = Decimal256::from_ratio(token_in.amount, factor_in as u128)
            .checked_mul(net_factor)?;

        let out_scaled =
            stable_math::calc_out_given_in(balance_in, balance_out, rest, amount_in_scaled)?;

        let raw_out = out_scaled.checked_mul(Decimal256::from_ratio(factor_out as u128, 1u128))?;
        let amount_out: Uint256 = raw_out.to_uint_floor();
        let amount_out: Uint128 = amount_out.try_into()?;

        // Exit fee reduces the output proportionally.
        let keep = Decimal::one().checked_sub(data.exit_fee)?;
        Ok(coin(amount_out.mul_floor(keep), &self.token_out_denom))
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        let data = self.data()?;

        let balance_in = self.scaled_balance(&self.token_in_denom)?;
        let balance_out = self.scaled_balance(&token_out.denom)?;
        let rest = self.rest_sum_squares(&self.token_in_denom, &token_out.denom)?;

        let factor_in = self.scaling_factor(&self.token_in_denom)?;
        let factor_out = self.scaling_factor(&token_out.denom)?;

        // Gross up the requested output to cover the exit fee.
        let keep = Decimal::one().checked_sub(data.exit_fee)?;
        let gross_out = if keep.is_zero() {
            token_out.amount
        } else {
            token_out.amount.div_ceil(keep)
        };

        let out_scaled = Decimal256::from_ratio(gross_out, factor_out as u128);
        if out_scaled >= balance_out {
            return Err(QuoterError::NotEnoughLiquidityToCompleteSwap {
                pool_id: self.pool.id,
                token_in: format!("{}{}", token_out.amount, token_out.denom),
            });
        }

        let in_scaled =
            stable_math::calc_in_given_out(balance_in, balance_out, rest, out_scaled)?;
        let raw_in = in_scaled.checked_mul(Decimal256::from_ratio(factor_in as u128, 1u128))?;

        let one = Decimal256::one();
        let net_factor = one.checked_sub(Decimal256::from(self.pool.spread_factor))?;
        let gross_in = raw_in.checked_div(net_factor)?;

        let amount_in: Uint256 = gross_in.to_uint_ceil();
        let amount_in: Uint128 = amount_in.try_into()?;
        Ok(coin(amount_in, &self.token_in_denom))
    }

    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let balance_base = self.scaled_balance(base_denom)?;
        let balance_quote = self.scaled_balance(quote_denom)?;
        let rest = self.rest_sum_squares(base_denom, quote_denom)?;

        let scaled_price = stable_math::spot_price(balance_base, balance_quote, rest)?;

        // Unscale: raw quote per raw base is scaled by factor_quote / factor_base.
        let factor_base = self.scaling_factor(base_denom)?;
        let factor_quote = self.scaling_factor(quote_denom)?;
        scaled_price
            .checked_mul(BigDec::from_u64(factor_quote))?
            .checked_div(BigDec::from_u64(factor_base))
    }
}
