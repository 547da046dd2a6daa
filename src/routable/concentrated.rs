//! Adapter for concentrated-liquidity pools.
//!
//! Swaps walk the tick bucket list starting at the current bucket,
//! direction chosen by whether the input token is the pool's lower-index
//! asset. Each iteration either finishes inside the current bucket or
//! consumes it entirely and moves to the adjacent one; running out of
//! buckets with input left is a pool-state error, not a partial fill.

use std::sync::Arc;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::clmm_math;
use crate::errors::QuoterError;
use crate::pools::{ConcentratedPoolData, PoolFamily, PoolRecord, PoolState, TickModel};

use super::{coin, ensure_not_cancelled, RoutablePool};

pub struct RoutableConcentratedPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
}

impl RoutableConcentratedPool {
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

    fn data(&self) -> Result<&ConcentratedPoolData, QuoterError> {
        match &self.pool.state {
            PoolState::Concentrated(data) => Ok(data),
            _ => Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            }),
        }
    }

    /// Validates the tick model and returns it with the starting bucket
    /// index.
    fn validated_tick_model(&self) -> Result<(&ConcentratedPoolData, &TickModel, i64), QuoterError> {
        let pool_id = self.pool.id;
        let data = self.data()?;
        let model = data
            .tick_model
            .as_ref()
            .ok_or(QuoterError::NoTickModel { pool_id })?;

        if model.has_no_liquidity {
            return Err(QuoterError::NoLiquidity { pool_id });
        }

        let index = model.current_tick_index;
        if index < 0 || index as usize >= model.ticks.len() {
            return Err(QuoterError::CurrentTickNotWithinBucket {
                pool_id,
                current_bucket_index: index,
                total_buckets: model.ticks.len(),
            });
        }

        let bucket = &model.ticks[index as usize];
        if data.current_tick < bucket.lower_tick || data.current_tick >= bucket.upper_tick {
            return Err(QuoterError::CurrentTickAndBucketMismatch {
                pool_id,
                lower_tick: bucket.lower_tick,
                upper_tick: bucket.upper_tick,
                current_tick: data.current_tick,
            });
        }

        if data.current_sqrt_price.is_zero() {
            return Err(QuoterError::ZeroCurrentSqrtPrice { pool_id });
        }

        Ok((data, model, index))
    }

    fn is_zero_for_one(&self, token_in_denom: &str) -> Result<bool, QuoterError> {
        let token0 = self
            .pool
            .denoms
            .first()
            .ok_or(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            })?;
        Ok(token_in_denom == token0)
    }

    fn exhausted(&self, token: &Coin) -> QuoterError {
        QuoterError::NotEnoughLiquidityToCompleteSwap {
            pool_id: self.pool.id,
            token_in: format!("{}{}", token.amount, token.denom),
        }
    }
}

fn clamp(value: BigDec, lo: BigDec, hi: BigDec) -> BigDec {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

#[async_trait]
impl RoutablePool for RoutableConcentratedPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        self.pool.denoms.clone()
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::Concentrated
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
        let (data, model, start_index) = self.validated_tick_model()?;
        let zero_for_one = self.is_zero_for_one(&token_in.denom)?;

        let keep = BigDec::one().checked_sub(BigDec::from_decimal(self.pool.spread_factor))?;

        let mut remaining_gross = BigDec::from_uint128(token_in.amount);
        let mut total_out = BigDec::zero();
        let mut current_sqrt_price = data.current_sqrt_price;
        let mut index = start_index;

        loop {
            ensure_not_cancelled(cancel)?;
            if index < 0 || index as usize >= model.ticks.len() {
                return Err(self.exhausted(token_in));
            }
            let bucket = &model.ticks[index as usize];
            let liquidity = BigDec::from_decimal(bucket.liquidity);
            let sqrt_lo = clmm_math::tick_to_sqrt_price(bucket.lower_tick)?;
            let sqrt_hi = clmm_math::tick_to_sqrt_price(bucket.upper_tick)?;
            let current = clamp(current_sqrt_price, sqrt_lo, sqrt_hi);
            let target = if zero_for_one { sqrt_lo } else { sqrt_hi };

            if liquidity.is_zero() {
                current_sqrt_price = target;
                index += if zero_for_one { -1 } else { 1 };
                continue;
            }

            // spread applies to the incremental input before it consumes
            // liquidity
            let net_remaining = remaining_gross.checked_mul(keep)?;
            let in_to_boundary = if zero_for_one {
                clmm_math::amount0_delta(target, current, liquidity, true)?
            } else {
                clmm_math::amount1_delta(current, target, liquidity, true)?
            };

            if net_remaining < in_to_boundary {
                let next = if zero_for_one {
                    clmm_math::next_sqrt_price_from_amount0_in(current, liquidity, net_remaining)?
                } else {
                    clmm_math::next_sqrt_price_from_amount1_in(current, liquidity, net_remaining)?
                };
                let out = if zero_for_one {
                    clmm_math::amount1_delta(next, current, liquidity, false)?
                } else {
                    clmm_math::amount0_delta(current, next, liquidity, false)?
                };
                total_out = total_out.checked_add(out)?;
                break;
            }

            let out = if zero_for_one {
                clmm_math::amount1_delta(target, current, liquidity, false)?
            } else {
                clmm_math::amount0_delta(current, target, liquidity, false)?
            };
            total_out = total_out.checked_add(out)?;

            let gross_used = in_to_boundary.checked_div_ceil(keep)?;
            remaining_gross = remaining_gross.saturating_sub(gross_used);
            current_sqrt_price = target;
            index += if zero_for_one { -1 } else { 1 };
            if remaining_gross.is_zero() {
                break;
            }
        }

        Ok(coin(total_out.to_uint128_floor()?, &self.token_out_denom))
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        let (data, model, start_index) = self.validated_tick_model()?;
        // direction is still keyed off the input side of the swap
        let zero_for_one = self.is_zero_for_one(&self.token_in_denom)?;

        let keep = BigDec::one().checked_sub(BigDec::from_decimal(self.pool.spread_factor))?;

        let mut remaining_out = BigDec::from_uint128(token_out.amount);
        let mut total_in_gross = BigDec::zero();
        let mut current_sqrt_price = data.current_sqrt_price;
        let mut index = start_index;

        loop {
            ensure_not_cancelled(cancel)?;
            if index < 0 || index as usize >= model.ticks.len() {
                return Err(self.exhausted(token_out));
            }
            let bucket = &model.ticks[index as usize];
            let liquidity = BigDec::from_decimal(bucket.liquidity);
            let sqrt_lo = clmm_math::tick_to_sqrt_price(bucket.lower_tick)?;
            let sqrt_hi = clmm_math::tick_to_sqrt_price(bucket.upper_tick)?;
            let current = clamp(current_sqrt_price, sqrt_lo, sqrt_hi);
            let target = if zero_for_one { sqrt_lo } else { sqrt_hi };

            if liquidity.is_zero() {
                current_sqrt_price = target;
                index += if zero_for_one { -1 } else { 1 };
                continue;
            }

            let out_to_boundary = if zero_for_one {
                clmm_math::amount1_delta(target, current, liquidity, false)?
            } else {
                clmm_math::amount0_delta(current, target, liquidity, false)?
            };

            if remaining_out <= out_to_boundary {
                let next = if zero_for_one {
                    clmm_math::next_sqrt_price_from_amount1_out(current, liquidity, remaining_out)?
                } else {
                    clmm_math::next_sqrt_price_from_amount0_out(current, liquidity, remaining_out)?
                };
                let in_needed = if zero_for_one {
                    clmm_math::amount0_delta(next, current, liquidity, true)?
                } else {
                    clmm_math::amount1_delta(current, next, liquidity, true)?
                };
                total_in_gross = total_in_gross.checked_add(in_needed.checked_div_ceil(keep)?)?;
                break;
            }

            let in_needed = if zero_for_one {
                clmm_math::amount0_delta(target, current, liquidity, true)?
            } else {
                clmm_math::amount1_delta(current, target, liquidity, true)?
            };
            total_in_gross = total_in_gross.checked_add(in_needed.checked_div_ceil(keep)?)?;
            remaining_out = remaining_out.checked_sub(out_to_boundary)?;
            current_sqrt_price = target;
            index += if zero_for_one { -1 } else { 1 };
        }

        Ok(coin(total_in_gross.to_uint128_ceil()?, &self.token_in_denom))
    }

    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let data = self.data()?;
        if data.current_sqrt_price.is_zero() {
            return Err(QuoterError::ZeroCurrentSqrtPrice {
                pool_id: self.pool.id,
            });
        }
        let token0 = self
            .pool
            .denoms
            .first()
            .ok_or(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            })?;

        // current sqrt price is quoted as token1 per token0
        let price = data
            .current_sqrt_price
            .checked_mul(data.current_sqrt_price)?;
        if base_denom == token0 && quote_denom == self.pool.denoms.get(1).map(String::as_str).unwrap_or_default() {
            Ok(price)
        } else if quote_denom == token0 {
            BigDec::one().checked_div(price)
        } else {
            Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            })
        }
    }
}
