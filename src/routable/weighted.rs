//! Adapter for weighted constant-product pools.

use std::sync::Arc;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal, Uint128};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{PoolFamily, PoolRecord, PoolState, WeightedPoolData};
use crate::weighted_math;

use super::{coin, ensure_not_cancelled, RoutablePool};

pub struct RoutableWeightedPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
}

impl RoutableWeightedPool {
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

    fn data(&self) -> Result<&WeightedPoolData, QuoterError> {
        match &self.pool.state {
            PoolState::Weighted(data) => Ok(data),
            _ => Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            }),
        }
    }

    /// Balance and weight for one side of the swap.
    fn side(&self, denom: &str) -> Result<(Uint128, Uint128), QuoterError> {
        let data = self.data()?;
        let weight = data
            .weights
            .get(denom)
            .copied()
            .ok_or(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            })?;
        let balance = self.pool.balance_of(denom);
        if balance.is_zero() {
            return Err(QuoterError::NoLiquidity {
                pool_id: self.pool.id,
            });
        }
        Ok((balance, weight))
    }
}

#[async_trait]
impl RoutablePool for RoutableWeightedPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        self.pool.denoms.clone()
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::ConstantProduct
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
        let (balance_in, weight_in) = self.side(&token_in.denom)?;
        let (balance_out, weight_out) = self.side(&self.token_out_denom)?;

        let amount_out = weighted_math::calc_out_given_in(
            balance_in,
            weight_in,
            balance_out,
            weight_out,
            token_in.amount,
            self.pool.spread_factor,
        )?;
        Ok(coin(amount_out, &self.token_out_denom))
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        let (balance_in, weight_in) = self.side(&self.token_in_denom)?;
        let (balance_out, weight_out) = self.side(&token_out.denom)?;

        if token_out.amount >= balance_out {
            return Err(QuoterError::NotEnoughLiquidityToCompleteSwap {
                pool_id: self.pool.id,
                token_in: format!("{}{}", token_out.amount, token_out.denom),
            });
        }

        let amount_in = weighted_math::calc_in_given_out(
            balance_in,
            weight_in,
            balance_out,
            weight_out,
            token_out.amount,
            self.pool.spread_factor,
        )?;
        Ok(coin(amount_in, &self.token_in_denom))
    }

    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let (balance_base, weight_base) = self.side(base_denom)?;
        let (balance_quote, weight_quote) = self.side(quote_denom)?;
        weighted_math::spot_price(balance_base, weight_base, balance_quote, weight_quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use cosmwasm_std::coin as cw_coin;

    fn pool(balances: Vec<Coin>, weights: Vec<(&str, u128)>, spread: Decimal) -> Arc<PoolRecord> {
        let denoms = balances.iter().map(|c| c.denom.clone()).collect();
        Arc::new(PoolRecord {
            id: 1,
            denoms,
            balances,
            spread_factor: spread,
            liquidity_cap: Some(Uint128::new(1_000_000)),
            has_market_incentives: false,
            state: PoolState::Weighted(WeightedPoolData {
                weights: weights
                    .into_iter()
                    .map(|(d, w)| (d.to_string(), Uint128::new(w)))
                    .collect::<BTreeMap<_, _>>(),
            }),
        })
    }

    #[tokio::test]
    async fn swaps_through_constant_product() {
        let adapter = RoutableWeightedPool::new(
            pool(
                vec![cw_coin(1000, "uosmo"), cw_coin(1000, "uatom")],
                vec![("uosmo", 1), ("uatom", 1)],
                Decimal::zero(),
            ),
            "uosmo".to_string(),
            "uatom".to_string(),
            Decimal::zero(),
        );

        let cancel = CancellationToken::new();
        let out = adapter
            .calculate_token_out_by_token_in(&cw_coin(100, "uosmo"), &cancel)
            .await
            .unwrap();
        assert_eq!(out, cw_coin(90, "uatom"));
    }

    #[tokio::test]
    async fn cancelled_token_aborts() {
        let adapter = RoutableWeightedPool::new(
            pool(
                vec![cw_coin(1000, "uosmo"), cw_coin(1000, "uatom")],
                vec![("uosmo", 1), ("uatom", 1)],
                Decimal::zero(),
            ),
            "uosmo".to_string(),
            "uatom".to_string(),
            Decimal::zero(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = adapter
            .calculate_token_out_by_token_in(&cw_coin(100, "uosmo"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoterError::Cancelled));
    }

    #[tokio::test]
    async fn exact_out_beyond_balance_errors() {
        let adapter = RoutableWeightedPool::new(
            pool(
                vec![cw_coin(1000, "uosmo"), cw_coin(1000, "uatom")],
                vec![("uosmo", 1), ("uatom", 1)],
                Decimal::zero(),
            ),
            "uosmo".to_string(),
            "uatom".to_string(),
            Decimal::zero(),
        );

        let cancel = CancellationToken::new();
        let err = adapter
            .calculate_token_in_by_token_out(&cw_coin(1000, "uatom"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::NotEnoughLiquidityToCompleteSwap { .. }
        ));
    }
}
