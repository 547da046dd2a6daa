//! Adapter for alloyed transmuter pools.
//!
//! Amounts convert through per-asset normalization factors:
//! `out = in * n_out / n_in`. The alloyed LP denom is minted and burned by
//! the pool, so balance validation only applies to the non-alloyed side.
//! After conversion the static rate limiter is enforced over the post-swap
//! normalized weights.

use std::sync::Arc;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal, Decimal256, Uint128, Uint256};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{AlloyedPoolData, PoolFamily, PoolRecord, PoolState};

use super::transmuter::validate_transmuter_balance;
use super::{coin, ensure_not_cancelled, RoutablePool};

pub struct RoutableAlloyedPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
}

impl RoutableAlloyedPool {
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

    fn data(&self) -> Result<&AlloyedPoolData, QuoterError> {
        match &self.pool.state {
            PoolState::AlloyedTransmuter(data) => Ok(data),
            _ => Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            }),
        }
    }

    /// Normalization factors for the swapped pair, validated non-zero.
    fn normalization_factors(
        &self,
        token_in_denom: &str,
        token_out_denom: &str,
    ) -> Result<(Uint128, Uint128), QuoterError> {
        let data = self.data()?;
        let pool_id = self.pool.id;

        let factor_in = data.normalization_factor(token_in_denom).ok_or_else(|| {
            QuoterError::MissingNormalizationFactor {
                denom: token_in_denom.to_string(),
                pool_id,
            }
        })?;
        let factor_out = data.normalization_factor(token_out_denom).ok_or_else(|| {
            QuoterError::MissingNormalizationFactor {
                denom: token_out_denom.to_string(),
                pool_id,
            }
        })?;

        if factor_in.is_zero() {
            return Err(QuoterError::ZeroNormalizationFactor {
                denom: token_in_denom.to_string(),
                pool_id,
            });
        }
        if factor_out.is_zero() {
            return Err(QuoterError::ZeroNormalizationFactor {
                denom: token_out_denom.to_string(),
                pool_id,
            });
        }
        Ok((factor_in, factor_out))
    }

    /// Enforces the static upper rate limiter against post-swap weights.
    ///
    /// When the swapped-in denom is not the alloyed denom, only its own
    /// weight can grow, so only its limiter is checked. When the alloyed
    /// denom comes in, the token-out side shrinks and every other asset's
    /// weight grows, so all remaining limiters are checked.
    fn check_static_rate_limiter(&self, swapped_in: &Coin) -> Result<(), QuoterError> {
        let data = self.data()?;
        if data.static_limiters.is_empty() {
            return Ok(());
        }

        let mut normalized = Vec::with_capacity(data.asset_configs.len());
        let mut total = Uint256::zero();
        for config in &data.asset_configs {
            if config.denom == data.alloyed_denom {
                continue;
            }
            let mut balance = self.pool.balance_of(&config.denom);
            if config.denom == swapped_in.denom {
                balance = balance.checked_add(swapped_in.amount)?;
            }
            if config.denom == self.token_out_denom {
                balance = balance.saturating_sub(swapped_in.amount);
            }

            let scaling = data
                .normalization_scaling_factors
                .get(&config.denom)
                .copied()
                .ok_or_else(|| QuoterError::MissingNormalizationFactor {
                    denom: config.denom.clone(),
                    pool_id: self.pool.id,
                })?;

            let value = Uint256::from(balance) * Uint256::from(scaling);
            total = total.checked_add(value)?;
            normalized.push((config.denom.as_str(), value));
        }

        if total.is_zero() {
            return Ok(());
        }

        let check = |denom: &str, value: Uint256| -> Result<(), QuoterError> {
            let Some(upper_limit) = data.static_limiters.get(denom) else {
                return Ok(());
            };
            let weight = Decimal256::from_ratio(value, total);
            if weight > Decimal256::from(*upper_limit) {
                return Err(QuoterError::StaticRateLimiterInvalidUpperLimit {
                    denom: denom.to_string(),
                    upper_limit: upper_limit.to_string(),
                    weight: weight.to_string(),
                });
            }
            Ok(())
        };

        if swapped_in.denom == data.alloyed_denom {
            for (denom, value) in &normalized {
                if *denom == self.token_out_denom {
                    continue;
                }
                check(denom, *value)?;
            }
        } else if let Some((_, value)) = normalized
            .iter()
            .find(|(denom, _)| *denom == swapped_in.denom)
        {
            check(&swapped_in.denom, *value)?;
        }
        Ok(())
    }

    /// `token_in * n_out / n_in` at full precision.
    fn calc_token_out_amt(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let (factor_in, factor_out) = self.normalization_factors(&token_in.denom, token_out_denom)?;
        self.check_static_rate_limiter(token_in)?;
        BigDec::from_uint128(token_in.amount)
            .checked_mul(BigDec::from_uint128(factor_out))?
            .checked_div(BigDec::from_uint128(factor_in))
    }

    /// `token_out * n_in / n_out` at full precision.
    fn calc_token_in_amt(
        &self,
        token_out: &Coin,
        token_in_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let (factor_in, factor_out) = self.normalization_factors(token_in_denom, &token_out.denom)?;
        self.check_static_rate_limiter(token_out)?;
        BigDec::from_uint128(token_out.amount)
            .checked_mul(BigDec::from_uint128(factor_in))?
            .checked_div(BigDec::from_uint128(factor_out))
    }
}

#[async_trait]
impl RoutablePool for RoutableAlloyedPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        match self.data() {
            Ok(data) => data
                .asset_configs
                .iter()
                .map(|config| config.denom.clone())
                .collect(),
            Err(_) => self.pool.denoms.clone(),
        }
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::CosmWasmAlloyedTransmuter
    }

    fn get_code_id(&self) -> Option<u64> {
        self.pool.code_id()
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

        let token_out_amount = self
            .calc_token_out_amt(token_in, &self.token_out_denom)?
            .to_uint128_floor()?;

        // the alloyed side is minted, not drawn from balances
        if self.token_out_denom != data.alloyed_denom {
            validate_transmuter_balance(
                token_out_amount,
                &self.pool.balances,
                &self.token_out_denom,
            )?;
        }
        Ok(coin(token_out_amount, &self.token_out_denom))
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        let data = self.data()?;

        let token_in_amount = self
            .calc_token_in_amt(token_out, &self.token_in_denom)?
            .to_uint128_floor()?;

        if self.token_in_denom != data.alloyed_denom {
            validate_transmuter_balance(
                token_in_amount,
                &self.pool.balances,
                &self.token_in_denom,
            )?;
        }
        Ok(coin(token_in_amount, &self.token_in_denom))
    }

    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let one = Coin {
            denom: base_denom.to_string(),
            amount: Uint128::one(),
        };
        self.calc_token_out_amt(&one, quote_denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::AssetConfig;
    use cosmwasm_std::coin as cw_coin;
    use std::collections::BTreeMap;

    fn pool(
        balances: Vec<Coin>,
        factors: Vec<(&str, u128)>,
        alloyed_denom: &str,
        limiters: Vec<(&str, Decimal)>,
    ) -> Arc<PoolRecord> {
        let denoms = factors.iter().map(|(d, _)| d.to_string()).collect();
        let mut data = AlloyedPoolData {
            code_id: 996,
            contract_address: "osmo1alloyed".to_string(),
            asset_configs: factors
                .iter()
                .map(|(d, f)| AssetConfig {
                    denom: d.to_string(),
                    normalization_factor: Uint128::new(*f),
                })
                .collect(),
            alloyed_denom: alloyed_denom.to_string(),
            static_limiters: limiters
                .into_iter()
                .map(|(d, l)| (d.to_string(), l))
                .collect::<BTreeMap<_, _>>(),
            normalization_scaling_factors: BTreeMap::new(),
        };
        data.precompute_normalization_scaling_factors();
        Arc::new(PoolRecord {
            id: 9,
            denoms,
            balances,
            spread_factor: Decimal::zero(),
            liquidity_cap: Some(Uint128::new(10_000_000)),
            has_market_incentives: false,
            state: PoolState::AlloyedTransmuter(data),
        })
    }

    #[tokio::test]
    async fn converts_through_normalization_factors() {
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(10, "a"), cw_coin(10_000_000, "b")],
                vec![("a", 1), ("b", 1_000_000), ("alloyed", 1)],
                "alloyed",
                vec![],
            ),
            "a".to_string(),
            "b".to_string(),
            Decimal::zero(),
        );
        let cancel = CancellationToken::new();
        let out = adapter
            .calculate_token_out_by_token_in(&cw_coin(3, "a"), &cancel)
            .await
            .unwrap();
        assert_eq!(out, cw_coin(3_000_000, "b"));
    }

    #[tokio::test]
    async fn round_trips_exactly() {
        let make = || {
            RoutableAlloyedPool::new(
                pool(
                    vec![cw_coin(1_000, "a"), cw_coin(2_000_000_000, "b")],
                    vec![("a", 1), ("b", 1_000_000), ("alloyed", 1)],
                    "alloyed",
                    vec![],
                ),
                "a".to_string(),
                "b".to_string(),
                Decimal::zero(),
            )
        };
        let cancel = CancellationToken::new();
        let out = make()
            .calculate_token_out_by_token_in(&cw_coin(7, "a"), &cancel)
            .await
            .unwrap();
        let back = make()
            .calculate_token_in_by_token_out(&out, &cancel)
            .await
            .unwrap();
        assert_eq!(back, cw_coin(7, "a"));
    }

    #[tokio::test]
    async fn mint_side_skips_balance_validation() {
        // swapping into the alloyed denom mints it; the pool balance of the
        // alloyed denom is irrelevant
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(1_000, "a")],
                vec![("a", 1), ("alloyed", 1)],
                "alloyed",
                vec![],
            ),
            "a".to_string(),
            "alloyed".to_string(),
            Decimal::zero(),
        );
        let cancel = CancellationToken::new();
        let out = adapter
            .calculate_token_out_by_token_in(&cw_coin(400, "a"), &cancel)
            .await
            .unwrap();
        assert_eq!(out, cw_coin(400, "alloyed"));
    }

    #[tokio::test]
    async fn missing_factor_errors() {
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(1_000, "a")],
                vec![("a", 1), ("alloyed", 1)],
                "alloyed",
                vec![],
            ),
            "a".to_string(),
            "unknown".to_string(),
            Decimal::zero(),
        );
        let cancel = CancellationToken::new();
        let err = adapter
            .calculate_token_out_by_token_in(&cw_coin(1, "a"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::MissingNormalizationFactor { denom, .. } if denom == "unknown"
        ));
    }

    #[tokio::test]
    async fn rate_limiter_blocks_overweight_token_in() {
        // a already holds 60% of the pool; its limiter caps it at 60%, so
        // any further a inflow breaches the limit
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(600, "a"), cw_coin(400, "b")],
                vec![("a", 1), ("b", 1), ("alloyed", 1)],
                "alloyed",
                vec![("a", Decimal::percent(60))],
            ),
            "a".to_string(),
            "b".to_string(),
            Decimal::zero(),
        );
        let cancel = CancellationToken::new();
        let err = adapter
            .calculate_token_out_by_token_in(&cw_coin(100, "a"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::StaticRateLimiterInvalidUpperLimit { denom, .. } if denom == "a"
        ));
    }

    #[tokio::test]
    async fn rate_limiter_checks_all_assets_for_alloyed_in() {
        // burning alloyed into b shrinks b, pushing a's weight to
        // 600/(600+300) = 66.7%, over its 65% limit
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(600, "a"), cw_coin(400, "b")],
                vec![("a", 1), ("b", 1), ("alloyed", 1)],
                "alloyed",
                vec![("a", Decimal::percent(65))],
            ),
            "alloyed".to_string(),
            "b".to_string(),
            Decimal::zero(),
        );
        let cancel = CancellationToken::new();
        let err = adapter
            .calculate_token_out_by_token_in(&cw_coin(100, "alloyed"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::StaticRateLimiterInvalidUpperLimit { denom, .. } if denom == "a"
        ));
    }

    #[tokio::test]
    async fn spot_price_is_factor_ratio() {
        let adapter = RoutableAlloyedPool::new(
            pool(
                vec![cw_coin(10, "a"), cw_coin(10_000_000, "b")],
                vec![("a", 1), ("b", 1_000_000), ("alloyed", 1)],
                "alloyed",
                vec![],
            ),
            "a".to_string(),
            "b".to_string(),
            Decimal::zero(),
        );
        let price = adapter.calc_spot_price("a", "b").await.unwrap();
        assert_eq!(price, BigDec::from_u64(1_000_000));
    }
}
