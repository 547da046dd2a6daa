//! Routable pool adapters.
//!
//! A [`RoutablePool`] is the uniform capability surface the router sees
//! over every pool family: identity, denoms, fees, swap math in both
//! directions, and spot price. Adapters are request-scoped: they hold a
//! shared reference to the immutable pool record plus the token-in /
//! token-out denoms chosen for the hop, which they own exclusively.
//!
//! Construction is dispatched by pool family. CosmWasm-backed families are
//! additionally validated against the configured code-id sets so that an
//! unknown contract can never be quoted with the wrong model.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal, Uint128};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{PoolFamily, PoolRecord, PoolState};
use crate::wasm_client::{unset_scaling_factor_getter, ScalingFactorGetter, WasmClient};

pub mod alloyed;
pub mod concentrated;
pub mod generalized;
pub mod stableswap;
pub mod transmuter;
pub mod weighted;

pub use alloyed::RoutableAlloyedPool;
pub use concentrated::RoutableConcentratedPool;
pub use generalized::RoutableGeneralCosmWasmPool;
pub use stableswap::RoutableStableswapPool;
pub use transmuter::RoutableTransmuterPool;
pub use weighted::RoutableWeightedPool;

/// Configuration for constructing CosmWasm-backed adapters.
#[derive(Clone)]
pub struct CosmWasmPoolsParams {
    pub transmuter_code_ids: HashSet<u64>,
    pub alloyed_transmuter_code_ids: HashSet<u64>,
    pub general_cosmwasm_code_ids: HashSet<u64>,
    pub scaling_factor_getter: ScalingFactorGetter,
    /// Query transport for general CosmWasm pools. Optional: without it
    /// those pools fail construction and are skipped best-effort.
    pub wasm_client: Option<Arc<dyn WasmClient>>,
    /// Per-request deadline for contract queries.
    pub query_timeout: Duration,
}

impl Default for CosmWasmPoolsParams {
    fn default() -> Self {
        Self {
            transmuter_code_ids: HashSet::new(),
            alloyed_transmuter_code_ids: HashSet::new(),
            general_cosmwasm_code_ids: HashSet::new(),
            scaling_factor_getter: unset_scaling_factor_getter(),
            wasm_client: None,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Taker fee applied on the way in: `floor(amount * (1 - fee))`.
pub fn charge_taker_fee_exact_in(token_in: Coin, taker_fee: Decimal) -> Coin {
    let keep = match Decimal::one().checked_sub(taker_fee) {
        Ok(keep) => keep,
        Err(_) => Decimal::zero(),
    };
    Coin {
        amount: token_in.amount.mul_floor(keep),
        denom: token_in.denom,
    }
}

/// Inverse taker fee for exact-out flows: `ceil(amount / (1 - fee))`.
///
/// A degenerate fee of one leaves the amount unchanged rather than
/// dividing by zero.
pub fn charge_taker_fee_exact_out(token_in: Coin, taker_fee: Decimal) -> Coin {
    let keep = match Decimal::one().checked_sub(taker_fee) {
        Ok(keep) if !keep.is_zero() => keep,
        _ => return token_in,
    };
    Coin {
        amount: token_in.amount.div_ceil(keep),
        denom: token_in.denom,
    }
}

/// Uniform capability surface over heterogeneous pool models.
#[async_trait]
pub trait RoutablePool: Send + Sync {
    fn get_id(&self) -> u64;
    fn get_pool_denoms(&self) -> Vec<String>;
    fn get_type(&self) -> PoolFamily;
    fn get_code_id(&self) -> Option<u64>;
    fn get_spread_factor(&self) -> Decimal;
    fn get_taker_fee(&self) -> Decimal;
    fn get_token_in_denom(&self) -> &str;
    fn get_token_out_denom(&self) -> &str;
    fn set_token_in_denom(&mut self, token_in_denom: String);
    fn set_token_out_denom(&mut self, token_out_denom: String);
    fn get_balances(&self) -> Vec<Coin>;

    fn charge_taker_fee_exact_in(&self, token_in: Coin) -> Coin {
        charge_taker_fee_exact_in(token_in, self.get_taker_fee())
    }

    fn charge_taker_fee_exact_out(&self, token_in: Coin) -> Coin {
        charge_taker_fee_exact_out(token_in, self.get_taker_fee())
    }

    /// Net amount of the configured token-out for `token_in`. The taker
    /// fee has already been applied by the caller; kernels see net input.
    async fn calculate_token_out_by_token_in(
        &self,
        token_in: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError>;

    /// Amount of the configured token-in required to receive `token_out`.
    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError>;

    /// Price of one base unit denominated in the quote asset.
    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError>;
}

/// Builds the adapter for `pool`, failing when the concrete family cannot
/// be determined or required configuration is missing.
pub fn new_routable_pool(
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
    params: &CosmWasmPoolsParams,
) -> Result<Box<dyn RoutablePool>, QuoterError> {
    match &pool.state {
        PoolState::Weighted(_) => Ok(Box::new(RoutableWeightedPool::new(
            pool,
            token_in_denom,
            token_out_denom,
            taker_fee,
        ))),
        PoolState::Stableswap(_) => Ok(Box::new(RoutableStableswapPool::new(
            pool,
            token_in_denom,
            token_out_denom,
            taker_fee,
        ))),
        PoolState::Concentrated(_) => Ok(Box::new(RoutableConcentratedPool::new(
            pool,
            token_in_denom,
            token_out_denom,
            taker_fee,
        ))),
        PoolState::Transmuter(data) => {
            if !params.transmuter_code_ids.contains(&data.code_id) {
                return Err(QuoterError::UnsupportedCosmWasmCodeId {
                    pool_id: pool.id,
                    code_id: data.code_id,
                });
            }
            Ok(Box::new(RoutableTransmuterPool::new(
                pool,
                token_in_denom,
                token_out_denom,
                taker_fee,
            )))
        }
        PoolState::AlloyedTransmuter(data) => {
            if !params.alloyed_transmuter_code_ids.contains(&data.code_id) {
                return Err(QuoterError::UnsupportedCosmWasmCodeId {
                    pool_id: pool.id,
                    code_id: data.code_id,
                });
            }
            Ok(Box::new(RoutableAlloyedPool::new(
                pool,
                token_in_denom,
                token_out_denom,
                taker_fee,
            )))
        }
        PoolState::GeneralCosmWasm(data) => {
            if !params.general_cosmwasm_code_ids.contains(&data.code_id) {
                return Err(QuoterError::UnsupportedCosmWasmCodeId {
                    pool_id: pool.id,
                    code_id: data.code_id,
                });
            }
            let client = params
                .wasm_client
                .clone()
                .ok_or(QuoterError::WasmClientUnset { pool_id: pool.id })?;
            Ok(Box::new(RoutableGeneralCosmWasmPool::new(
                pool,
                token_in_denom,
                token_out_denom,
                taker_fee,
                client,
                params.scaling_factor_getter.clone(),
                params.query_timeout,
            )))
        }
    }
}

pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), QuoterError> {
    if cancel.is_cancelled() {
        Err(QuoterError::Cancelled)
    } else {
        Ok(())
    }
}

pub(crate) fn coin(amount: Uint128, denom: &str) -> Coin {
    Coin {
        denom: denom.to_string(),
        amount,
    }
}
