//! Adapter for plain fixed-ratio (transmuter) pools.
//!
//! Swaps are one-to-one with no spread; the only constraint is that the
//! pool actually holds enough of the output denom.

use std::sync::Arc;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal, Uint128};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{PoolFamily, PoolRecord, PoolState};

use super::{coin, ensure_not_cancelled, RoutablePool};

pub struct RoutableTransmuterPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
}

impl RoutableTransmuterPool {
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
}

/// Errors when the pool's balance of `denom_to_validate` cannot cover
/// `amount`.
pub(crate) fn validate_transmuter_balance(
    amount: Uint128,
    balances: &[Coin],
    denom_to_validate: &str,
) -> Result<(), QuoterError> {
    let balance = crate::pools::amount_of(balances, denom_to_validate);
    if amount > balance {
        return Err(QuoterError::TransmuterInsufficientBalance {
            denom: denom_to_validate.to_string(),
            balance: balance.to_string(),
            requested: amount.to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl RoutablePool for RoutableTransmuterPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        self.pool.denoms.clone()
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::CosmWasmTransmuter
    }

    fn get_code_id(&self) -> Option<u64> {
        self.pool.code_id()
    }

    fn get_spread_factor(&self) -> Decimal {
        Decimal::zero()
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
        validate_transmuter_balance(token_in.amount, &self.pool.balances, &self.token_out_denom)?;
        Ok(coin(token_in.amount, &self.token_out_denom))
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        ensure_not_cancelled(cancel)?;
        validate_transmuter_balance(token_out.amount, &self.pool.balances, &self.token_in_denom)?;
        Ok(coin(token_out.amount, &self.token_in_denom))
    }

    async fn calc_spot_price(
        &self,
        _base_denom: &str,
        _quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        Ok(BigDec::one())
    }
}
