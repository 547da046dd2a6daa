//! Adapter for general CosmWasm pools.
//!
//! These pools have no on-host swap model; every calculation is delegated
//! to the pool contract through the [`WasmClient`]. Queries honor both the
//! request's cancellation token and a per-request deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cosmwasm_std::{Coin, Decimal};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::{GeneralCosmWasmPoolData, PoolFamily, PoolRecord, PoolState};
use crate::wasm_client::{ScalingFactorGetter, WasmClient};

use super::RoutablePool;

/// Contract query surface shared by swap-enabled CosmWasm pools.
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum PoolQueryMsg {
    CalcOutAmtGivenIn {
        token_in: Coin,
        token_out_denom: String,
        swap_fee: Decimal,
    },
    CalcInAmtGivenOut {
        token_out: Coin,
        token_in_denom: String,
        swap_fee: Decimal,
    },
    SpotPrice {
        quote_asset_denom: String,
        base_asset_denom: String,
    },
}

#[derive(Deserialize)]
struct CalcOutAmtGivenInResponse {
    token_out: Coin,
}

#[derive(Deserialize)]
struct CalcInAmtGivenOutResponse {
    token_in: Coin,
}

#[derive(Deserialize)]
struct SpotPriceResponse {
    spot_price: Decimal,
}

pub struct RoutableGeneralCosmWasmPool {
    pool: Arc<PoolRecord>,
    token_in_denom: String,
    token_out_denom: String,
    taker_fee: Decimal,
    client: Arc<dyn WasmClient>,
    scaling_factor_getter: ScalingFactorGetter,
    query_timeout: Duration,
}

impl RoutableGeneralCosmWasmPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<PoolRecord>,
        token_in_denom: String,
        token_out_denom: String,
        taker_fee: Decimal,
        client: Arc<dyn WasmClient>,
        scaling_factor_getter: ScalingFactorGetter,
        query_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            token_in_denom,
            token_out_denom,
            taker_fee,
            client,
            scaling_factor_getter,
            query_timeout,
        }
    }

    fn data(&self) -> Result<&GeneralCosmWasmPoolData, QuoterError> {
        match &self.pool.state {
            PoolState::GeneralCosmWasm(data) => Ok(data),
            _ => Err(QuoterError::InvalidPoolState {
                pool_id: self.pool.id,
            }),
        }
    }

    /// Runs one contract query under the cancellation token and the
    /// per-request deadline, then deserializes the response.
    async fn query<R: serde::de::DeserializeOwned>(
        &self,
        msg: &PoolQueryMsg,
        cancel: &CancellationToken,
    ) -> Result<R, QuoterError> {
        let pool_id = self.pool.id;
        let contract_address = self.data()?.contract_address.clone();
        let request = serde_json::to_vec(msg).map_err(|err| QuoterError::QueryFailed {
            pool_id,
            message: err.to_string(),
        })?;

        let query = self.client.query(&contract_address, &request);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QuoterError::Cancelled),
            outcome = tokio::time::timeout(self.query_timeout, query) => match outcome {
                Err(_) => {
                    return Err(QuoterError::QueryDeadlineExceeded {
                        pool_id,
                        timeout_ms: self.query_timeout.as_millis() as u64,
                    })
                }
                Ok(Err(err)) => {
                    return Err(QuoterError::QueryFailed {
                        pool_id,
                        message: err.to_string(),
                    })
                }
                Ok(Ok(bytes)) => bytes,
            },
        };

        serde_json::from_slice(&response).map_err(|err| QuoterError::QueryFailed {
            pool_id,
            message: format!("malformed contract response: {err}"),
        })
    }
}

#[async_trait]
impl RoutablePool for RoutableGeneralCosmWasmPool {
    fn get_id(&self) -> u64 {
        self.pool.id
    }

    fn get_pool_denoms(&self) -> Vec<String> {
        self.pool.denoms.clone()
    }

    fn get_type(&self) -> PoolFamily {
        PoolFamily::CosmWasmGeneral
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
        let msg = PoolQueryMsg::CalcOutAmtGivenIn {
            token_in: token_in.clone(),
            token_out_denom: self.token_out_denom.clone(),
            swap_fee: self.pool.spread_factor,
        };
        let response: CalcOutAmtGivenInResponse = self.query(&msg, cancel).await?;
        Ok(response.token_out)
    }

    async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        let msg = PoolQueryMsg::CalcInAmtGivenOut {
            token_out: token_out.clone(),
            token_in_denom: self.token_in_denom.clone(),
            swap_fee: self.pool.spread_factor,
        };
        let response: CalcInAmtGivenOutResponse = self.query(&msg, cancel).await?;
        Ok(response.token_in)
    }

    async fn calc_spot_price(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<BigDec, QuoterError> {
        let msg = PoolQueryMsg::SpotPrice {
            quote_asset_denom: quote_denom.to_string(),
            base_asset_denom: base_denom.to_string(),
        };
        let cancel = CancellationToken::new();
        let response: SpotPriceResponse = self.query(&msg, &cancel).await?;
        let mut price = BigDec::from_decimal(response.spot_price);

        // Contracts quote in on-chain base units; when a scaling factor
        // source is wired up, rescale to the (base, quote) pair's basis.
        match (self.scaling_factor_getter)(self.pool.id) {
            Ok(factors) if factors.len() >= 2 && factors[1] != 0 => {
                price = price
                    .checked_mul(BigDec::from_u64(factors[0]))?
                    .checked_div(BigDec::from_u64(factors[1]))?;
            }
            Ok(_) => {}
            Err(QuoterError::ScalingFactorGetterUnset { .. }) => {}
            Err(err) => return Err(err),
        }
        Ok(price)
    }
}
