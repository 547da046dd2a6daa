//! Routing primitives: candidate routes and the materialised [`Route`].
//!
//! Candidate routes are cheap `(pool id, token out)` paths produced by the
//! searcher and cached by denom pair. A [`Route`] is the request-scoped
//! materialisation: one routable adapter per hop, chained so each hop's
//! output denom feeds the next hop's input.

use std::collections::BTreeSet;
use std::fmt;

use cosmwasm_std::{Coin, Decimal, Uint128};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::bigdec::BigDec;
use crate::errors::QuoterError;
use crate::pools::PoolFamily;
use crate::routable::RoutablePool;

/// One hop of a candidate route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePool {
    pub id: u64,
    pub token_out_denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateRoute {
    pub pools: Vec<CandidatePool>,
    pub is_canonical_orderbook_route: bool,
}

impl CandidateRoute {
    /// Stable identifier built from the pool ids along the route.
    pub fn route_key(&self) -> String {
        self.pools
            .iter()
            .map(|pool| pool.id.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Validated candidate route set for one denom pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateRoutes {
    pub routes: Vec<CandidateRoute>,
    pub unique_pool_ids: BTreeSet<u64>,
    pub contains_canonical_orderbook: bool,
}

impl CandidateRoutes {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Search output prior to validation; carries the pool denoms the
/// validator needs for its denom-consistency checks.
#[derive(Debug, Clone)]
pub struct CandidatePoolDraft {
    pub id: u64,
    pub token_out_denom: String,
    pub pool_denoms: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateRouteDraft {
    pub pools: Vec<CandidatePoolDraft>,
    pub is_canonical_orderbook_route: bool,
}

/// Pool snapshot embedded in the quote response.
#[derive(Debug, Clone, Serialize)]
pub struct ResultPool {
    pub id: u64,
    #[serde(rename = "type")]
    pub family: PoolFamily,
    pub balances: Vec<Coin>,
    pub spread_factor: Decimal,
    pub taker_fee: Decimal,
    pub token_in_denom: String,
    pub token_out_denom: String,
}

/// One route of a (possibly split) quote.
#[derive(Debug, Clone, Serialize)]
pub struct SplitRouteResult {
    pub pools: Vec<ResultPool>,
    pub in_amount: Uint128,
    pub out_amount: Uint128,
}

/// A materialised multi-hop route.
pub struct Route {
    pools: Vec<Box<dyn RoutablePool>>,
    is_canonical_orderbook_route: bool,
}

impl Route {
    pub fn new(pools: Vec<Box<dyn RoutablePool>>, is_canonical_orderbook_route: bool) -> Self {
        Self {
            pools,
            is_canonical_orderbook_route,
        }
    }

    pub fn pools(&self) -> &[Box<dyn RoutablePool>] {
        &self.pools
    }

    pub fn is_canonical_orderbook_route(&self) -> bool {
        self.is_canonical_orderbook_route
    }

    pub fn pool_ids(&self) -> Vec<u64> {
        self.pools.iter().map(|pool| pool.get_id()).collect()
    }

    pub fn token_in_denom(&self) -> &str {
        self.pools
            .first()
            .map(|pool| pool.get_token_in_denom())
            .unwrap_or_default()
    }

    pub fn token_out_denom(&self) -> &str {
        self.pools
            .last()
            .map(|pool| pool.get_token_out_denom())
            .unwrap_or_default()
    }

    /// Chains the hops left to right: taker fee on the way into each hop,
    /// then the pool kernel on the net amount.
    pub async fn calculate_token_out_by_token_in(
        &self,
        token_in: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        let mut token = token_in.clone();
        for pool in &self.pools {
            if cancel.is_cancelled() {
                return Err(QuoterError::Cancelled);
            }
            let after_fee = pool.charge_taker_fee_exact_in(token);
            token = pool.calculate_token_out_by_token_in(&after_fee, cancel).await?;
        }
        Ok(token)
    }

    /// Chains the hops right to left for exact-out quoting; the taker fee
    /// is grossed back up after each hop's kernel.
    pub async fn calculate_token_in_by_token_out(
        &self,
        token_out: &Coin,
        cancel: &CancellationToken,
    ) -> Result<Coin, QuoterError> {
        let mut token = token_out.clone();
        for pool in self.pools.iter().rev() {
            if cancel.is_cancelled() {
                return Err(QuoterError::Cancelled);
            }
            let required_in = pool.calculate_token_in_by_token_out(&token, cancel).await?;
            token = pool.charge_taker_fee_exact_out(required_in);
        }
        Ok(token)
    }

    /// Total route fee: `1 - Π (1 - takerFee_h)(1 - spread_h)`.
    pub fn fee(&self) -> Decimal {
        let one = Decimal::one();
        let mut keep = one;
        for pool in &self.pools {
            let taker_keep = one.checked_sub(pool.get_taker_fee()).unwrap_or_default();
            let spread_keep = one.checked_sub(pool.get_spread_factor()).unwrap_or_default();
            keep = keep * taker_keep * spread_keep;
        }
        one.checked_sub(keep).unwrap_or_default()
    }

    /// Product of per-hop spot prices for the route's in/out orientation.
    pub async fn spot_price(&self) -> Result<BigDec, QuoterError> {
        let mut price = BigDec::one();
        for pool in &self.pools {
            let hop_price = pool
                .calc_spot_price(pool.get_token_in_denom(), pool.get_token_out_denom())
                .await?;
            price = price.checked_mul(hop_price)?;
        }
        Ok(price)
    }

    pub fn result_pools(&self) -> Vec<ResultPool> {
        self.pools
            .iter()
            .map(|pool| ResultPool {
                id: pool.get_id(),
                family: pool.get_type(),
                balances: pool.get_balances(),
                spread_factor: pool.get_spread_factor(),
                taker_fee: pool.get_taker_fee(),
                token_in_denom: pool.get_token_in_denom().to_string(),
                token_out_denom: pool.get_token_out_denom().to_string(),
            })
            .collect()
    }

    pub fn to_candidate_route(&self) -> CandidateRoute {
        CandidateRoute {
            pools: self
                .pools
                .iter()
                .map(|pool| CandidatePool {
                    id: pool.get_id(),
                    token_out_denom: pool.get_token_out_denom().to_string(),
                })
                .collect(),
            is_canonical_orderbook_route: self.is_canonical_orderbook_route,
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pools", &self.pool_ids())
            .field("token_out_denom", &self.token_out_denom())
            .finish()
    }
}

/// A route annotated with its evaluated amounts.
pub struct RouteWithAmounts {
    pub route: Route,
    pub in_amount: Uint128,
    pub out_amount: Uint128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_route_key_joins_pool_ids() {
        let route = CandidateRoute {
            pools: vec![
                CandidatePool {
                    id: 3,
                    token_out_denom: "uatom".to_string(),
                },
                CandidatePool {
                    id: 8,
                    token_out_denom: "uusdc".to_string(),
                },
            ],
            is_canonical_orderbook_route: false,
        };
        assert_eq!(route.route_key(), "3-8");
    }

    #[test]
    fn candidate_routes_default_is_empty() {
        let routes = CandidateRoutes::default();
        assert!(routes.is_empty());
        assert!(!routes.contains_canonical_orderbook);
    }
}
