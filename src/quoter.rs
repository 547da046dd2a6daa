//! Quote estimation, ranking, and splitting.
//!
//! The quoter fronts the whole pipeline: it consults the ranked route
//! cache, falls back to the candidate cache and the searcher, estimates
//! every materialised route, ranks by amount out, optionally splits the
//! input across routes with a coarse-grid dynamic program, and finalises
//! the quote document with effective fee and price impact.
//!
//! When every route of a pair fails estimation, both cache tiers for that
//! pair are invalidated before the first error is returned: a drained
//! pool may have poisoned the cached routes, and recomputing from scratch
//! can route around it through a different intermediate denom.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cosmwasm_std::{Coin, Decimal, SignedDecimal, Uint128};
use log::debug;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bigdec::BigDec;
use crate::cache::{
    format_candidate_route_cache_key, format_ranked_route_cache_key, order_of_magnitude, TtlCache,
};
use crate::candidate_search::find_candidate_routes;
use crate::errors::QuoterError;
use crate::metrics;
use crate::registry::PoolRegistry;
use crate::route::{CandidateRoutes, Route, RouteWithAmounts, SplitRouteResult};
use crate::settings::{CacheSettings, RouterSettings};
use crate::validator::validate_and_filter_routes;

/// Split quoting evaluates the input in tenths.
const SPLIT_GRID_UNITS: usize = 10;

/// Finalised quote document.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub amount_in: Coin,
    pub amount_out: Uint128,
    pub route: Vec<SplitRouteResult>,
    pub effective_fee: Decimal,
    pub price_impact: SignedDecimal,
}

/// One chosen allocation: route index, amount in, amount out.
type SplitAllocation = (usize, Uint128, Uint128);

pub struct Quoter {
    registry: Arc<PoolRegistry>,
    router_settings: RouterSettings,
    candidate_route_cache: TtlCache<CandidateRoutes>,
    ranked_route_cache: TtlCache<CandidateRoutes>,
    candidate_cache_ttl: Duration,
    ranked_cache_ttl: Duration,
}

impl Quoter {
    pub fn new(
        registry: Arc<PoolRegistry>,
        router_settings: RouterSettings,
        cache_settings: &CacheSettings,
    ) -> Self {
        Self {
            registry,
            router_settings,
            candidate_route_cache: TtlCache::new(),
            ranked_route_cache: TtlCache::new(),
            candidate_cache_ttl: cache_settings.candidate_route_cache_ttl(),
            ranked_cache_ttl: cache_settings.ranked_route_cache_ttl(),
        }
    }

    /// Computes the best quote for swapping `token_in` into
    /// `token_out_denom`.
    pub async fn get_quote(
        &self,
        token_in: Coin,
        token_out_denom: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, QuoterError> {
        if token_in.amount.is_zero() {
            return Err(QuoterError::ZeroTokenInAmount {
                denom: token_in.denom,
            });
        }
        if token_in.denom == token_out_denom {
            return Err(QuoterError::TokenOutDenomMatchesTokenInDenom {
                denom: token_in.denom,
            });
        }

        let magnitude = order_of_magnitude(token_in.amount);
        let ranked_key =
            format_ranked_route_cache_key(&token_in.denom, token_out_denom, magnitude);

        let ranked = match self.ranked_route_cache.get(&ranked_key) {
            Some(cached) => {
                metrics::record_cache_hit("ranked");
                let routes = self
                    .registry
                    .get_routes_from_candidates(&cached, &token_in.denom);
                self.estimate_and_rank_single_route_quote(routes, &token_in, token_out_denom, cancel)
                    .await?
            }
            None => {
                metrics::record_cache_miss("ranked");
                let candidates = self
                    .handle_candidate_routes(&token_in, token_out_denom, cancel)
                    .await?;
                self.rank_routes_by_direct_quote(&candidates, &token_in, token_out_denom, cancel)
                    .await?
            }
        };

        self.build_final_quote(ranked, token_in, cancel).await
    }

    /// Candidate routes for the pair: cache tier first, then search plus
    /// validation.
    pub async fn handle_candidate_routes(
        &self,
        token_in: &Coin,
        token_out_denom: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateRoutes, QuoterError> {
        if cancel.is_cancelled() {
            return Err(QuoterError::Cancelled);
        }
        let key = format_candidate_route_cache_key(&token_in.denom, token_out_denom);
        if let Some(cached) = self.candidate_route_cache.get(&key) {
            metrics::record_cache_hit("candidate");
            return Ok(cached);
        }
        metrics::record_cache_miss("candidate");

        let drafts = find_candidate_routes(
            &self.registry,
            &token_in.denom,
            token_out_denom,
            &self.router_settings.search_options(),
        );
        let validated = validate_and_filter_routes(&drafts, &token_in.denom)?;
        if !validated.is_empty() {
            self.candidate_route_cache
                .set(key, validated.clone(), self.candidate_cache_ttl);
        }
        Ok(validated)
    }

    /// Materialises, estimates, ranks, and records the ranking in the
    /// ranked cache bucketed by the input's order of magnitude.
    async fn rank_routes_by_direct_quote(
        &self,
        candidates: &CandidateRoutes,
        token_in: &Coin,
        token_out_denom: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RouteWithAmounts>, QuoterError> {
        let routes = self
            .registry
            .get_routes_from_candidates(candidates, &token_in.denom);
        let ranked = self
            .estimate_and_rank_single_route_quote(routes, token_in, token_out_denom, cancel)
            .await?;

        let magnitude = order_of_magnitude(token_in.amount);
        self.ranked_route_cache.set(
            format_ranked_route_cache_key(&token_in.denom, token_out_denom, magnitude),
            convert_ranked_to_candidate_routes(&ranked),
            self.ranked_cache_ttl,
        );
        Ok(ranked)
    }

    /// Evaluates each route on the full input and sorts by amount out
    /// descending. Routes that fail are skipped with the first error
    /// retained; if all fail, both cache tiers for the pair are
    /// invalidated and that error is returned.
    async fn estimate_and_rank_single_route_quote(
        &self,
        routes: Vec<Route>,
        token_in: &Coin,
        token_out_denom: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RouteWithAmounts>, QuoterError> {
        if routes.is_empty() {
            return Err(QuoterError::NoRoutes {
                token_in_denom: token_in.denom.clone(),
            });
        }

        let mut ranked: Vec<RouteWithAmounts> = Vec::with_capacity(routes.len());
        let mut first_error: Option<QuoterError> = None;

        for route in routes {
            match route.calculate_token_out_by_token_in(token_in, cancel).await {
                Ok(token_out) => ranked.push(RouteWithAmounts {
                    route,
                    in_amount: token_in.amount,
                    out_amount: token_out.amount,
                }),
                Err(QuoterError::Cancelled) => return Err(QuoterError::Cancelled),
                Err(err) => {
                    debug!("skipping single route due to error in estimate: {err}");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if ranked.is_empty() {
            let magnitude = order_of_magnitude(token_in.amount);
            self.candidate_route_cache
                .delete(&format_candidate_route_cache_key(
                    &token_in.denom,
                    token_out_denom,
                ));
            self.ranked_route_cache
                .delete(&format_ranked_route_cache_key(
                    &token_in.denom,
                    token_out_denom,
                    magnitude,
                ));
            metrics::record_cache_invalidation();
            warn!(
                token_in_denom = %token_in.denom,
                token_out_denom,
                "all routes failed estimation; invalidated route caches for pair"
            );
            return Err(first_error.unwrap_or(QuoterError::NoRoutes {
                token_in_denom: token_in.denom.clone(),
            }));
        }

        ranked.sort_by(|a, b| b.out_amount.cmp(&a.out_amount));
        Ok(ranked)
    }

    /// Picks single-route vs split by total amount out and assembles the
    /// final document.
    async fn build_final_quote(
        &self,
        ranked: Vec<RouteWithAmounts>,
        token_in: Coin,
        cancel: &CancellationToken,
    ) -> Result<Quote, QuoterError> {
        let best_single_out = ranked
            .first()
            .map(|route| route.out_amount)
            .unwrap_or_default();

        let cut = cut_routes_for_splits(self.router_settings.max_split_routes, ranked);
        let filtered = filter_duplicate_pool_id_routes(cut);

        let allocations: Vec<SplitAllocation> = if filtered.len() > 1 {
            let (split_allocations, split_total) =
                self.get_split_quote(&filtered, &token_in, cancel).await?;
            if split_total > best_single_out {
                split_allocations
            } else {
                vec![(0, token_in.amount, best_single_out)]
            }
        } else {
            vec![(0, token_in.amount, best_single_out)]
        };

        let mut amount_out = Uint128::zero();
        let mut route_results = Vec::with_capacity(allocations.len());
        let mut effective_fee = Decimal::zero();
        let mut expected_out_at_spot = BigDec::zero();

        for (route_index, in_amount, out_amount) in &allocations {
            let route = &filtered[*route_index].route;
            amount_out = amount_out.checked_add(*out_amount)?;

            let in_share = Decimal::from_ratio(*in_amount, token_in.amount);
            effective_fee = effective_fee.checked_add(in_share * route.fee())?;

            match route.spot_price().await {
                Ok(spot) => {
                    let expected = BigDec::from_uint128(*in_amount).checked_mul(spot)?;
                    expected_out_at_spot = expected_out_at_spot.checked_add(expected)?;
                }
                Err(err) => {
                    // without a spot price this allocation contributes no
                    // measurable impact
                    debug!("spot price unavailable for route: {err}");
                    expected_out_at_spot =
                        expected_out_at_spot.checked_add(BigDec::from_uint128(*out_amount))?;
                }
            }

            route_results.push(SplitRouteResult {
                pools: route.result_pools(),
                in_amount: *in_amount,
                out_amount: *out_amount,
            });
        }

        Ok(Quote {
            amount_in: token_in,
            amount_out,
            route: route_results,
            effective_fee,
            price_impact: compute_price_impact(amount_out, expected_out_at_spot),
        })
    }

    /// Discrete split search: every route is evaluated at each tenth of
    /// the input, then a dynamic program over route index x remaining
    /// grid units picks the combination with the maximal total out.
    async fn get_split_quote(
        &self,
        routes: &[RouteWithAmounts],
        token_in: &Coin,
        cancel: &CancellationToken,
    ) -> Result<(Vec<SplitAllocation>, Uint128), QuoterError> {
        let units = SPLIT_GRID_UNITS;

        let mut grid_outs: Vec<Vec<Uint128>> = Vec::with_capacity(routes.len());
        for route in routes {
            let mut outs = Vec::with_capacity(units + 1);
            outs.push(Uint128::zero());
            for unit in 1..=units {
                if cancel.is_cancelled() {
                    return Err(QuoterError::Cancelled);
                }
                let in_amount = token_in
                    .amount
                    .multiply_ratio(unit as u128, units as u128);
                if in_amount.is_zero() {
                    outs.push(Uint128::zero());
                    continue;
                }
                let grid_in = Coin {
                    denom: token_in.denom.clone(),
                    amount: in_amount,
                };
                let out = match route
                    .route
                    .calculate_token_out_by_token_in(&grid_in, cancel)
                    .await
                {
                    Ok(token_out) => token_out.amount,
                    Err(QuoterError::Cancelled) => return Err(QuoterError::Cancelled),
                    Err(err) => {
                        debug!("split grid point failed, treated as zero out: {err}");
                        Uint128::zero()
                    }
                };
                outs.push(out);
            }
            grid_outs.push(outs);
        }

        // dp[j]: best total out with j grid units consumed so far
        let mut dp: Vec<Option<Uint128>> = vec![None; units + 1];
        dp[0] = Some(Uint128::zero());
        let mut choices: Vec<Vec<usize>> = vec![vec![0; units + 1]; routes.len()];

        for (route_index, outs) in grid_outs.iter().enumerate() {
            let mut next: Vec<Option<Uint128>> = vec![None; units + 1];
            for consumed in 0..=units {
                for allocation in 0..=consumed {
                    let Some(base) = dp[consumed - allocation] else {
                        continue;
                    };
                    let total = base.checked_add(outs[allocation])?;
                    if next[consumed].map_or(true, |current| total > current) {
                        next[consumed] = Some(total);
                        choices[route_index][consumed] = allocation;
                    }
                }
            }
            dp = next;
        }

        let total_out = dp[units].unwrap_or_default();

        // walk the choice table backwards to recover per-route units
        let mut allocations: Vec<SplitAllocation> = Vec::new();
        let mut remaining = units;
        let mut unit_allocations = vec![0usize; routes.len()];
        for route_index in (0..routes.len()).rev() {
            let allocated = choices[route_index][remaining];
            unit_allocations[route_index] = allocated;
            remaining -= allocated;
        }

        let mut assigned_in = Uint128::zero();
        for (route_index, allocated_units) in unit_allocations.iter().enumerate() {
            if *allocated_units == 0 {
                continue;
            }
            let in_amount = token_in
                .amount
                .multiply_ratio(*allocated_units as u128, units as u128);
            assigned_in = assigned_in.checked_add(in_amount)?;
            allocations.push((
                route_index,
                in_amount,
                grid_outs[route_index][*allocated_units],
            ));
        }

        // grid truncation dust goes to the largest allocation so the
        // split consumes the full input
        let dust = token_in.amount.saturating_sub(assigned_in);
        if !dust.is_zero() {
            if let Some(largest) = allocations.iter_mut().max_by_key(|(_, in_amount, _)| *in_amount)
            {
                largest.1 = largest.1.checked_add(dust)?;
            }
        }

        Ok((allocations, total_out))
    }
}

/// First-come-first-kept filter: a route sharing any pool id with a
/// higher-ranked kept route is dropped.
fn filter_duplicate_pool_id_routes(ranked: Vec<RouteWithAmounts>) -> Vec<RouteWithAmounts> {
    let mut seen_pool_ids: HashSet<u64> = HashSet::new();
    let mut kept = Vec::with_capacity(ranked.len());
    for route in ranked {
        let pool_ids = route.route.pool_ids();
        if pool_ids.iter().any(|id| seen_pool_ids.contains(id)) {
            continue;
        }
        seen_pool_ids.extend(pool_ids);
        kept.push(route);
    }
    kept
}

fn cut_routes_for_splits(
    max_split_routes: usize,
    mut routes: Vec<RouteWithAmounts>,
) -> Vec<RouteWithAmounts> {
    routes.truncate(max_split_routes);
    routes
}

fn convert_ranked_to_candidate_routes(ranked: &[RouteWithAmounts]) -> CandidateRoutes {
    let mut unique_pool_ids: BTreeSet<u64> = BTreeSet::new();
    let mut contains_canonical_orderbook = false;
    let mut routes = Vec::with_capacity(ranked.len());
    for route in ranked {
        unique_pool_ids.extend(route.route.pool_ids());
        contains_canonical_orderbook =
            contains_canonical_orderbook || route.route.is_canonical_orderbook_route();
        routes.push(route.route.to_candidate_route());
    }
    CandidateRoutes {
        routes,
        unique_pool_ids,
        contains_canonical_orderbook,
    }
}

/// `execution / expected - 1`, clamped into the signed 18-digit range.
fn compute_price_impact(execution_out: Uint128, expected_out_at_spot: BigDec) -> SignedDecimal {
    if expected_out_at_spot.is_zero() {
        return SignedDecimal::zero();
    }
    let execution = BigDec::from_uint128(execution_out);
    let (numerator, negative) = if execution >= expected_out_at_spot {
        (execution.saturating_sub(expected_out_at_spot), false)
    } else {
        (expected_out_at_spot.saturating_sub(execution), true)
    };
    let magnitude = numerator
        .checked_div(expected_out_at_spot)
        .and_then(|ratio| ratio.to_decimal_floor())
        .unwrap_or(Decimal::zero());
    let magnitude = SignedDecimal::try_from(magnitude).unwrap_or(SignedDecimal::MAX);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::{PoolRecord, PoolState, TransmuterPoolData, WeightedPoolData};
    use crate::routable::CosmWasmPoolsParams;
    use cosmwasm_std::coin;
    use std::collections::BTreeMap;

    fn weighted_pool(id: u64, denom_a: &str, denom_b: &str, balance: u128) -> PoolRecord {
        PoolRecord {
            id,
            denoms: vec![denom_a.to_string(), denom_b.to_string()],
            balances: vec![coin(balance, denom_a), coin(balance, denom_b)],
            spread_factor: Decimal::zero(),
            liquidity_cap: Some(Uint128::new(balance)),
            has_market_incentives: false,
            state: PoolState::Weighted(WeightedPoolData {
                weights: BTreeMap::from([
                    (denom_a.to_string(), Uint128::one()),
                    (denom_b.to_string(), Uint128::one()),
                ]),
            }),
        }
    }

    fn transmuter_pool(id: u64, denom_a: &str, balance_a: u128, denom_b: &str, balance_b: u128) -> PoolRecord {
        PoolRecord {
            id,
            denoms: vec![denom_a.to_string(), denom_b.to_string()],
            balances: vec![coin(balance_a, denom_a), coin(balance_b, denom_b)],
            spread_factor: Decimal::zero(),
            liquidity_cap: Some(Uint128::new(balance_a + balance_b)),
            has_market_incentives: false,
            state: PoolState::Transmuter(TransmuterPoolData {
                code_id: 148,
                contract_address: format!("osmo1transmuter{id}"),
            }),
        }
    }

    fn quoter_with(pools: Vec<PoolRecord>) -> Quoter {
        let params = CosmWasmPoolsParams {
            transmuter_code_ids: [148].into(),
            ..Default::default()
        };
        let registry = Arc::new(PoolRegistry::new(Decimal::zero(), params));
        registry.store_pools(pools);
        Quoter::new(registry, RouterSettings::default(), &CacheSettings::default())
    }

    #[tokio::test]
    async fn direct_quote_through_single_pool() {
        let quoter = quoter_with(vec![weighted_pool(1, "uosmo", "uatom", 1000)]);
        let cancel = CancellationToken::new();
        let quote = quoter
            .get_quote(coin(100, "uosmo"), "uatom", &cancel)
            .await
            .unwrap();
        assert_eq!(quote.amount_out, Uint128::new(90));
        assert_eq!(quote.route.len(), 1);
        assert_eq!(quote.route[0].pools[0].id, 1);
        assert_eq!(quote.route[0].in_amount, Uint128::new(100));
        // slippage shows up as negative price impact
        assert!(quote.price_impact < SignedDecimal::zero());
    }

    #[tokio::test]
    async fn split_across_parallel_pools_beats_single_route() {
        let quoter = quoter_with(vec![
            weighted_pool(1, "uosmo", "uatom", 1000),
            weighted_pool(2, "uosmo", "uatom", 1000),
        ]);
        let cancel = CancellationToken::new();
        let quote = quoter
            .get_quote(coin(100, "uosmo"), "uatom", &cancel)
            .await
            .unwrap();

        // a single pool yields 90; a 50/50 split yields 47 + 47 = 94
        assert!(quote.amount_out > Uint128::new(90));
        assert_eq!(quote.route.len(), 2);
        let total_in: Uint128 = quote
            .route
            .iter()
            .map(|split| split.in_amount)
            .sum();
        assert_eq!(total_in, Uint128::new(100));
    }

    #[tokio::test]
    async fn split_never_below_best_single_route() {
        // second pool is tiny; the optimal play is no split at all
        let quoter = quoter_with(vec![
            weighted_pool(1, "uosmo", "uatom", 1_000_000),
            weighted_pool(2, "uosmo", "uatom", 10),
        ]);
        let cancel = CancellationToken::new();
        let quote = quoter
            .get_quote(coin(10_000, "uosmo"), "uatom", &cancel)
            .await
            .unwrap();
        assert_eq!(quote.route.len(), 1);
        assert_eq!(quote.route[0].pools[0].id, 1);
    }

    #[tokio::test]
    async fn zero_amount_and_same_denom_are_rejected() {
        let quoter = quoter_with(vec![weighted_pool(1, "uosmo", "uatom", 1000)]);
        let cancel = CancellationToken::new();

        let err = quoter
            .get_quote(coin(0, "uosmo"), "uatom", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoterError::ZeroTokenInAmount { .. }));

        let err = quoter
            .get_quote(coin(100, "uosmo"), "uosmo", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::TokenOutDenomMatchesTokenInDenom { .. }
        ));
    }

    #[tokio::test]
    async fn no_routes_is_an_error() {
        let quoter = quoter_with(vec![weighted_pool(1, "uosmo", "uatom", 1000)]);
        let cancel = CancellationToken::new();
        let err = quoter
            .get_quote(coin(100, "uosmo"), "uusdc", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoterError::NoRoutes { .. }));
    }

    #[tokio::test]
    async fn total_estimation_failure_invalidates_both_cache_tiers() {
        // the only route is a transmuter without enough output balance, so
        // every estimation fails
        let quoter = quoter_with(vec![transmuter_pool(1, "usdc", 500, "eth", 499)]);
        let cancel = CancellationToken::new();

        let err = quoter
            .get_quote(coin(500, "usdc"), "eth", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuoterError::TransmuterInsufficientBalance { .. }
        ));

        let candidate_key = format_candidate_route_cache_key("usdc", "eth");
        let ranked_key =
            format_ranked_route_cache_key("usdc", "eth", order_of_magnitude(Uint128::new(500)));
        assert!(!quoter.candidate_route_cache.contains(&candidate_key));
        assert!(!quoter.ranked_route_cache.contains(&ranked_key));
    }

    #[tokio::test]
    async fn successful_quote_populates_both_cache_tiers() {
        let quoter = quoter_with(vec![weighted_pool(1, "uosmo", "uatom", 1000)]);
        let cancel = CancellationToken::new();
        quoter
            .get_quote(coin(100, "uosmo"), "uatom", &cancel)
            .await
            .unwrap();

        let candidate_key = format_candidate_route_cache_key("uosmo", "uatom");
        let ranked_key =
            format_ranked_route_cache_key("uosmo", "uatom", order_of_magnitude(Uint128::new(100)));
        assert!(quoter.candidate_route_cache.contains(&candidate_key));
        assert!(quoter.ranked_route_cache.contains(&ranked_key));

        // second request of the same magnitude is served from the ranked
        // cache and produces the identical quote
        let quote = quoter
            .get_quote(coin(100, "uosmo"), "uatom", &cancel)
            .await
            .unwrap();
        assert_eq!(quote.amount_out, Uint128::new(90));
    }

    #[tokio::test]
    async fn cancellation_is_propagated() {
        let quoter = quoter_with(vec![weighted_pool(1, "uosmo", "uatom", 1000)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = quoter
            .get_quote(coin(100, "uosmo"), "uatom", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, QuoterError::Cancelled));
    }

    #[tokio::test]
    async fn transmuter_identity_scenario() {
        let quoter = quoter_with(vec![transmuter_pool(1, "usdc", 1000, "eth", 1000)]);
        let cancel = CancellationToken::new();
        let quote = quoter
            .get_quote(coin(500, "usdc"), "eth", &cancel)
            .await
            .unwrap();
        assert_eq!(quote.amount_out, Uint128::new(500));
        assert_eq!(quote.effective_fee, Decimal::zero());
    }

    #[test]
    fn cut_routes_handles_empty_input() {
        let routes: Vec<RouteWithAmounts> = Vec::new();
        assert!(cut_routes_for_splits(3, routes).is_empty());
    }

    #[test]
    fn price_impact_sign() {
        // execution below spot expectation is negative impact
        let impact = compute_price_impact(Uint128::new(90), BigDec::from_uint128(Uint128::new(100)));
        assert!(impact < SignedDecimal::zero());
        // matching expectation is zero
        let impact =
            compute_price_impact(Uint128::new(100), BigDec::from_uint128(Uint128::new(100)));
        assert_eq!(impact, SignedDecimal::zero());
    }
}
