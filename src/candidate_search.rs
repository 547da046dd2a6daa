//! Candidate route search.
//!
//! Bounded breadth-first traversal of the denom → pools graph. Starting
//! from the token-in denom, each partial path is extended one pool at a
//! time; a pool that introduces the token-out denom completes the path.
//! Pools are visited in a stable order: preferred pool ids first, then by
//! descending liquidity weight with a boost for concentrated pools and
//! configured transmuters, ties broken by pool id. The search stops once
//! `max_routes` routes are accepted or the frontier is exhausted at
//! `max_pools_per_route` depth.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use cosmwasm_std::Uint128;
use log::{debug, warn};

use crate::errors::QuoterError;
use crate::pools::{PoolFamily, PoolRecord};
use crate::registry::PoolRegistry;
use crate::route::{CandidatePoolDraft, CandidateRouteDraft};

const CONCENTRATED_POOL_WEIGHT_BOOST: f64 = 1.5;
const TRANSMUTER_POOL_WEIGHT_BOOST: f64 = 1.25;

#[derive(Debug, Clone)]
pub struct CandidateRouteSearchOptions {
    pub max_routes: usize,
    pub max_pools_per_route: usize,
    pub min_pool_liquidity_cap: u64,
    pub preferred_pool_ids: Vec<u64>,
}

impl Default for CandidateRouteSearchOptions {
    fn default() -> Self {
        Self {
            max_routes: 5,
            max_pools_per_route: 4,
            min_pool_liquidity_cap: 0,
            preferred_pool_ids: Vec::new(),
        }
    }
}

struct SearchPath {
    last_denom: String,
    pools: Vec<CandidatePoolDraft>,
    visited_pool_ids: HashSet<u64>,
    visited_denoms: HashSet<String>,
}

/// Mantissa-based lossy conversion; precise enough for ordering.
fn uint128_to_f64_lossy(value: Uint128) -> f64 {
    if value.is_zero() {
        return 0.0;
    }
    let s = value.to_string();
    let len = s.len();
    let take = len.min(15);
    let mantissa: f64 = s[..take].parse().unwrap_or(0.0);
    mantissa * 10f64.powi((len - take) as i32)
}

/// Liquidity-derived sort weight with family boosts.
fn pool_rating(pool: &PoolRecord, transmuter_code_ids: &HashSet<u64>) -> f64 {
    let cap = match pool.liquidity_cap {
        Some(cap) => uint128_to_f64_lossy(cap),
        None => {
            warn!(
                "pool ordering: {}",
                QuoterError::NoPoolLiquidityCap { pool_id: pool.id }
            );
            0.0
        }
    };
    let boost = match pool.family() {
        PoolFamily::Concentrated => CONCENTRATED_POOL_WEIGHT_BOOST,
        PoolFamily::CosmWasmTransmuter | PoolFamily::CosmWasmAlloyedTransmuter => {
            match pool.code_id() {
                Some(code_id) if transmuter_code_ids.contains(&code_id) => {
                    TRANSMUTER_POOL_WEIGHT_BOOST
                }
                _ => 1.0,
            }
        }
        _ => 1.0,
    };
    cap * boost
}

/// Stable visiting order: preferred first, then rating descending, then
/// pool id ascending.
fn sort_pools(
    pools: &mut Vec<Arc<PoolRecord>>,
    preferred_pool_ids: &HashSet<u64>,
    transmuter_code_ids: &HashSet<u64>,
) {
    let mut rated: Vec<(bool, f64, Arc<PoolRecord>)> = pools
        .drain(..)
        .map(|pool| {
            let preferred = preferred_pool_ids.contains(&pool.id);
            let rating = pool_rating(&pool, transmuter_code_ids);
            (preferred, rating, pool)
        })
        .collect();
    rated.sort_unstable_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.total_cmp(&a.1))
            .then_with(|| a.2.id.cmp(&b.2.id))
    });
    pools.extend(rated.into_iter().map(|(_, _, pool)| pool));
}

/// Finds up to `max_routes` candidate paths from `token_in_denom` to
/// `token_out_denom`.
pub fn find_candidate_routes(
    registry: &PoolRegistry,
    token_in_denom: &str,
    token_out_denom: &str,
    opts: &CandidateRouteSearchOptions,
) -> Vec<CandidateRouteDraft> {
    let snapshot = registry.snapshot();
    let preferred: HashSet<u64> = opts.preferred_pool_ids.iter().copied().collect();
    let params = registry.routable_params();
    let transmuter_code_ids: HashSet<u64> = params
        .transmuter_code_ids
        .iter()
        .chain(params.alloyed_transmuter_code_ids.iter())
        .copied()
        .collect();
    let min_cap = Uint128::from(opts.min_pool_liquidity_cap);

    let mut routes: Vec<CandidateRouteDraft> = Vec::new();
    let mut queue: VecDeque<SearchPath> = VecDeque::new();
    queue.push_back(SearchPath {
        last_denom: token_in_denom.to_string(),
        pools: Vec::new(),
        visited_pool_ids: HashSet::new(),
        visited_denoms: HashSet::from([token_in_denom.to_string()]),
    });

    'search: while let Some(path) = queue.pop_front() {
        let mut reachable: Vec<Arc<PoolRecord>> = snapshot
            .pool_ids_for_denom(&path.last_denom)
            .iter()
            .filter_map(|id| snapshot.get_pool(*id))
            .collect();
        sort_pools(&mut reachable, &preferred, &transmuter_code_ids);

        for pool in reachable {
            if routes.len() >= opts.max_routes {
                break 'search;
            }
            if path.visited_pool_ids.contains(&pool.id) {
                continue;
            }
            if pool.liquidity_cap.unwrap_or_default() < min_cap {
                continue;
            }

            if pool.contains_denom(token_out_denom) {
                // pool introduces the token out denom: the path terminates
                let mut pools = path.pools.clone();
                pools.push(CandidatePoolDraft {
                    id: pool.id,
                    token_out_denom: token_out_denom.to_string(),
                    pool_denoms: pool.denoms.clone(),
                });
                let is_canonical =
                    route_passes_canonical_orderbook(registry, token_in_denom, &pools);
                routes.push(CandidateRouteDraft {
                    pools,
                    is_canonical_orderbook_route: is_canonical,
                });
                continue;
            }

            // leave room for at least the terminating pool
            if path.pools.len() + 1 >= opts.max_pools_per_route {
                continue;
            }

            for next_denom in &pool.denoms {
                if next_denom == &path.last_denom || path.visited_denoms.contains(next_denom) {
                    continue;
                }
                let mut pools = path.pools.clone();
                pools.push(CandidatePoolDraft {
                    id: pool.id,
                    token_out_denom: next_denom.clone(),
                    pool_denoms: pool.denoms.clone(),
                });
                let mut visited_pool_ids = path.visited_pool_ids.clone();
                visited_pool_ids.insert(pool.id);
                let mut visited_denoms = path.visited_denoms.clone();
                visited_denoms.insert(next_denom.clone());
                queue.push_back(SearchPath {
                    last_denom: next_denom.clone(),
                    pools,
                    visited_pool_ids,
                    visited_denoms,
                });
            }
        }
    }

    debug!(
        "candidate search {token_in_denom} -> {token_out_denom}: {} routes",
        routes.len()
    );
    routes
}

/// Whether any hop of the route goes through the canonical orderbook for
/// that hop's pair.
fn route_passes_canonical_orderbook(
    registry: &PoolRegistry,
    token_in_denom: &str,
    pools: &[CandidatePoolDraft],
) -> bool {
    let mut hop_in = token_in_denom;
    for pool in pools {
        if registry.canonical_orderbook_pool_id(hop_in, &pool.token_out_denom) == Some(pool.id) {
            return true;
        }
        hop_in = &pool.token_out_denom;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::{PoolState, WeightedPoolData};
    use crate::routable::CosmWasmPoolsParams;
    use cosmwasm_std::{coin, Decimal};
    use std::collections::BTreeMap;

    fn weighted_pool(id: u64, denoms: &[&str], cap: u128) -> PoolRecord {
        PoolRecord {
            id,
            denoms: denoms.iter().map(|d| d.to_string()).collect(),
            balances: denoms.iter().map(|d| coin(1_000_000, *d)).collect(),
            spread_factor: Decimal::permille(3),
            liquidity_cap: Some(Uint128::new(cap)),
            has_market_incentives: false,
            state: PoolState::Weighted(WeightedPoolData {
                weights: denoms
                    .iter()
                    .map(|d| (d.to_string(), Uint128::one()))
                    .collect::<BTreeMap<_, _>>(),
            }),
        }
    }

    fn registry_with(pools: Vec<PoolRecord>) -> PoolRegistry {
        let registry = PoolRegistry::new(Decimal::permille(1), CosmWasmPoolsParams::default());
        registry.store_pools(pools);
        registry
    }

    #[test]
    fn finds_direct_and_multi_hop_routes() {
        let registry = registry_with(vec![
            weighted_pool(1, &["uosmo", "uatom"], 500),
            weighted_pool(2, &["uatom", "uusdc"], 500),
            weighted_pool(3, &["uosmo", "uusdc"], 900),
        ]);

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions::default(),
        );

        // direct route first (depth 1), then the two-hop route
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].pools.len(), 1);
        assert_eq!(routes[0].pools[0].id, 3);
        assert_eq!(routes[1].pools.len(), 2);
        assert_eq!(routes[1].pools[0].id, 1);
        assert_eq!(routes[1].pools[1].id, 2);
        assert_eq!(routes[1].pools[1].token_out_denom, "uusdc");
    }

    #[test]
    fn min_liquidity_cap_excludes_pools() {
        let registry = registry_with(vec![
            weighted_pool(1, &["uosmo", "uusdc"], 10),
            weighted_pool(2, &["uosmo", "uusdc"], 5000),
        ]);

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions {
                min_pool_liquidity_cap: 100,
                ..Default::default()
            },
        );
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pools[0].id, 2);
    }

    #[test]
    fn max_routes_bounds_the_search() {
        let registry = registry_with(vec![
            weighted_pool(1, &["uosmo", "uusdc"], 100),
            weighted_pool(2, &["uosmo", "uusdc"], 200),
            weighted_pool(3, &["uosmo", "uusdc"], 300),
        ]);

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions {
                max_routes: 2,
                ..Default::default()
            },
        );
        assert_eq!(routes.len(), 2);
        // liquidity-descending visiting order
        assert_eq!(routes[0].pools[0].id, 3);
        assert_eq!(routes[1].pools[0].id, 2);
    }

    #[test]
    fn preferred_pools_visit_first() {
        let registry = registry_with(vec![
            weighted_pool(1, &["uosmo", "uusdc"], 100),
            weighted_pool(2, &["uosmo", "uusdc"], 9000),
        ]);

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions {
                max_routes: 1,
                preferred_pool_ids: vec![1],
                ..Default::default()
            },
        );
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pools[0].id, 1);
    }

    #[test]
    fn no_pool_reused_within_a_path() {
        // single pool holding all three denoms cannot be traversed twice
        let registry = registry_with(vec![weighted_pool(1, &["uosmo", "uatom", "uusdc"], 100)]);
        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions::default(),
        );
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pools.len(), 1);
    }

    #[test]
    fn depth_limit_prunes_long_paths() {
        let registry = registry_with(vec![
            weighted_pool(1, &["uosmo", "a"], 100),
            weighted_pool(2, &["a", "b"], 100),
            weighted_pool(3, &["b", "uusdc"], 100),
        ]);

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions {
                max_pools_per_route: 2,
                ..Default::default()
            },
        );
        assert!(routes.is_empty());

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions {
                max_pools_per_route: 3,
                ..Default::default()
            },
        );
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].pools.len(), 3);
    }

    #[test]
    fn canonical_orderbook_route_is_flagged() {
        let registry = registry_with(vec![weighted_pool(1, &["uosmo", "uusdc"], 100)]);
        registry
            .process_orderbook_pool_id_for_base_quote(
                "uosmo",
                "uusdc",
                1,
                Uint128::new(100),
                "osmo1orderbook",
            )
            .unwrap();

        let routes = find_candidate_routes(
            &registry,
            "uosmo",
            "uusdc",
            &CandidateRouteSearchOptions::default(),
        );
        assert_eq!(routes.len(), 1);
        assert!(routes[0].is_canonical_orderbook_route);
    }
}
