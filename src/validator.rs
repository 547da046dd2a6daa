//! Route validation and filtering.
//!
//! Structural defects (no pools, broken denom chaining, mixed final
//! denoms) are hard errors; route-local defects that only make a single
//! path useless (duplicate pool ids, intermediary pools touching the
//! token-in or token-out denom) silently drop that route with a warning.

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::errors::QuoterError;
use crate::route::{CandidatePool, CandidateRoute, CandidateRouteDraft, CandidateRoutes};

/// Validates each candidate route and converts the survivors into the
/// final [`CandidateRoutes`] form.
pub fn validate_and_filter_routes(
    candidate_routes: &[CandidateRouteDraft],
    token_in_denom: &str,
) -> Result<CandidateRoutes, QuoterError> {
    let mut final_token_out_denom: Option<String> = None;
    let mut filtered_routes: Vec<CandidateRoute> = Vec::with_capacity(candidate_routes.len());
    let mut unique_pool_ids: BTreeSet<u64> = BTreeSet::new();
    let mut contains_canonical_orderbook = false;

    'route: for (route_index, candidate_route) in candidate_routes.iter().enumerate() {
        contains_canonical_orderbook =
            contains_canonical_orderbook || candidate_route.is_canonical_orderbook_route;

        let route_pools = &candidate_route.pools;
        let Some(last_pool) = route_pools.last() else {
            return Err(QuoterError::NoPoolsInRoute { route_index });
        };
        let route_token_out_denom = last_pool.token_out_denom.clone();

        let mut previous_token_out = token_in_denom;
        let mut pool_ids_in_route: HashSet<u64> = HashSet::with_capacity(route_pools.len());

        for (pool_index, pool) in route_pools.iter().enumerate() {
            unique_pool_ids.insert(pool.id);

            // routes revisiting a pool are dropped, not failed
            if !pool_ids_in_route.insert(pool.id) {
                warn!(
                    route_index,
                    pool_id = pool.id,
                    "route skipped - duplicate pool id within route"
                );
                continue 'route;
            }

            let mut found_previous_token_out = false;
            let mut found_current_token_out = false;
            let is_intermediary = pool_index > 0 && pool_index < route_pools.len() - 1;

            for denom in &pool.pool_denoms {
                if denom == previous_token_out {
                    found_previous_token_out = true;
                }
                if denom == &pool.token_out_denom {
                    found_current_token_out = true;
                }

                if is_intermediary {
                    if denom == token_in_denom {
                        warn!(
                            route_index,
                            pool_id = pool.id,
                            denom = %denom,
                            "route skipped - token in denom in intermediary pool"
                        );
                        continue 'route;
                    }
                    if denom == &route_token_out_denom {
                        warn!(
                            route_index,
                            pool_id = pool.id,
                            denom = %denom,
                            "route skipped - token out denom in intermediary pool"
                        );
                        continue 'route;
                    }
                }
            }

            if !found_previous_token_out {
                return Err(QuoterError::PreviousTokenOutDenomNotInPool {
                    route_index,
                    pool_id: pool.id,
                    previous_token_out_denom: previous_token_out.to_string(),
                });
            }
            if !found_current_token_out {
                return Err(QuoterError::CurrentTokenOutDenomNotInPool {
                    route_index,
                    pool_id: pool.id,
                    current_token_out_denom: pool.token_out_denom.clone(),
                });
            }

            previous_token_out = &pool.token_out_denom;
        }

        match &final_token_out_denom {
            Some(existing) if existing != &route_token_out_denom => {
                return Err(QuoterError::TokenOutMismatchBetweenRoutes {
                    token_out_denom_a: existing.clone(),
                    token_out_denom_b: route_token_out_denom,
                });
            }
            Some(_) => {}
            None => final_token_out_denom = Some(route_token_out_denom.clone()),
        }

        filtered_routes.push(CandidateRoute {
            pools: route_pools
                .iter()
                .map(|pool| CandidatePool {
                    id: pool.id,
                    token_out_denom: pool.token_out_denom.clone(),
                })
                .collect(),
            is_canonical_orderbook_route: candidate_route.is_canonical_orderbook_route,
        });
    }

    if let Some(token_out_denom) = &final_token_out_denom {
        if token_out_denom == token_in_denom {
            return Err(QuoterError::TokenOutDenomMatchesTokenInDenom {
                denom: token_out_denom.clone(),
            });
        }
    }

    Ok(CandidateRoutes {
        routes: filtered_routes,
        unique_pool_ids,
        contains_canonical_orderbook,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::CandidatePoolDraft;

    fn hop(id: u64, token_out: &str, denoms: &[&str]) -> CandidatePoolDraft {
        CandidatePoolDraft {
            id,
            token_out_denom: token_out.to_string(),
            pool_denoms: denoms.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn route(pools: Vec<CandidatePoolDraft>) -> CandidateRouteDraft {
        CandidateRouteDraft {
            pools,
            is_canonical_orderbook_route: false,
        }
    }

    #[test]
    fn accepts_well_formed_routes() {
        let routes = vec![
            route(vec![hop(1, "uusdc", &["uosmo", "uusdc"])]),
            route(vec![
                hop(2, "uatom", &["uosmo", "uatom"]),
                hop(3, "uusdc", &["uatom", "uusdc"]),
            ]),
        ];
        let validated = validate_and_filter_routes(&routes, "uosmo").unwrap();
        assert_eq!(validated.routes.len(), 2);
        assert_eq!(
            validated.unique_pool_ids.iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn empty_route_is_an_error() {
        let err = validate_and_filter_routes(&[route(vec![])], "uosmo").unwrap_err();
        assert!(matches!(err, QuoterError::NoPoolsInRoute { route_index: 0 }));
    }

    #[test]
    fn duplicate_pool_id_drops_route_silently() {
        let routes = vec![
            route(vec![
                hop(1, "uatom", &["uosmo", "uatom"]),
                hop(1, "uusdc", &["uatom", "uusdc"]),
            ]),
            route(vec![hop(2, "uusdc", &["uosmo", "uusdc"])]),
        ];
        let validated = validate_and_filter_routes(&routes, "uosmo").unwrap();
        assert_eq!(validated.routes.len(), 1);
        assert_eq!(validated.routes[0].pools[0].id, 2);
    }

    #[test]
    fn intermediary_pool_with_token_in_denom_drops_route() {
        // the middle pool routes back through the token-in denom
        let routes = vec![
            route(vec![
                hop(1, "x", &["uosmo", "x"]),
                hop(2, "y", &["x", "uosmo", "y"]),
                hop(3, "uusdc", &["y", "uusdc"]),
            ]),
            route(vec![hop(4, "uusdc", &["uosmo", "uusdc"])]),
        ];
        let validated = validate_and_filter_routes(&routes, "uosmo").unwrap();
        assert_eq!(validated.routes.len(), 1);
        assert_eq!(validated.routes[0].pools[0].id, 4);
    }

    #[test]
    fn intermediary_pool_with_token_out_denom_drops_route() {
        let routes = vec![
            route(vec![
                hop(1, "x", &["uosmo", "x"]),
                hop(2, "y", &["x", "y", "uusdc"]),
                hop(3, "uusdc", &["y", "uusdc"]),
            ]),
            route(vec![hop(4, "uusdc", &["uosmo", "uusdc"])]),
        ];
        let validated = validate_and_filter_routes(&routes, "uosmo").unwrap();
        assert_eq!(validated.routes.len(), 1);
    }

    #[test]
    fn broken_denom_chain_is_an_error() {
        let routes = vec![route(vec![
            hop(1, "uatom", &["uosmo", "uatom"]),
            hop(2, "uusdc", &["uion", "uusdc"]),
        ])];
        let err = validate_and_filter_routes(&routes, "uosmo").unwrap_err();
        assert!(matches!(
            err,
            QuoterError::PreviousTokenOutDenomNotInPool {
                pool_id: 2,
                ..
            }
        ));
    }

    #[test]
    fn token_out_not_in_pool_is_an_error() {
        let routes = vec![route(vec![hop(1, "uusdc", &["uosmo", "uatom"])])];
        let err = validate_and_filter_routes(&routes, "uosmo").unwrap_err();
        assert!(matches!(
            err,
            QuoterError::CurrentTokenOutDenomNotInPool { pool_id: 1, .. }
        ));
    }

    #[test]
    fn mixed_final_denoms_are_an_error() {
        let routes = vec![
            route(vec![hop(1, "uusdc", &["uosmo", "uusdc"])]),
            route(vec![hop(2, "uatom", &["uosmo", "uatom"])]),
        ];
        let err = validate_and_filter_routes(&routes, "uosmo").unwrap_err();
        assert!(matches!(
            err,
            QuoterError::TokenOutMismatchBetweenRoutes { .. }
        ));
    }

    #[test]
    fn token_out_equal_to_token_in_is_an_error() {
        let routes = vec![route(vec![hop(1, "uosmo", &["uosmo", "uatom"])])];
        let err = validate_and_filter_routes(&routes, "uosmo").unwrap_err();
        assert!(matches!(
            err,
            QuoterError::TokenOutDenomMatchesTokenInDenom { .. }
        ));
    }

    #[test]
    fn canonical_flag_unions_across_routes() {
        let mut flagged = route(vec![hop(1, "uusdc", &["uosmo", "uusdc"])]);
        flagged.is_canonical_orderbook_route = true;
        let routes = vec![flagged, route(vec![hop(2, "uusdc", &["uosmo", "uusdc"])])];
        let validated = validate_and_filter_routes(&routes, "uosmo").unwrap();
        assert!(validated.contains_canonical_orderbook);
        assert!(validated.routes[0].is_canonical_orderbook_route);
        assert!(!validated.routes[1].is_canonical_orderbook_route);
    }
}
