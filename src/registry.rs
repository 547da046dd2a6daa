//! In-memory pool registry.
//!
//! The registry owns the published pool set and everything derived from
//! it: the denom traversal index, pair-level taker fees, and the canonical
//! orderbook bookkeeping. `store_pools` is the single writer and publishes
//! a full copy-on-write snapshot, so every quote observes one consistent
//! pool set with no torn reads.
//!
//! Route materialisation is best-effort by design: a pool that cannot be
//! resolved or constructed only drops the route containing it, never the
//! whole quote. Each skip is logged and counted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use cosmwasm_std::{Decimal, Uint128};
use dashmap::DashMap;
use log::warn;

use crate::errors::QuoterError;
use crate::metrics;
use crate::pools::{PoolRecord, PoolState};
use crate::routable::{new_routable_pool, CosmWasmPoolsParams};
use crate::route::{CandidateRoutes, Route};

/// Consistent view of the pool set taken at one point in time.
#[derive(Default)]
pub struct RegistrySnapshot {
    pools: HashMap<u64, Arc<PoolRecord>>,
    denom_index: HashMap<String, Vec<u64>>,
}

impl RegistrySnapshot {
    pub fn get_pool(&self, pool_id: u64) -> Option<Arc<PoolRecord>> {
        self.pools.get(&pool_id).cloned()
    }

    pub fn pool_ids_for_denom(&self, denom: &str) -> &[u64] {
        self.denom_index
            .get(denom)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn pools(&self) -> impl Iterator<Item = &Arc<PoolRecord>> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

/// Taker fee override for one unordered denom pair.
#[derive(Debug, Clone)]
pub struct TakerFeeForPair {
    pub denom0: String,
    pub denom1: String,
    pub taker_fee: Decimal,
}

type TakerFeeKey = (String, String);

fn taker_fee_key(denom_a: &str, denom_b: &str) -> TakerFeeKey {
    if denom_a <= denom_b {
        (denom_a.to_string(), denom_b.to_string())
    } else {
        (denom_b.to_string(), denom_a.to_string())
    }
}

#[derive(Debug, Clone)]
enum CanonicalOrderbookEntry {
    Valid {
        pool_id: u64,
        contract_address: String,
        liquidity_cap: Uint128,
    },
    /// Pre-set marker: the pair must not resolve to any orderbook.
    Invalid,
}

/// Canonical orderbook listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOrderbook {
    pub base_denom: String,
    pub quote_denom: String,
    pub pool_id: u64,
    pub contract_address: String,
}

/// Filters accepted by [`PoolRegistry::get_pools`].
#[derive(Debug, Clone, Default)]
pub struct PoolsOptions {
    /// `Some(empty)` deliberately selects nothing.
    pub pool_id_filter: Option<HashSet<u64>>,
    pub min_pool_liquidity_cap: Option<u64>,
    pub with_market_incentives: bool,
}

pub struct PoolRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    taker_fees: RwLock<Arc<HashMap<TakerFeeKey, Decimal>>>,
    canonical_orderbooks: DashMap<(String, String), CanonicalOrderbookEntry>,
    default_taker_fee: Decimal,
    routable_params: CosmWasmPoolsParams,
}

impl PoolRegistry {
    pub fn new(default_taker_fee: Decimal, routable_params: CosmWasmPoolsParams) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            taker_fees: RwLock::new(Arc::new(HashMap::new())),
            canonical_orderbooks: DashMap::new(),
            default_taker_fee,
            routable_params,
        }
    }

    /// Current published snapshot. Holding the returned `Arc` keeps the
    /// view stable for the lifetime of a request.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().expect("registry lock poisoned").clone()
    }

    pub fn routable_params(&self) -> &CosmWasmPoolsParams {
        &self.routable_params
    }

    pub fn default_taker_fee(&self) -> Decimal {
        self.default_taker_fee
    }

    /// Replaces pools by id and publishes a new snapshot. Invoked by the
    /// ingest collaborator; single writer.
    pub fn store_pools(&self, pools: Vec<PoolRecord>) {
        let current = self.snapshot();
        let mut next_pools = current.pools.clone();

        for pool in pools {
            if let PoolState::GeneralCosmWasm(data) = &pool.state {
                if let (Some(orderbook), Some(cap)) = (&data.orderbook, pool.liquidity_cap) {
                    let processed = self.process_orderbook_pool_id_for_base_quote(
                        &orderbook.base_denom,
                        &orderbook.quote_denom,
                        pool.id,
                        cap,
                        &data.contract_address,
                    );
                    if let Err(err) = processed {
                        warn!(
                            "orderbook pool {} not considered for canonical bookkeeping: {err}",
                            pool.id
                        );
                    }
                }
            }
            next_pools.insert(pool.id, Arc::new(pool));
        }

        let mut denom_index: HashMap<String, Vec<u64>> = HashMap::new();
        for (id, pool) in &next_pools {
            for denom in &pool.denoms {
                denom_index.entry(denom.clone()).or_default().push(*id);
            }
        }
        for ids in denom_index.values_mut() {
            ids.sort_unstable();
        }

        let next = Arc::new(RegistrySnapshot {
            pools: next_pools,
            denom_index,
        });
        *self.snapshot.write().expect("registry lock poisoned") = next;
    }

    pub fn get_pool(&self, pool_id: u64) -> Result<Arc<PoolRecord>, QuoterError> {
        self.snapshot()
            .get_pool(pool_id)
            .ok_or(QuoterError::PoolNotFound { pool_id })
    }

    pub fn get_pools(&self, opts: &PoolsOptions) -> Vec<Arc<PoolRecord>> {
        if let Some(filter) = &opts.pool_id_filter {
            // explicit empty-set short-circuit
            if filter.is_empty() {
                return Vec::new();
            }
        }

        let snapshot = self.snapshot();
        let mut pools: Vec<Arc<PoolRecord>> = snapshot
            .pools()
            .filter(|pool| {
                if let Some(filter) = &opts.pool_id_filter {
                    if !filter.contains(&pool.id) {
                        return false;
                    }
                }
                if let Some(min_cap) = opts.min_pool_liquidity_cap {
                    let cap = pool.liquidity_cap.unwrap_or_default();
                    if cap < Uint128::from(min_cap) {
                        return false;
                    }
                }
                if opts.with_market_incentives && !pool.has_market_incentives {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        pools.sort_unstable_by_key(|pool| pool.id);
        pools
    }

    pub fn set_taker_fees(&self, fees: Vec<TakerFeeForPair>) {
        let next: HashMap<TakerFeeKey, Decimal> = fees
            .into_iter()
            .map(|fee| (taker_fee_key(&fee.denom0, &fee.denom1), fee.taker_fee))
            .collect();
        *self.taker_fees.write().expect("registry lock poisoned") = Arc::new(next);
    }

    /// Pair taker fee, order-independent, with the configured default as
    /// fallback.
    pub fn taker_fee(&self, denom_a: &str, denom_b: &str) -> Decimal {
        self.taker_fees
            .read()
            .expect("registry lock poisoned")
            .get(&taker_fee_key(denom_a, denom_b))
            .copied()
            .unwrap_or(self.default_taker_fee)
    }

    /// Materialises candidate routes into routable form. Routes whose
    /// pools cannot be resolved or constructed are skipped with a warning
    /// so one broken pool cannot fail the whole quote.
    pub fn get_routes_from_candidates(
        &self,
        candidate_routes: &CandidateRoutes,
        token_in_denom: &str,
    ) -> Vec<Route> {
        let snapshot = self.snapshot();
        let mut routes = Vec::with_capacity(candidate_routes.routes.len());

        'route: for candidate in &candidate_routes.routes {
            let mut pools: Vec<Box<dyn crate::routable::RoutablePool>> =
                Vec::with_capacity(candidate.pools.len());
            let mut previous_denom = token_in_denom.to_string();

            for candidate_pool in &candidate.pools {
                let Some(record) = snapshot.get_pool(candidate_pool.id) else {
                    warn!(
                        "route {} skipped: pool {} not found",
                        candidate.route_key(),
                        candidate_pool.id
                    );
                    metrics::record_pool_construction_skip();
                    continue 'route;
                };

                let taker_fee = self.taker_fee(&previous_denom, &candidate_pool.token_out_denom);
                match new_routable_pool(
                    record,
                    previous_denom.clone(),
                    candidate_pool.token_out_denom.clone(),
                    taker_fee,
                    &self.routable_params,
                ) {
                    Ok(adapter) => pools.push(adapter),
                    Err(err) => {
                        warn!(
                            "route {} skipped: pool {} failed to construct: {err}",
                            candidate.route_key(),
                            candidate_pool.id
                        );
                        metrics::record_pool_construction_skip();
                        continue 'route;
                    }
                }
                previous_denom = candidate_pool.token_out_denom.clone();
            }

            routes.push(Route::new(pools, candidate.is_canonical_orderbook_route));
        }
        routes
    }

    /// Sets or overrides the canonical orderbook for `(base, quote)` iff
    /// no valid entry exists or `liquidity_cap` strictly exceeds the
    /// stored one. Returns whether the entry was updated.
    pub fn process_orderbook_pool_id_for_base_quote(
        &self,
        base_denom: &str,
        quote_denom: &str,
        pool_id: u64,
        liquidity_cap: Uint128,
        contract_address: &str,
    ) -> Result<bool, QuoterError> {
        use dashmap::mapref::entry::Entry;

        let key = (base_denom.to_string(), quote_denom.to_string());
        match self.canonical_orderbooks.entry(key) {
            Entry::Occupied(mut occupied) => match occupied.get() {
                CanonicalOrderbookEntry::Invalid => Err(QuoterError::InvalidCanonicalOrderbookEntry {
                    base: base_denom.to_string(),
                    quote: quote_denom.to_string(),
                }),
                CanonicalOrderbookEntry::Valid {
                    liquidity_cap: stored,
                    ..
                } => {
                    if liquidity_cap > *stored {
                        occupied.insert(CanonicalOrderbookEntry::Valid {
                            pool_id,
                            contract_address: contract_address.to_string(),
                            liquidity_cap,
                        });
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(CanonicalOrderbookEntry::Valid {
                    pool_id,
                    contract_address: contract_address.to_string(),
                    liquidity_cap,
                });
                Ok(true)
            }
        }
    }

    /// Marks `(base, quote)` so it can never resolve to an orderbook.
    pub fn invalidate_canonical_orderbook(&self, base_denom: &str, quote_denom: &str) {
        self.canonical_orderbooks.insert(
            (base_denom.to_string(), quote_denom.to_string()),
            CanonicalOrderbookEntry::Invalid,
        );
    }

    pub fn get_canonical_orderbook_pool(
        &self,
        base_denom: &str,
        quote_denom: &str,
    ) -> Result<(u64, String), QuoterError> {
        let key = (base_denom.to_string(), quote_denom.to_string());
        match self.canonical_orderbooks.get(&key).as_deref() {
            Some(CanonicalOrderbookEntry::Valid {
                pool_id,
                contract_address,
                ..
            }) => Ok((*pool_id, contract_address.clone())),
            Some(CanonicalOrderbookEntry::Invalid) => {
                Err(QuoterError::InvalidCanonicalOrderbookEntry {
                    base: base_denom.to_string(),
                    quote: quote_denom.to_string(),
                })
            }
            None => Err(QuoterError::CanonicalOrderbookNotFound {
                base: base_denom.to_string(),
                quote: quote_denom.to_string(),
            }),
        }
    }

    /// Valid canonical pool id for either orientation of the pair.
    pub fn canonical_orderbook_pool_id(&self, denom_a: &str, denom_b: &str) -> Option<u64> {
        for key in [
            (denom_a.to_string(), denom_b.to_string()),
            (denom_b.to_string(), denom_a.to_string()),
        ] {
            if let Some(entry) = self.canonical_orderbooks.get(&key) {
                if let CanonicalOrderbookEntry::Valid { pool_id, .. } = entry.value() {
                    return Some(*pool_id);
                }
            }
        }
        None
    }

    /// All valid canonical orderbooks, sorted by pair for deterministic
    /// output.
    pub fn get_all_canonical_orderbook_pool_ids(&self) -> Vec<CanonicalOrderbook> {
        let mut all: Vec<CanonicalOrderbook> = self
            .canonical_orderbooks
            .iter()
            .filter_map(|entry| {
                let (base_denom, quote_denom) = entry.key().clone();
                match entry.value() {
                    CanonicalOrderbookEntry::Valid {
                        pool_id,
                        contract_address,
                        ..
                    } => Some(CanonicalOrderbook {
                        base_denom,
                        quote_denom,
                        pool_id: *pool_id,
                        contract_address: contract_address.clone(),
                    }),
                    CanonicalOrderbookEntry::Invalid => None,
                }
            })
            .collect();
        all.sort_unstable_by(|a, b| {
            (&a.base_denom, &a.quote_denom).cmp(&(&b.base_denom, &b.quote_denom))
        });
        all
    }
}
