//! Unified pool representation across all supported pool families.
//!
//! A [`PoolRecord`] carries the family-independent fields every pool has
//! (id, denoms, balances, spread, liquidity capitalization) plus a
//! [`PoolState`] variant with the family-specific state record. Records are
//! created by the ingest collaborator and published through the registry;
//! they are never mutated during quoting.

use std::collections::BTreeMap;

use cosmwasm_std::{Coin, Decimal, Uint128};
use serde::{Deserialize, Serialize};

use crate::bigdec::BigDec;

/// Pool family tag. One arm per supported swap rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolFamily {
    ConstantProduct,
    Stableswap,
    Concentrated,
    CosmWasmTransmuter,
    CosmWasmAlloyedTransmuter,
    CosmWasmGeneral,
}

impl std::fmt::Display for PoolFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolFamily::ConstantProduct => write!(f, "constant_product"),
            PoolFamily::Stableswap => write!(f, "stableswap"),
            PoolFamily::Concentrated => write!(f, "concentrated"),
            PoolFamily::CosmWasmTransmuter => write!(f, "cosmwasm_transmuter"),
            PoolFamily::CosmWasmAlloyedTransmuter => write!(f, "cosmwasm_alloyed_transmuter"),
            PoolFamily::CosmWasmGeneral => write!(f, "cosmwasm_general"),
        }
    }
}

/// A pool as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub id: u64,
    /// Ordered denom set. For concentrated pools the first entry is the
    /// lower-index asset that determines swap direction.
    pub denoms: Vec<String>,
    pub balances: Vec<Coin>,
    pub spread_factor: Decimal,
    /// Liquidity capitalization used for search eligibility and ordering.
    /// `None` sinks the pool to the bottom of the candidate order.
    pub liquidity_cap: Option<Uint128>,
    pub has_market_incentives: bool,
    pub state: PoolState,
}

/// Family-specific state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PoolState {
    Weighted(WeightedPoolData),
    Stableswap(StableswapPoolData),
    Concentrated(ConcentratedPoolData),
    Transmuter(TransmuterPoolData),
    AlloyedTransmuter(AlloyedPoolData),
    GeneralCosmWasm(GeneralCosmWasmPoolData),
}

/// Balancer-style weighted constant-product state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedPoolData {
    /// Per-asset positive integer weights.
    pub weights: BTreeMap<String, Uint128>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableswapPoolData {
    /// Per-asset scaling factors used to normalize balances before the
    /// invariant solve.
    pub scaling_factors: BTreeMap<String, u64>,
    pub exit_fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentratedPoolData {
    pub current_tick: i64,
    pub current_sqrt_price: BigDec,
    /// Absent until the tick ingest has run for this pool.
    pub tick_model: Option<TickModel>,
}

/// Liquidity bucket list for a concentrated pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickModel {
    /// Ordered, non-overlapping buckets with `lower_tick < upper_tick`.
    pub ticks: Vec<TickBucket>,
    /// Index into `ticks` of the bucket containing the current tick.
    pub current_tick_index: i64,
    pub has_no_liquidity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickBucket {
    pub lower_tick: i64,
    pub upper_tick: i64,
    pub liquidity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmuterPoolData {
    pub code_id: u64,
    pub contract_address: String,
}

/// Per-asset configuration of an alloyed transmuter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub denom: String,
    pub normalization_factor: Uint128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlloyedPoolData {
    pub code_id: u64,
    pub contract_address: String,
    pub asset_configs: Vec<AssetConfig>,
    /// The synthetic LP-share denom; mintable and burnable by the pool.
    pub alloyed_denom: String,
    /// Static rate limiter upper limits by denom, each in [0, 1].
    pub static_limiters: BTreeMap<String, Decimal>,
    /// Scaling factors derived from the asset normalization factors; see
    /// [`AlloyedPoolData::precompute_normalization_scaling_factors`].
    #[serde(default)]
    pub normalization_scaling_factors: BTreeMap<String, Uint128>,
}

impl AlloyedPoolData {
    /// Finds the normalization factor configured for `denom`.
    pub fn normalization_factor(&self, denom: &str) -> Option<Uint128> {
        self.asset_configs
            .iter()
            .find(|config| config.denom == denom)
            .map(|config| config.normalization_factor)
    }

    /// Populates `normalization_scaling_factors` so that every asset's
    /// balance can be brought to a common basis with a single integer
    /// multiply: `scaling[d] = lcm(all factors) / factor[d]`.
    pub fn precompute_normalization_scaling_factors(&mut self) {
        let mut lcm_all: u128 = 1;
        for config in &self.asset_configs {
            let factor = config.normalization_factor.u128();
            if factor == 0 {
                continue;
            }
            lcm_all = lcm(lcm_all, factor);
        }
        self.normalization_scaling_factors = self
            .asset_configs
            .iter()
            .filter(|config| !config.normalization_factor.is_zero())
            .map(|config| {
                let scaling = lcm_all / config.normalization_factor.u128();
                (config.denom.clone(), Uint128::new(scaling))
            })
            .collect();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookData {
    pub base_denom: String,
    pub quote_denom: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralCosmWasmPoolData {
    pub code_id: u64,
    pub contract_address: String,
    /// Present when the contract is an orderbook; feeds the canonical
    /// orderbook bookkeeping on store.
    pub orderbook: Option<OrderbookData>,
}

impl PoolRecord {
    pub fn family(&self) -> PoolFamily {
        match &self.state {
            PoolState::Weighted(_) => PoolFamily::ConstantProduct,
            PoolState::Stableswap(_) => PoolFamily::Stableswap,
            PoolState::Concentrated(_) => PoolFamily::Concentrated,
            PoolState::Transmuter(_) => PoolFamily::CosmWasmTransmuter,
            PoolState::AlloyedTransmuter(_) => PoolFamily::CosmWasmAlloyedTransmuter,
            PoolState::GeneralCosmWasm(_) => PoolFamily::CosmWasmGeneral,
        }
    }

    pub fn code_id(&self) -> Option<u64> {
        match &self.state {
            PoolState::Transmuter(data) => Some(data.code_id),
            PoolState::AlloyedTransmuter(data) => Some(data.code_id),
            PoolState::GeneralCosmWasm(data) => Some(data.code_id),
            _ => None,
        }
    }

    pub fn contains_denom(&self, denom: &str) -> bool {
        self.denoms.iter().any(|d| d == denom)
    }

    pub fn balance_of(&self, denom: &str) -> Uint128 {
        amount_of(&self.balances, denom)
    }
}

/// Amount of `denom` in `balances`, zero when absent.
pub fn amount_of(balances: &[Coin], denom: &str) -> Uint128 {
    balances
        .iter()
        .find(|coin| coin.denom == denom)
        .map(|coin| coin.amount)
        .unwrap_or_default()
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: u128, b: u128) -> u128 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::coin;

    #[test]
    fn amount_of_missing_denom_is_zero() {
        let balances = vec![coin(1000, "uosmo"), coin(500, "uatom")];
        assert_eq!(amount_of(&balances, "uosmo"), Uint128::new(1000));
        assert_eq!(amount_of(&balances, "uion"), Uint128::zero());
    }

    #[test]
    fn scaling_factor_precompute_uses_lcm() {
        let mut data = AlloyedPoolData {
            code_id: 1,
            contract_address: "osmo1contract".to_string(),
            asset_configs: vec![
                AssetConfig {
                    denom: "a".to_string(),
                    normalization_factor: Uint128::new(2),
                },
                AssetConfig {
                    denom: "b".to_string(),
                    normalization_factor: Uint128::new(3),
                },
                AssetConfig {
                    denom: "alloyed".to_string(),
                    normalization_factor: Uint128::new(6),
                },
            ],
            alloyed_denom: "alloyed".to_string(),
            static_limiters: BTreeMap::new(),
            normalization_scaling_factors: BTreeMap::new(),
        };
        data.precompute_normalization_scaling_factors();

        // lcm(2, 3, 6) = 6
        assert_eq!(data.normalization_scaling_factors["a"], Uint128::new(3));
        assert_eq!(data.normalization_scaling_factors["b"], Uint128::new(2));
        assert_eq!(
            data.normalization_scaling_factors["alloyed"],
            Uint128::new(1)
        );
    }
}
