//! Configuration structs and loading.
//!
//! Settings are deserialized from a layered `config` build: an optional
//! file source plus `QUOTER__`-prefixed environment variables, with serde
//! defaults for every field so a partial file is valid.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use config::{Config, Environment, File};
use cosmwasm_std::Decimal;
use serde::Deserialize;

use crate::candidate_search::CandidateRouteSearchOptions;
use crate::routable::CosmWasmPoolsParams;
use crate::wasm_client::{ScalingFactorGetter, WasmClient};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub pools: CosmWasmPoolsSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    #[serde(default = "default_taker_fee")]
    pub default_taker_fee: Decimal,
    #[serde(default = "default_max_routes")]
    pub max_routes: usize,
    #[serde(default = "default_max_pools_per_route")]
    pub max_pools_per_route: usize,
    #[serde(default = "default_max_split_routes")]
    pub max_split_routes: usize,
    #[serde(default)]
    pub min_pool_liquidity_cap: u64,
    #[serde(default)]
    pub preferred_pool_ids: Vec<u64>,
}

fn default_taker_fee() -> Decimal {
    Decimal::permille(1)
}
fn default_max_routes() -> usize {
    20
}
fn default_max_pools_per_route() -> usize {
    4
}
fn default_max_split_routes() -> usize {
    3
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_taker_fee: default_taker_fee(),
            max_routes: default_max_routes(),
            max_pools_per_route: default_max_pools_per_route(),
            max_split_routes: default_max_split_routes(),
            min_pool_liquidity_cap: 0,
            preferred_pool_ids: Vec::new(),
        }
    }
}

impl RouterSettings {
    pub fn search_options(&self) -> CandidateRouteSearchOptions {
        CandidateRouteSearchOptions {
            max_routes: self.max_routes,
            max_pools_per_route: self.max_pools_per_route,
            min_pool_liquidity_cap: self.min_pool_liquidity_cap,
            preferred_pool_ids: self.preferred_pool_ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CosmWasmPoolsSettings {
    #[serde(default)]
    pub transmuter_code_ids: Vec<u64>,
    #[serde(default)]
    pub alloyed_transmuter_code_ids: Vec<u64>,
    #[serde(default)]
    pub general_cosmwasm_code_ids: Vec<u64>,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_query_timeout_ms() -> u64 {
    5000
}

impl Default for CosmWasmPoolsSettings {
    fn default() -> Self {
        Self {
            transmuter_code_ids: Vec::new(),
            alloyed_transmuter_code_ids: Vec::new(),
            general_cosmwasm_code_ids: Vec::new(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl CosmWasmPoolsSettings {
    /// Binds the static code-id configuration to the runtime collaborators.
    pub fn to_params(
        &self,
        wasm_client: Option<Arc<dyn WasmClient>>,
        scaling_factor_getter: ScalingFactorGetter,
    ) -> CosmWasmPoolsParams {
        CosmWasmPoolsParams {
            transmuter_code_ids: self.transmuter_code_ids.iter().copied().collect(),
            alloyed_transmuter_code_ids: self
                .alloyed_transmuter_code_ids
                .iter()
                .copied()
                .collect(),
            general_cosmwasm_code_ids: self.general_cosmwasm_code_ids.iter().copied().collect(),
            scaling_factor_getter,
            wasm_client,
            query_timeout: Duration::from_millis(self.query_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_candidate_route_cache_ttl_seconds")]
    pub candidate_route_cache_ttl_seconds: u64,
    #[serde(default = "default_ranked_route_cache_ttl_seconds")]
    pub ranked_route_cache_ttl_seconds: u64,
}

fn default_candidate_route_cache_ttl_seconds() -> u64 {
    600
}
fn default_ranked_route_cache_ttl_seconds() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            candidate_route_cache_ttl_seconds: default_candidate_route_cache_ttl_seconds(),
            ranked_route_cache_ttl_seconds: default_ranked_route_cache_ttl_seconds(),
        }
    }
}

impl CacheSettings {
    pub fn candidate_route_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.candidate_route_cache_ttl_seconds)
    }

    pub fn ranked_route_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ranked_route_cache_ttl_seconds)
    }
}

impl Settings {
    /// Loads settings from an optional file plus `QUOTER__*` environment
    /// overrides.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(Environment::with_prefix("QUOTER").separator("__"));
        let config = builder.build().context("failed to assemble configuration")?;
        config
            .try_deserialize()
            .context("failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.router.max_routes, 20);
        assert_eq!(settings.router.max_pools_per_route, 4);
        assert_eq!(settings.router.max_split_routes, 3);
        assert_eq!(settings.router.default_taker_fee, Decimal::permille(1));
        assert_eq!(settings.pools.query_timeout_ms, 5000);
        assert_eq!(settings.cache.ranked_route_cache_ttl_seconds, 300);
    }

    #[test]
    fn search_options_mirror_router_settings() {
        let mut settings = RouterSettings::default();
        settings.preferred_pool_ids = vec![42];
        settings.min_pool_liquidity_cap = 777;
        let opts = settings.search_options();
        assert_eq!(opts.max_routes, 20);
        assert_eq!(opts.preferred_pool_ids, vec![42]);
        assert_eq!(opts.min_pool_liquidity_cap, 777);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.router.max_routes, 20);
    }
}
