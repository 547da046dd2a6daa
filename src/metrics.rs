// src/metrics.rs
//
// Thin metric recording layer. With the `observability` feature the
// counters go through the `metrics` facade; without it every helper is a
// no-op so the hot path carries no instrumentation cost.

/// Pools skipped during best-effort route materialisation.
pub const POOL_CONSTRUCTION_SKIPS: &str = "quoter_pool_construction_skips_total";
/// Route cache hits, labelled by tier (`candidate` / `ranked`).
pub const ROUTE_CACHE_HITS: &str = "quoter_route_cache_hits_total";
/// Route cache misses, labelled by tier.
pub const ROUTE_CACHE_MISSES: &str = "quoter_route_cache_misses_total";
/// Cache entries invalidated after a total estimation failure.
pub const ROUTE_CACHE_INVALIDATIONS: &str = "quoter_route_cache_invalidations_total";

#[cfg(feature = "observability")]
pub fn record_pool_construction_skip() {
    metrics::counter!(POOL_CONSTRUCTION_SKIPS).increment(1);
}

#[cfg(not(feature = "observability"))]
pub fn record_pool_construction_skip() {}

#[cfg(feature = "observability")]
pub fn record_cache_hit(tier: &'static str) {
    metrics::counter!(ROUTE_CACHE_HITS, "tier" => tier).increment(1);
}

#[cfg(not(feature = "observability"))]
pub fn record_cache_hit(_tier: &'static str) {}

#[cfg(feature = "observability")]
pub fn record_cache_miss(tier: &'static str) {
    metrics::counter!(ROUTE_CACHE_MISSES, "tier" => tier).increment(1);
}

#[cfg(not(feature = "observability"))]
pub fn record_cache_miss(_tier: &'static str) {}

#[cfg(feature = "observability")]
pub fn record_cache_invalidation() {
    metrics::counter!(ROUTE_CACHE_INVALIDATIONS).increment(1);
}

#[cfg(not(feature = "observability"))]
pub fn record_cache_invalidation() {}
