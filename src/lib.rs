//! # AMM Quoter SDK
//!
//! A sidecar quoting library for an automated-market-maker exchange: the
//! multi-hop swap router. Given a token-in amount and a token-out denom,
//! the router discovers candidate paths across a heterogeneous pool set,
//! estimates amount-out along each path, optionally splits the input
//! across several paths, ranks the results, and returns the best quote.
//!
//! ## Architecture
//!
//! The crate is organized into four layers:
//!
//! ### Pool Math Kernels
//! Per-family swap math: weighted constant-product, stableswap with a
//! Newton invariant solve, concentrated-liquidity tick walking, and
//! fixed-ratio transmuters (plain and alloyed with a static rate limiter).
//!
//! ### Routable Pool Adapters
//! A uniform capability surface over the pool families, including
//! taker-fee application and spot pricing. General CosmWasm pools
//! delegate to an external smart-contract query client.
//!
//! ### Registry & Search
//! An in-memory pool registry with copy-on-publish snapshots, a bounded
//! breadth-first candidate route searcher, and structural route
//! validation.
//!
//! ### Quoting
//! Route estimation and ranking, split quoting over a coarse grid, and a
//! two-tier (candidate / ranked-by-magnitude) TTL route cache with
//! invalidation on total estimation failure.

// Core types
/// Typed error taxonomy shared across the crate
pub mod errors;
/// Wide fixed-point decimal for √prices and kernel intermediates
pub mod bigdec;
/// Unified pool representation across all pool families
pub mod pools;

// Pool math kernels
/// Weighted constant-product swap math
pub mod weighted_math;
/// Stableswap invariant math over scaled balances
pub mod stable_math;
/// Concentrated-liquidity tick and √price math
pub mod clmm_math;

// Adapters
/// Routable pool trait and per-family adapters
pub mod routable;
/// Smart-contract query client abstraction
pub mod wasm_client;

// Registry & routing
/// In-memory pool registry and canonical orderbook bookkeeping
pub mod registry;
/// Candidate route and materialised route primitives
pub mod route;
/// Bounded breadth-first candidate route search
pub mod candidate_search;
/// Structural and denom-consistency route validation
pub mod validator;

// Quoting
/// TTL route cache and cache key schemes
pub mod cache;
/// Quote estimation, ranking, and splitting
pub mod quoter;

// Infrastructure
/// Configuration structs and loading
pub mod settings;
/// Feature-gated metric counters
pub mod metrics;

// Re-exports for convenience
pub use errors::{ErrorKind, QuoterError};
pub use pools::{PoolFamily, PoolRecord};
pub use quoter::{Quote, Quoter};
pub use registry::PoolRegistry;
pub use settings::Settings;
