//! Error taxonomy for the quoting core.
//!
//! Errors are grouped into kinds (validation, pool-state, balance,
//! configuration, lookup, cancellation) so that delivery layers can map a
//! failure to a structured response without inspecting variants. The
//! human-readable message lives in the `thiserror` display string.

use serde::Serialize;

/// Coarse classification of a [`QuoterError`], exposed to consumers that
/// render structured error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PoolState,
    Balance,
    Configuration,
    Lookup,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum QuoterError {
    // Validation
    #[error("no routes were provided for token in ({token_in_denom})")]
    NoRoutes { token_in_denom: String },

    #[error("route {route_index} has no pools")]
    NoPoolsInRoute { route_index: usize },

    #[error("previous token out denom ({previous_token_out_denom}) not found in pool ({pool_id}) on route {route_index}")]
    PreviousTokenOutDenomNotInPool {
        route_index: usize,
        pool_id: u64,
        previous_token_out_denom: String,
    },

    #[error("token out denom ({current_token_out_denom}) not found in pool ({pool_id}) on route {route_index}")]
    CurrentTokenOutDenomNotInPool {
        route_index: usize,
        pool_id: u64,
        current_token_out_denom: String,
    },

    #[error("routes have different final token out denoms ({token_out_denom_a}) and ({token_out_denom_b})")]
    TokenOutMismatchBetweenRoutes {
        token_out_denom_a: String,
        token_out_denom_b: String,
    },

    #[error("token out denom matches token in denom ({denom})")]
    TokenOutDenomMatchesTokenInDenom { denom: String },

    #[error("token in ({denom}) has zero amount")]
    ZeroTokenInAmount { denom: String },

    // Pool state
    #[error("pool ({pool_id}) has no tick model")]
    NoTickModel { pool_id: u64 },

    #[error("pool ({pool_id}) has no liquidity")]
    NoLiquidity { pool_id: u64 },

    #[error("current bucket index ({current_bucket_index}) is out of range of {total_buckets} buckets in pool ({pool_id})")]
    CurrentTickNotWithinBucket {
        pool_id: u64,
        current_bucket_index: i64,
        total_buckets: usize,
    },

    #[error("current tick ({current_tick}) is not within bucket [{lower_tick}, {upper_tick}) in pool ({pool_id})")]
    CurrentTickAndBucketMismatch {
        pool_id: u64,
        lower_tick: i64,
        upper_tick: i64,
        current_tick: i64,
    },

    #[error("pool ({pool_id}) has zero current sqrt price")]
    ZeroCurrentSqrtPrice { pool_id: u64 },

    #[error("not enough liquidity in pool ({pool_id}) to complete the swap of {token_in}")]
    NotEnoughLiquidityToCompleteSwap { pool_id: u64, token_in: String },

    // Balance
    #[error("transmuter has insufficient balance of ({denom}): balance ({balance}), requested ({requested})")]
    TransmuterInsufficientBalance {
        denom: String,
        balance: String,
        requested: String,
    },

    // Configuration
    #[error("missing normalization factor for ({denom}) in pool ({pool_id})")]
    MissingNormalizationFactor { denom: String, pool_id: u64 },

    #[error("zero normalization factor for ({denom}) in pool ({pool_id})")]
    ZeroNormalizationFactor { denom: String, pool_id: u64 },

    #[error("static rate limiter upper limit exceeded for ({denom}): weight ({weight}), upper limit ({upper_limit})")]
    StaticRateLimiterInvalidUpperLimit {
        denom: String,
        upper_limit: String,
        weight: String,
    },

    #[error("pool ({pool_id}) has no liquidity capitalization")]
    NoPoolLiquidityCap { pool_id: u64 },

    #[error("pool ({pool_id}) state does not match its declared family")]
    InvalidPoolState { pool_id: u64 },

    #[error("cosmwasm pool ({pool_id}) has unsupported code id ({code_id})")]
    UnsupportedCosmWasmCodeId { pool_id: u64, code_id: u64 },

    #[error("no smart contract query client configured for pool ({pool_id})")]
    WasmClientUnset { pool_id: u64 },

    #[error("scaling factor getter is unset; cannot resolve scaling factors for pool ({pool_id})")]
    ScalingFactorGetterUnset { pool_id: u64 },

    // Lookup
    #[error("pool ({pool_id}) not found")]
    PoolNotFound { pool_id: u64 },

    #[error("canonical orderbook not found for base ({base}) and quote ({quote})")]
    CanonicalOrderbookNotFound { base: String, quote: String },

    #[error("canonical orderbook entry for base ({base}) and quote ({quote}) is marked invalid")]
    InvalidCanonicalOrderbookEntry { base: String, quote: String },

    // Cancellation / deadlines
    #[error("quote computation was cancelled")]
    Cancelled,

    #[error("contract query exceeded deadline of {timeout_ms} ms for pool ({pool_id})")]
    QueryDeadlineExceeded { pool_id: u64, timeout_ms: u64 },

    #[error("contract query failed for pool ({pool_id}): {message}")]
    QueryFailed { pool_id: u64, message: String },

    // Arithmetic, bubbled up from fixed-point operations.
    #[error(transparent)]
    Overflow(#[from] cosmwasm_std::OverflowError),

    #[error(transparent)]
    DivideByZero(#[from] cosmwasm_std::DivideByZeroError),

    #[error(transparent)]
    CheckedFromRatio(#[from] cosmwasm_std::CheckedFromRatioError),

    #[error(transparent)]
    CheckedMultiplyFraction(#[from] cosmwasm_std::CheckedMultiplyFractionError),

    #[error(transparent)]
    DecimalRangeExceeded(#[from] cosmwasm_std::DecimalRangeExceeded),

    #[error(transparent)]
    ConversionOverflow(#[from] cosmwasm_std::ConversionOverflowError),
}

impl QuoterError {
    /// Kind used by delivery layers when shaping user-visible errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuoterError::NoRoutes { .. }
            | QuoterError::NoPoolsInRoute { .. }
            | QuoterError::PreviousTokenOutDenomNotInPool { .. }
            | QuoterError::CurrentTokenOutDenomNotInPool { .. }
            | QuoterError::TokenOutMismatchBetweenRoutes { .. }
            | QuoterError::TokenOutDenomMatchesTokenInDenom { .. }
            | QuoterError::ZeroTokenInAmount { .. } => ErrorKind::Validation,

            QuoterError::NoTickModel { .. }
            | QuoterError::NoLiquidity { .. }
            | QuoterError::CurrentTickNotWithinBucket { .. }
            | QuoterError::CurrentTickAndBucketMismatch { .. }
            | QuoterError::ZeroCurrentSqrtPrice { .. }
            | QuoterError::NotEnoughLiquidityToCompleteSwap { .. } => ErrorKind::PoolState,

            QuoterError::TransmuterInsufficientBalance { .. } => ErrorKind::Balance,

            QuoterError::MissingNormalizationFactor { .. }
            | QuoterError::ZeroNormalizationFactor { .. }
            | QuoterError::StaticRateLimiterInvalidUpperLimit { .. }
            | QuoterError::NoPoolLiquidityCap { .. }
            | QuoterError::InvalidPoolState { .. }
            | QuoterError::UnsupportedCosmWasmCodeId { .. }
            | QuoterError::WasmClientUnset { .. }
            | QuoterError::ScalingFactorGetterUnset { .. } => ErrorKind::Configuration,

            QuoterError::PoolNotFound { .. }
            | QuoterError::CanonicalOrderbookNotFound { .. }
            | QuoterError::InvalidCanonicalOrderbookEntry { .. } => ErrorKind::Lookup,

            QuoterError::Cancelled | QuoterError::QueryDeadlineExceeded { .. } => {
                ErrorKind::Cancelled
            }

            QuoterError::QueryFailed { .. }
            | QuoterError::Overflow(_)
            | QuoterError::DivideByZero(_)
            | QuoterError::CheckedFromRatio(_)
            | QuoterError::CheckedMultiplyFraction(_)
            | QuoterError::DecimalRangeExceeded(_)
            | QuoterError::ConversionOverflow(_) => ErrorKind::Internal,
        }
    }
}
