//! Engine-wide error taxonomy.
//!
//! One enum covers every failure the scheduler has to classify: pre-flight
//! balance shortfalls, missing liquidity routes, on-chain execution errors
//! and store outages. Per-strategy errors are caught at the scheduler
//! boundary and persisted as FAILED executions; they never crash the loop.

use thiserror::Error;

fn sol(lamports: &u64) -> f64 {
    *lamports as f64 / 1_000_000_000.0
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Pre-flight check failed before anything was submitted on chain.
    /// Still counts toward the consecutive-failure circuit breaker.
    #[error("insufficient balance: required {} SOL, available {} SOL", sol(.required), sol(.available))]
    InsufficientBalance { required: u64, available: u64 },

    /// No direct liquidity route exists for the mint. Soft-failed into a
    /// zero quote on the quoting path, hard error on the execution path.
    #[error("no route found for mint {0}")]
    NoRouteFound(String),

    /// Transaction submission or program execution failed; the raw message
    /// is preserved for operator diagnosis.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),

    /// Amount failed validation (zero, negative, or unparseable decimal).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Mint address failed base58 validation.
    #[error("invalid mint address: {0}")]
    InvalidMint(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Solana RPC failure (account fetch, balance read, blockhash, submit).
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Aggregator API failure (HTTP error, malformed response).
    #[error("aggregator error: {0}")]
    Aggregator(String),
}

impl From<tokio_postgres::Error> for EngineError {
    fn from(err: tokio_postgres::Error) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for EngineError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        EngineError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Aggregator(err.to_string())
    }
}

impl From<solana_client::client_error::ClientError> for EngineError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        EngineError::Rpc(err.to_string())
    }
}
