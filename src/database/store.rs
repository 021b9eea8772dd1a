// Strategy Store
//
// Persistence operations over DCA strategies and their execution history.
// The scheduler, executor and analytics consume the `StrategyStore` trait;
// `PostgresStore` is the production implementation over the shared pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::database::models::{
    DcaExecution, DcaStrategy, DueStrategy, ExecutionStatus, Frequency, FromRow, TokenPair,
};
use crate::error::EngineError;

/// Parameters for creating a strategy. The pair fields are snapshotted onto
/// the strategy row at creation time.
#[derive(Debug, Clone)]
pub struct NewStrategy {
    pub user_id: Uuid,
    pub pair: TokenPair,
    pub frequency: Frequency,
    /// Base-token smallest units per execution
    pub amount_per_interval: i64,
}

/// Parameters for recording one execution attempt
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub strategy_id: Uuid,
    pub amount_invested: i64,
    pub tokens_received: i64,
    pub execution_price: i64,
    pub status: ExecutionStatus,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
}

impl NewExecution {
    /// Successful attempt with the amounts actually moved
    pub fn success(
        strategy_id: Uuid,
        amount_invested: i64,
        tokens_received: i64,
        execution_price: i64,
        tx_hash: String,
    ) -> Self {
        Self {
            strategy_id,
            amount_invested,
            tokens_received,
            execution_price,
            status: ExecutionStatus::Success,
            tx_hash: Some(tx_hash),
            error_message: None,
        }
    }

    /// Failed attempt; amounts zeroed, message preserved for diagnosis
    pub fn failure(strategy_id: Uuid, error_message: String) -> Self {
        Self {
            strategy_id,
            amount_invested: 0,
            tokens_received: 0,
            execution_price: 0,
            status: ExecutionStatus::Failed,
            tx_hash: None,
            error_message: Some(error_message),
        }
    }
}

/// Persistence surface consumed by the scheduler, executor and analytics
#[async_trait]
pub trait StrategyStore: Send + Sync {
    /// Insert a new ACTIVE strategy. Fails if the user already has a live
    /// (ACTIVE or PAUSED) strategy for the same pair.
    async fn create_strategy(&self, params: NewStrategy) -> Result<DcaStrategy, EngineError>;

    async fn get_strategy(&self, id: Uuid) -> Result<Option<DcaStrategy>, EngineError>;

    async fn get_user_strategies(&self, user_id: Uuid) -> Result<Vec<DcaStrategy>, EngineError>;

    /// ACTIVE strategies due at or before `now`, oldest first, joined with
    /// the owner's wallet pubkey
    async fn get_due_strategies(&self, now: DateTime<Utc>)
        -> Result<Vec<DueStrategy>, EngineError>;

    /// ACTIVE -> PAUSED. Returns the number of rows changed.
    async fn pause(&self, id: Uuid) -> Result<u64, EngineError>;

    /// PAUSED or CANCELLED -> ACTIVE. Returns the number of rows changed.
    async fn resume(&self, id: Uuid) -> Result<u64, EngineError>;

    /// ACTIVE or PAUSED -> CANCELLED. Returns the number of rows changed.
    async fn cancel(&self, id: Uuid) -> Result<u64, EngineError>;

    /// Append one immutable execution record
    async fn record_execution(&self, params: NewExecution) -> Result<DcaExecution, EngineError>;

    /// Post-success strategy update: advance the schedule, accumulate the
    /// invested amount, reset the failure counter. Compare-and-swap on
    /// `expected_version`; returns false when the row moved underneath us.
    async fn update_after_success(
        &self,
        id: Uuid,
        expected_version: i64,
        next_time: DateTime<Utc>,
        amount_invested: i64,
    ) -> Result<bool, EngineError>;

    /// Post-failure counter bump, compare-and-swap on `expected_version`.
    /// Returns the updated row so the caller can apply the circuit breaker,
    /// or None when the row moved underneath us.
    async fn increment_failures(
        &self,
        id: Uuid,
        expected_version: i64,
    ) -> Result<Option<DcaStrategy>, EngineError>;

    /// Execution history for one strategy, newest first
    async fn get_executions(
        &self,
        strategy_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DcaExecution>, EngineError>;

    /// Execution history across all of a user's strategies, newest first
    async fn get_user_executions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DcaExecution>, EngineError>;

    /// Active tradable pair by symbols; inactive pairs are not found
    async fn get_token_pair(
        &self,
        base_symbol: &str,
        target_symbol: &str,
    ) -> Result<Option<TokenPair>, EngineError>;
}

/// Postgres-backed store over the shared deadpool pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, EngineError> {
        self.pool.get().await.map_err(EngineError::from)
    }
}

#[async_trait]
impl StrategyStore for PostgresStore {
    async fn create_strategy(&self, params: NewStrategy) -> Result<DcaStrategy, EngineError> {
        if params.amount_per_interval <= 0 {
            return Err(EngineError::InvalidAmount(format!(
                "amount per interval must be positive, got {}",
                params.amount_per_interval
            )));
        }
        if !params.pair.active {
            return Err(EngineError::Store(format!(
                "token pair {}/{} is inactive",
                params.pair.base_symbol, params.pair.target_symbol
            )));
        }

        let client = self.client().await?;
        let id = Uuid::new_v4();
        let result = client
            .query_one(
                "INSERT INTO dca_strategies (
                     id, user_id,
                     base_symbol, base_mint, base_decimals,
                     target_symbol, target_mint, target_decimals,
                     frequency, amount_per_interval, next_execution_time
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
                 RETURNING *",
                &[
                    &id,
                    &params.user_id,
                    &params.pair.base_symbol,
                    &params.pair.base_mint,
                    &params.pair.base_decimals,
                    &params.pair.target_symbol,
                    &params.pair.target_mint,
                    &params.pair.target_decimals,
                    &params.frequency.as_str(),
                    &params.amount_per_interval,
                ],
            )
            .await;

        match result {
            Ok(row) => DcaStrategy::from_row(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(EngineError::Store(format!(
                    "user {} already has a live strategy for {}/{}",
                    params.user_id, params.pair.base_symbol, params.pair.target_symbol
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Option<DcaStrategy>, EngineError> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT * FROM dca_strategies WHERE id = $1", &[&id])
            .await?;
        row.map(|r| DcaStrategy::from_row(&r)).transpose()
    }

    async fn get_user_strategies(&self, user_id: Uuid) -> Result<Vec<DcaStrategy>, EngineError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT * FROM dca_strategies WHERE user_id = $1 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await?;
        rows.iter().map(DcaStrategy::from_row).collect()
    }

    async fn get_due_strategies(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueStrategy>, EngineError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT s.*, u.wallet_pubkey AS user_wallet_pubkey
                 FROM dca_strategies s
                 JOIN users u ON u.id = s.user_id
                 WHERE s.status = 'ACTIVE' AND s.next_execution_time <= $1
                 ORDER BY s.next_execution_time ASC",
                &[&now],
            )
            .await?;
        rows.iter().map(DueStrategy::from_row).collect()
    }

    async fn pause(&self, id: Uuid) -> Result<u64, EngineError> {
        let client = self.client().await?;
        let n = client
            .execute(
                "UPDATE dca_strategies
                 SET status = 'PAUSED', version = version + 1, updated_at = NOW()
                 WHERE id = $1 AND status = 'ACTIVE'",
                &[&id],
            )
            .await?;
        Ok(n)
    }

    async fn resume(&self, id: Uuid) -> Result<u64, EngineError> {
        let client = self.client().await?;
        let n = client
            .execute(
                "UPDATE dca_strategies
                 SET status = 'ACTIVE', version = version + 1, updated_at = NOW()
                 WHERE id = $1 AND status IN ('PAUSED', 'CANCELLED')",
                &[&id],
            )
            .await?;
        Ok(n)
    }

    async fn cancel(&self, id: Uuid) -> Result<u64, EngineError> {
        let client = self.client().await?;
        let n = client
            .execute(
                "UPDATE dca_strategies
                 SET status = 'CANCELLED', version = version + 1, updated_at = NOW()
                 WHERE id = $1 AND status IN ('ACTIVE', 'PAUSED')",
                &[&id],
            )
            .await?;
        Ok(n)
    }

    async fn record_execution(&self, params: NewExecution) -> Result<DcaExecution, EngineError> {
        let client = self.client().await?;
        let id = Uuid::new_v4();
        let row = client
            .query_one(
                "INSERT INTO dca_executions (
                     id, strategy_id, amount_invested, tokens_received,
                     execution_price, status, tx_hash, error_message
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING *",
                &[
                    &id,
                    &params.strategy_id,
                    &params.amount_invested,
                    &params.tokens_received,
                    &params.execution_price,
                    &params.status.as_str(),
                    &params.tx_hash,
                    &params.error_message,
                ],
            )
            .await?;
        DcaExecution::from_row(&row)
    }

    async fn update_after_success(
        &self,
        id: Uuid,
        expected_version: i64,
        next_time: DateTime<Utc>,
        amount_invested: i64,
    ) -> Result<bool, EngineError> {
        let client = self.client().await?;
        let n = client
            .execute(
                "UPDATE dca_strategies
                 SET next_execution_time = $2,
                     total_invested = total_invested + $3,
                     execution_count = execution_count + 1,
                     consecutive_failures = 0,
                     version = version + 1,
                     updated_at = NOW()
                 WHERE id = $1 AND version = $4",
                &[&id, &next_time, &amount_invested, &expected_version],
            )
            .await?;
        Ok(n == 1)
    }

    async fn increment_failures(
        &self,
        id: Uuid,
        expected_version: i64,
    ) -> Result<Option<DcaStrategy>, EngineError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "UPDATE dca_strategies
                 SET consecutive_failures = consecutive_failures + 1,
                     version = version + 1,
                     updated_at = NOW()
                 WHERE id = $1 AND version = $2
                 RETURNING *",
                &[&id, &expected_version],
            )
            .await?;
        row.map(|r| DcaStrategy::from_row(&r)).transpose()
    }

    async fn get_executions(
        &self,
        strategy_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DcaExecution>, EngineError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT * FROM dca_executions
                 WHERE strategy_id = $1
                 ORDER BY execution_time DESC
                 LIMIT $2",
                &[&strategy_id, &limit],
            )
            .await?;
        rows.iter().map(DcaExecution::from_row).collect()
    }

    async fn get_user_executions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DcaExecution>, EngineError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT e.* FROM dca_executions e
                 JOIN dca_strategies s ON s.id = e.strategy_id
                 WHERE s.user_id = $1
                 ORDER BY e.execution_time DESC
                 LIMIT $2",
                &[&user_id, &limit],
            )
            .await?;
        rows.iter().map(DcaExecution::from_row).collect()
    }

    async fn get_token_pair(
        &self,
        base_symbol: &str,
        target_symbol: &str,
    ) -> Result<Option<TokenPair>, EngineError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT * FROM token_pairs
                 WHERE base_symbol = $1 AND target_symbol = $2 AND active = TRUE",
                &[&base_symbol, &target_symbol],
            )
            .await?;
        row.map(|r| TokenPair::from_row(&r)).transpose()
    }
}
