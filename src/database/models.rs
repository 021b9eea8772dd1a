// Database Models
//
// Tokio-postgres compatible models for the DCA engine: users with custodial
// wallets, tradable token pairs, recurring strategies and their execution
// history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::EngineError;

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self, EngineError>
    where
        Self: Sized;
}

// ============================================================================
// USER & WALLET MODELS
// ============================================================================

/// User account with an optional custodial trading wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Base58 public key of the custodial wallet, set on first use
    pub wallet_pubkey: Option<String>,
    /// Base58-encoded 64-byte keypair, set on first use
    #[serde(skip_serializing)]
    pub wallet_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        Ok(Self {
            id: row.try_get("id")?,
            wallet_pubkey: row.try_get("wallet_pubkey")?,
            wallet_secret: row.try_get("wallet_secret")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// ============================================================================
// TOKEN PAIR MODELS
// ============================================================================

/// Admin-managed tradable pair. Strategies snapshot these fields at creation
/// and re-resolve by symbols at execution time so a deactivated pair stops
/// trading immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub id: Uuid,
    pub base_symbol: String,
    pub base_mint: String,
    pub base_decimals: i32,
    pub target_symbol: String,
    pub target_mint: String,
    pub target_decimals: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl FromRow for TokenPair {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        Ok(Self {
            id: row.try_get("id")?,
            base_symbol: row.try_get("base_symbol")?,
            base_mint: row.try_get("base_mint")?,
            base_decimals: row.try_get("base_decimals")?,
            target_symbol: row.try_get("target_symbol")?,
            target_mint: row.try_get("target_mint")?,
            target_decimals: row.try_get("target_decimals")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// ============================================================================
// DCA STRATEGY MODELS
// ============================================================================

/// Strategy lifecycle state, stored as TEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyStatus {
    Active,
    Paused,
    Cancelled,
    /// Reserved: nothing transitions here yet
    Completed,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "ACTIVE",
            StrategyStatus::Paused => "PAUSED",
            StrategyStatus::Cancelled => "CANCELLED",
            StrategyStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for StrategyStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(StrategyStatus::Active),
            "PAUSED" => Ok(StrategyStatus::Paused),
            "CANCELLED" => Ok(StrategyStatus::Cancelled),
            "COMPLETED" => Ok(StrategyStatus::Completed),
            other => Err(EngineError::Store(format!(
                "unknown strategy status: {other}"
            ))),
        }
    }
}

/// Purchase cadence, stored as TEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    /// One-minute cadence for integration testing
    Test,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Test => "TEST",
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
        }
    }

    /// Fixed interval between executions. MONTHLY is a flat 30 days.
    pub fn interval(&self) -> chrono::Duration {
        match self {
            Frequency::Test => chrono::Duration::seconds(60),
            Frequency::Hourly => chrono::Duration::hours(1),
            Frequency::Daily => chrono::Duration::days(1),
            Frequency::Weekly => chrono::Duration::weeks(1),
            Frequency::Monthly => chrono::Duration::days(30),
        }
    }
}

impl FromStr for Frequency {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEST" => Ok(Frequency::Test),
            "HOURLY" => Ok(Frequency::Hourly),
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            other => Err(EngineError::Store(format!("unknown frequency: {other}"))),
        }
    }
}

/// A recurring purchase instruction. All amounts are integer smallest units
/// of the base token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaStrategy {
    pub id: Uuid,
    pub user_id: Uuid,
    pub base_symbol: String,
    pub base_mint: String,
    pub base_decimals: i32,
    pub target_symbol: String,
    pub target_mint: String,
    pub target_decimals: i32,
    pub frequency: Frequency,
    pub amount_per_interval: i64,
    pub next_execution_time: DateTime<Utc>,
    pub status: StrategyStatus,
    pub consecutive_failures: i32,
    pub execution_count: i32,
    pub total_invested: i64,
    /// Optimistic-concurrency counter; scheduler writes check it
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DcaStrategy {
    /// Whether the scheduler should pick this strategy up at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == StrategyStatus::Active && self.next_execution_time <= now
    }
}

impl FromRow for DcaStrategy {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            base_symbol: row.try_get("base_symbol")?,
            base_mint: row.try_get("base_mint")?,
            base_decimals: row.try_get("base_decimals")?,
            target_symbol: row.try_get("target_symbol")?,
            target_mint: row.try_get("target_mint")?,
            target_decimals: row.try_get("target_decimals")?,
            frequency: row.try_get::<_, String>("frequency")?.parse()?,
            amount_per_interval: row.try_get("amount_per_interval")?,
            next_execution_time: row.try_get("next_execution_time")?,
            status: row.try_get::<_, String>("status")?.parse()?,
            consecutive_failures: row.try_get("consecutive_failures")?,
            execution_count: row.try_get("execution_count")?,
            total_invested: row.try_get("total_invested")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A due strategy joined with the owner's wallet pubkey
#[derive(Debug, Clone)]
pub struct DueStrategy {
    pub strategy: DcaStrategy,
    pub wallet_pubkey: Option<String>,
}

impl FromRow for DueStrategy {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        Ok(Self {
            strategy: DcaStrategy::from_row(row)?,
            wallet_pubkey: row.try_get("user_wallet_pubkey")?,
        })
    }
}

// ============================================================================
// EXECUTION MODELS
// ============================================================================

/// Outcome of one execution attempt, stored as TEXT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Pending,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Pending => "PENDING",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "PENDING" => Ok(ExecutionStatus::Pending),
            other => Err(EngineError::Store(format!(
                "unknown execution status: {other}"
            ))),
        }
    }
}

/// Immutable record of one execution attempt. Amounts are zero on failure;
/// `execution_price` is lamports per smallest target unit, scaled by 1e9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaExecution {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub amount_invested: i64,
    pub tokens_received: i64,
    pub execution_price: i64,
    pub status: ExecutionStatus,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub execution_time: DateTime<Utc>,
}

impl FromRow for DcaExecution {
    fn from_row(row: &Row) -> Result<Self, EngineError> {
        Ok(Self {
            id: row.try_get("id")?,
            strategy_id: row.try_get("strategy_id")?,
            amount_invested: row.try_get("amount_invested")?,
            tokens_received: row.try_get("tokens_received")?,
            execution_price: row.try_get("execution_price")?,
            status: row.try_get::<_, String>("status")?.parse()?,
            tx_hash: row.try_get("tx_hash")?,
            error_message: row.try_get("error_message")?,
            execution_time: row.try_get("execution_time")?,
        })
    }
}
