//! # DCA Scheduler
//!
//! The recurring-buy loop. Every tick it loads the due set (ACTIVE
//! strategies whose next execution time has passed, oldest first) and works
//! through it strictly serially, pacing between trades so a burst of due
//! strategies does not slam the RPC node. Per-strategy failures are recorded
//! and counted; the run carries on. Three consecutive failures trip the
//! circuit breaker and pause the strategy until its owner intervenes.
//!
//! All post-trade strategy writes are compare-and-swap on the row version
//! read with the due set. When a user pauses or cancels mid-trade the trade
//! may still land, but the stale state update is skipped and logged rather
//! than clobbering the user's change.

use chrono::Utc;
use serde::Serialize;
use solana_sdk::signature::Signer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::CONFIG;
use crate::database::models::{DcaStrategy, DueStrategy};
use crate::database::store::{NewExecution, StrategyStore};
use crate::error::EngineError;
use crate::math::units::{from_base_units, scaled_price, to_base_units};
use crate::services::executor::{ExecutionOutcome, TradeExecutor};
use crate::services::wallet::WalletProvider;
use crate::services::SOL_MINT;

pub struct DcaScheduler {
    store: Arc<dyn StrategyStore>,
    executor: Arc<TradeExecutor>,
    wallets: Arc<dyn WalletProvider>,
    tick_interval: Duration,
    pacing: Duration,
    max_consecutive_failures: i32,
    is_running: Arc<RwLock<bool>>,
    ticks: AtomicU64,
    trades_executed: AtomicU64,
    trades_failed: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub ticks: u64,
    pub trades_executed: u64,
    pub trades_failed: u64,
    pub tick_interval_secs: u64,
}

impl DcaScheduler {
    pub fn new(
        store: Arc<dyn StrategyStore>,
        executor: Arc<TradeExecutor>,
        wallets: Arc<dyn WalletProvider>,
    ) -> Self {
        Self::with_timing(
            store,
            executor,
            wallets,
            Duration::from_secs(CONFIG.scheduler.tick_interval_secs),
            Duration::from_millis(CONFIG.scheduler.execution_pacing_ms),
            CONFIG.scheduler.max_consecutive_failures,
        )
    }

    fn with_timing(
        store: Arc<dyn StrategyStore>,
        executor: Arc<TradeExecutor>,
        wallets: Arc<dyn WalletProvider>,
        tick_interval: Duration,
        pacing: Duration,
        max_consecutive_failures: i32,
    ) -> Self {
        Self {
            store,
            executor,
            wallets,
            tick_interval,
            pacing,
            max_consecutive_failures,
            is_running: Arc::new(RwLock::new(false)),
            ticks: AtomicU64::new(0),
            trades_executed: AtomicU64::new(0),
            trades_failed: AtomicU64::new(0),
        }
    }

    /// Run the tick loop until [`stop`](Self::stop) is called. Returns
    /// immediately if the scheduler is already running.
    pub async fn start(&self) {
        {
            let mut is_running = self.is_running.write().await;
            if *is_running {
                return;
            }
            *is_running = true;
        }

        info!("⏰ DCA scheduler started, tick every {:?}", self.tick_interval);

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while *self.is_running.read().await {
            ticker.tick().await;
            self.tick().await;
        }

        info!("DCA scheduler stopped");
    }

    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        *is_running = false;
    }

    pub async fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            is_running: *self.is_running.read().await,
            ticks: self.ticks.load(Ordering::Relaxed),
            trades_executed: self.trades_executed.load(Ordering::Relaxed),
            trades_failed: self.trades_failed.load(Ordering::Relaxed),
            tick_interval_secs: self.tick_interval.as_secs(),
        }
    }

    /// One due-set sweep. A failed due-set query aborts the whole tick; any
    /// later failure is contained to its own strategy.
    pub async fn tick(&self) {
        let now = Utc::now();
        let due = match self.store.get_due_strategies(now).await {
            Ok(due) => due,
            Err(e) => {
                error!("Skipping tick, could not load due strategies: {}", e);
                return;
            }
        };
        self.ticks.fetch_add(1, Ordering::Relaxed);

        if due.is_empty() {
            debug!("No strategies due");
            return;
        }
        info!("⏰ {} strategies due", due.len());

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        for (i, entry) in due.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
            if self.run_one(entry).await {
                succeeded += 1;
            } else {
                failed += 1;
            }
        }
        self.trades_executed.fetch_add(succeeded, Ordering::Relaxed);
        self.trades_failed.fetch_add(failed, Ordering::Relaxed);
        info!("⏰ Tick complete: {} bought, {} failed", succeeded, failed);
    }

    async fn run_one(&self, due: &DueStrategy) -> bool {
        match self.attempt(due).await {
            Ok((outcome, tokens_received)) => {
                self.finalize_success(&due.strategy, outcome, tokens_received)
                    .await;
                true
            }
            Err(e) => {
                self.finalize_failure(&due.strategy, e).await;
                false
            }
        }
    }

    async fn attempt(
        &self,
        due: &DueStrategy,
    ) -> Result<(ExecutionOutcome, i64), EngineError> {
        let strategy = &due.strategy;

        // the pair is re-resolved every run so deactivating it stops trading
        let pair = self
            .store
            .get_token_pair(&strategy.base_symbol, &strategy.target_symbol)
            .await?
            .ok_or_else(|| {
                EngineError::Execution(format!(
                    "token pair {}/{} is unavailable",
                    strategy.base_symbol, strategy.target_symbol
                ))
            })?;
        if pair.base_mint != SOL_MINT {
            return Err(EngineError::Execution(format!(
                "base token {} is not SOL",
                pair.base_symbol
            )));
        }

        let amount = u64::try_from(strategy.amount_per_interval).map_err(|_| {
            EngineError::InvalidAmount(format!(
                "negative amount per interval on strategy {}",
                strategy.id
            ))
        })?;

        let wallet_pubkey = match &due.wallet_pubkey {
            Some(pubkey) => pubkey.clone(),
            None => self
                .wallets
                .get_or_create_keypair(strategy.user_id)
                .await?
                .pubkey()
                .to_string(),
        };
        let available = self.wallets.balance(&wallet_pubkey).await?;
        let required = amount.saturating_add(CONFIG.execution.fee_buffer_lamports);
        if available < required {
            return Err(EngineError::InsufficientBalance {
                required,
                available,
            });
        }

        let signer = self.wallets.get_or_create_keypair(strategy.user_id).await?;
        let sol_amount = from_base_units(amount as u128, pair.base_decimals as u32);
        let outcome = self
            .executor
            .execute_buy(
                &signer,
                &pair.target_mint,
                &sol_amount,
                pair.target_decimals as u32,
                CONFIG.execution.slippage_bps,
            )
            .await?;

        let units = to_base_units(&outcome.output_amount, pair.target_decimals as u32)?;
        let tokens_received = i64::try_from(units).unwrap_or(i64::MAX);
        Ok((outcome, tokens_received))
    }

    async fn finalize_success(
        &self,
        strategy: &DcaStrategy,
        outcome: ExecutionOutcome,
        tokens_received: i64,
    ) {
        info!(
            "✅ Strategy {} bought {} {} ({})",
            strategy.id, outcome.output_amount, strategy.target_symbol, outcome.signature
        );

        let price = scaled_price(
            strategy.amount_per_interval.max(0) as u64,
            tokens_received.max(0) as u64,
        );
        let record = NewExecution::success(
            strategy.id,
            strategy.amount_per_interval,
            tokens_received,
            price,
            outcome.signature,
        );
        if let Err(e) = self.store.record_execution(record).await {
            error!("Failed to record execution for {}: {}", strategy.id, e);
        }

        // next run is anchored to now, not to the originally scheduled time,
        // so a late tick does not cause back-to-back buys
        let next_time = Utc::now() + strategy.frequency.interval();
        match self
            .store
            .update_after_success(
                strategy.id,
                strategy.version,
                next_time,
                strategy.amount_per_interval,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                "🔄 Strategy {} changed concurrently, leaving its state untouched",
                strategy.id
            ),
            Err(e) => error!("Failed to update strategy {} after success: {}", strategy.id, e),
        }
    }

    async fn finalize_failure(&self, strategy: &DcaStrategy, err: EngineError) {
        error!("❌ Strategy {} execution failed: {}", strategy.id, err);

        let record = NewExecution::failure(strategy.id, err.to_string());
        if let Err(e) = self.store.record_execution(record).await {
            error!("Failed to record failure for {}: {}", strategy.id, e);
        }

        match self.store.increment_failures(strategy.id, strategy.version).await {
            Ok(Some(updated))
                if updated.consecutive_failures >= self.max_consecutive_failures =>
            {
                match self.store.pause(strategy.id).await {
                    Ok(1) => warn!(
                        "⏸️ Auto-paused strategy {} after {} consecutive failures",
                        strategy.id, updated.consecutive_failures
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Failed to auto-pause strategy {}: {}", strategy.id, e),
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => warn!(
                "🔄 Strategy {} changed concurrently, failure count not updated",
                strategy.id
            ),
            Err(e) => error!("Failed to bump failure count for {}: {}", strategy.id, e),
        }
    }
}
