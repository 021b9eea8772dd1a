//! # Analytics
//!
//! Per-strategy and per-portfolio performance rollups. Positions are marked
//! to market by simulating full liquidation of the accumulated tokens
//! through the current route; when no route can price a position it is
//! valued flat at cost so one dead token never poisons a whole portfolio.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::database::models::{DcaStrategy, ExecutionStatus, StrategyStatus};
use crate::database::store::StrategyStore;
use crate::error::EngineError;
use crate::math::units::scaled_price;
use crate::services::price_feed::PriceFeed;
use crate::services::quoter::RouteQuoter;

/// Upper bound on history rows folded into one rollup
const EXECUTION_FETCH_LIMIT: i64 = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct StrategyAnalytics {
    pub strategy_id: Uuid,
    pub status: StrategyStatus,
    pub target_symbol: String,
    /// All recorded execution attempts, failed ones included
    pub attempt_count: i64,
    /// Successful buys only
    pub buy_count: i64,
    /// Successful buys as a percentage of attempts
    pub success_rate: f64,
    /// Lamports spent across successful buys
    pub total_invested: i64,
    /// Smallest-unit tokens accumulated
    pub total_tokens: i64,
    /// Average cost, lamports per smallest target unit scaled by 1e9
    pub average_buy_price: i64,
    /// Market price at the same scale; equals the average buy price when
    /// the position cannot be quoted
    pub current_price: i64,
    /// Present value of the position in lamports
    pub current_value: i64,
    pub pnl: i64,
    pub pnl_pct: f64,
    /// False when the value is the flat at-cost fallback
    pub marked_to_market: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioAnalytics {
    pub user_id: Uuid,
    pub strategy_count: usize,
    pub active_count: usize,
    pub total_invested: i64,
    pub current_value: i64,
    pub pnl: i64,
    pub pnl_pct: f64,
    pub sol_price_usd: Option<f64>,
    pub current_value_usd: Option<f64>,
    pub strategies: Vec<StrategyAnalytics>,
}

pub struct AnalyticsService {
    store: Arc<dyn StrategyStore>,
    quoter: Arc<RouteQuoter>,
    price_feed: Arc<dyn PriceFeed>,
}

impl AnalyticsService {
    pub fn new(
        store: Arc<dyn StrategyStore>,
        quoter: Arc<RouteQuoter>,
        price_feed: Arc<dyn PriceFeed>,
    ) -> Self {
        Self {
            store,
            quoter,
            price_feed,
        }
    }

    pub async fn strategy_analytics(
        &self,
        strategy_id: Uuid,
    ) -> Result<StrategyAnalytics, EngineError> {
        let strategy = self
            .store
            .get_strategy(strategy_id)
            .await?
            .ok_or_else(|| EngineError::Store(format!("strategy {} not found", strategy_id)))?;
        self.analyze(&strategy).await
    }

    pub async fn portfolio_analytics(
        &self,
        user_id: Uuid,
    ) -> Result<PortfolioAnalytics, EngineError> {
        let strategies = self.store.get_user_strategies(user_id).await?;
        let active_count = strategies
            .iter()
            .filter(|s| s.status == StrategyStatus::Active)
            .count();

        let rollups = join_all(strategies.iter().map(|s| self.analyze(s))).await;
        let mut per_strategy = Vec::with_capacity(rollups.len());
        for rollup in rollups {
            match rollup {
                Ok(analytics) => per_strategy.push(analytics),
                Err(e) => warn!("Dropping strategy from portfolio rollup: {}", e),
            }
        }

        let total_invested = per_strategy
            .iter()
            .fold(0i64, |acc, a| acc.saturating_add(a.total_invested));
        let current_value = per_strategy
            .iter()
            .fold(0i64, |acc, a| acc.saturating_add(a.current_value));
        let pnl = current_value.saturating_sub(total_invested);
        let pnl_pct = percentage(pnl, total_invested);

        let sol_price_usd = self.price_feed.sol_price_usd().await;
        let current_value_usd = sol_price_usd.map(|price| current_value as f64 / 1e9 * price);

        Ok(PortfolioAnalytics {
            user_id,
            strategy_count: strategies.len(),
            active_count,
            total_invested,
            current_value,
            pnl,
            pnl_pct,
            sol_price_usd,
            current_value_usd,
            strategies: per_strategy,
        })
    }

    async fn analyze(&self, strategy: &DcaStrategy) -> Result<StrategyAnalytics, EngineError> {
        let executions = self
            .store
            .get_executions(strategy.id, EXECUTION_FETCH_LIMIT)
            .await?;

        let attempt_count = executions.len() as i64;
        let mut total_invested = 0i64;
        let mut total_tokens = 0i64;
        let mut buy_count = 0i64;
        for execution in &executions {
            if execution.status == ExecutionStatus::Success {
                total_invested = total_invested.saturating_add(execution.amount_invested);
                total_tokens = total_tokens.saturating_add(execution.tokens_received);
                buy_count += 1;
            }
        }

        let (current_value, marked_to_market) = self
            .position_value(&strategy.target_mint, total_invested, total_tokens)
            .await;
        let pnl = current_value.saturating_sub(total_invested);

        let average_buy_price =
            scaled_price(total_invested.max(0) as u64, total_tokens.max(0) as u64);
        let current_price = if marked_to_market {
            scaled_price(current_value.max(0) as u64, total_tokens.max(0) as u64)
        } else {
            average_buy_price
        };

        Ok(StrategyAnalytics {
            strategy_id: strategy.id,
            status: strategy.status,
            target_symbol: strategy.target_symbol.clone(),
            attempt_count,
            buy_count,
            success_rate: percentage(buy_count, attempt_count),
            total_invested,
            total_tokens,
            average_buy_price,
            current_price,
            current_value,
            pnl,
            pnl_pct: percentage(pnl, total_invested),
            marked_to_market,
        })
    }

    /// Lamports the accumulated position would fetch if fully liquidated
    /// right now. Falls back to valuing at cost when no route prices it.
    async fn position_value(&self, mint: &str, invested: i64, tokens: i64) -> (i64, bool) {
        if tokens <= 0 {
            return (0, false);
        }
        match self.quoter.quote_sell(mint, tokens as u64).await {
            Ok(quote) if !quote.is_unavailable() => {
                (i64::try_from(quote.output_amount).unwrap_or(i64::MAX), true)
            }
            Ok(_) => (invested, false),
            Err(e) => {
                warn!("Could not value {} position: {}", mint, e);
                (invested, false)
            }
        }
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Frequency, TokenPair};
    use crate::database::store::memory::MemoryStore;
    use crate::database::store::{NewExecution, NewStrategy};
    use crate::services::curve_program::{CurveProgram, CurveState};
    use crate::services::jupiter::{Aggregator, JupiterQuote, SwapOutcome};
    use async_trait::async_trait;
    use chrono::Utc;
    use solana_sdk::signature::Keypair;

    struct NoCurve;

    #[async_trait]
    impl CurveProgram for NoCurve {
        async fn curve_state(&self, _mint: &str) -> Result<Option<CurveState>, EngineError> {
            Ok(None)
        }

        async fn buy(
            &self,
            _signer: &Keypair,
            _mint: &str,
            _token_amount_out: u64,
            _max_sol_cost: u64,
        ) -> Result<String, EngineError> {
            Err(EngineError::Execution("read-only test".to_string()))
        }

        async fn sell(
            &self,
            _signer: &Keypair,
            _mint: &str,
            _token_amount_in: u64,
            _min_sol_out: u64,
        ) -> Result<String, EngineError> {
            Err(EngineError::Execution("read-only test".to_string()))
        }
    }

    struct FixedAggregator {
        out_amount: Option<u64>,
    }

    #[async_trait]
    impl Aggregator for FixedAggregator {
        async fn best_route(
            &self,
            input_mint: &str,
            output_mint: &str,
            amount_in: u64,
            slippage_bps: u64,
        ) -> Result<JupiterQuote, EngineError> {
            let out = self
                .out_amount
                .ok_or_else(|| EngineError::NoRouteFound(output_mint.to_string()))?;
            Ok(JupiterQuote {
                input_mint: input_mint.to_string(),
                in_amount: amount_in.to_string(),
                output_mint: output_mint.to_string(),
                out_amount: out.to_string(),
                other_amount_threshold: None,
                swap_mode: Some("ExactIn".to_string()),
                slippage_bps: Some(slippage_bps as u16),
                platform_fee: None,
                price_impact_pct: None,
                route_plan: None,
                context_slot: None,
                time_taken: None,
            })
        }

        async fn execute_swap(
            &self,
            route: &JupiterQuote,
            _signer: &Keypair,
        ) -> Result<SwapOutcome, EngineError> {
            Ok(SwapOutcome {
                signature: "unused".to_string(),
                output_amount: route.out_amount_units()?,
            })
        }
    }

    struct StubPrice(Option<f64>);

    #[async_trait]
    impl PriceFeed for StubPrice {
        async fn sol_price_usd(&self) -> Option<f64> {
            self.0
        }
    }

    fn pair(target_symbol: &str, target_mint: &str) -> TokenPair {
        TokenPair {
            id: Uuid::new_v4(),
            base_symbol: "SOL".to_string(),
            base_mint: crate::services::SOL_MINT.to_string(),
            base_decimals: 9,
            target_symbol: target_symbol.to_string(),
            target_mint: target_mint.to_string(),
            target_decimals: 6,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn service(
        store: Arc<MemoryStore>,
        sell_quote: Option<u64>,
        sol_price: Option<f64>,
    ) -> AnalyticsService {
        let quoter = Arc::new(RouteQuoter::new(
            Arc::new(NoCurve),
            Arc::new(FixedAggregator {
                out_amount: sell_quote,
            }),
        ));
        AnalyticsService::new(store, quoter, Arc::new(StubPrice(sol_price)))
    }

    async fn strategy_with_history(store: &MemoryStore) -> DcaStrategy {
        let strategy = store
            .create_strategy(NewStrategy {
                user_id: Uuid::new_v4(),
                pair: pair("TKN", "tok111111111111111111111111111111111111111"),
                frequency: Frequency::Daily,
                amount_per_interval: 100_000_000,
            })
            .await
            .unwrap();
        store
            .record_execution(NewExecution::success(
                strategy.id,
                100_000_000,
                50_000_000,
                2_000_000_000,
                "sig-1".to_string(),
            ))
            .await
            .unwrap();
        store
            .record_execution(NewExecution::failure(
                strategy.id,
                "no route".to_string(),
            ))
            .await
            .unwrap();
        store
            .record_execution(NewExecution::success(
                strategy.id,
                100_000_000,
                30_000_000,
                3_333_333_333,
                "sig-2".to_string(),
            ))
            .await
            .unwrap();
        strategy
    }

    #[tokio::test]
    async fn sums_only_successful_buys() {
        let store = Arc::new(MemoryStore::new());
        let strategy = strategy_with_history(&store).await;
        let analytics = service(store, Some(250_000_000), None);

        let rollup = analytics.strategy_analytics(strategy.id).await.unwrap();
        assert_eq!(rollup.attempt_count, 3);
        assert_eq!(rollup.buy_count, 2);
        assert!((rollup.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(rollup.total_invested, 200_000_000);
        assert_eq!(rollup.total_tokens, 80_000_000);
        // 0.2 SOL over 80M units: 2.5 lamports per unit scaled by 1e9
        assert_eq!(rollup.average_buy_price, 2_500_000_000);
        assert!(rollup.marked_to_market);
        assert_eq!(rollup.current_value, 250_000_000);
        assert_eq!(rollup.current_price, 3_125_000_000);
        assert_eq!(rollup.pnl, 50_000_000);
        assert!((rollup.pnl_pct - 25.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unquotable_positions_are_valued_at_cost() {
        let store = Arc::new(MemoryStore::new());
        let strategy = strategy_with_history(&store).await;
        let analytics = service(store, None, None);

        let rollup = analytics.strategy_analytics(strategy.id).await.unwrap();
        assert!(!rollup.marked_to_market);
        assert_eq!(rollup.current_value, rollup.total_invested);
        assert_eq!(rollup.current_price, rollup.average_buy_price);
        assert_eq!(rollup.pnl, 0);
        assert_eq!(rollup.pnl_pct, 0.0);
    }

    #[tokio::test]
    async fn empty_strategies_report_zeros() {
        let store = Arc::new(MemoryStore::new());
        let strategy = store
            .create_strategy(NewStrategy {
                user_id: Uuid::new_v4(),
                pair: pair("TKN", "tok111111111111111111111111111111111111111"),
                frequency: Frequency::Weekly,
                amount_per_interval: 1_000_000,
            })
            .await
            .unwrap();
        let analytics = service(store, Some(1), None);

        let rollup = analytics.strategy_analytics(strategy.id).await.unwrap();
        assert_eq!(rollup.attempt_count, 0);
        assert_eq!(rollup.buy_count, 0);
        assert_eq!(rollup.success_rate, 0.0);
        assert_eq!(rollup.total_invested, 0);
        assert_eq!(rollup.current_value, 0);
        assert_eq!(rollup.average_buy_price, 0);
        assert_eq!(rollup.current_price, 0);
        assert!(!rollup.marked_to_market);
    }

    #[tokio::test]
    async fn missing_strategy_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let analytics = service(store, Some(1), None);
        assert!(analytics.strategy_analytics(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn portfolio_aggregates_across_strategies() {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();

        let first = store
            .create_strategy(NewStrategy {
                user_id,
                pair: pair("AAA", "aaa111111111111111111111111111111111111111"),
                frequency: Frequency::Daily,
                amount_per_interval: 100_000_000,
            })
            .await
            .unwrap();
        store
            .record_execution(NewExecution::success(
                first.id,
                100_000_000,
                50_000_000,
                2_000_000_000,
                "sig-a".to_string(),
            ))
            .await
            .unwrap();

        let second = store
            .create_strategy(NewStrategy {
                user_id,
                pair: pair("BBB", "bbb111111111111111111111111111111111111111"),
                frequency: Frequency::Daily,
                amount_per_interval: 50_000_000,
            })
            .await
            .unwrap();
        store
            .record_execution(NewExecution::success(
                second.id,
                50_000_000,
                10_000_000,
                5_000_000_000,
                "sig-b".to_string(),
            ))
            .await
            .unwrap();
        store.pause(second.id).await.unwrap();

        // both positions quoted at 120M lamports each
        let analytics = service(store, Some(120_000_000), Some(100.0));
        let portfolio = analytics.portfolio_analytics(user_id).await.unwrap();

        assert_eq!(portfolio.strategy_count, 2);
        assert_eq!(portfolio.active_count, 1);
        assert_eq!(portfolio.total_invested, 150_000_000);
        assert_eq!(portfolio.current_value, 240_000_000);
        assert_eq!(portfolio.pnl, 90_000_000);
        assert_eq!(portfolio.sol_price_usd, Some(100.0));
        // 0.24 SOL at $100
        assert!((portfolio.current_value_usd.unwrap() - 24.0).abs() < 1e-9);
        assert_eq!(portfolio.strategies.len(), 2);
    }

    #[tokio::test]
    async fn empty_portfolio_is_flat() {
        let store = Arc::new(MemoryStore::new());
        let analytics = service(store, Some(1), None);
        let portfolio = analytics.portfolio_analytics(Uuid::new_v4()).await.unwrap();
        assert_eq!(portfolio.strategy_count, 0);
        assert_eq!(portfolio.total_invested, 0);
        assert_eq!(portfolio.current_value, 0);
        assert_eq!(portfolio.pnl_pct, 0.0);
        assert!(portfolio.current_value_usd.is_none());
    }
}
