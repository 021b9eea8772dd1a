//! # Trade Executor
//!
//! Turns a routed quote into a signed on-chain trade. Amounts cross this
//! boundary as decimal strings ("0.1" SOL, "50" tokens) and are converted
//! to base units internally, so callers never juggle lamports directly.
//! Every outbound call is wrapped in a hard timeout; a hung RPC node fails
//! the trade instead of wedging the scheduler.

use serde::Serialize;
use solana_sdk::signature::Keypair;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::CONFIG;
use crate::error::EngineError;
use crate::math::units::{from_base_units, to_base_units};
use crate::services::curve_program::CurveProgram;
use crate::services::jupiter::Aggregator;
use crate::services::quoter::{QuoteRoute, RouteQuoter, TradeQuote};

/// Completed trade, amounts as decimal strings
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub signature: String,
    /// Amount spent, in whole units of the input token
    pub input_amount: String,
    /// Amount received, in whole units of the output token
    pub output_amount: String,
    pub route: QuoteRoute,
}

pub struct TradeExecutor {
    quoter: Arc<RouteQuoter>,
    curve: Arc<dyn CurveProgram>,
    aggregator: Arc<dyn Aggregator>,
    call_timeout: Duration,
}

impl TradeExecutor {
    pub fn new(
        quoter: Arc<RouteQuoter>,
        curve: Arc<dyn CurveProgram>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        Self::with_timeout(
            quoter,
            curve,
            aggregator,
            Duration::from_secs(CONFIG.execution.request_timeout_secs),
        )
    }

    fn with_timeout(
        quoter: Arc<RouteQuoter>,
        curve: Arc<dyn CurveProgram>,
        aggregator: Arc<dyn Aggregator>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            quoter,
            curve,
            aggregator,
            call_timeout,
        }
    }

    /// Buy `mint` with `sol_amount` SOL (decimal string). The outcome's
    /// output amount is a decimal string in whole tokens at
    /// `target_decimals`.
    pub async fn execute_buy(
        &self,
        signer: &Keypair,
        mint: &str,
        sol_amount: &str,
        target_decimals: u32,
        slippage_bps: u64,
    ) -> Result<ExecutionOutcome, EngineError> {
        let lamports = parse_amount(sol_amount, 9)?;

        let quote = self
            .bounded(
                "buy quote",
                self.quoter.quote_buy_for_execution(mint, lamports, slippage_bps),
            )
            .await?;

        let (signature, received) = match quote.route {
            QuoteRoute::BondingCurve => {
                let max_sol_cost = with_slippage_up(lamports, slippage_bps);
                let signature = self
                    .bounded(
                        "curve buy",
                        self.curve.buy(signer, mint, quote.output_amount, max_sol_cost),
                    )
                    .await?;
                (signature, quote.output_amount)
            }
            QuoteRoute::ExternalAmm => {
                let route = aggregator_route(&quote, mint)?;
                let outcome = self
                    .bounded("aggregator swap", self.aggregator.execute_swap(route, signer))
                    .await?;
                (outcome.signature, outcome.output_amount)
            }
            QuoteRoute::Undefined => return Err(EngineError::NoRouteFound(mint.to_string())),
        };

        info!(
            "💸 Bought {} {} for {} SOL via {:?} ({})",
            from_base_units(received as u128, target_decimals),
            mint,
            from_base_units(lamports as u128, 9),
            quote.route,
            signature
        );

        Ok(ExecutionOutcome {
            signature,
            input_amount: from_base_units(lamports as u128, 9),
            output_amount: from_base_units(received as u128, target_decimals),
            route: quote.route,
        })
    }

    /// Sell `token_amount` (decimal string, `target_decimals` places) of
    /// `mint` back into SOL.
    pub async fn execute_sell(
        &self,
        signer: &Keypair,
        mint: &str,
        token_amount: &str,
        target_decimals: u32,
        slippage_bps: u64,
    ) -> Result<ExecutionOutcome, EngineError> {
        let tokens_in = parse_amount(token_amount, target_decimals)?;

        let quote = self
            .bounded(
                "sell quote",
                self.quoter.quote_sell_for_execution(mint, tokens_in, slippage_bps),
            )
            .await?;

        let (signature, received) = match quote.route {
            QuoteRoute::BondingCurve => {
                let min_sol_out = with_slippage_down(quote.output_amount, slippage_bps);
                let signature = self
                    .bounded(
                        "curve sell",
                        self.curve.sell(signer, mint, tokens_in, min_sol_out),
                    )
                    .await?;
                (signature, quote.output_amount)
            }
            QuoteRoute::ExternalAmm => {
                let route = aggregator_route(&quote, mint)?;
                let outcome = self
                    .bounded("aggregator swap", self.aggregator.execute_swap(route, signer))
                    .await?;
                (outcome.signature, outcome.output_amount)
            }
            QuoteRoute::Undefined => return Err(EngineError::NoRouteFound(mint.to_string())),
        };

        info!(
            "💸 Sold {} {} for {} SOL via {:?} ({})",
            from_base_units(tokens_in as u128, target_decimals),
            mint,
            from_base_units(received as u128, 9),
            quote.route,
            signature
        );

        Ok(ExecutionOutcome {
            signature,
            input_amount: from_base_units(tokens_in as u128, target_decimals),
            output_amount: from_base_units(received as u128, 9),
            route: quote.route,
        })
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Execution(format!(
                "{} timed out after {:?}",
                what, self.call_timeout
            ))),
        }
    }
}

fn parse_amount(amount: &str, decimals: u32) -> Result<u64, EngineError> {
    let units = to_base_units(amount, decimals)?;
    if units == 0 {
        return Err(EngineError::InvalidAmount(format!(
            "amount {} is zero at {} decimals",
            amount, decimals
        )));
    }
    u64::try_from(units)
        .map_err(|_| EngineError::InvalidAmount(format!("amount {} exceeds u64 range", amount)))
}

fn aggregator_route<'a>(
    quote: &'a TradeQuote,
    mint: &str,
) -> Result<&'a crate::services::jupiter::JupiterQuote, EngineError> {
    quote
        .aggregator_route
        .as_ref()
        .ok_or_else(|| EngineError::Execution(format!("aggregator route missing for {}", mint)))
}

fn with_slippage_up(amount: u64, slippage_bps: u64) -> u64 {
    let scaled = (amount as u128) * (10_000 + slippage_bps as u128) / 10_000;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

fn with_slippage_down(amount: u64, slippage_bps: u64) -> u64 {
    let kept = 10_000u128.saturating_sub(slippage_bps as u128);
    ((amount as u128) * kept / 10_000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::curve_program::CurveState;
    use crate::services::jupiter::{JupiterQuote, SwapOutcome};
    use async_trait::async_trait;
    use solana_sdk::pubkey::Pubkey;
    use std::sync::Mutex;

    const MINT: &str = "tok111111111111111111111111111111111111111";

    #[derive(Default)]
    struct RecordingCurve {
        state: Mutex<Option<CurveState>>,
        state_delay: Option<Duration>,
        buys: Mutex<Vec<(u64, u64)>>,
        sells: Mutex<Vec<(u64, u64)>>,
    }

    impl RecordingCurve {
        fn live(sol: u64, token: u64) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(Some(CurveState {
                    virtual_token_reserves: token,
                    virtual_sol_reserves: sol,
                    real_token_reserves: token,
                    real_sol_reserves: 0,
                    token_total_supply: token,
                    complete: false,
                    creator: Pubkey::new_unique(),
                })),
                ..Default::default()
            })
        }

        fn absent() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    #[async_trait]
    impl CurveProgram for RecordingCurve {
        async fn curve_state(&self, _mint: &str) -> Result<Option<CurveState>, EngineError> {
            if let Some(delay) = self.state_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(*self.state.lock().unwrap())
        }

        async fn buy(
            &self,
            _signer: &Keypair,
            _mint: &str,
            token_amount_out: u64,
            max_sol_cost: u64,
        ) -> Result<String, EngineError> {
            self.buys.lock().unwrap().push((token_amount_out, max_sol_cost));
            Ok("curve-buy-sig".to_string())
        }

        async fn sell(
            &self,
            _signer: &Keypair,
            _mint: &str,
            token_amount_in: u64,
            min_sol_out: u64,
        ) -> Result<String, EngineError> {
            self.sells.lock().unwrap().push((token_amount_in, min_sol_out));
            Ok("curve-sell-sig".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingAggregator {
        quote_out: Option<u64>,
        swap_out: Option<u64>,
        swaps: Mutex<u64>,
    }

    #[async_trait]
    impl Aggregator for RecordingAggregator {
        async fn best_route(
            &self,
            input_mint: &str,
            output_mint: &str,
            amount_in: u64,
            slippage_bps: u64,
        ) -> Result<JupiterQuote, EngineError> {
            let out = self
                .quote_out
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
                price_impact_pct: Some("0.1".to_string()),
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
            *self.swaps.lock().unwrap() += 1;
            Ok(SwapOutcome {
                signature: "amm-sig".to_string(),
                output_amount: self.swap_out.unwrap_or(route.out_amount_units()?),
            })
        }
    }

    fn executor(
        curve: Arc<RecordingCurve>,
        aggregator: Arc<RecordingAggregator>,
        timeout: Duration,
    ) -> TradeExecutor {
        let quoter = Arc::new(RouteQuoter::new(curve.clone(), aggregator.clone()));
        TradeExecutor::with_timeout(quoter, curve, aggregator, timeout)
    }

    #[tokio::test]
    async fn curve_buy_passes_quote_and_slippage_limit() {
        let curve = RecordingCurve::live(30_000_000_000, 1_073_000_000_000_000);
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve.clone(), aggregator, Duration::from_secs(5));

        let outcome = executor
            .execute_buy(&Keypair::new(), MINT, "0.1", 6, 100)
            .await
            .unwrap();

        assert_eq!(outcome.signature, "curve-buy-sig");
        assert_eq!(outcome.route, QuoteRoute::BondingCurve);
        assert_eq!(outcome.input_amount, "0.1");
        assert_eq!(outcome.output_amount, "3564784.053157");

        // 100 bps slippage on a 0.1 SOL spend
        let buys = curve.buys.lock().unwrap();
        assert_eq!(buys.as_slice(), &[(3_564_784_053_157, 101_000_000)]);
    }

    #[tokio::test]
    async fn amm_buy_reports_the_settled_amount() {
        let curve = RecordingCurve::absent();
        let aggregator = Arc::new(RecordingAggregator {
            quote_out: Some(42_000_000),
            swap_out: Some(41_900_000),
            ..Default::default()
        });
        let executor = executor(curve, aggregator.clone(), Duration::from_secs(5));

        let outcome = executor
            .execute_buy(&Keypair::new(), MINT, "1", 6, 100)
            .await
            .unwrap();

        assert_eq!(outcome.signature, "amm-sig");
        assert_eq!(outcome.route, QuoteRoute::ExternalAmm);
        assert_eq!(outcome.output_amount, "41.9");
        assert_eq!(*aggregator.swaps.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn curve_sell_applies_the_minimum_out_floor() {
        let curve = RecordingCurve::live(1_000_000_000, 1_000_000_000_000);
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve.clone(), aggregator, Duration::from_secs(5));

        let outcome = executor
            .execute_sell(&Keypair::new(), MINT, "10", 6, 100)
            .await
            .unwrap();

        assert_eq!(outcome.signature, "curve-sell-sig");
        assert_eq!(outcome.output_amount, "0.00001");

        let sells = curve.sells.lock().unwrap();
        assert_eq!(sells.as_slice(), &[(10_000_000, 9_900)]);
    }

    #[tokio::test]
    async fn amounts_that_truncate_to_zero_are_rejected() {
        let curve = RecordingCurve::live(1_000, 1_000);
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve, aggregator, Duration::from_secs(5));

        for amount in ["0", "0.0000000001"] {
            assert!(matches!(
                executor.execute_buy(&Keypair::new(), MINT, amount, 6, 100).await,
                Err(EngineError::InvalidAmount(_))
            ));
        }
    }

    #[tokio::test]
    async fn amounts_beyond_u64_are_rejected() {
        let curve = RecordingCurve::live(1_000, 1_000);
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve, aggregator, Duration::from_secs(5));

        assert!(matches!(
            executor
                .execute_buy(&Keypair::new(), MINT, "50000000000", 9, 100)
                .await,
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[tokio::test]
    async fn missing_route_is_a_hard_error() {
        let curve = RecordingCurve::absent();
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve, aggregator, Duration::from_secs(5));

        assert!(matches!(
            executor.execute_buy(&Keypair::new(), MINT, "1", 6, 100).await,
            Err(EngineError::NoRouteFound(_))
        ));
    }

    #[tokio::test]
    async fn hung_calls_fail_instead_of_blocking() {
        let curve = Arc::new(RecordingCurve {
            state_delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let aggregator = Arc::new(RecordingAggregator::default());
        let executor = executor(curve, aggregator, Duration::from_millis(10));

        let err = executor
            .execute_buy(&Keypair::new(), MINT, "1", 6, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn slippage_helpers_scale_in_basis_points() {
        assert_eq!(with_slippage_up(100_000_000, 100), 101_000_000);
        assert_eq!(with_slippage_down(10_000, 100), 9_900);
        assert_eq!(with_slippage_down(10_000, 20_000), 0);
        assert_eq!(with_slippage_up(u64::MAX, 10_000), u64::MAX);
    }
}
