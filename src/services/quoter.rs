//! Route Quoter
//!
//! Per-mint routing between the two liquidity sources: tokens still trading
//! on the bonding curve are priced by simulating the constant-product
//! invariant against live reserves; everything else goes to the aggregator.
//! Classification results are cached with a TTL so repeat quotes cost one
//! account read at most.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::CONFIG;
use crate::error::EngineError;
use crate::math::curve::{self, SpotPrice};
use crate::services::curve_program::{CurveProgram, CurveState};
use crate::services::jupiter::{Aggregator, JupiterQuote};
use crate::services::SOL_MINT;

/// Which liquidity source priced the quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteRoute {
    BondingCurve,
    ExternalAmm,
    /// Soft-failure marker: no route, no liquidity, or a quoting error
    Undefined,
}

/// Normalized quote across both liquidity sources
#[derive(Debug, Clone, Serialize)]
pub struct TradeQuote {
    pub route: QuoteRoute,
    /// Output in smallest units of the receiving side
    pub output_amount: u64,
    /// Signed percentage; positive when the trade pushes the price down
    pub price_impact_pct: f64,
    /// Aggregator route handle, present when route == ExternalAmm
    #[serde(skip)]
    pub aggregator_route: Option<JupiterQuote>,
}

impl TradeQuote {
    pub fn unavailable() -> Self {
        Self {
            route: QuoteRoute::Undefined,
            output_amount: 0,
            price_impact_pct: 0.0,
            aggregator_route: None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.route == QuoteRoute::Undefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    Curve,
    Amm,
}

#[derive(Debug, Clone, Copy)]
struct CachedClass {
    class: RouteClass,
    cached_at: Instant,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Buy,
    Sell,
}

/// Dual-route quoting engine
pub struct RouteQuoter {
    curve: Arc<dyn CurveProgram>,
    aggregator: Arc<dyn Aggregator>,
    route_cache: DashMap<String, CachedClass>,
    cache_ttl: Duration,
}

impl RouteQuoter {
    pub fn new(curve: Arc<dyn CurveProgram>, aggregator: Arc<dyn Aggregator>) -> Self {
        Self::with_ttl(
            curve,
            aggregator,
            Duration::from_secs(CONFIG.execution.route_cache_ttl_secs),
        )
    }

    fn with_ttl(
        curve: Arc<dyn CurveProgram>,
        aggregator: Arc<dyn Aggregator>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            curve,
            aggregator,
            route_cache: DashMap::new(),
            cache_ttl,
        }
    }

    /// Advisory buy quote: `lamports_in` SOL for `mint`. Routing and
    /// aggregator failures soft-fail into an unavailable quote; only a zero
    /// input amount is an error.
    pub async fn quote_buy(&self, mint: &str, lamports_in: u64) -> Result<TradeQuote, EngineError> {
        let slippage = CONFIG.execution.slippage_bps;
        self.soften(mint, self.firm_quote(mint, lamports_in, Side::Buy, slippage).await)
    }

    /// Advisory sell quote: `tokens_in` of `mint` for SOL. Same soft-fail
    /// contract as [`quote_buy`](Self::quote_buy).
    pub async fn quote_sell(&self, mint: &str, tokens_in: u64) -> Result<TradeQuote, EngineError> {
        let slippage = CONFIG.execution.slippage_bps;
        self.soften(mint, self.firm_quote(mint, tokens_in, Side::Sell, slippage).await)
    }

    /// Hard-failing buy quote for the execution path
    pub async fn quote_buy_for_execution(
        &self,
        mint: &str,
        lamports_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeQuote, EngineError> {
        self.firm_quote(mint, lamports_in, Side::Buy, slippage_bps).await
    }

    /// Hard-failing sell quote for the execution path
    pub async fn quote_sell_for_execution(
        &self,
        mint: &str,
        tokens_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeQuote, EngineError> {
        self.firm_quote(mint, tokens_in, Side::Sell, slippage_bps).await
    }

    fn soften(
        &self,
        mint: &str,
        result: Result<TradeQuote, EngineError>,
    ) -> Result<TradeQuote, EngineError> {
        match result {
            Ok(quote) => Ok(quote),
            Err(e @ EngineError::InvalidAmount(_)) => Err(e),
            Err(e) => {
                warn!("📉 Quote unavailable for {}: {}", mint, e);
                Ok(TradeQuote::unavailable())
            }
        }
    }

    async fn firm_quote(
        &self,
        mint: &str,
        amount_in: u64,
        side: Side,
        slippage_bps: u64,
    ) -> Result<TradeQuote, EngineError> {
        if amount_in == 0 {
            return Err(EngineError::InvalidAmount("zero swap amount".to_string()));
        }
        if let Some(state) = self.tradeable_curve_state(mint).await? {
            return quote_on_curve(&state, amount_in, side)
                .ok_or_else(|| EngineError::NoRouteFound(mint.to_string()));
        }
        self.quote_on_amm(mint, amount_in, side, slippage_bps).await
    }

    /// Live curve state for a mint still trading on the curve, or None for
    /// graduated and unknown mints. At most one account read per call; a
    /// fresh cached AMM classification reads nothing.
    async fn tradeable_curve_state(
        &self,
        mint: &str,
    ) -> Result<Option<CurveState>, EngineError> {
        if let Some(entry) = self.route_cache.get(mint) {
            if entry.cached_at.elapsed() < self.cache_ttl && entry.class == RouteClass::Amm {
                return Ok(None);
            }
        }

        let state = self.curve.curve_state(mint).await?;
        let (class, live) = match state {
            Some(s) if !s.complete => (RouteClass::Curve, Some(s)),
            _ => (RouteClass::Amm, None),
        };
        self.route_cache.insert(
            mint.to_string(),
            CachedClass {
                class,
                cached_at: Instant::now(),
            },
        );
        Ok(live)
    }

    async fn quote_on_amm(
        &self,
        mint: &str,
        amount_in: u64,
        side: Side,
        slippage_bps: u64,
    ) -> Result<TradeQuote, EngineError> {
        let (input_mint, output_mint) = match side {
            Side::Buy => (SOL_MINT, mint),
            Side::Sell => (mint, SOL_MINT),
        };
        let route = self
            .aggregator
            .best_route(input_mint, output_mint, amount_in, slippage_bps)
            .await?;
        let output_amount = route.out_amount_units()?;
        if output_amount == 0 {
            return Err(EngineError::NoRouteFound(mint.to_string()));
        }
        Ok(TradeQuote {
            route: QuoteRoute::ExternalAmm,
            output_amount,
            price_impact_pct: route.impact_pct(),
            aggregator_route: Some(route),
        })
    }
}

/// Full invariant simulation on both sides. None means the curve has no
/// liquidity to quote against.
fn quote_on_curve(state: &CurveState, amount_in: u64, side: Side) -> Option<TradeQuote> {
    let sol = state.virtual_sol_reserves;
    let token = state.virtual_token_reserves;
    let before = SpotPrice {
        sol_reserves: sol,
        token_reserves: token,
    };

    let (output_amount, after) = match side {
        Side::Buy => {
            let out = curve::tokens_out_for_sol_in(sol, token, amount_in).ok()?;
            (
                out,
                SpotPrice {
                    sol_reserves: sol.saturating_add(amount_in),
                    token_reserves: token - out,
                },
            )
        }
        Side::Sell => {
            let out = curve::sol_out_for_tokens_in(sol, token, amount_in).ok()?;
            (
                out,
                SpotPrice {
                    sol_reserves: sol - out,
                    token_reserves: token.saturating_add(amount_in),
                },
            )
        }
    };
    if output_amount == 0 {
        return None;
    }

    Some(TradeQuote {
        route: QuoteRoute::BondingCurve,
        output_amount,
        price_impact_pct: curve::price_impact_pct(before, after),
        aggregator_route: None,
    })
}
