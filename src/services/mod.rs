//! # Services Module
//!
//! Trading services for the DCA engine: route quoting, trade execution,
//! the recurring-buy scheduler, and the clients they sit on.

pub mod analytics;
pub mod curve_program;
pub mod executor;
pub mod jupiter;
pub mod price_feed;
pub mod quoter;
pub mod scheduler;
pub mod wallet;

/// Wrapped SOL mint, the base side of every trade
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

pub use analytics::{AnalyticsService, PortfolioAnalytics, StrategyAnalytics};
pub use curve_program::{CurveProgram, RpcCurveProgram};
pub use executor::{ExecutionOutcome, TradeExecutor};
pub use jupiter::{Aggregator, JupiterClient};
pub use price_feed::{JupiterPriceFeed, PriceFeed};
pub use quoter::{QuoteRoute, RouteQuoter, TradeQuote};
pub use scheduler::DcaScheduler;
pub use wallet::{RpcWalletProvider, WalletProvider};
