//! Jupiter Aggregator Client
//!
//! Fetches direct-route quotes from the Jupiter v6 API and executes the
//! returned swaps: decode the prebuilt transaction, sign at the wallet's
//! index, submit and confirm.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};

use crate::config::CONFIG;
use crate::error::EngineError;

/// Jupiter API quote response. Doubles as the route handle passed back for
/// execution, which is how the swap API consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterQuote {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "otherAmountThreshold")]
    pub other_amount_threshold: Option<String>,
    #[serde(rename = "swapMode")]
    pub swap_mode: Option<String>,
    #[serde(rename = "slippageBps")]
    pub slippage_bps: Option<u16>,
    #[serde(rename = "platformFee")]
    pub platform_fee: Option<serde_json::Value>,
    #[serde(rename = "priceImpactPct")]
    pub price_impact_pct: Option<String>,
    #[serde(rename = "routePlan")]
    pub route_plan: Option<serde_json::Value>,
    #[serde(rename = "contextSlot")]
    pub context_slot: Option<u64>,
    #[serde(rename = "timeTaken")]
    pub time_taken: Option<f64>,
}

impl JupiterQuote {
    /// Output amount in smallest units
    pub fn out_amount_units(&self) -> Result<u64, EngineError> {
        self.out_amount.parse::<u64>().map_err(|_| {
            EngineError::Aggregator(format!("bad outAmount in quote: {}", self.out_amount))
        })
    }

    /// Signed price impact percentage reported by the aggregator
    pub fn impact_pct(&self) -> f64 {
        self.price_impact_pct
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0)
    }
}

/// Jupiter API swap response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterSwapResponse {
    #[serde(rename = "swapTransaction")]
    pub swap_transaction: String,
}

/// Jupiter swap request payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JupiterSwapRequest {
    #[serde(rename = "userPublicKey")]
    pub user_public_key: String,
    #[serde(rename = "quoteResponse")]
    pub quote_response: JupiterQuote,
    #[serde(rename = "wrapAndUnwrapSol")]
    pub wrap_and_unwrap_sol: bool,
    #[serde(rename = "computeUnitPriceMicroLamports")]
    pub compute_unit_price_micro_lamports: Option<u64>,
}

/// Result of a submitted aggregator swap
#[derive(Debug, Clone)]
pub struct SwapOutcome {
    pub signature: String,
    pub output_amount: u64,
}

/// External AMM aggregator consumed by the quoter and executor
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Best single-hop route for the pair; multi-hop-only pairs are
    /// NoRouteFound
    async fn best_route(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_in: u64,
        slippage_bps: u64,
    ) -> Result<JupiterQuote, EngineError>;

    /// Build, sign and submit the swap for a previously fetched route
    async fn execute_swap(
        &self,
        route: &JupiterQuote,
        signer: &Keypair,
    ) -> Result<SwapOutcome, EngineError>;
}

/// HTTP client against the Jupiter v6 API
pub struct JupiterClient {
    http: reqwest::Client,
    rpc: Arc<RpcClient>,
    base_url: String,
}

impl JupiterClient {
    pub fn new(rpc: Arc<RpcClient>) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CONFIG.execution.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            rpc,
            base_url: CONFIG.aggregator.quote_api_url.clone(),
        })
    }
}

/// A usable route has exactly one hop
fn ensure_direct(quote: &JupiterQuote) -> Result<(), EngineError> {
    if let Some(plan) = quote.route_plan.as_ref().and_then(|p| p.as_array()) {
        if plan.len() != 1 {
            return Err(EngineError::NoRouteFound(quote.output_mint.clone()));
        }
    }
    Ok(())
}

#[async_trait]
impl Aggregator for JupiterClient {
    async fn best_route(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount_in: u64,
        slippage_bps: u64,
    ) -> Result<JupiterQuote, EngineError> {
        let amount = amount_in.to_string();
        let slippage = slippage_bps.to_string();
        let params = [
            ("inputMint", input_mint),
            ("outputMint", output_mint),
            ("amount", amount.as_str()),
            ("slippageBps", slippage.as_str()),
            ("onlyDirectRoutes", "true"),
        ];

        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 400 || body.contains("COULD_NOT_FIND_ANY_ROUTE") {
                return Err(EngineError::NoRouteFound(output_mint.to_string()));
            }
            return Err(EngineError::Aggregator(format!(
                "quote API returned {status}: {body}"
            )));
        }

        let quote: JupiterQuote = response.json().await?;
        ensure_direct(&quote)?;
        Ok(quote)
    }

    async fn execute_swap(
        &self,
        route: &JupiterQuote,
        signer: &Keypair,
    ) -> Result<SwapOutcome, EngineError> {
        let swap_request = JupiterSwapRequest {
            user_public_key: signer.pubkey().to_string(),
            quote_response: route.clone(),
            wrap_and_unwrap_sol: true,
            compute_unit_price_micro_lamports: Some(CONFIG.execution.priority_fee_microlamports),
        };

        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&swap_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Aggregator(format!(
                "swap API returned {status}: {body}"
            )));
        }

        let swap_response: JupiterSwapResponse = response.json().await?;

        // Deserialize and sign the prebuilt transaction at the wallet's index
        let transaction_bytes = base64::engine::general_purpose::STANDARD
            .decode(&swap_response.swap_transaction)
            .map_err(|e| {
                EngineError::Aggregator(format!("bad swap transaction encoding: {e}"))
            })?;

        let mut versioned_tx: VersionedTransaction = bincode::deserialize(&transaction_bytes)
            .map_err(|e| {
                EngineError::Aggregator(format!("bad swap transaction payload: {e}"))
            })?;

        let message_keys = versioned_tx.message.static_account_keys();
        let idx = message_keys
            .iter()
            .position(|key| key == &signer.pubkey())
            .ok_or_else(|| {
                EngineError::Aggregator("wallet missing from transaction account keys".to_string())
            })?;

        let msg_data = versioned_tx.message.serialize();
        let sig = signer.sign_message(&msg_data);
        versioned_tx.signatures[idx] = sig;

        let signature = self
            .rpc
            .send_and_confirm_transaction(&versioned_tx)
            .await?;

        Ok(SwapOutcome {
            signature: signature.to_string(),
            output_amount: route.out_amount_units()?,
        })
    }
}
