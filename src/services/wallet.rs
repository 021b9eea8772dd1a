//! # Wallet Provider
//!
//! Custodial signing wallets, one per user. Secrets live in the users table
//! as base58-encoded 64-byte keypairs and are provisioned lazily on first
//! use. Balances come straight from the RPC node.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Signing keypair for a user, provisioning one on first use
    async fn get_or_create_keypair(&self, user_id: Uuid) -> Result<Keypair, EngineError>;

    /// SOL balance in lamports
    async fn balance(&self, pubkey: &str) -> Result<u64, EngineError>;
}

/// Database-backed provider with RPC balance lookups
pub struct RpcWalletProvider {
    pool: Pool,
    rpc: Arc<RpcClient>,
}

impl RpcWalletProvider {
    pub fn new(pool: Pool, rpc: Arc<RpcClient>) -> Self {
        Self { pool, rpc }
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    async fn get_or_create_keypair(&self, user_id: Uuid) -> Result<Keypair, EngineError> {
        let client = self.pool.get().await?;

        let row = client
            .query_opt("SELECT wallet_secret FROM users WHERE id = $1", &[&user_id])
            .await?;
        let Some(row) = row else {
            return Err(EngineError::Store(format!("user {} not found", user_id)));
        };
        let secret: Option<String> = row.try_get("wallet_secret")?;
        if let Some(secret) = secret {
            return decode_keypair(&secret);
        }

        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let pubkey = keypair.pubkey().to_string();
        let updated = client
            .execute(
                "UPDATE users
                 SET wallet_pubkey = $2, wallet_secret = $3, updated_at = NOW()
                 WHERE id = $1 AND wallet_secret IS NULL",
                &[&user_id, &pubkey, &encoded],
            )
            .await?;
        if updated == 1 {
            info!("🔑 Provisioned wallet {} for user {}", pubkey, user_id);
            return Ok(keypair);
        }

        // Another task provisioned first; use the stored secret
        let row = client
            .query_one("SELECT wallet_secret FROM users WHERE id = $1", &[&user_id])
            .await?;
        let secret: Option<String> = row.try_get("wallet_secret")?;
        match secret {
            Some(secret) => decode_keypair(&secret),
            None => Err(EngineError::Store(format!(
                "wallet for user {} missing after provisioning",
                user_id
            ))),
        }
    }

    async fn balance(&self, pubkey: &str) -> Result<u64, EngineError> {
        let pubkey = Pubkey::from_str(pubkey)
            .map_err(|e| EngineError::Store(format!("invalid wallet pubkey {}: {}", pubkey, e)))?;
        Ok(self.rpc.get_balance(&pubkey).await?)
    }
}

fn decode_keypair(secret: &str) -> Result<Keypair, EngineError> {
    let bytes = bs58::decode(secret)
        .into_vec()
        .map_err(|e| EngineError::Store(format!("stored wallet secret is not base58: {}", e)))?;
    Keypair::try_from(&bytes[..])
        .map_err(|e| EngineError::Store(format!("stored wallet secret is not a keypair: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_keypair_round_trips() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let decoded = decode_keypair(&encoded).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn garbage_secret_is_rejected() {
        assert!(matches!(
            decode_keypair("not-base58-0OIl"),
            Err(EngineError::Store(_))
        ));
    }

    #[test]
    fn truncated_secret_is_rejected() {
        let keypair = Keypair::new();
        let short = bs58::encode(&keypair.to_bytes()[..32]).into_string();
        assert!(matches!(decode_keypair(&short), Err(EngineError::Store(_))));
    }
}
