//! Bonding-Curve Program Client
//!
//! Reads per-mint curve state from chain and builds the program's buy and
//! sell instructions directly: discriminator plus two little-endian u64
//! args, accounts in IDL order, compute budget prepended.

use async_trait::async_trait;
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_program,
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};

use crate::config::CONFIG;
use crate::error::EngineError;

/// Anchor instruction discriminators from the program IDL
const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

/// discriminator + five u64 reserve fields + complete flag + creator key
const CURVE_ACCOUNT_LEN: usize = 8 + 5 * 8 + 1 + 32;

const COMPUTE_UNIT_LIMIT: u32 = 150_000;

/// On-chain curve state for one mint
#[derive(Debug, Clone, Copy)]
pub struct CurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    /// Graduated to an external AMM; the curve no longer trades
    pub complete: bool,
    pub creator: Pubkey,
}

impl CurveState {
    /// Parse the program's account data layout
    pub fn parse(data: &[u8]) -> Result<Self, EngineError> {
        if data.len() < CURVE_ACCOUNT_LEN {
            return Err(EngineError::Rpc(format!(
                "curve account too short: {} bytes",
                data.len()
            )));
        }
        let u64_at = |offset: usize| -> u64 {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(buf)
        };
        let mut creator = [0u8; 32];
        creator.copy_from_slice(&data[49..81]);
        Ok(Self {
            virtual_token_reserves: u64_at(8),
            virtual_sol_reserves: u64_at(16),
            real_token_reserves: u64_at(24),
            real_sol_reserves: u64_at(32),
            token_total_supply: u64_at(40),
            complete: data[48] != 0,
            creator: Pubkey::new_from_array(creator),
        })
    }
}

/// On-chain bonding-curve program consumed by the quoter and executor
#[async_trait]
pub trait CurveProgram: Send + Sync {
    /// Curve state for the mint, or None when no curve account exists
    async fn curve_state(&self, mint: &str) -> Result<Option<CurveState>, EngineError>;

    /// Buy `token_amount_out` tokens spending at most `max_sol_cost`
    /// lamports. Returns the confirmed signature.
    async fn buy(
        &self,
        signer: &Keypair,
        mint: &str,
        token_amount_out: u64,
        max_sol_cost: u64,
    ) -> Result<String, EngineError>;

    /// Sell `token_amount_in` tokens for at least `min_sol_out` lamports.
    /// Returns the confirmed signature.
    async fn sell(
        &self,
        signer: &Keypair,
        mint: &str,
        token_amount_in: u64,
        min_sol_out: u64,
    ) -> Result<String, EngineError>;
}

fn instruction_data(discriminator: [u8; 8], amount: u64, limit: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&discriminator);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&limit.to_le_bytes());
    data
}

fn parse_mint(mint: &str) -> Result<Pubkey, EngineError> {
    Pubkey::from_str(mint).map_err(|_| EngineError::InvalidMint(mint.to_string()))
}

/// RPC-backed implementation against the live program
pub struct RpcCurveProgram {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    fee_recipient: Pubkey,
}

impl RpcCurveProgram {
    pub fn new(rpc: Arc<RpcClient>) -> Result<Self, EngineError> {
        let program_id = Pubkey::from_str(&CONFIG.chain.curve_program_id)
            .map_err(|e| EngineError::Config(format!("bad curve program id: {e}")))?;
        let fee_recipient = Pubkey::from_str(&CONFIG.chain.curve_fee_recipient)
            .map_err(|e| EngineError::Config(format!("bad curve fee recipient: {e}")))?;
        Ok(Self {
            rpc,
            program_id,
            fee_recipient,
        })
    }

    fn curve_pda(&self, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &self.program_id).0
    }

    fn global_pda(&self) -> Pubkey {
        Pubkey::find_program_address(&[b"global"], &self.program_id).0
    }

    fn event_authority_pda(&self) -> Pubkey {
        Pubkey::find_program_address(&[b"__event_authority"], &self.program_id).0
    }

    fn creator_vault_pda(&self, creator: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"creator-vault", creator.as_ref()], &self.program_id).0
    }

    /// Base priority fee with up to 10% random jitter
    fn priority_fee(&self) -> u64 {
        let base = CONFIG.execution.priority_fee_microlamports;
        base + rand::thread_rng().gen_range(0..=base / 10)
    }

    /// Fetch state for a mint that must still be trading on the curve
    async fn live_state(&self, mint: &str) -> Result<CurveState, EngineError> {
        match self.curve_state(mint).await? {
            Some(state) if !state.complete => Ok(state),
            _ => Err(EngineError::NoRouteFound(mint.to_string())),
        }
    }

    async fn submit(
        &self,
        signer: &Keypair,
        instructions: &[Instruction],
    ) -> Result<String, EngineError> {
        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            instructions,
            Some(&signer.pubkey()),
            &[signer],
            blockhash,
        );
        let signature = self.rpc.send_and_confirm_transaction(&transaction).await?;
        Ok(signature.to_string())
    }
}

#[async_trait]
impl CurveProgram for RpcCurveProgram {
    async fn curve_state(&self, mint: &str) -> Result<Option<CurveState>, EngineError> {
        let mint_key = parse_mint(mint)?;
        let curve = self.curve_pda(&mint_key);
        let response = self
            .rpc
            .get_account_with_commitment(&curve, self.rpc.commitment())
            .await?;
        match response.value {
            Some(account) if account.owner == self.program_id => {
                CurveState::parse(&account.data).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn buy(
        &self,
        signer: &Keypair,
        mint: &str,
        token_amount_out: u64,
        max_sol_cost: u64,
    ) -> Result<String, EngineError> {
        let mint_key = parse_mint(mint)?;
        let state = self.live_state(mint).await?;

        let bonding_curve = self.curve_pda(&mint_key);
        let associated_bonding_curve = get_associated_token_address(&bonding_curve, &mint_key);
        let user_ata = get_associated_token_address(&signer.pubkey(), &mint_key);

        let buy_ix = Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(self.global_pda(), false),
                AccountMeta::new(self.fee_recipient, false),
                AccountMeta::new_readonly(mint_key, false),
                AccountMeta::new(bonding_curve, false),
                AccountMeta::new(associated_bonding_curve, false),
                AccountMeta::new(user_ata, false),
                AccountMeta::new(signer.pubkey(), true),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new(self.creator_vault_pda(&state.creator), false),
                AccountMeta::new_readonly(self.event_authority_pda(), false),
                AccountMeta::new_readonly(self.program_id, false),
            ],
            data: instruction_data(BUY_DISCRIMINATOR, token_amount_out, max_sol_cost),
        };

        let instructions = [
            ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNIT_LIMIT),
            ComputeBudgetInstruction::set_compute_unit_price(self.priority_fee()),
            create_associated_token_account_idempotent(
                &signer.pubkey(),
                &signer.pubkey(),
                &mint_key,
                &spl_token::ID,
            ),
            buy_ix,
        ];
        self.submit(signer, &instructions).await
    }

    async fn sell(
        &self,
        signer: &Keypair,
        mint: &str,
        token_amount_in: u64,
        min_sol_out: u64,
    ) -> Result<String, EngineError> {
        let mint_key = parse_mint(mint)?;
        let state = self.live_state(mint).await?;

        let bonding_curve = self.curve_pda(&mint_key);
        let associated_bonding_curve = get_associated_token_address(&bonding_curve, &mint_key);
        let user_ata = get_associated_token_address(&signer.pubkey(), &mint_key);

        let sell_ix = Instruction {
            program_id: self.program_id,
            accounts: vec![
                AccountMeta::new_readonly(self.global_pda(), false),
                AccountMeta::new(self.fee_recipient, false),
                AccountMeta::new_readonly(mint_key, false),
                AccountMeta::new(bonding_curve, false),
                AccountMeta::new(associated_bonding_curve, false),
                AccountMeta::new(user_ata, false),
                AccountMeta::new(signer.pubkey(), true),
                AccountMeta::new_readonly(system_program::ID, false),
                AccountMeta::new(self.creator_vault_pda(&state.creator), false),
                AccountMeta::new_readonly(spl_token::ID, false),
                AccountMeta::new_readonly(self.event_authority_pda(), false),
                AccountMeta::new_readonly(self.program_id, false),
            ],
            data: instruction_data(SELL_DISCRIMINATOR, token_amount_in, min_sol_out),
        };

        let instructions = [
            ComputeBudgetInstruction::set_compute_unit_limit(COMPUTE_UNIT_LIMIT),
            ComputeBudgetInstruction::set_compute_unit_price(self.priority_fee()),
            sell_ix,
        ];
        self.submit(signer, &instructions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve_account_bytes(
        virtual_token: u64,
        virtual_sol: u64,
        complete: bool,
        creator: Pubkey,
    ) -> Vec<u8> {
        let mut data = vec![0u8; CURVE_ACCOUNT_LEN];
        data[8..16].copy_from_slice(&virtual_token.to_le_bytes());
        data[16..24].copy_from_slice(&virtual_sol.to_le_bytes());
        data[24..32].copy_from_slice(&793_100_000_000_000u64.to_le_bytes());
        data[32..40].copy_from_slice(&0u64.to_le_bytes());
        data[40..48].copy_from_slice(&1_000_000_000_000_000u64.to_le_bytes());
        data[48] = complete as u8;
        data[49..81].copy_from_slice(creator.as_ref());
        data
    }

    #[test]
    fn parses_curve_account_layout() {
        let creator = Pubkey::new_unique();
        let data = curve_account_bytes(1_073_000_000_000_000, 30_000_000_000, false, creator);
        let state = CurveState::parse(&data).unwrap();
        assert_eq!(state.virtual_token_reserves, 1_073_000_000_000_000);
        assert_eq!(state.virtual_sol_reserves, 30_000_000_000);
        assert_eq!(state.real_token_reserves, 793_100_000_000_000);
        assert_eq!(state.token_total_supply, 1_000_000_000_000_000);
        assert!(!state.complete);
        assert_eq!(state.creator, creator);
    }

    #[test]
    fn graduation_flag_is_read() {
        let data = curve_account_bytes(1, 1, true, Pubkey::new_unique());
        assert!(CurveState::parse(&data).unwrap().complete);
    }

    #[test]
    fn short_account_data_is_rejected() {
        assert!(CurveState::parse(&[0u8; 40]).is_err());
    }

    #[test]
    fn instruction_data_is_discriminator_then_le_args() {
        let data = instruction_data(BUY_DISCRIMINATOR, 34_612_903_225_807, 1_010_000_000);
        assert_eq!(&data[..8], &BUY_DISCRIMINATOR);
        assert_eq!(&data[8..16], &34_612_903_225_807u64.to_le_bytes());
        assert_eq!(&data[16..24], &1_010_000_000u64.to_le_bytes());
        assert_eq!(data.len(), 24);
    }

    #[test]
    fn bad_mint_is_rejected() {
        assert!(matches!(
            parse_mint("not-a-mint"),
            Err(EngineError::InvalidMint(_))
        ));
    }
}
