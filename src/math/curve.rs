//! Constant-product swap math for pre-graduation bonding curves.
//!
//! All reserve arithmetic runs in `u128` so `u64 * u64` products cannot
//! overflow, and every division floors. Outputs are conservative: the pool
//! side of the invariant never loses value to rounding.

use crate::error::EngineError;

/// Tokens received for `sol_in` lamports against the given virtual reserves.
///
/// Returns `Ok(0)` when either reserve is zero (an empty curve quotes
/// nothing rather than erroring) and `Err` on a zero input amount.
pub fn tokens_out_for_sol_in(
    sol_reserves: u64,
    token_reserves: u64,
    sol_in: u64,
) -> Result<u64, EngineError> {
    if sol_in == 0 {
        return Err(EngineError::InvalidAmount("zero swap amount".to_string()));
    }
    if sol_reserves == 0 || token_reserves == 0 {
        return Ok(0);
    }
    let k = sol_reserves as u128 * token_reserves as u128;
    let new_sol = sol_reserves as u128 + sol_in as u128;
    let new_token = k / new_sol;
    Ok((token_reserves as u128 - new_token) as u64)
}

/// Lamports received for selling `tokens_in` into the given virtual reserves.
///
/// Mirror of [`tokens_out_for_sol_in`] with the roles of the reserves
/// swapped; the same zero-reserve and zero-amount rules apply.
pub fn sol_out_for_tokens_in(
    sol_reserves: u64,
    token_reserves: u64,
    tokens_in: u64,
) -> Result<u64, EngineError> {
    if tokens_in == 0 {
        return Err(EngineError::InvalidAmount("zero swap amount".to_string()));
    }
    if sol_reserves == 0 || token_reserves == 0 {
        return Ok(0);
    }
    let k = sol_reserves as u128 * token_reserves as u128;
    let new_token = token_reserves as u128 + tokens_in as u128;
    let new_sol = k / new_token;
    Ok((sol_reserves as u128 - new_sol) as u64)
}

/// Marginal price of the curve held as the reserve ratio, lamports per
/// token base unit. Kept rational so impact math stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotPrice {
    pub sol_reserves: u64,
    pub token_reserves: u64,
}

impl SpotPrice {
    pub fn as_f64(&self) -> f64 {
        if self.token_reserves == 0 {
            return 0.0;
        }
        self.sol_reserves as f64 / self.token_reserves as f64
    }
}

/// Signed price impact of a swap, `(before - after) / before * 100`.
///
/// Sells push the price down and come out positive; buys push it up and
/// come out negative. The comparison cross-multiplies the two rational
/// prices in `u128`, so the only float operation is the final division.
pub fn price_impact_pct(before: SpotPrice, after: SpotPrice) -> f64 {
    let a = before.sol_reserves as u128 * after.token_reserves as u128;
    let b = after.sol_reserves as u128 * before.token_reserves as u128;
    if a == 0 {
        return 0.0;
    }
    if a >= b {
        (a - b) as f64 / a as f64 * 100.0
    } else {
        -((b - a) as f64 / a as f64 * 100.0)
    }
}
