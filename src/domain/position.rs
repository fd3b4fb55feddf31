//! On-chain position view and the open quote handed to the executor.

use super::{Decimal, Mint, PriceTable, TokenMeta};
use serde::{Deserialize, Serialize};

/// A concentrated-liquidity position as observed on chain.
///
/// Reconstructed fresh every cycle; nothing here is cached between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Stable identity for the position's lifetime.
    pub position_mint: Mint,
    /// Account address used for closing. May differ from the mint-derived
    /// address depending on how the position was discovered.
    pub position_id: String,
    pub pool_address: String,
    pub token_a_mint: Mint,
    pub token_b_mint: Mint,
    /// Current pool price, token A denominated in token B.
    pub price: Decimal,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub amount_token_a: Decimal,
    pub amount_token_b: Decimal,
    pub amount_token_a_usd: Decimal,
    pub amount_token_b_usd: Decimal,
    pub amount_position_usd: Decimal,
    pub in_range: bool,
}

impl Position {
    /// Whether `price` lies within `[lower_price, upper_price]`.
    pub fn compute_in_range(price: Decimal, lower: Decimal, upper: Decimal) -> bool {
        price >= lower && price <= upper
    }

    /// Revalue the leg amounts against a price table, recomputing the USD
    /// fields and the in-range flag.
    pub fn revalued(mut self, prices: &PriceTable) -> Self {
        self.amount_token_a_usd = prices.usd_value(&self.token_a_mint, self.amount_token_a);
        self.amount_token_b_usd = prices.usd_value(&self.token_b_mint, self.amount_token_b);
        self.amount_position_usd = (self.amount_token_a_usd + self.amount_token_b_usd).round2();
        self.in_range = Self::compute_in_range(self.price, self.lower_price, self.upper_price);
        self
    }
}

/// A pre-built quote for opening a position, produced by
/// `PositionExecutor::quote_open` and consumed by `PositionExecutor::open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionQuote {
    pub pool_address: String,
    pub token_a: TokenMeta,
    pub token_b: TokenMeta,
    /// Maximum raw token A amount the open will draw from the wallet.
    pub amount_token_a: u64,
    /// Maximum raw token B amount the open will draw from the wallet.
    pub amount_token_b: u64,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub range_percent: u8,
}
