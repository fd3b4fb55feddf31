//! Market-facing value types: pool analytics, token metadata, balances, and
//! the per-cycle price table.

use super::{Decimal, Mint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token metadata attached to a pool listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub mint: Mint,
    pub symbol: String,
    pub decimals: u8,
}

/// One pool's analytics snapshot, numeric fields already parsed.
///
/// The analytics API serves TVL and yield as strings; the market data
/// connector parses them before anything compares or sorts on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub address: String,
    pub token_a: TokenMeta,
    pub token_b: TokenMeta,
    /// Price of token A denominated in token B.
    pub price: Decimal,
    pub tvl_usdc: Decimal,
    pub yield_over_tvl: Decimal,
}

impl PoolStats {
    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.token_a.symbol, self.token_b.symbol)
    }
}

/// A wallet token balance with USD valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub mint: Mint,
    pub human_amount: Decimal,
    pub raw_amount: u64,
    pub decimals: u8,
    pub usd_value: Decimal,
}

/// USD price per mint, fetched once per cycle.
///
/// Every valuation inside one cycle prices against the same table, so all
/// USD figures in one report are mutually consistent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceTable(HashMap<Mint, Decimal>);

impl PriceTable {
    pub fn new() -> Self {
        PriceTable(HashMap::new())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Mint, Decimal)>) -> Self {
        PriceTable(entries.into_iter().collect())
    }

    pub fn insert(&mut self, mint: Mint, price: Decimal) {
        self.0.insert(mint, price);
    }

    pub fn price(&self, mint: &Mint) -> Option<Decimal> {
        self.0.get(mint).copied()
    }

    /// USD value of a human-readable amount, zero when the mint is unpriced.
    pub fn usd_value(&self, mint: &Mint, human_amount: Decimal) -> Decimal {
        match self.price(mint) {
            Some(price) => (price * human_amount).round2(),
            None => Decimal::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_value_rounds_to_cents() {
        let mint = Mint::new("So11111111111111111111111111111111111111112");
        let table = PriceTable::from_entries([(
            mint.clone(),
            Decimal::from_str_canonical("153.337").unwrap(),
        )]);
        let value = table.usd_value(&mint, Decimal::from_str_canonical("2").unwrap());
        assert_eq!(value.to_canonical_string(), "306.67");
    }

    #[test]
    fn unpriced_mint_values_to_zero() {
        let table = PriceTable::new();
        let value = table.usd_value(&Mint::new("unknown"), Decimal::from_str_canonical("5").unwrap());
        assert!(value.is_zero());
    }
}
