//! The strategy orchestration engine and its ledger bookkeeping types.

use crate::connector::ConnectorError;
use crate::domain::{Decimal, Mint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod recommend;
pub mod settlement;
pub mod sizing;
pub mod strategy;

pub use strategy::{StrategyEngine, StrategySettings};

/// Cost basis recorded when the engine opens a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub position_mint: Mint,
    pub pool_address: String,
    pub token_a_mint: Mint,
    pub token_b_mint: Mint,
    pub usd_amount: Decimal,
    pub token_a_usd: Decimal,
    pub token_b_usd: Decimal,
    pub range_percent: u8,
    pub opened_at: DateTime<Utc>,
}

/// A persisted position with its full update history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub position_mint: Mint,
    pub pool_address: String,
    pub token_a_mint: Mint,
    pub token_b_mint: Mint,
    pub is_open: bool,
    pub usd_amount: Decimal,
    pub token_a_usd: Decimal,
    pub token_b_usd: Decimal,
    pub range_percent: u8,
    pub opened_at: DateTime<Utc>,
    /// Append-only, ordered oldest first.
    pub updates: Vec<PositionUpdate>,
}

impl LedgerEntry {
    /// Peak USD value over the recorded history, excluding anything not
    /// yet appended. Falls back to the open basis when history is empty.
    pub fn peak_usd_amount(&self) -> Decimal {
        self.updates
            .iter()
            .map(|u| u.usd_amount)
            .fold(None::<Decimal>, |acc, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
            .unwrap_or(self.usd_amount)
    }

    pub fn latest_update(&self) -> Option<&PositionUpdate> {
        self.updates.last()
    }
}

/// One per-cycle snapshot appended to a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub recorded_at: DateTime<Utc>,
    pub token_a_usd: Decimal,
    pub token_b_usd: Decimal,
    pub usd_amount: Decimal,
    /// Current USD value minus the open basis.
    pub usd_pnl: Decimal,
    pub usd_percent_pnl: Decimal,
    /// Running maximum of usd_amount including this snapshot; monotone
    /// non-decreasing within one entry.
    pub peak_usd_amount: Decimal,
    /// usd_amount minus peak_usd_amount; never positive.
    pub stop_trailing_usd: Decimal,
    pub stop_trailing_percent: Decimal,
}

impl PositionUpdate {
    /// Snapshot written at open time: the basis itself, zero PNL.
    pub fn initial(entry: &NewLedgerEntry) -> Self {
        PositionUpdate {
            recorded_at: entry.opened_at,
            token_a_usd: entry.token_a_usd,
            token_b_usd: entry.token_b_usd,
            usd_amount: entry.usd_amount,
            usd_pnl: Decimal::zero(),
            usd_percent_pnl: Decimal::zero(),
            peak_usd_amount: entry.usd_amount,
            stop_trailing_usd: Decimal::zero(),
            stop_trailing_percent: Decimal::zero(),
        }
    }
}

/// Error type for engine phases; each phase catches this at the cycle
/// boundary and renders it into the report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_updates(usd_amounts: &[&str]) -> LedgerEntry {
        let basis = Decimal::from_str_canonical("100").unwrap();
        LedgerEntry {
            position_mint: Mint::new("mint1"),
            pool_address: "pool1".to_string(),
            token_a_mint: Mint::new("a"),
            token_b_mint: Mint::new("b"),
            is_open: true,
            usd_amount: basis,
            token_a_usd: Decimal::from_str_canonical("50").unwrap(),
            token_b_usd: Decimal::from_str_canonical("50").unwrap(),
            range_percent: 3,
            opened_at: Utc::now(),
            updates: usd_amounts
                .iter()
                .map(|s| {
                    let usd = Decimal::from_str_canonical(s).unwrap();
                    PositionUpdate {
                        recorded_at: Utc::now(),
                        token_a_usd: usd,
                        token_b_usd: Decimal::zero(),
                        usd_amount: usd,
                        usd_pnl: usd - basis,
                        usd_percent_pnl: (usd - basis).percent_of(basis),
                        peak_usd_amount: usd,
                        stop_trailing_usd: Decimal::zero(),
                        stop_trailing_percent: Decimal::zero(),
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn peak_is_max_over_history() {
        let entry = entry_with_updates(&["100", "130", "110"]);
        assert_eq!(entry.peak_usd_amount().to_canonical_string(), "130");
    }

    #[test]
    fn peak_falls_back_to_basis_when_history_empty() {
        let entry = entry_with_updates(&[]);
        assert_eq!(entry.peak_usd_amount().to_canonical_string(), "100");
    }

    #[test]
    fn initial_update_mirrors_basis() {
        let new_entry = NewLedgerEntry {
            position_mint: Mint::new("mint1"),
            pool_address: "pool1".to_string(),
            token_a_mint: Mint::new("a"),
            token_b_mint: Mint::new("b"),
            usd_amount: Decimal::from_str_canonical("50").unwrap(),
            token_a_usd: Decimal::from_str_canonical("25").unwrap(),
            token_b_usd: Decimal::from_str_canonical("25").unwrap(),
            range_percent: 2,
            opened_at: Utc::now(),
        };
        let update = PositionUpdate::initial(&new_entry);
        assert_eq!(update.usd_amount, new_entry.usd_amount);
        assert_eq!(update.peak_usd_amount, new_entry.usd_amount);
        assert!(update.usd_pnl.is_zero());
        assert!(update.stop_trailing_percent.is_zero());
    }
}
