//! Domain types for the liquidity strategy.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - The Mint primitive and report formatting helpers
//! - Market value types: pool analytics, balances, the per-cycle price table
//! - The on-chain position view and open quote

pub mod decimal;
pub mod market;
pub mod position;
pub mod primitives;

pub use decimal::Decimal;
pub use market::{Balance, PoolStats, PriceTable, TokenMeta};
pub use position::{Position, PositionQuote};
pub use primitives::{short_hash, Mint};
