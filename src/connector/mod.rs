//! Collaborator traits the strategy engine is built against.
//!
//! The engine never talks to a chain or an HTTP API directly; it receives
//! these traits at construction so tests substitute scripted fakes and the
//! binary picks live or paper implementations.

use crate::domain::{Balance, Decimal, Mint, PoolStats, Position, PositionQuote, PriceTable};
use async_trait::async_trait;
use thiserror::Error;

pub mod jupiter;
pub mod mock;
pub mod orca;
pub mod paper;

pub use jupiter::{JupiterSwapExecutor, TransactionSubmitter};
pub use mock::{MockChain, MockMarket, MockSwapExecutor, SwapScript};
pub use orca::OrcaMarketData;
pub use paper::PaperWallet;

/// Pool listings and the price table from the DEX analytics service.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch all pool analytics. Numeric strings are parsed before return.
    async fn list_pools(&self) -> Result<Vec<PoolStats>, ConnectorError>;

    /// Fetch the USD price table used for every valuation in one cycle.
    async fn fetch_prices(&self) -> Result<PriceTable, ConnectorError>;
}

/// Reconstructs the wallet's open on-chain positions.
#[async_trait]
pub trait PositionReader: Send + Sync {
    async fn list_open_positions(
        &self,
        prices: &PriceTable,
    ) -> Result<Vec<Position>, ConnectorError>;
}

/// Reconstructs wallet token balances with USD valuation.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn list_balances(&self, prices: &PriceTable) -> Result<Vec<Balance>, ConnectorError>;
}

/// A single swap request: quote, and optionally execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub input_mint: Mint,
    pub output_mint: Mint,
    /// Raw integer amount; input amount for ExactIn, output for ExactOut.
    pub amount: u64,
    /// When true, `amount` is the desired output (ExactOut mode).
    pub amount_is_output: bool,
    /// When false, only a quote is obtained and nothing moves.
    pub execute: bool,
    /// Bounded retry budget for the whole quote-and-execute operation.
    pub max_attempts: u32,
}

/// Realized amounts of a swap (or quoted amounts when not executed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub in_amount: u64,
    pub out_amount: u64,
    pub usd_value: Decimal,
}

/// Obtains a quote and optionally executes an on-chain swap.
///
/// Each call either fully succeeds or fails; there is no partial swap
/// state. Implementations retry transient failures up to
/// `SwapRequest::max_attempts` before returning an error.
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    async fn quote_and_swap(&self, request: &SwapRequest) -> Result<SwapOutcome, ConnectorError>;
}

/// Opens a position from a pre-built quote or fully closes one by id.
#[async_trait]
pub trait PositionExecutor: Send + Sync {
    /// Build an open quote for a pool: range bounds around the current
    /// price and the maximum token amounts both legs will need.
    async fn quote_open(
        &self,
        pool: &PoolStats,
        range_percent: u8,
        input_mint: &Mint,
        input_amount: u64,
    ) -> Result<PositionQuote, ConnectorError>;

    /// Open the position; returns the new position mint.
    async fn open(&self, quote: &PositionQuote) -> Result<Mint, ConnectorError>;

    /// Collect fees and rewards, withdraw all liquidity, and close.
    async fn close(&self, position_id: &str) -> Result<(), ConnectorError>;
}

/// Why the chain rejected an operation.
///
/// Live connectors map the raw failure text to one of these tags at their
/// own boundary, so the engine switches on a tag rather than a substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Not enough of the native gas asset to pay for the transaction.
    InsufficientGas,
    /// Not enough of a leg token; usually means a sizing swap went wrong.
    InsufficientFunds,
    /// The open would draw more of a token than the quoted maximum.
    TokenMaxExceeded,
    /// The transaction's blockhash expired before confirmation.
    BlockHeightExceeded,
    /// The position's tick bounds do not line up with the pool.
    InvalidTickRange,
    SlippageExceeded,
    /// Unrecognized failure; the raw message is preserved for diagnosis.
    Unknown(String),
}

impl RejectionReason {
    /// Classify a raw chain error message by its known substrings.
    ///
    /// This is deliberately confined to the connector boundary; everything
    /// above it works with the tag.
    pub fn from_message(message: &str) -> Self {
        if message.contains("insufficient lamports") {
            RejectionReason::InsufficientGas
        } else if message.contains("insufficient funds") {
            RejectionReason::InsufficientFunds
        } else if message.contains("TokenMaxExceeded") {
            RejectionReason::TokenMaxExceeded
        } else if message.contains("block height exceeded") {
            RejectionReason::BlockHeightExceeded
        } else if message.contains("tick_array_lower") || message.contains("tick_array_upper") {
            RejectionReason::InvalidTickRange
        } else if message.contains("SlippageToleranceExceeded") {
            RejectionReason::SlippageExceeded
        } else {
            RejectionReason::Unknown(message.to_string())
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::InsufficientGas => write!(f, "insufficient gas funds"),
            RejectionReason::InsufficientFunds => write!(f, "insufficient token funds"),
            RejectionReason::TokenMaxExceeded => write!(f, "token max exceeded"),
            RejectionReason::BlockHeightExceeded => write!(f, "block height exceeded"),
            RejectionReason::InvalidTickRange => write!(f, "invalid tick range"),
            RejectionReason::SlippageExceeded => write!(f, "slippage exceeded"),
            RejectionReason::Unknown(msg) => write!(f, "unknown: {}", msg),
        }
    }
}

/// Error type for all connector operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Rejected: {0}")]
    Rejected(RejectionReason),
    #[error("Error: {0}")]
    Other(String),
}
