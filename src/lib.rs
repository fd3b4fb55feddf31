pub mod api;
pub mod config;
pub mod connector;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;

pub use config::Config;
pub use connector::{
    BalanceReader, ConnectorError, MarketData, MockChain, MockMarket, MockSwapExecutor,
    PaperWallet, PositionExecutor, PositionReader, RejectionReason, SwapExecutor,
};
pub use db::{init_db, Repository};
pub use domain::{Balance, Decimal, Mint, PoolStats, Position, PriceTable};
pub use engine::{StrategyEngine, StrategySettings};
pub use error::AppError;
