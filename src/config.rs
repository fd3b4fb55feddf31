use crate::domain::{Decimal, Mint};
use std::collections::HashMap;
use thiserror::Error;

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub pools_url: String,
    pub prices_url: String,
    pub cycle_interval_secs: u64,
    pub stop_loss_trailing_percent: Decimal,
    pub simultaneous_entries: usize,
    pub usd_entry_value: Decimal,
    pub base_asset: Mint,
    pub native_mint: Mint,
    pub min_native_usd: Decimal,
    pub hold_tokens: Vec<Mint>,
    pub settle_delay_ms: u64,
    /// Base asset balance the paper wallet starts with, human units.
    pub paper_base_balance: Decimal,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let pools_url = env_map
            .get("ORCA_POOLS_URL")
            .cloned()
            .unwrap_or_else(|| "https://api.orca.so/v2/solana/pools".to_string());

        let prices_url = env_map
            .get("ORCA_PRICES_URL")
            .cloned()
            .unwrap_or_else(|| "https://api.orca.so/v2/solana/prices".to_string());

        let cycle_interval_secs = parse_u64(&env_map, "CYCLE_INTERVAL_SECS", "300")?;

        let stop_loss_trailing_percent =
            parse_decimal(&env_map, "STOP_LOSS_TRAILING_PERCENT", "10")?;

        let simultaneous_entries = parse_u64(&env_map, "SIMULTANEOUS_ENTRIES", "2")? as usize;

        let usd_entry_value = parse_decimal(&env_map, "USD_ENTRY_VALUE", "50")?;

        let base_asset = Mint::new(
            env_map
                .get("BASE_ASSET")
                .map(|s| s.as_str())
                .unwrap_or(USDC_MINT),
        );

        let native_mint = Mint::new(
            env_map
                .get("NATIVE_MINT")
                .map(|s| s.as_str())
                .unwrap_or(SOL_MINT),
        );

        let min_native_usd = parse_decimal(&env_map, "MIN_NATIVE_USD", "2")?;

        // The base and native assets are always held; HOLD_TOKENS adds
        // extra mints on top of those.
        let mut hold_tokens = vec![base_asset.clone(), native_mint.clone()];
        if let Some(extra) = env_map.get("HOLD_TOKENS") {
            for raw in extra.split(',') {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let mint = Mint::new(trimmed);
                if !hold_tokens.contains(&mint) {
                    hold_tokens.push(mint);
                }
            }
        }

        let settle_delay_ms = parse_u64(&env_map, "SETTLE_DELAY_MS", "1000")?;

        let paper_base_balance = parse_decimal(&env_map, "PAPER_BASE_BALANCE", "500")?;

        Ok(Config {
            port,
            database_path,
            pools_url,
            prices_url,
            cycle_interval_secs,
            stop_loss_trailing_percent,
            simultaneous_entries,
            usd_entry_value,
            base_asset,
            native_mint,
            min_native_usd,
            hold_tokens,
            settle_delay_ms,
            paper_base_balance,
        })
    }
}

fn parse_u64(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<u64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        })
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<Decimal, ConfigError> {
    let raw = env_map.get(key).map(|s| s.as_str()).unwrap_or(default);
    Decimal::from_str_canonical(raw).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a valid decimal".to_string())
    })
}
