//! Live market data gateway over the Orca analytics HTTP API.

use super::{ConnectorError, MarketData};
use crate::domain::{Decimal, Mint, PoolStats, PriceTable, TokenMeta};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Market data source backed by the public pools and prices endpoints.
#[derive(Debug, Clone)]
pub struct OrcaMarketData {
    client: Client,
    pools_url: String,
    prices_url: String,
}

impl OrcaMarketData {
    pub fn new(pools_url: String, prices_url: String) -> Self {
        Self {
            client: Client::new(),
            pools_url,
            prices_url,
        }
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ConnectorError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(url).send().await.map_err(|e| {
                backoff::Error::transient(ConnectorError::Network(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(ConnectorError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ConnectorError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ConnectorError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(ConnectorError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl MarketData for OrcaMarketData {
    async fn list_pools(&self) -> Result<Vec<PoolStats>, ConnectorError> {
        debug!("Fetching pool listings from {}", self.pools_url);
        let response = self.get_json(&self.pools_url).await?;

        let pools_json = response
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ConnectorError::Parse("Expected data array".to_string()))?;

        let mut pools = Vec::new();
        for pool_json in pools_json {
            match parse_pool(pool_json) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    warn!("Skipping unparseable pool listing: {}", e);
                }
            }
        }
        Ok(pools)
    }

    async fn fetch_prices(&self) -> Result<PriceTable, ConnectorError> {
        debug!("Fetching price table from {}", self.prices_url);
        let response = self.get_json(&self.prices_url).await?;

        let prices_json: HashMap<String, String> = serde_json::from_value(
            response
                .get("data")
                .cloned()
                .ok_or_else(|| ConnectorError::Parse("Expected data object".to_string()))?,
        )
        .map_err(|e| ConnectorError::Parse(e.to_string()))?;

        let mut table = PriceTable::new();
        for (mint, price) in prices_json {
            match Decimal::from_str_canonical(&price) {
                Ok(price) => table.insert(Mint::new(mint), price),
                Err(e) => warn!("Skipping unparseable price for {}: {}", mint, e),
            }
        }
        Ok(table)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToken {
    address: String,
    symbol: String,
    decimals: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    address: String,
    token_a: RawToken,
    token_b: RawToken,
    price: String,
    tvl_usdc: String,
    yield_over_tvl: String,
}

/// Parse one pool listing, converting its numeric strings up front.
fn parse_pool(value: &serde_json::Value) -> Result<PoolStats, ConnectorError> {
    let raw: RawPool =
        serde_json::from_value(value.clone()).map_err(|e| ConnectorError::Parse(e.to_string()))?;

    let parse_decimal = |field: &str, s: &str| {
        Decimal::from_str_canonical(s)
            .map_err(|e| ConnectorError::Parse(format!("{}: {}", field, e)))
    };

    Ok(PoolStats {
        address: raw.address,
        token_a: TokenMeta {
            mint: Mint::new(raw.token_a.address),
            symbol: raw.token_a.symbol,
            decimals: raw.token_a.decimals,
        },
        token_b: TokenMeta {
            mint: Mint::new(raw.token_b.address),
            symbol: raw.token_b.symbol,
            decimals: raw.token_b.decimals,
        },
        price: parse_decimal("price", &raw.price)?,
        tvl_usdc: parse_decimal("tvlUsdc", &raw.tvl_usdc)?,
        yield_over_tvl: parse_decimal("yieldOverTvl", &raw.yield_over_tvl)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_json() -> serde_json::Value {
        serde_json::json!({
            "address": "Czfq3xZZDmsdGdUyrNLtRhGc47cXcZtLG4crryfu44zE",
            "tokenA": {
                "address": "So11111111111111111111111111111111111111112",
                "symbol": "SOL",
                "decimals": 9,
                "name": "Wrapped SOL"
            },
            "tokenB": {
                "address": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "symbol": "USDC",
                "decimals": 6,
                "name": "USD Coin"
            },
            "price": "153.48",
            "tvlUsdc": "2500000.12",
            "yieldOverTvl": "0.0123",
            "tickSpacing": 4
        })
    }

    #[test]
    fn parse_pool_converts_numeric_strings() {
        let pool = parse_pool(&pool_json()).expect("parse failed");
        assert_eq!(pool.pair_label(), "SOL/USDC");
        assert_eq!(pool.token_a.decimals, 9);
        assert_eq!(pool.tvl_usdc.to_canonical_string(), "2500000.12");
        assert_eq!(pool.yield_over_tvl.to_canonical_string(), "0.0123");
    }

    #[test]
    fn parse_pool_rejects_bad_numbers() {
        let mut value = pool_json();
        value["tvlUsdc"] = serde_json::json!("not-a-number");
        assert!(matches!(
            parse_pool(&value),
            Err(ConnectorError::Parse(_))
        ));
    }
}
