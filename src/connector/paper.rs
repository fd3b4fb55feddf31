//! Paper-trading wallet: simulated balances, swaps, and positions.
//!
//! Lets the binary run the full strategy loop against live market data
//! without keys or on-chain writes. Swaps and position legs settle
//! instantly at the supplied price table with no slippage.

use super::{
    BalanceReader, ConnectorError, MarketData, PositionExecutor, PositionReader, RejectionReason,
    SwapExecutor, SwapOutcome, SwapRequest,
};
use crate::domain::{
    Balance, Decimal, Mint, PoolStats, Position, PositionQuote, PriceTable, TokenMeta,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PaperPosition {
    position_mint: Mint,
    pool_address: String,
    token_a: TokenMeta,
    token_b: TokenMeta,
    lower_price: Decimal,
    upper_price: Decimal,
    amount_a_raw: u64,
    amount_b_raw: u64,
}

#[derive(Debug, Default)]
struct PaperState {
    /// Raw balance per mint.
    balances: HashMap<Mint, u64>,
    /// Known mint precision, learned from seeding and pool quotes.
    decimals: HashMap<Mint, u8>,
    positions: Vec<PaperPosition>,
}

/// Simulated wallet implementing every execution-side connector trait.
pub struct PaperWallet {
    market: Arc<dyn MarketData>,
    state: Mutex<PaperState>,
}

impl PaperWallet {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self {
            market,
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Seed a starting balance (builder style).
    pub fn with_balance(self, mint: Mint, raw_amount: u64, decimals: u8) -> Self {
        {
            let mut state = self.state.lock().expect("paper state poisoned");
            state.balances.insert(mint.clone(), raw_amount);
            state.decimals.insert(mint, decimals);
        }
        self
    }

    fn decimals_of(state: &PaperState, mint: &Mint) -> u8 {
        // Unknown mints default to USDC-like precision.
        state.decimals.get(mint).copied().unwrap_or(6)
    }

    fn debit(state: &mut PaperState, mint: &Mint, raw: u64) -> Result<(), ConnectorError> {
        let held = state.balances.get(mint).copied().unwrap_or(0);
        if held < raw {
            return Err(ConnectorError::Rejected(RejectionReason::InsufficientFunds));
        }
        state.balances.insert(mint.clone(), held - raw);
        Ok(())
    }

    fn credit(state: &mut PaperState, mint: &Mint, raw: u64) {
        *state.balances.entry(mint.clone()).or_insert(0) += raw;
    }

    /// Convert an amount of one mint to another through the USD table.
    fn convert(
        prices: &PriceTable,
        state: &PaperState,
        from: &Mint,
        to: &Mint,
        raw: u64,
    ) -> Result<u64, ConnectorError> {
        let price_from = prices
            .price(from)
            .ok_or_else(|| ConnectorError::Other(format!("no price for {}", from)))?;
        let price_to = prices
            .price(to)
            .ok_or_else(|| ConnectorError::Other(format!("no price for {}", to)))?;
        if price_to.is_zero() {
            return Err(ConnectorError::Other(format!("zero price for {}", to)));
        }
        let human_from = Decimal::from_raw_amount(raw, Self::decimals_of(state, from));
        let human_to = human_from * price_from / price_to;
        Ok(human_to.to_raw_amount(Self::decimals_of(state, to)))
    }
}

#[async_trait]
impl BalanceReader for PaperWallet {
    async fn list_balances(&self, prices: &PriceTable) -> Result<Vec<Balance>, ConnectorError> {
        let state = self.state.lock().expect("paper state poisoned");
        let mut balances: Vec<Balance> = state
            .balances
            .iter()
            .filter(|(_, raw)| **raw > 0)
            .map(|(mint, raw)| {
                let decimals = Self::decimals_of(&state, mint);
                let human_amount = Decimal::from_raw_amount(*raw, decimals);
                Balance {
                    mint: mint.clone(),
                    human_amount,
                    raw_amount: *raw,
                    decimals,
                    usd_value: prices.usd_value(mint, human_amount),
                }
            })
            .collect();
        balances.sort_by(|a, b| a.mint.cmp(&b.mint));
        Ok(balances)
    }
}

#[async_trait]
impl SwapExecutor for PaperWallet {
    async fn quote_and_swap(&self, request: &SwapRequest) -> Result<SwapOutcome, ConnectorError> {
        let prices = self.market.fetch_prices().await?;
        let mut state = self.state.lock().expect("paper state poisoned");

        let (in_amount, out_amount) = if request.amount_is_output {
            let in_amount = Self::convert(
                &prices,
                &state,
                &request.output_mint,
                &request.input_mint,
                request.amount,
            )?;
            (in_amount, request.amount)
        } else {
            let out_amount = Self::convert(
                &prices,
                &state,
                &request.input_mint,
                &request.output_mint,
                request.amount,
            )?;
            (request.amount, out_amount)
        };

        let in_human = Decimal::from_raw_amount(in_amount, Self::decimals_of(&state, &request.input_mint));
        let usd_value = prices.usd_value(&request.input_mint, in_human);

        if request.execute {
            Self::debit(&mut state, &request.input_mint, in_amount)?;
            Self::credit(&mut state, &request.output_mint, out_amount);
            info!(
                "Paper swap {} -> {} (~${})",
                request.input_mint.short(),
                request.output_mint.short(),
                usd_value
            );
        }

        Ok(SwapOutcome {
            in_amount,
            out_amount,
            usd_value,
        })
    }
}

#[async_trait]
impl PositionExecutor for PaperWallet {
    async fn quote_open(
        &self,
        pool: &PoolStats,
        range_percent: u8,
        input_mint: &Mint,
        input_amount: u64,
    ) -> Result<PositionQuote, ConnectorError> {
        let mut state = self.state.lock().expect("paper state poisoned");
        state
            .decimals
            .insert(pool.token_a.mint.clone(), pool.token_a.decimals);
        state
            .decimals
            .insert(pool.token_b.mint.clone(), pool.token_b.decimals);

        // The other leg is sized at the pool price for an even value split.
        let (amount_a, amount_b) = if *input_mint == pool.token_a.mint {
            let human_a = Decimal::from_raw_amount(input_amount, pool.token_a.decimals);
            let human_b = human_a * pool.price;
            (input_amount, human_b.to_raw_amount(pool.token_b.decimals))
        } else {
            let human_b = Decimal::from_raw_amount(input_amount, pool.token_b.decimals);
            if pool.price.is_zero() {
                return Err(ConnectorError::Other(format!(
                    "zero pool price for {}",
                    pool.address
                )));
            }
            let human_a = human_b / pool.price;
            (human_a.to_raw_amount(pool.token_a.decimals), input_amount)
        };

        let spread = pool.price * Decimal::from_u64(range_percent as u64) / Decimal::hundred();
        Ok(PositionQuote {
            pool_address: pool.address.clone(),
            token_a: pool.token_a.clone(),
            token_b: pool.token_b.clone(),
            amount_token_a: amount_a,
            amount_token_b: amount_b,
            lower_price: pool.price - spread,
            upper_price: pool.price + spread,
            range_percent,
        })
    }

    async fn open(&self, quote: &PositionQuote) -> Result<Mint, ConnectorError> {
        let mut state = self.state.lock().expect("paper state poisoned");
        Self::debit(&mut state, &quote.token_a.mint, quote.amount_token_a)?;
        if let Err(e) = Self::debit(&mut state, &quote.token_b.mint, quote.amount_token_b) {
            // Roll the first leg back so a failed open moves nothing.
            Self::credit(&mut state, &quote.token_a.mint, quote.amount_token_a);
            return Err(e);
        }

        let position_mint = Mint::new(Uuid::new_v4().to_string());
        state.positions.push(PaperPosition {
            position_mint: position_mint.clone(),
            pool_address: quote.pool_address.clone(),
            token_a: quote.token_a.clone(),
            token_b: quote.token_b.clone(),
            lower_price: quote.lower_price,
            upper_price: quote.upper_price,
            amount_a_raw: quote.amount_token_a,
            amount_b_raw: quote.amount_token_b,
        });
        info!(
            "Paper position opened in {} ({})",
            quote.pool_address,
            position_mint.short()
        );
        Ok(position_mint)
    }

    async fn close(&self, position_id: &str) -> Result<(), ConnectorError> {
        let mut state = self.state.lock().expect("paper state poisoned");
        let index = state
            .positions
            .iter()
            .position(|p| p.position_mint.as_str() == position_id)
            .ok_or_else(|| ConnectorError::Other(format!("position {} not found", position_id)))?;
        let position = state.positions.remove(index);
        Self::credit(&mut state, &position.token_a.mint, position.amount_a_raw);
        Self::credit(&mut state, &position.token_b.mint, position.amount_b_raw);
        info!("Paper position closed ({})", position.position_mint.short());
        Ok(())
    }
}

#[async_trait]
impl PositionReader for PaperWallet {
    async fn list_open_positions(
        &self,
        prices: &PriceTable,
    ) -> Result<Vec<Position>, ConnectorError> {
        let state = self.state.lock().expect("paper state poisoned");
        let positions = state
            .positions
            .iter()
            .map(|p| {
                let amount_a = Decimal::from_raw_amount(p.amount_a_raw, p.token_a.decimals);
                let amount_b = Decimal::from_raw_amount(p.amount_b_raw, p.token_b.decimals);
                // Pool price in token B per token A, derived from USD prices.
                let price_a = prices.price(&p.token_a.mint).unwrap_or_default();
                let price_b = prices.price(&p.token_b.mint).unwrap_or_default();
                let price = if price_b.is_zero() {
                    Decimal::zero()
                } else {
                    price_a / price_b
                };

                let position = Position {
                    position_mint: p.position_mint.clone(),
                    position_id: p.position_mint.as_str().to_string(),
                    pool_address: p.pool_address.clone(),
                    token_a_mint: p.token_a.mint.clone(),
                    token_b_mint: p.token_b.mint.clone(),
                    price,
                    lower_price: p.lower_price,
                    upper_price: p.upper_price,
                    amount_token_a: amount_a,
                    amount_token_b: amount_b,
                    amount_token_a_usd: Decimal::zero(),
                    amount_token_b_usd: Decimal::zero(),
                    amount_position_usd: Decimal::zero(),
                    in_range: false,
                };
                position.revalued(prices)
            })
            .collect();
        Ok(positions)
    }
}
