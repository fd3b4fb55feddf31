//! Scripted connector doubles for tests.
//!
//! Unlike [`PaperWallet`](super::PaperWallet), these return exactly what a
//! test scripts and record every call, so failure paths and decision rules
//! can be pinned down without simulating a wallet.

use super::{
    BalanceReader, ConnectorError, MarketData, PositionExecutor, PositionReader, SwapExecutor,
    SwapOutcome, SwapRequest,
};
use crate::domain::{
    Balance, Decimal, Mint, PoolStats, Position, PositionQuote, PriceTable,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Market data source returning scripted pools and prices.
///
/// Prices can be swapped mid-test to drive positions out of range.
#[derive(Debug, Default)]
pub struct MockMarket {
    pools: Mutex<Vec<PoolStats>>,
    prices: Mutex<PriceTable>,
    fail_pools: Mutex<Option<ConnectorError>>,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pools(self, pools: Vec<PoolStats>) -> Self {
        *self.pools.lock().expect("mock poisoned") = pools;
        self
    }

    pub fn with_prices(self, prices: PriceTable) -> Self {
        *self.prices.lock().expect("mock poisoned") = prices;
        self
    }

    pub fn with_pools_error(self, error: ConnectorError) -> Self {
        *self.fail_pools.lock().expect("mock poisoned") = Some(error);
        self
    }

    pub fn set_prices(&self, prices: PriceTable) {
        *self.prices.lock().expect("mock poisoned") = prices;
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn list_pools(&self) -> Result<Vec<PoolStats>, ConnectorError> {
        if let Some(error) = self.fail_pools.lock().expect("mock poisoned").clone() {
            return Err(error);
        }
        Ok(self.pools.lock().expect("mock poisoned").clone())
    }

    async fn fetch_prices(&self) -> Result<PriceTable, ConnectorError> {
        Ok(self.prices.lock().expect("mock poisoned").clone())
    }
}

/// One scripted response for the mock swap executor.
#[derive(Debug, Clone)]
pub enum SwapScript {
    /// Echo the requested amount on both sides.
    Succeed,
    Fail(ConnectorError),
}

/// Swap executor that replays a script and records every request.
#[derive(Debug, Default)]
pub struct MockSwapExecutor {
    script: Mutex<VecDeque<SwapScript>>,
    requests: Mutex<Vec<SwapRequest>>,
}

impl MockSwapExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted response; once the queue drains, swaps succeed.
    pub fn with_script(self, step: SwapScript) -> Self {
        self.script.lock().expect("mock poisoned").push_back(step);
        self
    }

    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.lock().expect("mock poisoned").clone()
    }
}

#[async_trait]
impl SwapExecutor for MockSwapExecutor {
    async fn quote_and_swap(&self, request: &SwapRequest) -> Result<SwapOutcome, ConnectorError> {
        self.requests
            .lock()
            .expect("mock poisoned")
            .push(request.clone());
        let step = self
            .script
            .lock()
            .expect("mock poisoned")
            .pop_front()
            .unwrap_or(SwapScript::Succeed);
        match step {
            SwapScript::Succeed => Ok(SwapOutcome {
                in_amount: request.amount,
                out_amount: request.amount,
                usd_value: Decimal::zero(),
            }),
            SwapScript::Fail(error) => Err(error),
        }
    }
}

#[derive(Debug, Default)]
struct MockChainState {
    positions: Vec<Position>,
    balances: Vec<Balance>,
    open_results: VecDeque<Result<Position, ConnectorError>>,
    close_error: Option<ConnectorError>,
    opened: Vec<PositionQuote>,
    closed: Vec<String>,
}

/// Scripted chain view: open positions, balances, and executor behavior.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<MockChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(self, position: Position) -> Self {
        self.state
            .lock()
            .expect("mock poisoned")
            .positions
            .push(position);
        self
    }

    pub fn with_balances(self, balances: Vec<Balance>) -> Self {
        self.state.lock().expect("mock poisoned").balances = balances;
        self
    }

    /// Queue the result of the next `open` call. On success the scripted
    /// position becomes visible to subsequent position reads.
    pub fn with_open_result(self, result: Result<Position, ConnectorError>) -> Self {
        self.state
            .lock()
            .expect("mock poisoned")
            .open_results
            .push_back(result);
        self
    }

    pub fn with_close_error(self, error: ConnectorError) -> Self {
        self.state.lock().expect("mock poisoned").close_error = Some(error);
        self
    }

    pub fn opened_quotes(&self) -> Vec<PositionQuote> {
        self.state.lock().expect("mock poisoned").opened.clone()
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.state.lock().expect("mock poisoned").closed.clone()
    }
}

#[async_trait]
impl PositionReader for MockChain {
    async fn list_open_positions(
        &self,
        _prices: &PriceTable,
    ) -> Result<Vec<Position>, ConnectorError> {
        Ok(self.state.lock().expect("mock poisoned").positions.clone())
    }
}

#[async_trait]
impl BalanceReader for MockChain {
    async fn list_balances(&self, _prices: &PriceTable) -> Result<Vec<Balance>, ConnectorError> {
        Ok(self.state.lock().expect("mock poisoned").balances.clone())
    }
}

#[async_trait]
impl PositionExecutor for MockChain {
    async fn quote_open(
        &self,
        pool: &PoolStats,
        range_percent: u8,
        input_mint: &Mint,
        input_amount: u64,
    ) -> Result<PositionQuote, ConnectorError> {
        // Same even-split math as the paper wallet, without balance checks.
        let (amount_a, amount_b) = if *input_mint == pool.token_a.mint {
            let human_a = Decimal::from_raw_amount(input_amount, pool.token_a.decimals);
            let human_b = human_a * pool.price;
            (input_amount, human_b.to_raw_amount(pool.token_b.decimals))
        } else {
            (input_amount, input_amount)
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
        let mut state = self.state.lock().expect("mock poisoned");
        state.opened.push(quote.clone());
        match state.open_results.pop_front() {
            Some(Ok(position)) => {
                let mint = position.position_mint.clone();
                state.positions.push(position);
                Ok(mint)
            }
            Some(Err(error)) => Err(error),
            None => Err(ConnectorError::Other(
                "no scripted open result".to_string(),
            )),
        }
    }

    async fn close(&self, position_id: &str) -> Result<(), ConnectorError> {
        let mut state = self.state.lock().expect("mock poisoned");
        if let Some(error) = state.close_error.clone() {
            return Err(error);
        }
        state.closed.push(position_id.to_string());
        state.positions.retain(|p| p.position_id != position_id);
        Ok(())
    }
}
