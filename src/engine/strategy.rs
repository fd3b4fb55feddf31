//! Three-phase strategy cycle: close, open, settle.

use super::{settlement, sizing, EngineError, NewLedgerEntry, PositionUpdate};
use crate::connector::{
    BalanceReader, ConnectorError, MarketData, PositionExecutor, PositionReader, RejectionReason,
    SwapExecutor,
};
use crate::db::Repository;
use crate::domain::{Balance, Decimal, Mint, PoolStats, Position, PriceTable};
use crate::engine::recommend;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Tunables for one engine instance, resolved from configuration.
#[derive(Debug, Clone)]
pub struct StrategySettings {
    /// Close a position once it has given back this much of its peak,
    /// in percent. Stored as a positive number.
    pub stop_loss_trailing_percent: Decimal,
    /// Maximum number of positions held at once.
    pub simultaneous_entries: usize,
    /// Target USD value for each new position.
    pub usd_entry_value: Decimal,
    /// Asset all entries are funded from and all settlements sell into.
    pub base_asset: Mint,
    /// Native gas asset mint.
    pub native_mint: Mint,
    /// Minimum USD value of the native asset required before opening.
    pub min_native_usd: Decimal,
    /// Tokens the settlement phase never sells.
    pub hold_tokens: Vec<Mint>,
    /// Wait after an open before re-reading chain state.
    pub settle_delay: Duration,
}

/// The strategy orchestration engine.
///
/// Owns no chain or HTTP machinery itself; every external effect goes
/// through the injected collaborators.
pub struct StrategyEngine {
    market: Arc<dyn MarketData>,
    positions: Arc<dyn PositionReader>,
    balances: Arc<dyn BalanceReader>,
    swaps: Arc<dyn SwapExecutor>,
    executor: Arc<dyn PositionExecutor>,
    ledger: Arc<Repository>,
    settings: StrategySettings,
    /// Serializes cycles so an HTTP-triggered run cannot overlap the
    /// scheduled one.
    cycle_lock: Mutex<()>,
}

impl StrategyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: Arc<dyn MarketData>,
        positions: Arc<dyn PositionReader>,
        balances: Arc<dyn BalanceReader>,
        swaps: Arc<dyn SwapExecutor>,
        executor: Arc<dyn PositionExecutor>,
        ledger: Arc<Repository>,
        settings: StrategySettings,
    ) -> Self {
        StrategyEngine {
            market,
            positions,
            balances,
            swaps,
            executor,
            ledger,
            settings,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one full cycle and render the operation report.
    ///
    /// Each phase is its own failure boundary: an error becomes an
    /// `ERROR:` block in that phase's section and the remaining phases
    /// still run. The report is always complete text.
    pub async fn run_cycle(&self) -> String {
        let _guard = self.cycle_lock.lock().await;
        info!("Cycle started");

        let mut close_log = String::new();
        let mut open_log = String::new();
        // Assigned on every path through the match below.
        let sold_log: String;
        let mut summary_log = String::new();
        let mut remaining_positions: Vec<Position> = Vec::new();

        match self.market.fetch_prices().await {
            Ok(prices) => {
                if let Err(error) = self
                    .close_phase(&prices, &mut close_log, &mut remaining_positions)
                    .await
                {
                    warn!("Close phase failed: {}", error);
                    close_log.push_str(&format!(" - ERROR:\n{}", error));
                }

                if let Err(error) = self
                    .open_phase(&prices, &remaining_positions, &mut open_log)
                    .await
                {
                    warn!("Open phase failed: {}", error);
                    open_log.push_str(&format!(" - ERROR:\n{}", error));
                }

                match settlement::run_settlement(
                    self.balances.as_ref(),
                    self.positions.as_ref(),
                    self.swaps.as_ref(),
                    &self.ledger,
                    &prices,
                    &self.settings.hold_tokens,
                    &self.settings.base_asset,
                )
                .await
                {
                    Ok(report) => {
                        sold_log = report.sold_tokens;
                        summary_log = report.summary;
                    }
                    Err(error) => {
                        warn!("Settlement phase failed: {}", error);
                        sold_log = format!(" - ERROR:\n{}", error);
                    }
                }
            }
            Err(error) => {
                warn!("Price fetch failed, skipping cycle work: {}", error);
                let block = format!(" - ERROR:\n{}", error);
                close_log = block.clone();
                open_log = block.clone();
                sold_log = block;
            }
        }

        let mut report = String::from("OPERATION LOGS:");
        report.push_str("\n\nSTEP 1: CLOSE POSITIONS:\n");
        report.push_str(section_or_nothing(&close_log));
        report.push_str("\n\nSTEP 2: OPEN POSITIONS:\n");
        report.push_str(section_or_nothing(&open_log));
        report.push_str("\n\nSTEP 3: SOLD TOKENS:\n");
        report.push_str(section_or_nothing(&sold_log));
        if summary_log.is_empty() {
            report.push_str(" - No balance found.");
        } else {
            report.push_str(&summary_log);
        }

        info!("Cycle finished");
        report
    }

    /// Evaluate every tracked open position for closing.
    ///
    /// Positions the ledger does not know are left alone. The ledger gets
    /// one update per evaluated position whether or not it closes.
    async fn close_phase(
        &self,
        prices: &PriceTable,
        log: &mut String,
        remaining: &mut Vec<Position>,
    ) -> Result<(), EngineError> {
        let positions = self.positions.list_open_positions(prices).await?;
        *remaining = positions.clone();

        for position in positions {
            let Some(entry) = self.ledger.get_open_by_mint(&position.position_mint).await? else {
                continue;
            };

            let current = position.amount_position_usd;
            let usd_pnl = (current - entry.usd_amount).round2();
            let usd_percent_pnl = usd_pnl.percent_of(entry.usd_amount).round2();

            // Drawdown is measured against the peak of recorded history;
            // the current observation only raises the peak for later cycles.
            let decision_peak = entry.peak_usd_amount();
            let decision_trailing_usd = (current - decision_peak).round2();
            let decision_trailing_percent =
                decision_trailing_usd.percent_of(decision_peak).round2();

            let recorded_peak = decision_peak.max(current);
            let recorded_trailing_usd = (current - recorded_peak).round2();
            let recorded_trailing_percent =
                recorded_trailing_usd.percent_of(recorded_peak).round2();

            info!(
                "Position {}: value ${}, trailing {}% (limit -{}%)",
                position.position_mint.short(),
                current,
                decision_trailing_percent,
                self.settings.stop_loss_trailing_percent.abs()
            );

            self.ledger
                .append_update(
                    &position.position_mint,
                    &PositionUpdate {
                        recorded_at: Utc::now(),
                        token_a_usd: position.amount_token_a_usd,
                        token_b_usd: position.amount_token_b_usd,
                        usd_amount: current,
                        usd_pnl,
                        usd_percent_pnl,
                        peak_usd_amount: recorded_peak,
                        stop_trailing_usd: recorded_trailing_usd,
                        stop_trailing_percent: recorded_trailing_percent,
                    },
                )
                .await?;

            let stop_hit = decision_trailing_percent
                <= -self.settings.stop_loss_trailing_percent.abs();
            if !position.in_range || stop_hit {
                self.executor.close(&position.position_id).await?;
                self.ledger.close_position(&position.position_mint).await?;
                info!("Closed {} (~${})", position.position_mint.short(), current);
                log.push_str(&format!(
                    " - {} ~ ${}",
                    position.position_mint.short(),
                    current
                ));
                remaining.retain(|p| p.position_mint != position.position_mint);
            }
        }
        Ok(())
    }

    /// Open new positions up to the entry cap.
    async fn open_phase(
        &self,
        prices: &PriceTable,
        held: &[Position],
        log: &mut String,
    ) -> Result<(), EngineError> {
        if held.len() >= self.settings.simultaneous_entries {
            return Ok(());
        }

        let (mut balances, funded) = self.verify_balances(prices).await?;
        if !funded {
            log.push_str(" - No balance.");
            return Ok(());
        }

        let pools = self.market.list_pools().await?;
        let opportunities = recommend::select_opportunities(pools);
        if opportunities.is_empty() {
            log.push_str(" - No opportunities.");
            return Ok(());
        }
        let new_opportunities: Vec<PoolStats> = opportunities
            .into_iter()
            .filter(|o| !held.iter().any(|p| p.pool_address == o.address))
            .collect();

        let mut open_errors = 0u32;
        let mut swap_errors = 0u32;
        let mut opened = 0usize;

        for opportunity in new_opportunities {
            if open_errors >= 2 {
                log.push_str("\n - TOO MANY OPEN ERRORS");
                break;
            }
            if swap_errors >= 2 {
                log.push_str("\n - TOO MANY SWAP ERRORS");
                break;
            }
            if held.len() + opened >= self.settings.simultaneous_entries {
                break;
            }
            if opened > 0 {
                let (b, still_funded) = self.verify_balances(prices).await?;
                balances = b;
                if !still_funded {
                    log.push_str("\n - NO BALANCE ENOUGH");
                    break;
                }
            }

            let entry_value = self.settings.usd_entry_value;
            let token_a_human = match prices.price(&opportunity.token_a.mint) {
                Some(price) if !price.is_zero() => entry_value / price,
                _ => entry_value,
            };
            let input_amount = (token_a_human / Decimal::from_u64(2))
                .to_raw_amount(opportunity.token_a.decimals);
            let range = recommend::range_percent_for(
                opportunity.yield_over_tvl,
                opportunity.tvl_usdc,
            );

            info!(
                "Opening {} ~${} at range {}%",
                opportunity.pair_label(),
                entry_value,
                range
            );

            let quote = match self
                .executor
                .quote_open(&opportunity, range, &opportunity.token_a.mint, input_amount)
                .await
            {
                Ok(quote) => quote,
                Err(error) => {
                    open_errors += 1;
                    log.push_str(&open_error_line(&error));
                    continue;
                }
            };

            if let Err(error) = sizing::fund_position_legs(
                self.swaps.as_ref(),
                &self.settings.base_asset,
                &quote,
                &balances,
            )
            .await
            {
                warn!("Funding swaps failed for {}: {}", opportunity.pair_label(), error);
                swap_errors += 1;
                continue;
            }

            match self.executor.open(&quote).await {
                Ok(position_mint) => {
                    log.push_str(&format!(
                        " - POSITION OPENED: {} ~${}\n",
                        opportunity.pair_label(),
                        entry_value
                    ));
                    opened += 1;

                    // Let the chain catch up before reading the basis back.
                    tokio::time::sleep(self.settings.settle_delay).await;
                    self.record_opened(prices, &opportunity, &position_mint, range)
                        .await?;
                }
                Err(error) => {
                    open_errors += 1;
                    log.push_str(&open_error_line(&error));
                }
            }
        }
        Ok(())
    }

    /// Persist a just-opened position with its observed cost basis.
    ///
    /// If the chain has not surfaced the position yet, the configured
    /// entry value stands in as the basis.
    async fn record_opened(
        &self,
        prices: &PriceTable,
        opportunity: &PoolStats,
        position_mint: &Mint,
        range_percent: u8,
    ) -> Result<(), EngineError> {
        let observed = match self.positions.list_open_positions(prices).await {
            Ok(positions) => positions
                .into_iter()
                .find(|p| &p.position_mint == position_mint),
            Err(error) => {
                warn!("Could not read back opened position: {}", error);
                None
            }
        };

        let entry = match observed {
            Some(position) => NewLedgerEntry {
                position_mint: position.position_mint,
                pool_address: position.pool_address,
                token_a_mint: position.token_a_mint,
                token_b_mint: position.token_b_mint,
                usd_amount: position.amount_position_usd,
                token_a_usd: position.amount_token_a_usd,
                token_b_usd: position.amount_token_b_usd,
                range_percent,
                opened_at: Utc::now(),
            },
            None => {
                let half = (self.settings.usd_entry_value / Decimal::from_u64(2)).round2();
                NewLedgerEntry {
                    position_mint: position_mint.clone(),
                    pool_address: opportunity.address.clone(),
                    token_a_mint: opportunity.token_a.mint.clone(),
                    token_b_mint: opportunity.token_b.mint.clone(),
                    usd_amount: self.settings.usd_entry_value,
                    token_a_usd: half,
                    token_b_usd: half,
                    range_percent,
                    opened_at: Utc::now(),
                }
            }
        };
        self.ledger.insert_open(&entry).await?;
        Ok(())
    }

    /// Check the wallet can fund a new entry: enough native asset for
    /// gas, and more base asset than one entry's value.
    async fn verify_balances(
        &self,
        prices: &PriceTable,
    ) -> Result<(Vec<Balance>, bool), EngineError> {
        let balances = self.balances.list_balances(prices).await?;

        let native_usd = balances
            .iter()
            .find(|b| b.mint == self.settings.native_mint)
            .map(|b| b.usd_value)
            .unwrap_or_else(Decimal::zero);
        if native_usd <= self.settings.min_native_usd {
            warn!(
                "Native balance ${} at or below ${} floor",
                native_usd, self.settings.min_native_usd
            );
            return Ok((balances, false));
        }

        let base_usd = balances
            .iter()
            .find(|b| b.mint == self.settings.base_asset)
            .map(|b| b.usd_value)
            .unwrap_or_else(Decimal::zero);
        if base_usd <= self.settings.usd_entry_value {
            warn!(
                "Base asset balance ${} cannot fund a ${} entry",
                base_usd, self.settings.usd_entry_value
            );
            return Ok((balances, false));
        }

        Ok((balances, true))
    }

    /// Current wallet balances priced against a fresh table.
    pub async fn balances_snapshot(&self) -> Result<Vec<Balance>, EngineError> {
        let prices = self.market.fetch_prices().await?;
        Ok(self.balances.list_balances(&prices).await?)
    }

    /// Current open positions priced against a fresh table.
    pub async fn positions_snapshot(&self) -> Result<Vec<Position>, EngineError> {
        let prices = self.market.fetch_prices().await?;
        Ok(self.positions.list_open_positions(&prices).await?)
    }
}

fn section_or_nothing(log: &str) -> &str {
    if log.is_empty() {
        " - NOTHING."
    } else {
        log
    }
}

/// One report line per failed open, keyed off the rejection tag.
fn open_error_line(error: &ConnectorError) -> String {
    let hint = match error {
        ConnectorError::Rejected(RejectionReason::InsufficientGas) => {
            "INSUFFICIENT GAS (YOU NEED MORE OF THE NATIVE ASSET)".to_string()
        }
        ConnectorError::Rejected(RejectionReason::InsufficientFunds) => {
            "INSUFFICIENT FUNDS (SWAP WAS WRONG)".to_string()
        }
        ConnectorError::Rejected(RejectionReason::TokenMaxExceeded) => {
            "SENT MORE TOKENS THAN NEEDED (SWAP WAS WRONG)".to_string()
        }
        ConnectorError::Rejected(RejectionReason::BlockHeightExceeded) => {
            "BLOCK HEIGHT EXCEEDED, TRY AGAIN".to_string()
        }
        ConnectorError::Rejected(RejectionReason::InvalidTickRange) => {
            "TICKS ARE NOT RIGHT (SWAP WAS WRONG)".to_string()
        }
        ConnectorError::Rejected(RejectionReason::SlippageExceeded) => {
            "SLIPPAGE EXCEEDED, TRY AGAIN".to_string()
        }
        other => other.to_string(),
    };
    format!(" - ERROR OPENING POSITION: {}\n", hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MockChain, MockMarket, MockSwapExecutor};
    use crate::db::init_db;
    use tempfile::TempDir;

    fn settings() -> StrategySettings {
        StrategySettings {
            stop_loss_trailing_percent: Decimal::from_u64(10),
            simultaneous_entries: 2,
            usd_entry_value: Decimal::from_u64(50),
            base_asset: Mint::new("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            native_mint: Mint::new("So11111111111111111111111111111111111111112"),
            min_native_usd: Decimal::from_u64(2),
            hold_tokens: vec![
                Mint::new("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
                Mint::new("So11111111111111111111111111111111111111112"),
            ],
            settle_delay: Duration::from_millis(0),
        }
    }

    async fn engine(
        market: Arc<MockMarket>,
        chain: Arc<MockChain>,
        swaps: Arc<MockSwapExecutor>,
    ) -> (StrategyEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let ledger = Arc::new(Repository::new(pool));
        let engine = StrategyEngine::new(
            market,
            chain.clone(),
            chain.clone(),
            swaps,
            chain,
            ledger,
            settings(),
        );
        (engine, temp_dir)
    }

    #[tokio::test]
    async fn empty_world_renders_complete_report() {
        let market = Arc::new(MockMarket::new().with_prices(PriceTable::from_entries([(
            Mint::new("So11111111111111111111111111111111111111112"),
            Decimal::from_u64(150),
        )])));
        let chain = Arc::new(MockChain::new());
        let swaps = Arc::new(MockSwapExecutor::new());
        let (engine, _tmp) = engine(market, chain, swaps).await;

        let report = engine.run_cycle().await;
        assert!(report.starts_with("OPERATION LOGS:"));
        assert!(report.contains("STEP 1: CLOSE POSITIONS:\n - NOTHING."));
        // Empty wallet fails the balance check.
        assert!(report.contains("STEP 2: OPEN POSITIONS:\n - No balance."));
        assert!(report.contains("STEP 3: SOLD TOKENS:\n - NOTHING."));
        assert!(report.contains("HOLD WALLET:"));
        assert!(report.contains("AMOUNT: $0"));
    }

    #[tokio::test]
    async fn pools_failure_degrades_only_the_open_phase() {
        let market = Arc::new(
            MockMarket::new().with_pools_error(ConnectorError::Network("down".to_string())),
        );
        let chain = Arc::new(MockChain::new().with_balances(vec![
            Balance {
                mint: Mint::new("So11111111111111111111111111111111111111112"),
                human_amount: Decimal::from_u64(1),
                raw_amount: 1_000_000_000,
                decimals: 9,
                usd_value: Decimal::from_u64(150),
            },
            Balance {
                mint: Mint::new("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
                human_amount: Decimal::from_u64(100),
                raw_amount: 100_000_000,
                decimals: 6,
                usd_value: Decimal::from_u64(100),
            },
        ]));
        let swaps = Arc::new(MockSwapExecutor::new());
        let (engine, _tmp) = engine(market, chain, swaps).await;

        let report = engine.run_cycle().await;
        // The pools failure lands in the open section as an error block.
        assert!(report.contains("STEP 2: OPEN POSITIONS:\n - ERROR:\nNetwork error: down"));
        // The other phases still completed.
        assert!(report.contains("STEP 1: CLOSE POSITIONS:\n - NOTHING."));
        assert!(report.contains("HOLD WALLET:"));
    }

    #[tokio::test]
    async fn cap_reached_skips_open_phase_entirely() {
        let position = |mint: &str, pool: &str| Position {
            position_mint: Mint::new(mint),
            position_id: format!("{}-id", mint),
            pool_address: pool.to_string(),
            token_a_mint: Mint::new("a"),
            token_b_mint: Mint::new("b"),
            price: Decimal::from_u64(1),
            lower_price: Decimal::zero(),
            upper_price: Decimal::from_u64(2),
            amount_token_a: Decimal::zero(),
            amount_token_b: Decimal::zero(),
            amount_token_a_usd: Decimal::zero(),
            amount_token_b_usd: Decimal::zero(),
            amount_position_usd: Decimal::from_u64(50),
            in_range: true,
        };
        let market = Arc::new(MockMarket::new());
        let chain = Arc::new(
            MockChain::new()
                .with_position(position("mint-one1", "pool-one1"))
                .with_position(position("mint-two1", "pool-two1")),
        );
        let swaps = Arc::new(MockSwapExecutor::new());
        let (engine, _tmp) = engine(market, chain, swaps).await;

        let report = engine.run_cycle().await;
        // Untracked positions are not closed, and with the cap full the
        // open section stays empty.
        assert!(report.contains("STEP 1: CLOSE POSITIONS:\n - NOTHING."));
        assert!(report.contains("STEP 2: OPEN POSITIONS:\n - NOTHING."));
    }
}
