//! Settlement and reporting phase.
//!
//! Sells every wallet token outside the hold list back into the base
//! asset, then renders the hold-wallet and open-position summaries that
//! close out the cycle report.

use super::EngineError;
use crate::connector::{BalanceReader, PositionReader, SwapExecutor, SwapRequest};
use crate::db::Repository;
use crate::domain::{Decimal, Mint, PriceTable, short_hash};
use tracing::{info, warn};

/// Rendered output of the settlement phase.
pub struct SettlementReport {
    /// Lines for tokens sold (or that failed to sell); empty when nothing
    /// was eligible.
    pub sold_tokens: String,
    /// Hold-wallet and open-position summaries with totals.
    pub summary: String,
}

/// Run the settlement phase against one cycle's price table.
///
/// Failed sells are reported and skipped; they never abort the phase.
///
/// # Errors
/// Returns an error when balances or positions cannot be read, or the
/// ledger lookup fails.
pub async fn run_settlement(
    balances: &dyn BalanceReader,
    positions: &dyn PositionReader,
    swaps: &dyn SwapExecutor,
    ledger: &Repository,
    prices: &PriceTable,
    hold_tokens: &[Mint],
    base_mint: &Mint,
) -> Result<SettlementReport, EngineError> {
    let mut sold_tokens = String::new();
    let mut sold: Vec<Mint> = Vec::new();

    let mut all_balances = balances.list_balances(prices).await?;
    let to_sell: Vec<_> = all_balances
        .iter()
        .filter(|b| !hold_tokens.contains(&b.mint))
        .cloned()
        .collect();

    for balance in to_sell {
        let request = SwapRequest {
            input_mint: balance.mint.clone(),
            output_mint: base_mint.clone(),
            amount: balance.raw_amount,
            amount_is_output: false,
            execute: true,
            max_attempts: 2,
        };
        match swaps.quote_and_swap(&request).await {
            Ok(_) => {
                info!("Sold {} (~${})", balance.mint.short(), balance.usd_value);
                sold.push(balance.mint.clone());
                sold_tokens.push_str(&format!(
                    " - {} ~${}\n",
                    balance.mint.short(),
                    balance.usd_value
                ));
            }
            Err(error) => {
                warn!("Failed to sell {}: {}", balance.mint.short(), error);
                sold_tokens.push_str(&format!(
                    " - SWAP FAILED: {} ~${}\n",
                    balance.mint.short(),
                    balance.usd_value
                ));
            }
        }
    }

    // Re-read so the hold summary reflects the sells that just landed.
    if !sold.is_empty() {
        all_balances = balances.list_balances(prices).await?;
    }

    let mut summary = String::from("\n\nHOLD WALLET:\n");
    let mut hold_amount_usd = Decimal::zero();
    for balance in &all_balances {
        if sold.contains(&balance.mint) {
            continue;
        }
        summary.push_str(&format!(
            " - {} -> {} (${})\n",
            balance.mint.short(),
            balance.human_amount,
            balance.usd_value
        ));
        hold_amount_usd += balance.usd_value;
    }
    summary.push_str(&format!("   HOLD AMOUNT: ${}\n", hold_amount_usd.round2()));

    summary.push_str("\nOPEN POSITIONS:\n");
    let open_positions = positions.list_open_positions(prices).await?;
    let mut positions_amount_usd = Decimal::zero();
    let mut total_pnl_usd = Decimal::zero();
    let mut total_pnl_percent = Decimal::zero();
    for position in &open_positions {
        let tracked = ledger.get_open_by_mint(&position.position_mint).await?;
        match tracked.as_ref().and_then(|entry| entry.latest_update()) {
            Some(last_update) => {
                let pnl_usd =
                    (position.amount_position_usd - last_update.usd_amount).round2();
                let pnl_percent = pnl_usd.percent_of(last_update.usd_amount).round2();
                total_pnl_usd += pnl_usd;
                total_pnl_percent += pnl_percent;
                summary.push_str(&format!(
                    " - {} ~ ${} ({}% ~ ${})\n",
                    short_hash(&position.pool_address),
                    position.amount_position_usd,
                    pnl_percent,
                    pnl_usd
                ));
            }
            None => {
                // Not tracked in the ledger; report value only.
                summary.push_str(&format!(
                    " - {} ~ ${}\n",
                    short_hash(&position.pool_address),
                    position.amount_position_usd
                ));
            }
        }
        positions_amount_usd += position.amount_position_usd;
    }
    summary.push_str(&format!(
        "   POSITIONS AMOUNT: ~ ${} ({}% ~ ${})",
        positions_amount_usd.round2(),
        total_pnl_percent.round2(),
        total_pnl_usd.round2()
    ));

    summary.push_str(&format!(
        "\n\nAMOUNT: ${}",
        (hold_amount_usd + positions_amount_usd).round2()
    ));

    Ok(SettlementReport {
        sold_tokens,
        summary,
    })
}
