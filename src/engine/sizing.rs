//! Swap sizing for position entry.
//!
//! Before an open, each leg the wallet cannot already cover is bought
//! with an exact-output swap from the base asset, sized to the shortfall
//! only. Legs denominated in the base asset itself are never swapped for.

use crate::connector::{ConnectorError, SwapExecutor, SwapRequest};
use crate::domain::{Balance, Mint, PositionQuote};
use tracing::debug;

/// Acquire whatever the wallet is short of for both legs of a quote.
///
/// Any swap failure aborts the whole funding attempt; the caller treats
/// it as one swap error against its breaker, not per leg.
///
/// # Errors
/// Returns the first swap error encountered.
pub async fn fund_position_legs(
    swaps: &dyn SwapExecutor,
    base_mint: &Mint,
    quote: &PositionQuote,
    balances: &[Balance],
) -> Result<(), ConnectorError> {
    fund_leg(
        swaps,
        base_mint,
        &quote.token_a.mint,
        quote.amount_token_a,
        balances,
    )
    .await?;
    fund_leg(
        swaps,
        base_mint,
        &quote.token_b.mint,
        quote.amount_token_b,
        balances,
    )
    .await?;
    Ok(())
}

async fn fund_leg(
    swaps: &dyn SwapExecutor,
    base_mint: &Mint,
    leg_mint: &Mint,
    needed: u64,
    balances: &[Balance],
) -> Result<(), ConnectorError> {
    if leg_mint == base_mint {
        return Ok(());
    }
    let held = balances
        .iter()
        .find(|b| &b.mint == leg_mint)
        .map(|b| b.raw_amount)
        .unwrap_or(0);
    if held >= needed {
        return Ok(());
    }

    let shortfall = needed - held;
    debug!(
        "Funding leg {}: need {}, hold {}, buying {}",
        leg_mint.short(),
        needed,
        held,
        shortfall
    );
    swaps
        .quote_and_swap(&SwapRequest {
            input_mint: base_mint.clone(),
            output_mint: leg_mint.clone(),
            amount: shortfall,
            amount_is_output: true,
            execute: true,
            max_attempts: 1,
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MockSwapExecutor, RejectionReason, SwapScript};
    use crate::domain::{Decimal, TokenMeta};

    fn base() -> Mint {
        Mint::new("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
    }

    fn quote(amount_a: u64, amount_b: u64, token_b_is_base: bool) -> PositionQuote {
        let token_b_mint = if token_b_is_base {
            base()
        } else {
            Mint::new("tokenB")
        };
        PositionQuote {
            pool_address: "pool1".to_string(),
            token_a: TokenMeta {
                mint: Mint::new("tokenA"),
                symbol: "TKA".to_string(),
                decimals: 9,
            },
            token_b: TokenMeta {
                mint: token_b_mint,
                symbol: "TKB".to_string(),
                decimals: 6,
            },
            amount_token_a: amount_a,
            amount_token_b: amount_b,
            lower_price: Decimal::from_u64(90),
            upper_price: Decimal::from_u64(110),
            range_percent: 3,
        }
    }

    fn balance(mint: &str, raw: u64) -> Balance {
        Balance {
            mint: Mint::new(mint),
            human_amount: Decimal::from_u64(raw),
            raw_amount: raw,
            decimals: 0,
            usd_value: Decimal::zero(),
        }
    }

    #[tokio::test]
    async fn buys_only_the_shortfall() {
        let swaps = MockSwapExecutor::new();
        let balances = vec![balance("tokenA", 400), balance("tokenB", 0)];

        fund_position_legs(&swaps, &base(), &quote(1000, 500, false), &balances)
            .await
            .unwrap();

        let requests = swaps.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].amount, 600);
        assert_eq!(requests[0].output_mint, Mint::new("tokenA"));
        assert!(requests[0].amount_is_output);
        assert!(requests[0].execute);
        assert_eq!(requests[1].amount, 500);
        assert_eq!(requests[1].output_mint, Mint::new("tokenB"));
    }

    #[tokio::test]
    async fn base_asset_leg_is_never_swapped_for() {
        let swaps = MockSwapExecutor::new();
        let balances = vec![balance("tokenA", 2000)];

        fund_position_legs(&swaps, &base(), &quote(1000, 500, true), &balances)
            .await
            .unwrap();

        assert!(swaps.requests().is_empty());
    }

    #[tokio::test]
    async fn fully_funded_wallet_makes_no_swaps() {
        let swaps = MockSwapExecutor::new();
        let balances = vec![balance("tokenA", 1000), balance("tokenB", 500)];

        fund_position_legs(&swaps, &base(), &quote(1000, 500, false), &balances)
            .await
            .unwrap();

        assert!(swaps.requests().is_empty());
    }

    #[tokio::test]
    async fn first_failure_aborts_funding() {
        let swaps = MockSwapExecutor::new().with_script(SwapScript::Fail(
            ConnectorError::Rejected(RejectionReason::SlippageExceeded),
        ));
        let balances = vec![];

        let result =
            fund_position_legs(&swaps, &base(), &quote(1000, 500, false), &balances).await;

        assert!(result.is_err());
        // Leg B is never attempted after leg A fails.
        assert_eq!(swaps.requests().len(), 1);
    }
}
