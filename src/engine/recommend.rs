//! Pool selection and range sizing rules.

use crate::domain::{Decimal, PoolStats};

/// Minimum yield-over-TVL, in percent, for a pool to qualify.
const MIN_YIELD_PERCENT: &str = "0.3";

/// Rank pools into an ordered opportunity list.
///
/// Takes the top 15 by TVL, reorders those by yield over TVL, and keeps
/// only pools whose yield clears the percentage floor. Order is the order
/// open attempts will be made in.
pub fn select_opportunities(mut pools: Vec<PoolStats>) -> Vec<PoolStats> {
    pools.sort_by(|a, b| b.tvl_usdc.cmp(&a.tvl_usdc));
    pools.truncate(15);
    pools.sort_by(|a, b| b.yield_over_tvl.cmp(&a.yield_over_tvl));

    let floor = Decimal::from_str_canonical(MIN_YIELD_PERCENT).unwrap_or_else(|_| Decimal::zero());
    pools.retain(|p| p.yield_over_tvl * Decimal::hundred() > floor);
    pools
}

/// Width of the liquidity range as a percentage around the pool price.
///
/// Strong yield in a deep pool gets the tightest range; moderate yield or
/// a shallow pool gets a middle range; everything else gets the widest.
pub fn range_percent_for(yield_over_tvl: Decimal, tvl_usdc: Decimal) -> u8 {
    let tight_yield = Decimal::from_str_canonical("0.01").unwrap_or_else(|_| Decimal::zero());
    let mid_yield = Decimal::from_str_canonical("0.005").unwrap_or_else(|_| Decimal::zero());
    let deep_tvl = Decimal::from_u64(1_000_000);
    let shallow_tvl = Decimal::from_u64(500_000);

    if yield_over_tvl > tight_yield && tvl_usdc > deep_tvl {
        2
    } else if yield_over_tvl > mid_yield || tvl_usdc < shallow_tvl {
        3
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Mint, TokenMeta};

    fn pool(address: &str, tvl: &str, yield_over_tvl: &str) -> PoolStats {
        PoolStats {
            address: address.to_string(),
            token_a: TokenMeta {
                mint: Mint::new(format!("{}-a", address)),
                symbol: "A".to_string(),
                decimals: 9,
            },
            token_b: TokenMeta {
                mint: Mint::new(format!("{}-b", address)),
                symbol: "B".to_string(),
                decimals: 6,
            },
            price: Decimal::from_u64(1),
            tvl_usdc: Decimal::from_str_canonical(tvl).unwrap(),
            yield_over_tvl: Decimal::from_str_canonical(yield_over_tvl).unwrap(),
        }
    }

    #[test]
    fn selection_orders_by_yield_within_top_tvl() {
        let pools = vec![
            pool("low-yield", "9000000", "0.004"),
            pool("high-yield", "5000000", "0.02"),
            pool("mid-yield", "7000000", "0.008"),
        ];
        let picked = select_opportunities(pools);
        let addresses: Vec<&str> = picked.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(addresses, vec!["high-yield", "mid-yield", "low-yield"]);
    }

    #[test]
    fn selection_drops_pools_below_yield_floor() {
        let pools = vec![
            pool("keeps", "1000000", "0.0031"),
            pool("drops", "1000000", "0.003"),
            pool("drops-too", "1000000", "0.001"),
        ];
        let picked = select_opportunities(pools);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].address, "keeps");
    }

    #[test]
    fn selection_considers_only_top_fifteen_by_tvl() {
        let mut pools: Vec<PoolStats> = (0..20)
            .map(|i| pool(&format!("big{}", i), &format!("{}", 1_000_000 + i), "0.004"))
            .collect();
        // Highest yield in the corpus, but too shallow to make the cut.
        pools.push(pool("shallow", "100", "0.5"));

        let picked = select_opportunities(pools);
        assert_eq!(picked.len(), 15);
        assert!(picked.iter().all(|p| p.address.starts_with("big")));
    }

    #[test]
    fn range_tightens_with_yield_and_depth() {
        let d = |s: &str| Decimal::from_str_canonical(s).unwrap();
        assert_eq!(range_percent_for(d("0.012"), d("1200000")), 2);
        assert_eq!(range_percent_for(d("0.002"), d("300000")), 3);
        assert_eq!(range_percent_for(d("0.008"), d("800000")), 3);
        assert_eq!(range_percent_for(d("0.001"), d("2000000")), 5);
    }

    #[test]
    fn range_boundaries_are_strict() {
        let d = |s: &str| Decimal::from_str_canonical(s).unwrap();
        // Exactly at the thresholds falls through to the next tier.
        assert_eq!(range_percent_for(d("0.01"), d("2000000")), 3);
        assert_eq!(range_percent_for(d("0.012"), d("1000000")), 3);
        assert_eq!(range_percent_for(d("0.005"), d("500000")), 5);
    }
}
