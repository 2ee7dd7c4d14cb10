//! Listed trading pairs and their fee schedule.
//!
//! Markets are informational: they are shown to operators and traders but
//! order creation does not enforce them.

use serde::Serialize;

use crate::asset::AssetRegistry;
use crate::error::Result;
use crate::wallet::WalletService;

/// Basis points in one whole.
const BPS_DENOMINATOR: u64 = 10_000;

/// A trading pair with buy/sell fees and limits, amounts in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Market {
    pub base: &'static str,
    pub quote: &'static str,
    pub buy_fixed_fee: u64,
    pub buy_fee_bps: u64,
    pub sell_fixed_fee: u64,
    pub sell_fee_bps: u64,
    pub buy_limit: u64,
    pub sell_limit: u64,
}

static MARKETS: &[Market] = &[Market {
    base: "L-BTC",
    quote: "USDT",
    buy_fixed_fee: 1_000,
    buy_fee_bps: 10,
    sell_fixed_fee: 100_000_000,
    sell_fee_bps: 75,
    buy_limit: 500_000_000_000,
    sell_limit: 500_000_000_000,
}];

impl Market {
    /// `"BASE/QUOTE"`.
    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// Whether this market trades `a` against `b`, in either order.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (self.base == a && self.quote == b) || (self.base == b && self.quote == a)
    }

    /// Total fee for buying `amount` of the base asset.
    pub fn buy_fee(&self, amount: u64) -> u64 {
        self.buy_fixed_fee
            .saturating_add(percentage_fee(amount, self.buy_fee_bps))
    }

    /// Total fee for selling `amount` of the base asset.
    pub fn sell_fee(&self, amount: u64) -> u64 {
        self.sell_fixed_fee
            .saturating_add(percentage_fee(amount, self.sell_fee_bps))
    }
}

/// `amount * bps / 10_000`, rounded down.
pub fn percentage_fee(amount: u64, bps: u64) -> u64 {
    let fee = u128::from(amount) * u128::from(bps) / u128::from(BPS_DENOMINATOR);
    u64::try_from(fee).unwrap_or(u64::MAX)
}

/// Every listed market.
pub fn markets() -> &'static [Market] {
    MARKETS
}

/// The market trading `a` against `b`, regardless of which side is the base.
pub fn find_market(a: &str, b: &str) -> Option<&'static Market> {
    MARKETS.iter().find(|m| m.matches(a, b))
}

/// Look a market up by its `"BASE/QUOTE"` name.
pub fn find_pair(pair: &str) -> Option<&'static Market> {
    MARKETS.iter().find(|m| m.pair() == pair)
}

/// Listed markets whose assets exist on the registry's network, with limits
/// set to what the provider's wallet can currently cover: the buy limit is
/// the base asset balance and the sell limit the quote asset balance.
pub fn markets_with_limits<W: WalletService + ?Sized>(
    registry: &AssetRegistry,
    wallet: &W,
) -> Result<Vec<Market>> {
    let balance = wallet.balance()?;
    let mut out = Vec::new();
    for market in MARKETS {
        let (Ok(base), Ok(quote)) = (registry.by_ticker(market.base), registry.by_ticker(market.quote))
        else {
            log::debug!("market {} not listed on {}", market.pair(), registry.network());
            continue;
        };
        out.push(Market {
            buy_limit: balance.get(&base.id).copied().unwrap_or(0),
            sell_limit: balance.get(&quote.id).copied().unwrap_or(0),
            ..market.clone()
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use crate::testing::MockWallet;

    #[test]
    fn lookup_is_symmetric() {
        let direct = find_market("L-BTC", "USDT").unwrap();
        let reversed = find_market("USDT", "L-BTC").unwrap();
        assert_eq!(direct, reversed);
        assert_eq!(direct.pair(), "L-BTC/USDT");
        assert!(find_market("L-BTC", "L-BTC").is_none());
        assert!(find_market("USDT", "FUSD").is_none());
    }

    #[test]
    fn pair_lookup_is_ordered() {
        assert!(find_pair("L-BTC/USDT").is_some());
        assert!(find_pair("USDT/L-BTC").is_none());
    }

    #[test]
    fn fees_combine_fixed_and_percentage() {
        let m = find_market("L-BTC", "USDT").unwrap();
        // 0.1% of 1 BTC plus 1000 sats.
        assert_eq!(m.buy_fee(100_000_000), 1_000 + 100_000);
        // 0.75% of 10 USDT plus 1 USDT.
        assert_eq!(m.sell_fee(1_000_000_000), 100_000_000 + 7_500_000);
        assert_eq!(percentage_fee(99, 10), 0);
        assert_eq!(percentage_fee(u64::MAX, 10_000), u64::MAX);
    }

    #[test]
    fn limits_follow_wallet_balance() {
        let registry = AssetRegistry::for_network(Network::LiquidTestnet);
        let wallet = MockWallet::new();
        let lbtc = registry.by_ticker("L-BTC").unwrap().id;
        wallet.fund(lbtc, 7_000);
        wallet.fund(lbtc, 3_000);

        let listed = markets_with_limits(&registry, &wallet).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].buy_limit, 10_000);
        assert_eq!(listed[0].sell_limit, 0);
    }

    #[test]
    fn markets_without_assets_are_hidden() {
        // Regtest only knows the policy asset.
        let registry = AssetRegistry::for_network(Network::LiquidRegtest);
        let listed = markets_with_limits(&registry, &MockWallet::new()).unwrap();
        assert!(listed.is_empty());
    }
}
