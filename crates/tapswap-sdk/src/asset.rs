//! Static asset tables and the byte encodings used for assets in scripts.

use lwk_wollet::elements::AssetId;
use lwk_wollet::elements::hashes::Hash;

use crate::amount::{format_decimal, parse_decimal};
use crate::error::{Error, Result};
use crate::network::Network;

/// Explicit-asset commitment prefix.
pub const EXPLICIT_ASSET_PREFIX: u8 = 0x01;

struct AssetEntry {
    ticker: &'static str,
    name: &'static str,
    id: &'static str,
    precision: u8,
}

const LIQUID_ASSETS: &[AssetEntry] = &[
    AssetEntry {
        ticker: "L-BTC",
        name: "Liquid Bitcoin",
        id: "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d",
        precision: 8,
    },
    AssetEntry {
        ticker: "USDT",
        name: "Tether USD",
        id: "ce091c998b83c78bb71a632313ba3760f1763d9cfcffae02258ffa9865a37bd2",
        precision: 8,
    },
];

const TESTNET_ASSETS: &[AssetEntry] = &[
    AssetEntry {
        ticker: "L-BTC",
        name: "Liquid Bitcoin",
        id: "144c654344aa716d6f3abcc1ca90e5641e4e2a7f633bc09fe3baf64585819a49",
        precision: 8,
    },
    AssetEntry {
        ticker: "USDT",
        name: "Tether USD",
        id: "f3d1ec678811398cd2ae277cbe3849c6f6dbd72c74bc542f7c4b11ff0e820958",
        precision: 8,
    },
];

const REGTEST_ASSETS: &[AssetEntry] = &[AssetEntry {
    ticker: "L-BTC",
    name: "Liquid Bitcoin",
    id: "5ac9f65c0efcc4775e0baec4ec03abdde22473cd3cf33c0419ca290e0751b225",
    precision: 8,
}];

/// A tradable asset. `id` is held in the usual `AssetId` form; its `Display`
/// is the hex shown by explorers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub ticker: String,
    pub name: String,
    pub id: AssetId,
    pub precision: u8,
}

impl Asset {
    pub fn new(ticker: &str, name: &str, id: AssetId, precision: u8) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            id,
            precision,
        }
    }

    /// The 32 id bytes in display (explorer) order.
    pub fn display_bytes(&self) -> [u8; 32] {
        display_bytes(&self.id)
    }

    /// The 33 bytes pushed by covenant scripts to compare against an output asset.
    pub fn script_push_bytes(&self) -> [u8; 33] {
        asset_push_bytes(&self.id)
    }

    /// Convert a decimal string in this asset's units to base units.
    pub fn to_base_units(&self, value: &str) -> Result<u64> {
        parse_decimal(value, self.precision)
    }

    pub fn format_amount(&self, amount: u64) -> String {
        format_decimal(amount, self.precision)
    }
}

/// The asset id in display order (the byte reversal of the internal hash).
pub fn display_bytes(asset: &AssetId) -> [u8; 32] {
    let mut bytes = asset.into_inner().to_byte_array();
    bytes.reverse();
    bytes
}

/// Script-push encoding of an explicit asset: `reverse(0x01 || internal)`.
///
/// That is the display-order id followed by the explicit prefix.
pub fn asset_push_bytes(asset: &AssetId) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[..32].copy_from_slice(&display_bytes(asset));
    out[32] = EXPLICIT_ASSET_PREFIX;
    out
}

/// Ticker-indexed asset table for one network.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    network: Network,
    assets: Vec<Asset>,
}

impl AssetRegistry {
    pub fn for_network(network: Network) -> Self {
        let table = match network {
            Network::Liquid => LIQUID_ASSETS,
            Network::LiquidTestnet => TESTNET_ASSETS,
            Network::LiquidRegtest => REGTEST_ASSETS,
        };
        let assets = table
            .iter()
            .map(|e| {
                let id = e
                    .id
                    .parse::<AssetId>()
                    .expect("static asset table holds valid asset ids");
                Asset::new(e.ticker, e.name, id, e.precision)
            })
            .collect();
        Self { network, assets }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Add or replace an asset. Tickers are unique within a registry.
    pub fn register(&mut self, asset: Asset) {
        self.assets.retain(|a| a.ticker != asset.ticker);
        self.assets.push(asset);
    }

    pub fn by_ticker(&self, ticker: &str) -> Result<&Asset> {
        self.assets
            .iter()
            .find(|a| a.ticker == ticker)
            .ok_or_else(|| Error::UnknownAsset(ticker.to_string()))
    }

    pub fn by_id(&self, id: &AssetId) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == *id)
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }
}
