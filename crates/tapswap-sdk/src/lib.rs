pub mod amount;
pub mod asset;
pub mod chain;
pub mod error;
pub mod market;
pub mod network;
pub mod order;
pub mod pset;
pub mod repository;
pub mod script;
pub mod taproot;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trade;
pub mod wallet;
pub mod watcher;

// Core types
pub use asset::{Asset, AssetRegistry};
pub use chain::{ChainBackend, ElectrumBackend, ScriptHistoryEntry};
pub use error::{Error, Result, WatcherError};
pub use market::{Market, find_market, markets};
pub use network::Network;
pub use order::{AssetAmount, Order, OrderFactory, OrderParts, OrderStatus};
pub use pset::Utxo;
pub use repository::{OrderRepository, StatusEntry};

// Covenant scripts and the funding output
pub use script::{WitnessVersion, fulfill_script, refund_script};
pub use taproot::{FundingOutput, LeafProof, nums_internal_key};

// Settlement
pub use trade::{FEE_AMOUNT, Trade, TradeStatus};
pub use wallet::{CoinSelection, LwkWallet, WalletAddress, WalletService, WalletStatus};

// Watcher
pub use watcher::{
    ORDER_EXPIRY, OrderLocks, OrderWatcher, OrderWatcherConfig, OrderWatcherHandle, SweepReport,
    WatchCmd, WatchEvent, spawn_order_watcher,
};

// Re-export LWK for app-layer use
pub use lwk_wollet;
pub use lwk_wollet::elements;
