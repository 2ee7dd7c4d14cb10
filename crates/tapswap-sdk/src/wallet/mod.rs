//! The wallet collaborator: addresses, coin selection, signing and broadcast
//! for the liquidity provider's side of a swap.

mod lwk;

pub use lwk::{LwkWallet, select_coins};

use std::collections::HashMap;

use lwk_wollet::elements::{Address, AssetId, Script, Transaction, Txid};

use crate::error::Result;
use crate::pset::{Utxo, total_value};

/// Readiness of a wallet backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletStatus {
    pub initialized: bool,
    pub unlocked: bool,
    pub synced: bool,
}

impl WalletStatus {
    /// A wallet can sign once it is initialized and unlocked.
    pub fn is_ready(&self) -> bool {
        self.initialized && self.unlocked
    }
}

/// A wallet-controlled address and its script pubkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAddress {
    pub address: Address,
    pub script_pubkey: Script,
}

/// Coins chosen to cover an amount, and what is left over after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    pub utxos: Vec<Utxo>,
    pub change: u64,
}

impl CoinSelection {
    pub fn total(&self) -> u64 {
        total_value(&self.utxos)
    }
}

/// Everything the settlement engine needs from the provider's wallet.
pub trait WalletService {
    fn status(&self) -> Result<WalletStatus>;

    /// A fresh address, distinct from the ones returned before it. `is_change`
    /// draws from the change chain.
    fn get_address(&self, is_change: bool) -> Result<WalletAddress>;

    /// Select coins of `asset` covering at least `amount`.
    fn select_utxos(&self, asset: &AssetId, amount: u64) -> Result<CoinSelection>;

    /// Sign every input the wallet owns in a base64 PSET and return the result, base64 encoded.
    fn sign_partial(&self, pset: &str) -> Result<String>;

    /// Finalize the inputs the wallet signed and extract the transaction.
    /// Inputs that already carry a final witness are left untouched.
    fn finalize(&self, pset: &str) -> Result<Transaction>;

    /// Broadcast a fully signed transaction given as hex.
    fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid>;

    fn balance(&self) -> Result<HashMap<AssetId, u64>>;
}
