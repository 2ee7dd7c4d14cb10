//! In-memory collaborators for exercising the settlement engine without a
//! live wallet, Electrum server or database.
//!
//! Available to unit tests and, behind the `testing` feature, to the
//! integration tests of this crate and its dependents.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use lwk_wollet::elements::bitcoin::PublicKey;
use lwk_wollet::elements::hashes::Hash;
use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{
    Address, AddressParams, AssetId, OutPoint, Script, Transaction, TxOut, Txid, encode,
};

use crate::asset::AssetRegistry;
use crate::chain::{ChainBackend, ScriptHistoryEntry};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::order::{Order, OrderFactory, OrderStatus};
use crate::pset::{Utxo, explicit_txout, total_value};
use crate::repository::{OrderRepository, StatusEntry};
use crate::wallet::{CoinSelection, WalletAddress, WalletService, WalletStatus};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Compressed public key used for the trader and for mock wallet signatures.
pub const TRADER_PUBKEY_HEX: &str =
    "0226b7b1c5d9e6f7a146c5a11a3d0f365be1c5736dcec612e2aceb6d45cd222989";

/// Key-path Taproot script for [`TRADER_PUBKEY_HEX`].
pub const TRADER_SCRIPT_HEX: &str =
    "51205467ca71d4284c12fa73f174675a1ae2eac16d1b36d0bde65ee3526e3c19a982";

/// Placeholder signature the mock wallet leaves on inputs it owns.
pub const MOCK_SIGNATURE: [u8; 9] = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01];

/// A key that is not the mock wallet's (the secp256k1 generator).
pub const COSIGNER_PUBKEY_HEX: &str =
    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

/// Signature left under [`COSIGNER_PUBKEY_HEX`] when a cosigner is attached.
pub const COSIGNER_SIGNATURE: [u8; 9] = [0x30, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x02, 0x01];

pub fn testnet_factory() -> OrderFactory {
    OrderFactory::new(AssetRegistry::for_network(Network::LiquidTestnet))
}

pub fn test_txid(byte: u8) -> Txid {
    Txid::from_byte_array([byte; 32])
}

/// An explicit UTXO at `txid_byte`-filled txid and `vout`, locked to `script`.
pub fn explicit_utxo(txid_byte: u8, vout: u32, asset: AssetId, value: u64, script: &Script) -> Utxo {
    Utxo {
        outpoint: OutPoint::new(test_txid(txid_byte), vout),
        value,
        asset,
        prevout: explicit_txout(asset, value, script),
        confirmed: true,
    }
}

fn pubkey(hex_str: &str) -> PublicKey {
    let bytes = hex::decode(hex_str).expect("static pubkey hex");
    PublicKey::from_slice(&bytes).expect("static pubkey")
}

fn mock_pubkey() -> PublicKey {
    pubkey(TRADER_PUBKEY_HEX)
}

// ---------------------------------------------------------------------------
// MockWallet
// ---------------------------------------------------------------------------

/// A provider wallet holding explicit P2WPKH coins in memory.
///
/// `sign_partial` attaches a placeholder signature to each input it owns.
/// `finalize` builds `[signature, pubkey]` witnesses from the signature under
/// its own key only, and refuses a PSET with other inputs still open.
/// `broadcast` records the transaction and drops the coins it spent.
pub struct MockWallet {
    status: Mutex<WalletStatus>,
    coins: Mutex<Vec<Utxo>>,
    broadcasts: Mutex<Vec<Transaction>>,
    next_index: AtomicUsize,
    next_txid: AtomicUsize,
    fail_broadcast: AtomicBool,
    cosigner: AtomicBool,
    signed: AtomicUsize,
    finalized: AtomicUsize,
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWallet {
    pub fn new() -> Self {
        Self::with_status(WalletStatus {
            initialized: true,
            unlocked: true,
            synced: true,
        })
    }

    pub fn with_status(status: WalletStatus) -> Self {
        Self {
            status: Mutex::new(status),
            coins: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            next_index: AtomicUsize::new(0),
            next_txid: AtomicUsize::new(0xa0),
            fail_broadcast: AtomicBool::new(false),
            cosigner: AtomicBool::new(false),
            signed: AtomicUsize::new(0),
            finalized: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: WalletStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Wallet script for address `index`.
    pub fn script_for(index: usize) -> Script {
        let mut bytes = vec![0x00, 0x14];
        bytes.extend_from_slice(&[0x77; 19]);
        bytes.push(index as u8);
        Script::from(bytes)
    }

    /// Add a coin of `value` units of `asset` to the wallet.
    pub fn fund(&self, asset: AssetId, value: u64) -> Utxo {
        let byte = self.next_txid.fetch_add(1, Ordering::SeqCst) as u8;
        let utxo = explicit_utxo(byte, 0, asset, value, &Self::script_for(0));
        self.coins.lock().unwrap().push(utxo.clone());
        utxo
    }

    pub fn fail_broadcasts(&self, fail: bool) {
        self.fail_broadcast.store(fail, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }

    /// Also leave a foreign signature on every owned input when signing.
    pub fn attach_cosigner(&self, attach: bool) {
        self.cosigner.store(attach, Ordering::SeqCst);
    }

    /// Number of successful `finalize` calls so far.
    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Number of `sign_partial` calls so far.
    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }

    pub fn coins(&self) -> Vec<Utxo> {
        self.coins.lock().unwrap().clone()
    }

    fn owns(&self, txout: &TxOut) -> bool {
        let spk = txout.script_pubkey.as_bytes();
        spk.len() == 22 && spk[..21] == Self::script_for(0).as_bytes()[..21]
    }
}

impl WalletService for MockWallet {
    fn status(&self) -> Result<WalletStatus> {
        Ok(*self.status.lock().unwrap())
    }

    fn get_address(&self, _is_change: bool) -> Result<WalletAddress> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let script_pubkey = Self::script_for(index);
        let address = Address::from_script(&script_pubkey, None, &AddressParams::LIQUID_TESTNET)
            .ok_or_else(|| Error::Wallet("mock script has no address".into()))?;
        Ok(WalletAddress {
            address,
            script_pubkey,
        })
    }

    fn select_utxos(&self, asset: &AssetId, amount: u64) -> Result<CoinSelection> {
        let mut matching: Vec<Utxo> = self
            .coins
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.asset == *asset)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.value.cmp(&a.value));

        let mut utxos = Vec::new();
        for utxo in matching {
            if total_value(&utxos) >= amount {
                break;
            }
            utxos.push(utxo);
        }
        let total = total_value(&utxos);
        if total < amount {
            return Err(Error::UtxoSelection(format!(
                "have {total} of {asset}, need {amount}"
            )));
        }
        Ok(CoinSelection {
            utxos,
            change: total - amount,
        })
    }

    fn sign_partial(&self, pset: &str) -> Result<String> {
        let mut pset: PartiallySignedTransaction = pset
            .parse()
            .map_err(|e| Error::Signing(format!("invalid PSET: {e}")))?;
        let cosigner = self.cosigner.load(Ordering::SeqCst);
        for input in pset.inputs_mut() {
            let owned = input.witness_utxo.as_ref().is_some_and(|txout| self.owns(txout));
            if owned {
                input.partial_sigs.insert(mock_pubkey(), MOCK_SIGNATURE.to_vec());
                if cosigner {
                    input
                        .partial_sigs
                        .insert(pubkey(COSIGNER_PUBKEY_HEX), COSIGNER_SIGNATURE.to_vec());
                }
            }
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(pset.to_string())
    }

    fn finalize(&self, pset: &str) -> Result<Transaction> {
        let mut pset: PartiallySignedTransaction = pset
            .parse()
            .map_err(|e| Error::Finalize(format!("invalid PSET: {e}")))?;
        let own_key = mock_pubkey();
        for (index, input) in pset.inputs_mut().iter_mut().enumerate() {
            if input.final_script_witness.is_some() {
                continue;
            }
            let owned = input.witness_utxo.as_ref().is_some_and(|txout| self.owns(txout));
            let sig = input
                .partial_sigs
                .get(&own_key)
                .filter(|_| owned)
                .cloned()
                .ok_or_else(|| Error::Finalize(format!("input {index} cannot be finalized")))?;
            input.final_script_witness = Some(vec![sig, own_key.to_bytes()]);
            input.partial_sigs.clear();
        }
        let tx = pset
            .extract_tx()
            .map_err(|e| Error::Finalize(format!("extract: {e}")))?;
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(tx)
    }

    fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(Error::Broadcast("mock broadcast rejected".into()));
        }
        let bytes = hex::decode(raw_tx_hex).map_err(|e| Error::Broadcast(e.to_string()))?;
        let tx: Transaction =
            encode::deserialize(&bytes).map_err(|e| Error::Broadcast(e.to_string()))?;

        let spent: Vec<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
        self.coins
            .lock()
            .unwrap()
            .retain(|u| !spent.contains(&u.outpoint));
        let txid = tx.txid();
        self.broadcasts.lock().unwrap().push(tx);
        Ok(txid)
    }

    fn balance(&self) -> Result<HashMap<AssetId, u64>> {
        let mut balance = HashMap::new();
        for utxo in self.coins.lock().unwrap().iter() {
            *balance.entry(utxo.asset).or_insert(0) += utxo.value;
        }
        Ok(balance)
    }
}

// ---------------------------------------------------------------------------
// MockChain
// ---------------------------------------------------------------------------

/// Chain view keyed by script pubkey.
#[derive(Default)]
pub struct MockChain {
    utxos: Mutex<HashMap<Script, Vec<Utxo>>>,
    broadcasts: Mutex<Vec<Transaction>>,
    fail_queries: AtomicBool,
    fetches: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, address: &Address, utxo: Utxo) {
        self.utxos
            .lock()
            .unwrap()
            .entry(address.script_pubkey())
            .or_default()
            .push(utxo);
    }

    /// Deposit `value` of `asset` to `address` in a fresh outpoint.
    pub fn deposit_value(&self, address: &Address, txid_byte: u8, asset: AssetId, value: u64) -> Utxo {
        let utxo = explicit_utxo(txid_byte, 0, asset, value, &address.script_pubkey());
        self.deposit(address, utxo.clone());
        utxo
    }

    /// Forget every UTXO locked to `address`, as if they were spent.
    pub fn clear(&self, address: &Address) {
        self.utxos.lock().unwrap().remove(&address.script_pubkey());
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of `fetch_utxos` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Query("mock chain unavailable".into()));
        }
        Ok(())
    }
}

impl ChainBackend for MockChain {
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(&address.script_pubkey())
            .cloned()
            .unwrap_or_default())
    }

    fn fetch_prevout(&self, txid: &Txid, vout: u32) -> Result<TxOut> {
        self.check()?;
        let wanted = OutPoint::new(*txid, vout);
        self.utxos
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|u| u.outpoint == wanted)
            .map(|u| u.prevout.clone())
            .ok_or_else(|| Error::Query(format!("unknown outpoint {wanted}")))
    }

    fn fetch_transaction_history(&self, address: &Address) -> Result<Vec<ScriptHistoryEntry>> {
        self.check()?;
        Ok(self
            .utxos
            .lock()
            .unwrap()
            .get(&address.script_pubkey())
            .map(|utxos| {
                utxos
                    .iter()
                    .map(|u| ScriptHistoryEntry {
                        txid: u.outpoint.txid,
                        height: if u.confirmed { 1 } else { 0 },
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.check()?;
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.txid() == *txid)
            .cloned()
            .ok_or_else(|| Error::Query(format!("unknown transaction {txid}")))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        self.check()?;
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(tx.txid())
    }
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Order repository backed by a vector, oldest order first.
#[derive(Default)]
pub struct MemoryRepository {
    orders: Vec<(Order, Vec<StatusEntry>)>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest_status(&self, id: &str) -> Option<OrderStatus> {
        self.find(id)
            .and_then(|(_, history)| history.last())
            .map(|entry| entry.status)
    }

    fn find(&self, id: &str) -> Option<&(Order, Vec<StatusEntry>)> {
        self.orders.iter().find(|(order, _)| order.id() == id)
    }
}

impl OrderRepository for MemoryRepository {
    fn save(&mut self, order: &Order) -> Result<()> {
        if self.find(order.id()).is_some() {
            return Err(Error::Repository(format!(
                "order {} already exists",
                order.id()
            )));
        }
        let pending = StatusEntry {
            status: OrderStatus::Pending,
            timestamp: order.created_at(),
            txid: None,
        };
        self.orders.push((order.clone(), vec![pending]));
        Ok(())
    }

    fn get_by_id(&mut self, id: &str) -> Result<Option<(Order, OrderStatus)>> {
        Ok(self.find(id).and_then(|(order, history)| {
            history.last().map(|entry| (order.clone(), entry.status))
        }))
    }

    fn list_pending(&mut self) -> Result<Vec<(Order, OrderStatus)>> {
        Ok(self
            .orders
            .iter()
            .filter_map(|(order, history)| {
                let status = history.last()?.status;
                status.is_open().then(|| (order.clone(), status))
            })
            .collect())
    }

    fn append_status(
        &mut self,
        id: &str,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
        txid: Option<Txid>,
    ) -> Result<()> {
        let (_, history) = self
            .orders
            .iter_mut()
            .find(|(order, _)| order.id() == id)
            .ok_or_else(|| Error::Repository(format!("unknown order {id}")))?;
        history.push(StatusEntry {
            status,
            timestamp,
            txid,
        });
        Ok(())
    }

    fn status_history(&mut self, id: &str) -> Result<Vec<StatusEntry>> {
        Ok(self
            .find(id)
            .map(|(_, history)| history.clone())
            .unwrap_or_default())
    }
}
