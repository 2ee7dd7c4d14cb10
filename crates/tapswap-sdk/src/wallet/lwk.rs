use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use lwk_common::Signer;
use lwk_signer::SwSigner;
use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{AssetId, Transaction, Txid, encode};
use lwk_wollet::{ElectrumClient, ElectrumUrl, WalletTxOut, Wollet, WolletDescriptor};

use super::{CoinSelection, WalletAddress, WalletService, WalletStatus};
use crate::chain::{ChainBackend, ElectrumBackend};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::pset::Utxo;

/// Software wallet backed by an LWK watch-only wollet and an in-memory signer.
///
/// Only explicit (unblinded on-chain) coins can be spent: settlement
/// transactions carry explicit outputs and are never blinded.
pub struct LwkWallet {
    signer: SwSigner,
    wollet: Mutex<Wollet>,
    network: Network,
    chain: ElectrumBackend,
    synced: AtomicBool,
    next_receive: AtomicU32,
    next_change: AtomicU32,
}

impl LwkWallet {
    pub fn new(
        mnemonic: &str,
        network: Network,
        electrum_url: &str,
        datadir: &Path,
    ) -> Result<Self> {
        let signer = SwSigner::new(mnemonic, network.is_mainnet())
            .map_err(|e| Error::Wallet(e.to_string()))?;

        let slip77_key = signer
            .slip77_master_blinding_key()
            .map_err(|e| Error::Wallet(e.to_string()))?;
        let xpub = signer.xpub();
        // Multipath so change lands on the internal chain.
        let descriptor_str = format!("ct(slip77({}),elwpkh({}/<0;1>/*))", slip77_key, xpub);
        let descriptor: WolletDescriptor = descriptor_str
            .parse()
            .map_err(|e: lwk_wollet::Error| Error::Wallet(format!("descriptor: {e}")))?;

        let persist_dir = datadir.join(network.as_str()).join("wallet_db");
        let wollet = Wollet::with_fs_persist(network.into_lwk(), descriptor, &persist_dir)
            .map_err(|e| Error::Wallet(e.to_string()))?;

        Ok(Self {
            signer,
            wollet: Mutex::new(wollet),
            network,
            chain: ElectrumBackend::new(electrum_url),
            synced: AtomicBool::new(false),
            next_receive: AtomicU32::new(0),
            next_change: AtomicU32::new(0),
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn lock(&self) -> Result<MutexGuard<'_, Wollet>> {
        self.wollet
            .lock()
            .map_err(|_| Error::Wallet("wallet mutex poisoned".into()))
    }

    /// Full scan of the wallet descriptor against the Electrum server.
    pub fn sync(&self) -> Result<()> {
        let url: ElectrumUrl = self
            .chain
            .electrum_url()
            .parse()
            .map_err(|e| Error::Electrum(format!("{:?}", e)))?;
        let mut client = ElectrumClient::new(&url).map_err(|e| Error::Electrum(e.to_string()))?;
        let mut wollet = self.lock()?;
        lwk_wollet::full_scan_with_electrum_client(&mut wollet, &mut client)
            .map_err(|e| Error::Electrum(e.to_string()))?;
        self.synced.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn utxos(&self) -> Result<Vec<WalletTxOut>> {
        self.lock()?
            .utxos()
            .map_err(|e| Error::Query(e.to_string()))
    }
}

/// Hand out the next index on a chain: never below the wollet's last unused
/// index, and never one already handed out since startup. Callers hold the
/// wollet lock.
fn reserve_index(counter: &AtomicU32, last_unused: u32) -> u32 {
    let index = counter.load(Ordering::SeqCst).max(last_unused);
    counter.store(index.saturating_add(1), Ordering::SeqCst);
    index
}

/// Largest-first selection over unspent wallet outputs of `asset`.
///
/// Returns the chosen outputs; fails if their total cannot reach `amount`.
pub fn select_coins(
    candidates: &[WalletTxOut],
    asset: &AssetId,
    amount: u64,
) -> Result<Vec<WalletTxOut>> {
    let mut matching: Vec<&WalletTxOut> = candidates
        .iter()
        .filter(|u| !u.is_spent && u.unblinded.asset == *asset)
        .collect();
    matching.sort_by(|a, b| b.unblinded.value.cmp(&a.unblinded.value));

    let mut selected = Vec::new();
    let mut total = 0u64;
    for utxo in matching {
        if total >= amount {
            break;
        }
        total = total.saturating_add(utxo.unblinded.value);
        selected.push(utxo.clone());
    }
    if total < amount || selected.is_empty() {
        return Err(Error::UtxoSelection(format!(
            "need {amount} of asset {asset}, wallet holds {total}"
        )));
    }
    Ok(selected)
}

impl WalletService for LwkWallet {
    fn status(&self) -> Result<WalletStatus> {
        Ok(WalletStatus {
            initialized: true,
            unlocked: true,
            synced: self.synced.load(Ordering::SeqCst),
        })
    }

    fn get_address(&self, is_change: bool) -> Result<WalletAddress> {
        let wollet = self.lock()?;
        // The last unused index only moves once a transaction pays it, so a
        // settlement asking for several addresses steps past it locally.
        let result = if is_change {
            let unused = wollet.change(None).map_err(|e| Error::Query(e.to_string()))?;
            wollet.change(Some(reserve_index(&self.next_change, unused.index())))
        } else {
            let unused = wollet.address(None).map_err(|e| Error::Query(e.to_string()))?;
            wollet.address(Some(reserve_index(&self.next_receive, unused.index())))
        }
        .map_err(|e| Error::Query(e.to_string()))?;
        // Settlement outputs are explicit, so hand out the unconfidential form.
        let address = result.address().to_unconfidential();
        log::debug!(
            "wallet: {} address {} at index {}",
            if is_change { "change" } else { "receive" },
            address,
            result.index()
        );
        Ok(WalletAddress {
            script_pubkey: address.script_pubkey(),
            address,
        })
    }

    fn select_utxos(&self, asset: &AssetId, amount: u64) -> Result<CoinSelection> {
        let explicit: Vec<WalletTxOut> = {
            let mut out = Vec::new();
            for utxo in self.utxos()? {
                if utxo.is_spent || utxo.unblinded.asset != *asset {
                    continue;
                }
                let txout = self
                    .chain
                    .fetch_prevout(&utxo.outpoint.txid, utxo.outpoint.vout)?;
                if txout.asset.is_explicit() && txout.value.is_explicit() {
                    out.push(utxo);
                } else {
                    log::debug!("wallet: skipping blinded coin {}", utxo.outpoint);
                }
            }
            out
        };

        let chosen = select_coins(&explicit, asset, amount)?;
        let mut utxos = Vec::with_capacity(chosen.len());
        for coin in &chosen {
            let txout = self
                .chain
                .fetch_prevout(&coin.outpoint.txid, coin.outpoint.vout)?;
            let utxo = Utxo::from_explicit(coin.outpoint, txout, coin.height.is_some())
                .ok_or_else(|| Error::UtxoSelection(format!("{} is blinded", coin.outpoint)))?;
            utxos.push(utxo);
        }
        let total: u64 = chosen.iter().map(|c| c.unblinded.value).sum();
        Ok(CoinSelection {
            utxos,
            change: total - amount,
        })
    }

    fn sign_partial(&self, pset: &str) -> Result<String> {
        let mut pset: PartiallySignedTransaction = pset
            .parse()
            .map_err(|e| Error::Signing(format!("invalid PSET: {e}")))?;
        self.lock()?
            .add_details(&mut pset)
            .map_err(|e| Error::Signing(format!("add_details: {}", e)))?;
        let signed = self
            .signer
            .sign(&mut pset)
            .map_err(|e| Error::Signing(format!("{:?}", e)))?;
        log::debug!("wallet: signed {signed} input(s)");
        Ok(pset.to_string())
    }

    fn finalize(&self, pset: &str) -> Result<Transaction> {
        let mut pset: PartiallySignedTransaction = pset
            .parse()
            .map_err(|e| Error::Finalize(format!("invalid PSET: {e}")))?;
        self.lock()?
            .finalize(&mut pset)
            .map_err(|e| Error::Finalize(e.to_string()))
    }

    fn broadcast(&self, raw_tx_hex: &str) -> Result<Txid> {
        let bytes =
            hex::decode(raw_tx_hex).map_err(|e| Error::Broadcast(format!("invalid hex: {e}")))?;
        let tx: Transaction = encode::deserialize(&bytes)
            .map_err(|e| Error::Broadcast(format!("invalid transaction: {e}")))?;
        let txid = self.chain.broadcast(&tx)?;
        // Re-sync so the spent coins drop out of the next selection.
        if let Err(e) = self.sync() {
            log::warn!("wallet: sync after broadcast of {txid} failed: {e}");
        }
        Ok(txid)
    }

    fn balance(&self) -> Result<HashMap<AssetId, u64>> {
        let balance = self
            .lock()?
            .balance()
            .map_err(|e| Error::Query(e.to_string()))?;
        Ok(balance.iter().map(|(k, v)| (*k, *v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwk_wollet::elements::confidential::{AssetBlindingFactor, ValueBlindingFactor};
    use lwk_wollet::elements::hashes::Hash;
    use lwk_wollet::elements::{AddressParams, OutPoint, Script, TxOutSecrets};
    use lwk_wollet::Chain;

    fn make_utxo(value: u64, asset: AssetId, vout: u32, spent: bool) -> WalletTxOut {
        let addr = lwk_wollet::elements::Address::p2sh(
            &Script::new(),
            None,
            &AddressParams::LIQUID_TESTNET,
        );
        WalletTxOut {
            outpoint: OutPoint::new(Txid::all_zeros(), vout),
            script_pubkey: Script::new(),
            height: Some(100),
            unblinded: TxOutSecrets {
                asset,
                asset_bf: AssetBlindingFactor::zero(),
                value,
                value_bf: ValueBlindingFactor::zero(),
            },
            wildcard_index: 0,
            ext_int: Chain::External,
            is_spent: spent,
            address: addr,
        }
    }

    fn policy_asset() -> AssetId {
        "0000000000000000000000000000000000000000000000000000000000000001"
            .parse()
            .unwrap()
    }

    fn other_asset() -> AssetId {
        "0000000000000000000000000000000000000000000000000000000000000002"
            .parse()
            .unwrap()
    }

    #[test]
    fn selects_largest_first_until_covered() {
        let pa = policy_asset();
        let utxos = vec![
            make_utxo(300, pa, 0, false),
            make_utxo(1000, pa, 1, false),
            make_utxo(700, pa, 2, false),
        ];
        let chosen = select_coins(&utxos, &pa, 1500).unwrap();
        let vouts: Vec<u32> = chosen.iter().map(|u| u.outpoint.vout).collect();
        assert_eq!(vouts, vec![1, 2]);
    }

    #[test]
    fn single_coin_when_enough() {
        let pa = policy_asset();
        let utxos = vec![make_utxo(500, pa, 0, false), make_utxo(900, pa, 1, false)];
        let chosen = select_coins(&utxos, &pa, 500).unwrap();
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].unblinded.value, 900);
    }

    #[test]
    fn ignores_spent_and_other_assets() {
        let pa = policy_asset();
        let utxos = vec![
            make_utxo(5000, pa, 0, true),
            make_utxo(5000, other_asset(), 1, false),
            make_utxo(100, pa, 2, false),
        ];
        assert!(matches!(
            select_coins(&utxos, &pa, 500),
            Err(Error::UtxoSelection(_))
        ));
        let chosen = select_coins(&utxos, &pa, 100).unwrap();
        assert_eq!(chosen[0].outpoint.vout, 2);
    }

    #[test]
    fn empty_wallet_fails() {
        assert!(select_coins(&[], &policy_asset(), 1).is_err());
    }

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn offline_wallet(dir: &Path) -> LwkWallet {
        LwkWallet::new(MNEMONIC, Network::LiquidTestnet, "tcp://127.0.0.1:1", dir).unwrap()
    }

    #[test]
    fn settlement_addresses_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = offline_wallet(dir.path());

        let receive = wallet.get_address(false).unwrap();
        let settlement_change = wallet.get_address(true).unwrap();
        let fee_change = wallet.get_address(true).unwrap();

        assert_ne!(receive.script_pubkey, settlement_change.script_pubkey);
        assert_ne!(receive.script_pubkey, fee_change.script_pubkey);
        assert_ne!(settlement_change.script_pubkey, fee_change.script_pubkey);
        assert!(receive.address.blinding_pubkey.is_none());
    }

    #[test]
    fn change_comes_from_the_internal_chain() {
        let dir = tempfile::tempdir().unwrap();
        let wallet = offline_wallet(dir.path());

        let first = wallet.get_address(true).unwrap();
        let second = wallet.get_address(true).unwrap();
        let receive = wallet.get_address(false).unwrap();

        let wollet = wallet.lock().unwrap();
        let internal = |i| wollet.change(Some(i)).unwrap().address().to_unconfidential();
        let external = |i| wollet.address(Some(i)).unwrap().address().to_unconfidential();
        assert_eq!(first.address, internal(0));
        assert_eq!(second.address, internal(1));
        assert_eq!(receive.address, external(0));
        assert_ne!(internal(0), external(0));
    }

    #[test]
    fn reserved_indices_never_repeat() {
        let counter = AtomicU32::new(0);
        assert_eq!(reserve_index(&counter, 0), 0);
        assert_eq!(reserve_index(&counter, 0), 1);
        // A sync that moves the last unused index forward wins.
        assert_eq!(reserve_index(&counter, 5), 5);
        assert_eq!(reserve_index(&counter, 3), 6);
    }
}
