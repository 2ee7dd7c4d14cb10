use lwk_wollet::elements::{Address, OutPoint, Script, Transaction, TxOut, Txid};

use crate::error::{Error, Result};
use crate::pset::Utxo;

/// A single entry returned by `fetch_transaction_history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHistoryEntry {
    pub txid: Txid,
    /// Block height. -1 or 0 means unconfirmed (mempool), >0 means confirmed.
    pub height: i32,
}

impl ScriptHistoryEntry {
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }
}

/// Read access to the Liquid chain, plus broadcast.
pub trait ChainBackend {
    /// Explicit unspent outputs locked to `address` (confirmed and mempool).
    ///
    /// Confidential outputs are left out: covenant clauses compare explicit
    /// amounts and assets, so a blinded deposit can never settle.
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>>;

    /// The output at `txid:vout`.
    fn fetch_prevout(&self, txid: &Txid, vout: u32) -> Result<TxOut>;

    /// Get the full transaction history for an address (confirmed + unconfirmed).
    fn fetch_transaction_history(&self, address: &Address) -> Result<Vec<ScriptHistoryEntry>>;

    /// Fetch a transaction by its txid.
    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction>;

    /// Broadcast a signed transaction and return its txid.
    fn broadcast(&self, tx: &Transaction) -> Result<Txid>;
}

/// Electrum script hash: SHA256(scriptPubKey) with reversed byte order, hex encoded.
pub fn electrum_script_hash(script_pubkey: &Script) -> String {
    use sha2::{Digest, Sha256};

    let mut hash = Sha256::digest(script_pubkey.as_bytes()).to_vec();
    hash.reverse();
    hex::encode(&hash)
}

/// Electrum-based chain backend for Liquid.
pub struct ElectrumBackend {
    electrum_url: String,
}

impl ElectrumBackend {
    pub fn new(electrum_url: &str) -> Self {
        Self {
            electrum_url: electrum_url.to_string(),
        }
    }

    pub fn electrum_url(&self) -> &str {
        &self.electrum_url
    }

    fn scripthash_call(&self, method: &str, script_pubkey: &Script) -> Result<Vec<serde_json::Value>> {
        use electrum_client::ElectrumApi;

        let client = electrum_client::Client::new(&self.electrum_url)
            .map_err(|e| Error::Electrum(e.to_string()))?;

        let resp = client
            .raw_call(
                method,
                [electrum_client::Param::String(electrum_script_hash(
                    script_pubkey,
                ))],
            )
            .map_err(|e| Error::Electrum(e.to_string()))?;

        match resp {
            serde_json::Value::Array(entries) => Ok(entries),
            _ => Err(Error::Query(format!("{method}: expected array response"))),
        }
    }

    fn lwk_client(&self) -> Result<lwk_wollet::ElectrumClient> {
        let url: lwk_wollet::ElectrumUrl = self
            .electrum_url
            .parse()
            .map_err(|e| Error::Electrum(format!("{:?}", e)))?;
        lwk_wollet::ElectrumClient::new(&url).map_err(|e| Error::Electrum(e.to_string()))
    }
}

fn parse_txid(entry: &serde_json::Value) -> Result<Txid> {
    let tx_hash_hex = entry["tx_hash"]
        .as_str()
        .ok_or_else(|| Error::Query("missing tx_hash".into()))?;
    tx_hash_hex
        .parse()
        .map_err(|e| Error::Query(format!("bad tx_hash: {e}")))
}

impl ChainBackend for ElectrumBackend {
    fn fetch_utxos(&self, address: &Address) -> Result<Vec<Utxo>> {
        let entries =
            self.scripthash_call("blockchain.scripthash.listunspent", &address.script_pubkey())?;

        let mut results = Vec::new();
        for entry in &entries {
            let txid = parse_txid(entry)?;
            let tx_pos = entry["tx_pos"]
                .as_u64()
                .ok_or_else(|| Error::Query("missing tx_pos".into()))? as u32;
            let height = entry["height"].as_i64().unwrap_or(0);

            let txout = self.fetch_prevout(&txid, tx_pos)?;
            match Utxo::from_explicit(OutPoint::new(txid, tx_pos), txout, height > 0) {
                Some(utxo) => results.push(utxo),
                None => log::debug!("skipping confidential output {txid}:{tx_pos} at {address}"),
            }
        }
        Ok(results)
    }

    fn fetch_prevout(&self, txid: &Txid, vout: u32) -> Result<TxOut> {
        let tx = self.fetch_transaction(txid)?;
        tx.output
            .get(vout as usize)
            .cloned()
            .ok_or_else(|| Error::Query(format!("{txid}:{vout} out of range")))
    }

    fn fetch_transaction_history(&self, address: &Address) -> Result<Vec<ScriptHistoryEntry>> {
        let entries =
            self.scripthash_call("blockchain.scripthash.get_history", &address.script_pubkey())?;

        let mut results = Vec::new();
        for entry in &entries {
            let txid = parse_txid(entry)?;
            let height = entry["height"]
                .as_i64()
                .ok_or_else(|| Error::Query("missing height".into()))?
                as i32;
            results.push(ScriptHistoryEntry { txid, height });
        }
        Ok(results)
    }

    fn fetch_transaction(&self, txid: &Txid) -> Result<Transaction> {
        use lwk_wollet::blocking::BlockchainBackend;

        let client = self.lwk_client()?;
        let txs = client
            .get_transactions(&[*txid])
            .map_err(|e| Error::Electrum(e.to_string()))?;
        txs.into_iter()
            .next()
            .ok_or_else(|| Error::Query(format!("transaction {} not found", txid)))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        use lwk_wollet::blocking::BlockchainBackend;

        let client = self.lwk_client()?;
        client
            .broadcast(tx)
            .map_err(|e| Error::Broadcast(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_hash_is_reversed_sha256() {
        // sha256(0x51) = 4ae81572...8cc33260
        assert_eq!(
            electrum_script_hash(&Script::from(vec![0x51])),
            "6032c38c0bc0e91e726f1e55e1832e434509001a7aed5cfd881b6ef07215e84a"
        );
        let trader = Script::from(
            hex::decode("51205467ca71d4284c12fa73f174675a1ae2eac16d1b36d0bde65ee3526e3c19a982")
                .unwrap(),
        );
        assert_eq!(
            electrum_script_hash(&trader),
            "3904e060e34256313f84dbb9909dc22265a3c39e3a5c4f0a2e73813080eea8a6"
        );
    }

    #[test]
    fn history_confirmation() {
        let entry = ScriptHistoryEntry {
            txid: "0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap(),
            height: 0,
        };
        assert!(!entry.is_confirmed());
        assert!(ScriptHistoryEntry { height: 10, ..entry }.is_confirmed());
    }

    #[test]
    fn backend_keeps_url() {
        let backend = ElectrumBackend::new("tcp://localhost:50001");
        assert_eq!(backend.electrum_url(), "tcp://localhost:50001");
    }
}
