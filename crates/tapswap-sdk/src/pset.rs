use lwk_wollet::elements::confidential::{Asset, Nonce, Value as ConfValue};
use lwk_wollet::elements::pset::{PartiallySignedTransaction, PsbtSighashType};
use lwk_wollet::elements::{AssetId, OutPoint, Script, Sequence, TxOut, TxOutWitness};

/// Taproot default sighash, used for covenant inputs.
pub const SIGHASH_DEFAULT: u32 = 0x00;
/// Sighash for wallet-owned inputs.
pub const SIGHASH_ALL: u32 = 0x01;

/// An unspent output with an explicit asset and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: u64,
    pub asset: AssetId,
    /// The output being spent, attached to PSET inputs as the witness UTXO.
    pub prevout: TxOut,
    pub confirmed: bool,
}

impl Utxo {
    /// Wrap an explicit output. Returns `None` for confidential outputs.
    pub fn from_explicit(outpoint: OutPoint, prevout: TxOut, confirmed: bool) -> Option<Self> {
        let asset = prevout.asset.explicit()?;
        let value = prevout.value.explicit()?;
        Some(Self {
            outpoint,
            value,
            asset,
            prevout,
            confirmed,
        })
    }
}

/// Sum of the values of `utxos`.
pub fn total_value(utxos: &[Utxo]) -> u64 {
    utxos.iter().fold(0u64, |acc, u| acc.saturating_add(u.value))
}

/// Create a new empty PSET v2.
pub(crate) fn new_pset() -> PartiallySignedTransaction {
    PartiallySignedTransaction::new_v2()
}

/// Build an explicit (non-confidential) TxOut.
pub fn explicit_txout(asset: AssetId, amount: u64, script_pubkey: &Script) -> TxOut {
    TxOut {
        asset: Asset::Explicit(asset),
        value: ConfValue::Explicit(amount),
        nonce: Nonce::Null,
        script_pubkey: script_pubkey.clone(),
        witness: TxOutWitness::default(),
    }
}

/// Build a fee TxOut.
pub(crate) fn fee_txout(asset: AssetId, amount: u64) -> TxOut {
    explicit_txout(asset, amount, &Script::new())
}

/// Add an input spending `utxo` to a PSET, with the witness UTXO attached.
pub(crate) fn add_pset_input(pset: &mut PartiallySignedTransaction, utxo: &Utxo, sighash: u32) {
    let input = lwk_wollet::elements::pset::Input {
        previous_txid: utxo.outpoint.txid,
        previous_output_index: utxo.outpoint.vout,
        witness_utxo: Some(utxo.prevout.clone()),
        sequence: Some(Sequence::ENABLE_LOCKTIME_NO_RBF),
        sighash_type: Some(PsbtSighashType::from_u32(sighash)),
        ..Default::default()
    };
    pset.add_input(input);
}

/// Add an output to a PSET.
pub(crate) fn add_pset_output(pset: &mut PartiallySignedTransaction, txout: TxOut) {
    let output = lwk_wollet::elements::pset::Output {
        amount: match txout.value {
            ConfValue::Explicit(v) => Some(v),
            _ => None,
        },
        asset: match txout.asset {
            Asset::Explicit(id) => Some(id),
            _ => None,
        },
        script_pubkey: txout.script_pubkey,
        ..Default::default()
    };
    pset.add_output(output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwk_wollet::elements::Txid;
    use lwk_wollet::elements::hashes::Hash;

    fn asset() -> AssetId {
        "f3d1ec678811398cd2ae277cbe3849c6f6dbd72c74bc542f7c4b11ff0e820958"
            .parse()
            .unwrap()
    }

    #[test]
    fn from_explicit_reads_asset_and_value() {
        let txout = explicit_txout(asset(), 1234, &Script::from(vec![0x51, 0x20]));
        let outpoint = OutPoint::new(Txid::all_zeros(), 3);
        let utxo = Utxo::from_explicit(outpoint, txout.clone(), true).unwrap();
        assert_eq!(utxo.value, 1234);
        assert_eq!(utxo.asset, asset());
        assert_eq!(utxo.prevout, txout);
    }

    #[test]
    fn from_explicit_skips_confidential() {
        let mut txout = explicit_txout(asset(), 1, &Script::new());
        txout.value = ConfValue::Null;
        assert!(Utxo::from_explicit(OutPoint::default(), txout, false).is_none());
    }

    #[test]
    fn fee_output_has_empty_script() {
        let fee = fee_txout(asset(), 500);
        assert!(fee.script_pubkey.is_empty());
        assert_eq!(fee.value, ConfValue::Explicit(500));
    }

    #[test]
    fn inputs_carry_sighash_and_witness_utxo() {
        let txout = explicit_txout(asset(), 10, &Script::new());
        let utxo = Utxo::from_explicit(OutPoint::default(), txout.clone(), true).unwrap();
        let mut pset = new_pset();
        add_pset_input(&mut pset, &utxo, SIGHASH_DEFAULT);
        add_pset_output(&mut pset, fee_txout(asset(), 10));

        assert_eq!(pset.n_inputs(), 1);
        assert_eq!(pset.n_outputs(), 1);
        let input = &pset.inputs()[0];
        assert_eq!(input.witness_utxo.as_ref(), Some(&txout));
        assert_eq!(input.sighash_type, Some(PsbtSighashType::from_u32(SIGHASH_DEFAULT)));
        assert_eq!(pset.outputs()[0].amount, Some(10));
    }

    #[test]
    fn total_value_sums() {
        let u = |v| {
            Utxo::from_explicit(OutPoint::default(), explicit_txout(asset(), v, &Script::new()), true)
                .unwrap()
        };
        assert_eq!(total_value(&[u(1), u(2), u(3)]), 6);
        assert_eq!(total_value(&[]), 0);
    }
}
