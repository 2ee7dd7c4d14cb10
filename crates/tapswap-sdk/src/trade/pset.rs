//! Settlement PSET builder.
//!
//! ## PSET Layout
//!
//! ```text
//! Inputs:
//!   [0..F-1]         F covenant funding inputs        (SIGHASH_DEFAULT)
//!   [F..F+S-1]       S provider settlement inputs      (SIGHASH_ALL)
//!   [F+S..]          provider fee inputs               (SIGHASH_ALL)
//!
//! Outputs:
//!   [0]              trader payout (explicit)
//!   [1]              funded input asset to the provider
//!   [next]           settlement change (if any)
//!   [next]           fee change (if any)
//!   [last]           fee output (explicit, empty script)
//! ```
//!
//! The covenant clauses inspect output 0, so the trader payout must stay there.

use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{AssetId, Script};

use crate::error::{Error, Result};
use crate::pset::{
    SIGHASH_ALL, SIGHASH_DEFAULT, Utxo, add_pset_input, add_pset_output, explicit_txout,
    fee_txout, new_pset, total_value,
};

/// A change output, present only when a coin selection overshoots.
#[derive(Debug, Clone)]
pub struct ChangeOutput {
    pub script_pubkey: Script,
    pub amount: u64,
}

/// Parameters for constructing a settlement PSET.
#[derive(Debug, Clone)]
pub struct SettlementParams {
    /// Covenant-locked funding UTXOs (all of the order's input asset).
    pub funding_utxos: Vec<Utxo>,
    /// Provider coins of the order's output asset.
    pub settlement_utxos: Vec<Utxo>,
    /// Provider coins of the fee asset. Empty when the fee is paid out of
    /// `settlement_utxos` because the trader buys the fee asset.
    pub fee_utxos: Vec<Utxo>,
    /// Where the trader is paid.
    pub trader_script: Script,
    pub trader_asset: AssetId,
    pub trader_amount: u64,
    /// Where the provider receives the funded asset.
    pub provider_script: Script,
    pub provider_asset: AssetId,
    pub settlement_change: Option<ChangeOutput>,
    pub fee_change: Option<ChangeOutput>,
    pub fee_asset: AssetId,
    pub fee_amount: u64,
}

/// Build the unsigned settlement PSET.
///
/// The provider receives the full funded amount of the input asset, which
/// may exceed the order's input amount when the trader overfunded.
pub fn build_settlement_pset(params: &SettlementParams) -> Result<PartiallySignedTransaction> {
    if params.funding_utxos.is_empty() {
        return Err(Error::Pset("at least one funding UTXO is required".into()));
    }
    if params.settlement_utxos.is_empty() {
        return Err(Error::Pset("settlement UTXOs are required".into()));
    }
    if let Some(utxo) = params
        .funding_utxos
        .iter()
        .find(|u| u.asset != params.provider_asset)
    {
        return Err(Error::Pset(format!(
            "funding UTXO {} holds asset {}, expected {}",
            utxo.outpoint, utxo.asset, params.provider_asset
        )));
    }
    let funded = total_value(&params.funding_utxos);

    let mut pset = new_pset();

    // Inputs: covenant first, then the provider's coins.
    for utxo in &params.funding_utxos {
        add_pset_input(&mut pset, utxo, SIGHASH_DEFAULT);
    }
    for utxo in params.settlement_utxos.iter().chain(&params.fee_utxos) {
        add_pset_input(&mut pset, utxo, SIGHASH_ALL);
    }

    add_pset_output(
        &mut pset,
        explicit_txout(
            params.trader_asset,
            params.trader_amount,
            &params.trader_script,
        ),
    );
    add_pset_output(
        &mut pset,
        explicit_txout(params.provider_asset, funded, &params.provider_script),
    );
    for (change, asset) in [
        (&params.settlement_change, params.trader_asset),
        (&params.fee_change, params.fee_asset),
    ] {
        if let Some(change) = change.as_ref().filter(|c| c.amount > 0) {
            add_pset_output(
                &mut pset,
                explicit_txout(asset, change.amount, &change.script_pubkey),
            );
        }
    }
    add_pset_output(&mut pset, fee_txout(params.fee_asset, params.fee_amount));

    Ok(pset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwk_wollet::elements::hashes::Hash;
    use lwk_wollet::elements::pset::PsbtSighashType;
    use lwk_wollet::elements::{OutPoint, Txid};

    fn asset(n: u8) -> AssetId {
        format!("{:064x}", n).parse().unwrap()
    }

    fn utxo(vout: u32, asset_id: AssetId, value: u64) -> Utxo {
        Utxo::from_explicit(
            OutPoint::new(Txid::all_zeros(), vout),
            explicit_txout(asset_id, value, &Script::from(vec![0x51, 0x01, 0x01])),
            true,
        )
        .unwrap()
    }

    fn params() -> SettlementParams {
        SettlementParams {
            funding_utxos: vec![utxo(0, asset(1), 1000)],
            settlement_utxos: vec![utxo(1, asset(2), 5000)],
            fee_utxos: vec![utxo(2, asset(3), 800)],
            trader_script: Script::from(vec![0x00, 0x14, 0xaa]),
            trader_asset: asset(2),
            trader_amount: 4000,
            provider_script: Script::from(vec![0x00, 0x14, 0xbb]),
            provider_asset: asset(1),
            settlement_change: Some(ChangeOutput {
                script_pubkey: Script::from(vec![0x00, 0x14, 0xcc]),
                amount: 1000,
            }),
            fee_change: Some(ChangeOutput {
                script_pubkey: Script::from(vec![0x00, 0x14, 0xdd]),
                amount: 300,
            }),
            fee_asset: asset(3),
            fee_amount: 500,
        }
    }

    #[test]
    fn layout_with_both_changes() {
        let pset = build_settlement_pset(&params()).unwrap();
        assert_eq!(pset.n_inputs(), 3);
        assert_eq!(pset.n_outputs(), 5);

        let outputs = pset.outputs();
        assert_eq!(outputs[0].amount, Some(4000));
        assert_eq!(outputs[0].asset, Some(asset(2)));
        assert_eq!(outputs[0].script_pubkey, Script::from(vec![0x00, 0x14, 0xaa]));
        assert_eq!(outputs[1].amount, Some(1000));
        assert_eq!(outputs[1].asset, Some(asset(1)));
        assert_eq!(outputs[2].amount, Some(1000));
        assert_eq!(outputs[3].amount, Some(300));
        assert_eq!(outputs[3].asset, Some(asset(3)));
        assert_eq!(outputs[4].amount, Some(500));
        assert!(outputs[4].script_pubkey.is_empty());
    }

    #[test]
    fn sighash_per_input_role() {
        let pset = build_settlement_pset(&params()).unwrap();
        let inputs = pset.inputs();
        assert_eq!(inputs[0].sighash_type, Some(PsbtSighashType::from_u32(0x00)));
        assert_eq!(inputs[1].sighash_type, Some(PsbtSighashType::from_u32(0x01)));
        assert_eq!(inputs[2].sighash_type, Some(PsbtSighashType::from_u32(0x01)));
        assert!(inputs.iter().all(|i| i.witness_utxo.is_some()));
    }

    #[test]
    fn zero_change_is_omitted() {
        let mut p = params();
        p.settlement_change = None;
        p.fee_change = Some(ChangeOutput {
            script_pubkey: Script::new(),
            amount: 0,
        });
        let pset = build_settlement_pset(&p).unwrap();
        assert_eq!(pset.n_outputs(), 3);
        assert!(pset.outputs()[2].script_pubkey.is_empty());
    }

    #[test]
    fn fee_paid_from_settlement_coins() {
        let mut p = params();
        p.fee_asset = asset(2);
        p.fee_utxos.clear();
        p.fee_change = None;
        let pset = build_settlement_pset(&p).unwrap();
        assert_eq!(pset.n_inputs(), 2);
        assert_eq!(pset.n_outputs(), 4);
        assert_eq!(pset.outputs()[3].asset, Some(asset(2)));
    }

    #[test]
    fn aggregate_funding_pays_the_full_amount() {
        let mut p = params();
        p.funding_utxos = vec![utxo(7, asset(1), 600), utxo(8, asset(1), 700)];
        let pset = build_settlement_pset(&p).unwrap();
        assert_eq!(pset.inputs()[0].previous_output_index, 7);
        assert_eq!(pset.inputs()[1].previous_output_index, 8);
        assert_eq!(pset.outputs()[1].amount, Some(1300));
    }

    #[test]
    fn rejects_missing_inputs_and_foreign_funding() {
        let mut p = params();
        p.funding_utxos.clear();
        assert!(matches!(build_settlement_pset(&p), Err(Error::Pset(_))));

        let mut p = params();
        p.settlement_utxos.clear();
        assert!(build_settlement_pset(&p).is_err());

        let mut p = params();
        p.funding_utxos.push(utxo(9, asset(4), 1));
        assert!(build_settlement_pset(&p).is_err());
    }
}
