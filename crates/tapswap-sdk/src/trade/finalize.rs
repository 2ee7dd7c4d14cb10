//! Covenant input finalization for settlement transactions.
//!
//! Covenant inputs carry no signature at all: their witness is the fulfill
//! script and the control block proving it sits in the funding tree. They are
//! finalized before the PSET is handed to the wallet, which finalizes its own
//! inputs and leaves these untouched.

use lwk_wollet::elements::Script;
use lwk_wollet::elements::pset::PartiallySignedTransaction;

use crate::error::{Error, Result};
use crate::taproot::FundingOutput;

/// Finalize a covenant input as a no-signature leaf spend.
///
/// The witness is exactly `[fulfill_script, control_block]`.
pub fn finalize_leaf_spend(
    pset: &mut PartiallySignedTransaction,
    index: usize,
    tree: &FundingOutput,
    fulfill_script: &Script,
) -> Result<()> {
    let control_block = tree.control_block(fulfill_script).ok_or_else(|| {
        Error::Finalize("no leaf in the funding tree matches the fulfill script".into())
    })?;
    let input = pset
        .inputs_mut()
        .get_mut(index)
        .ok_or_else(|| Error::Finalize(format!("covenant input {index} out of range")))?;
    input.final_script_witness = Some(vec![fulfill_script.to_bytes(), control_block]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwk_wollet::elements::{AssetId, OutPoint};

    use crate::network::Network;
    use crate::pset::{Utxo, add_pset_input, explicit_txout, new_pset};

    fn asset() -> AssetId {
        Network::LiquidTestnet.policy_asset()
    }

    #[test]
    fn leaf_spend_witness_shape() {
        let fulfill = Script::from(vec![0x51]);
        let refund = Script::from(vec![0x52]);
        let tree = FundingOutput::build(&fulfill, &refund, Network::LiquidTestnet).unwrap();

        let mut pset = new_pset();
        let utxo = Utxo::from_explicit(
            OutPoint::default(),
            explicit_txout(asset(), 10, tree.script_pubkey()),
            true,
        )
        .unwrap();
        add_pset_input(&mut pset, &utxo, 0);

        finalize_leaf_spend(&mut pset, 0, &tree, &fulfill).unwrap();
        let witness = pset.inputs()[0].final_script_witness.clone().unwrap();
        assert_eq!(witness.len(), 2);
        assert_eq!(witness[0], vec![0x51]);
        assert_eq!(witness[1], tree.control_block(&fulfill).unwrap());
        assert_eq!(witness[1].len(), 65);
    }

    #[test]
    fn leaf_spend_requires_matching_leaf() {
        let tree = FundingOutput::build(
            &Script::from(vec![0x51]),
            &Script::from(vec![0x52]),
            Network::LiquidTestnet,
        )
        .unwrap();
        let mut pset = new_pset();
        assert!(matches!(
            finalize_leaf_spend(&mut pset, 0, &tree, &Script::from(vec![0x53])),
            Err(Error::Finalize(_))
        ));
        assert!(finalize_leaf_spend(&mut pset, 0, &tree, &Script::from(vec![0x51])).is_err());
    }
}
