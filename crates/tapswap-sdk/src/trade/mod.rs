//! Trade state machine: funding detection, settlement and cancellation.
//!
//! ```text
//! Pending ──detect_funding──▶ Funded ──execute──▶ Executed
//!                               │
//!                               └──cancel──▶ Cancelled
//! ```
//!
//! `Expired` is an order status assigned by the watcher, not a trade state.

pub mod finalize;
pub mod pset;

use lwk_wollet::elements::pset::PartiallySignedTransaction;
use lwk_wollet::elements::{Txid, encode};

use crate::error::{Error, Result};
use crate::order::Order;
use crate::pset::{Utxo, total_value};
use crate::wallet::{CoinSelection, WalletService};

use self::finalize::finalize_leaf_spend;
use self::pset::{ChangeOutput, SettlementParams, build_settlement_pset};

/// Flat network fee paid by every settlement, in base units of the policy asset.
pub const FEE_AMOUNT: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Pending,
    Funded,
    Executed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Pending => "Pending",
            TradeStatus::Funded => "Funded",
            TradeStatus::Executed => "Executed",
            TradeStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient view of one settlement attempt for an order.
#[derive(Debug, Clone)]
pub struct Trade<'a> {
    order: &'a Order,
    status: TradeStatus,
    funding: Vec<Utxo>,
    observed: u64,
}

impl<'a> Trade<'a> {
    /// Inspect the UTXOs at the order's funding address.
    ///
    /// Only UTXOs of the order's input asset count. If they add up to at
    /// least the input amount the trade is `Funded` and spends all of them;
    /// otherwise it stays `Pending` with no funding.
    pub fn detect_funding(order: &'a Order, utxos: &[Utxo]) -> Self {
        let matching: Vec<Utxo> = utxos
            .iter()
            .filter(|u| u.asset == order.input().asset)
            .cloned()
            .collect();
        let funded = total_value(&matching);

        if funded >= order.input().amount {
            Self {
                order,
                status: TradeStatus::Funded,
                funding: matching,
                observed: funded,
            }
        } else {
            log::debug!(
                "order {}: {funded} of {} funded",
                order.id(),
                order.input().amount
            );
            Self {
                order,
                status: TradeStatus::Pending,
                funding: Vec::new(),
                observed: funded,
            }
        }
    }

    pub fn order(&self) -> &Order {
        self.order
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn funding(&self) -> &[Utxo] {
        &self.funding
    }

    /// The funding UTXO spent as input 0.
    pub fn funding_utxo(&self) -> Option<&Utxo> {
        self.funding.first()
    }

    pub fn funded_amount(&self) -> u64 {
        total_value(&self.funding)
    }

    /// The funding UTXOs, or `InsufficientFunding` while the trade is not funded.
    pub fn require_funded(&self) -> Result<&[Utxo]> {
        if self.status == TradeStatus::Funded {
            Ok(&self.funding)
        } else {
            Err(Error::InsufficientFunding {
                have: self.observed,
                need: self.order.input().amount,
            })
        }
    }

    fn transition_error(&self, to: TradeStatus) -> Error {
        Error::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Settle the trade: pay the trader from the provider's wallet, sweep the
    /// funding to the provider and broadcast.
    ///
    /// On success the trade is `Executed`; on any failure it stays `Funded`.
    pub fn execute<W: WalletService + ?Sized>(&mut self, wallet: &W) -> Result<Txid> {
        if self.status != TradeStatus::Funded {
            return Err(self.transition_error(TradeStatus::Executed));
        }
        let order = self.order;
        let output = *order.output();
        let fee_asset = order.network().policy_asset();

        // 1. Provider addresses
        let receive = wallet.get_address(false)?;
        let settlement_change = wallet.get_address(true)?;
        let fee_change = wallet.get_address(true)?;

        // 2. Provider coins. A trader buying the fee asset is paid and charged
        //    from one selection so no coin is picked twice.
        let (settlement, fees): (CoinSelection, Option<CoinSelection>) =
            if output.asset == fee_asset {
                let amount = output.amount.checked_add(FEE_AMOUNT).ok_or_else(|| {
                    Error::UtxoSelection("output amount plus fee overflows".into())
                })?;
                (wallet.select_utxos(&output.asset, amount)?, None)
            } else {
                (
                    wallet.select_utxos(&output.asset, output.amount)?,
                    Some(wallet.select_utxos(&fee_asset, FEE_AMOUNT)?),
                )
            };

        // 3. Unsigned settlement
        let params = SettlementParams {
            funding_utxos: self.funding.clone(),
            settlement_utxos: settlement.utxos,
            fee_utxos: fees.as_ref().map(|f| f.utxos.clone()).unwrap_or_default(),
            trader_script: order.trader_script().clone(),
            trader_asset: output.asset,
            trader_amount: output.amount,
            provider_script: receive.script_pubkey,
            provider_asset: order.input().asset,
            settlement_change: Some(ChangeOutput {
                script_pubkey: settlement_change.script_pubkey,
                amount: settlement.change,
            }),
            fee_change: fees.map(|f| ChangeOutput {
                script_pubkey: fee_change.script_pubkey,
                amount: f.change,
            }),
            fee_asset,
            fee_amount: FEE_AMOUNT,
        };
        let pset = build_settlement_pset(&params)?;

        // 4. Provider signatures
        let signed = wallet.sign_partial(&pset.to_string())?;
        let mut pset: PartiallySignedTransaction = signed
            .parse()
            .map_err(|e| Error::Signing(format!("wallet returned an invalid PSET: {e}")))?;

        // 5. Covenant inputs first, so the wallet finalizes only what it signed
        for index in 0..self.funding.len() {
            finalize_leaf_spend(&mut pset, index, order.script_tree(), order.fulfill_script())?;
        }

        // 6. Wallet inputs, extract and broadcast
        let tx = wallet.finalize(&pset.to_string())?;
        let txid = wallet.broadcast(&hex::encode(encode::serialize(&tx)))?;

        log::info!("order {}: settled in {txid}", order.id());
        self.status = TradeStatus::Executed;
        Ok(txid)
    }

    /// Abandon a funded trade without touching the chain.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status != TradeStatus::Funded {
            return Err(self.transition_error(TradeStatus::Cancelled));
        }
        self.status = TradeStatus::Cancelled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockWallet, TRADER_SCRIPT_HEX, explicit_utxo, testnet_factory};

    fn order() -> Order {
        testnet_factory()
            .create(TRADER_SCRIPT_HEX, "L-BTC", "0.00001000", "USDT", "0.00002000")
            .unwrap()
    }

    #[test]
    fn funding_threshold_boundary() {
        let order = order();
        let asset = order.input().asset;
        let short = [explicit_utxo(1, 0, asset, 999, order.script_tree().script_pubkey())];
        let trade = Trade::detect_funding(&order, &short);
        assert_eq!(trade.status(), TradeStatus::Pending);
        assert!(trade.funding().is_empty());
        assert!(matches!(
            trade.require_funded(),
            Err(Error::InsufficientFunding { have: 999, need: 1000 })
        ));

        let exact = [explicit_utxo(1, 0, asset, 1000, order.script_tree().script_pubkey())];
        let trade = Trade::detect_funding(&order, &exact);
        assert_eq!(trade.status(), TradeStatus::Funded);
        assert_eq!(trade.require_funded().unwrap().len(), 1);
    }

    #[test]
    fn only_the_input_asset_counts() {
        let order = order();
        let spk = order.script_tree().script_pubkey().clone();
        let utxos = [
            explicit_utxo(1, 0, order.output().asset, 5000, &spk),
            explicit_utxo(2, 0, order.input().asset, 400, &spk),
            explicit_utxo(3, 1, order.input().asset, 700, &spk),
        ];
        let trade = Trade::detect_funding(&order, &utxos);
        assert_eq!(trade.status(), TradeStatus::Funded);
        assert_eq!(trade.funding().len(), 2);
        assert_eq!(trade.funded_amount(), 1100);
        assert_eq!(trade.funding_utxo().unwrap().value, 400);
    }

    #[test]
    fn cancel_only_from_funded() {
        let order = order();
        let mut pending = Trade::detect_funding(&order, &[]);
        assert!(matches!(
            pending.cancel(),
            Err(Error::InvalidTransition { .. })
        ));

        let utxos = [explicit_utxo(
            1,
            0,
            order.input().asset,
            1000,
            order.script_tree().script_pubkey(),
        )];
        let mut trade = Trade::detect_funding(&order, &utxos);
        trade.cancel().unwrap();
        assert_eq!(trade.status(), TradeStatus::Cancelled);
        assert!(trade.cancel().is_err());
    }

    #[test]
    fn execute_requires_funding() {
        let order = order();
        let wallet = MockWallet::new();
        let mut trade = Trade::detect_funding(&order, &[]);
        assert!(matches!(
            trade.execute(&wallet),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(wallet.broadcasts().is_empty());
    }

    #[test]
    fn failed_selection_leaves_trade_funded() {
        let order = order();
        let wallet = MockWallet::new();
        let utxos = [explicit_utxo(
            1,
            0,
            order.input().asset,
            1000,
            order.script_tree().script_pubkey(),
        )];
        let mut trade = Trade::detect_funding(&order, &utxos);
        assert!(matches!(
            trade.execute(&wallet),
            Err(Error::UtxoSelection(_))
        ));
        assert_eq!(trade.status(), TradeStatus::Funded);
    }

    #[test]
    fn executed_trade_cannot_execute_again() {
        let order = order();
        let wallet = MockWallet::new();
        wallet.fund(order.output().asset, 50_000);
        wallet.fund(order.network().policy_asset(), 10_000);
        let utxos = [explicit_utxo(
            1,
            0,
            order.input().asset,
            1000,
            order.script_tree().script_pubkey(),
        )];
        let mut trade = Trade::detect_funding(&order, &utxos);
        trade.execute(&wallet).unwrap();
        assert_eq!(trade.status(), TradeStatus::Executed);
        assert!(trade.execute(&wallet).is_err());
        assert!(trade.cancel().is_err());
        assert_eq!(wallet.broadcasts().len(), 1);
    }
}
