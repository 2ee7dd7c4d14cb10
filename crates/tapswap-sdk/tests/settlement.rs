//! Settlement of funded orders against the in-memory wallet.
//!
//! Covers the assembled transaction end to end: input order and witnesses,
//! output order and amounts, and the fee.

use tapswap_sdk::elements::{Script, Transaction};
use tapswap_sdk::testing::{
    COSIGNER_SIGNATURE, MOCK_SIGNATURE, MockWallet, TRADER_PUBKEY_HEX, TRADER_SCRIPT_HEX,
    explicit_utxo, testnet_factory,
};
use tapswap_sdk::wallet::WalletService;
use tapswap_sdk::{Error, FEE_AMOUNT, Order, Trade, TradeStatus};

fn trader() -> Script {
    Script::from(hex::decode(TRADER_SCRIPT_HEX).unwrap())
}

fn explicit(tx: &Transaction, index: usize) -> (u64, String, Script) {
    let out = &tx.output[index];
    (
        out.value.explicit().expect("explicit value"),
        out.asset.explicit().expect("explicit asset").to_string(),
        out.script_pubkey.clone(),
    )
}

fn fund_order(order: &Order, value: u64) -> Vec<tapswap_sdk::Utxo> {
    vec![explicit_utxo(
        0x10,
        1,
        order.input().asset,
        value,
        order.script_tree().script_pubkey(),
    )]
}

// ---------------------------------------------------------------------------
// L-BTC in, USDT out
// ---------------------------------------------------------------------------

#[test]
fn one_btc_for_one_usdt_end_to_end() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "L-BTC", "1", "USDT", "1")
        .unwrap();
    let lbtc = order.input().asset;
    let usdt = order.output().asset;

    let wallet = MockWallet::new();
    wallet.fund(usdt, 250_000_000);
    wallet.fund(lbtc, 10_000);

    let funding = fund_order(&order, 100_000_000);
    let mut trade = Trade::detect_funding(&order, &funding);
    assert_eq!(trade.status(), TradeStatus::Funded);

    let txid = trade.execute(&wallet).expect("settlement");
    assert_eq!(trade.status(), TradeStatus::Executed);
    assert_eq!(wallet.signed(), 1);
    assert_eq!(wallet.finalized(), 1);

    let broadcasts = wallet.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_eq!(tx.txid(), txid);

    // Inputs: covenant, settlement coin, fee coin.
    assert_eq!(tx.input.len(), 3);
    assert_eq!(tx.input[0].previous_output, funding[0].outpoint);
    let covenant_witness = &tx.input[0].witness.script_witness;
    assert_eq!(covenant_witness.len(), 2);
    assert_eq!(covenant_witness[0], order.fulfill_script().to_bytes());
    assert_eq!(
        covenant_witness[1],
        order.script_tree().control_block(order.fulfill_script()).unwrap()
    );
    for input in &tx.input[1..] {
        let witness = &input.witness.script_witness;
        assert_eq!(witness.len(), 2, "wallet inputs carry [sig, pubkey]");
        assert_eq!(witness[0], MOCK_SIGNATURE.to_vec());
        assert_eq!(hex::encode(&witness[1]), TRADER_PUBKEY_HEX);
    }

    // Outputs: trader, provider, settlement change, fee change, fee.
    assert_eq!(tx.output.len(), 5);
    let (value, asset, spk) = explicit(tx, 0);
    assert_eq!((value, asset, spk), (100_000_000, usdt.to_string(), trader()));
    let (value, asset, _) = explicit(tx, 1);
    assert_eq!((value, asset), (100_000_000, lbtc.to_string()));
    let (value, asset, _) = explicit(tx, 2);
    assert_eq!((value, asset), (150_000_000, usdt.to_string()));
    let (value, asset, _) = explicit(tx, 3);
    assert_eq!((value, asset), (10_000 - FEE_AMOUNT, lbtc.to_string()));
    assert!(tx.output[4].is_fee());
    assert_eq!(explicit(tx, 4).0, FEE_AMOUNT);
    // Receive, settlement change and fee change are three different scripts.
    let provider: Vec<&Script> = tx.output[1..4].iter().map(|o| &o.script_pubkey).collect();
    assert_ne!(provider[0], provider[1]);
    assert_ne!(provider[0], provider[2]);
    assert_ne!(provider[1], provider[2]);

    // The wallet spent both of its coins.
    assert!(wallet.coins().is_empty());
}

#[test]
fn foreign_signatures_stay_out_of_wallet_witnesses() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "L-BTC", "0.0001", "USDT", "1")
        .unwrap();
    let wallet = MockWallet::new();
    wallet.fund(order.output().asset, 100_000_000);
    wallet.fund(order.input().asset, 10_000);
    wallet.attach_cosigner(true);

    let funding = fund_order(&order, 10_000);
    let mut trade = Trade::detect_funding(&order, &funding);
    trade.execute(&wallet).unwrap();

    let tx = &wallet.broadcasts()[0];
    assert_eq!(
        tx.input[0].witness.script_witness[0],
        order.fulfill_script().to_bytes()
    );
    for input in &tx.input[1..] {
        let witness = &input.witness.script_witness;
        assert_eq!(witness.len(), 2);
        assert_ne!(witness[0], COSIGNER_SIGNATURE.to_vec());
        assert_eq!(witness[0], MOCK_SIGNATURE.to_vec());
        assert_eq!(hex::encode(&witness[1]), TRADER_PUBKEY_HEX);
    }
}

#[test]
fn overfunding_goes_to_the_provider() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "L-BTC", "0.001", "USDT", "50")
        .unwrap();
    let wallet = MockWallet::new();
    wallet.fund(order.output().asset, 5_000_000_000);
    wallet.fund(order.input().asset, FEE_AMOUNT);

    let spk = order.script_tree().script_pubkey().clone();
    let funding = vec![
        explicit_utxo(0x20, 0, order.input().asset, 60_000, &spk),
        explicit_utxo(0x21, 3, order.input().asset, 60_000, &spk),
    ];
    let mut trade = Trade::detect_funding(&order, &funding);
    assert_eq!(trade.funded_amount(), 120_000);
    trade.execute(&wallet).unwrap();

    let tx = &wallet.broadcasts()[0];
    // Two covenant inputs, both with the leaf-spend witness.
    for input in &tx.input[..2] {
        assert_eq!(input.witness.script_witness.len(), 2);
        assert_eq!(input.witness.script_witness[0], order.fulfill_script().to_bytes());
    }
    assert_eq!(explicit(tx, 1).0, 120_000);
    // Exact settlement and fee coins leave no change outputs.
    assert_eq!(tx.output.len(), 3);
    assert!(tx.output[2].is_fee());
}

// ---------------------------------------------------------------------------
// USDT in, L-BTC out: payout and fee share one selection
// ---------------------------------------------------------------------------

#[test]
fn buying_the_fee_asset_uses_one_selection() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "USDT", "1", "L-BTC", "0.5")
        .unwrap();
    let lbtc = order.output().asset;
    let usdt = order.input().asset;

    let wallet = MockWallet::new();
    wallet.fund(lbtc, 100_000_000);

    let funding = fund_order(&order, 100_000_000);
    let mut trade = Trade::detect_funding(&order, &funding);
    trade.execute(&wallet).unwrap();

    let tx = &wallet.broadcasts()[0];
    assert_eq!(tx.input.len(), 2);
    assert_eq!(tx.output.len(), 4);
    assert_eq!(explicit(tx, 0), (50_000_000, lbtc.to_string(), trader()));
    assert_eq!(explicit(tx, 1).0, 100_000_000);
    assert_eq!(explicit(tx, 1).1, usdt.to_string());
    assert_eq!(
        explicit(tx, 2).0,
        100_000_000 - 50_000_000 - FEE_AMOUNT,
        "change covers payout plus fee"
    );
    assert!(tx.output[3].is_fee());
}

#[test]
fn single_coin_must_cover_payout_and_fee() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "USDT", "1", "L-BTC", "0.5")
        .unwrap();
    let wallet = MockWallet::new();
    wallet.fund(order.output().asset, 50_000_000);

    let funding = fund_order(&order, 100_000_000);
    let mut trade = Trade::detect_funding(&order, &funding);
    assert!(matches!(
        trade.execute(&wallet),
        Err(Error::UtxoSelection(_))
    ));
    assert_eq!(trade.status(), TradeStatus::Funded);
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[test]
fn rejected_broadcast_keeps_trade_funded() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "L-BTC", "1", "USDT", "1")
        .unwrap();
    let wallet = MockWallet::new();
    wallet.fund(order.output().asset, 100_000_000);
    wallet.fund(order.input().asset, 1_000);
    wallet.fail_broadcasts(true);

    let funding = fund_order(&order, 100_000_000);
    let mut trade = Trade::detect_funding(&order, &funding);
    assert!(matches!(trade.execute(&wallet), Err(Error::Broadcast(_))));
    assert_eq!(trade.status(), TradeStatus::Funded);
    assert_eq!(wallet.coins().len(), 2);

    // A retry after the backend recovers succeeds.
    wallet.fail_broadcasts(false);
    trade.execute(&wallet).unwrap();
    assert_eq!(trade.status(), TradeStatus::Executed);
}

#[test]
fn underfunded_order_does_not_touch_the_wallet() {
    let order = testnet_factory()
        .create(TRADER_SCRIPT_HEX, "L-BTC", "1", "USDT", "1")
        .unwrap();
    let wallet = MockWallet::new();
    wallet.fund(order.output().asset, 100_000_000);

    let funding = fund_order(&order, 99_999_999);
    let mut trade = Trade::detect_funding(&order, &funding);
    assert_eq!(trade.status(), TradeStatus::Pending);
    assert!(trade.execute(&wallet).is_err());
    assert_eq!(wallet.signed(), 0);
    assert_eq!(wallet.balance().unwrap().len(), 1);
}
