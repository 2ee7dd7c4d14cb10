use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tapswap_lib::{Config, ConfigOverrides, OrderBook, SwapService, logging};
use tapswap_sdk::{AssetRegistry, LwkWallet, Network, OrderFactory, WatchEvent, markets};

#[derive(Parser)]
#[command(name = "tapswapd", version, about = "Covenant-settled asset swaps on Liquid")]
struct Cli {
    /// liquid, testnet or regtest
    #[arg(long, env = "TAPSWAP_NETWORK", global = true)]
    network: Option<Network>,

    #[arg(long, env = "TAPSWAP_ELECTRUM_URL", global = true)]
    electrum_url: Option<String>,

    #[arg(long, env = "TAPSWAP_DATA_DIR", default_value = "./tapswap-data", global = true)]
    data_dir: PathBuf,

    #[arg(long, env = "TAPSWAP_MNEMONIC", hide_env_values = true, global = true)]
    mnemonic: Option<String>,

    /// Seconds between watcher sweeps; 0 or less disables the watcher
    #[arg(
        long,
        env = "TAPSWAP_WATCH_INTERVAL_SECONDS",
        allow_negative_numbers = true,
        global = true
    )]
    watch_interval_seconds: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the resolved settings to tapswap.json in the data dir
    Init,
    /// Sync the wallet and settle funded orders until interrupted
    Run,
    /// Create an order and print its funding address
    CreateOrder {
        /// Hex script pubkey the trader is paid to
        #[arg(long)]
        trader_script: String,
        #[arg(long)]
        input_asset: String,
        #[arg(long)]
        input_amount: String,
        #[arg(long)]
        output_asset: String,
        #[arg(long)]
        output_amount: String,
    },
    /// Show an order and its current status
    Order { id: String },
    /// List the assets known on the network
    Assets,
    /// List markets, with limits when a wallet is configured
    Markets,
}

#[tokio::main]
async fn main() -> Result<()> {
    // electrum-client pulls in rustls 0.23, which needs a process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();
    logging::init();

    let cli = Cli::parse();
    let config = Config::load(
        &cli.data_dir,
        ConfigOverrides {
            network: cli.network,
            electrum_url: cli.electrum_url,
            mnemonic: cli.mnemonic,
            watch_interval_seconds: cli.watch_interval_seconds,
        },
    )
    .context("failed to load config")?;

    match cli.command {
        Command::Init => {
            config.save()?;
            tracing::info!(
                path = %config.data_dir.join(tapswap_lib::config::CONFIG_FILE).display(),
                network = %config.network,
                "wrote config"
            );
            Ok(())
        }
        Command::Run => run(config).await,
        Command::CreateOrder {
            trader_script,
            input_asset,
            input_amount,
            output_asset,
            output_amount,
        } => {
            let book = order_book(&config)?;
            let view = book.create_order(
                &trader_script,
                &input_asset,
                &input_amount,
                &output_asset,
                &output_amount,
            )?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Order { id } => {
            let view = order_book(&config)?.get_order(&id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
        Command::Assets => {
            for asset in AssetRegistry::for_network(config.network).assets() {
                println!(
                    "{:<6} {:<24} precision {}  {}",
                    asset.ticker, asset.name, asset.precision, asset.id
                );
            }
            Ok(())
        }
        Command::Markets => {
            let listed = if config.mnemonic.is_some() {
                let wallet = synced_wallet(&config).await?;
                tapswap_sdk::market::markets_with_limits(
                    &AssetRegistry::for_network(config.network),
                    &wallet,
                )?
            } else {
                markets().to_vec()
            };
            println!("{}", serde_json::to_string_pretty(&listed)?);
            Ok(())
        }
    }
}

fn order_book(config: &Config) -> Result<OrderBook<tapswap_store::SwapStore>> {
    let store = tapswap_lib::open_store(config)?;
    Ok(OrderBook::new(
        OrderFactory::new(AssetRegistry::for_network(config.network)),
        Arc::new(Mutex::new(store)),
    ))
}

/// Open the wallet and run its full scan off the async runtime.
async fn synced_wallet(config: &Config) -> Result<LwkWallet> {
    let wallet = tapswap_lib::open_wallet(config)?;
    let wallet = tokio::task::spawn_blocking(move || wallet.sync().map(|()| wallet))
        .await
        .context("wallet sync task panicked")?
        .context("wallet sync failed")?;
    Ok(wallet)
}

async fn run(config: Config) -> Result<()> {
    let book = order_book(&config)?;
    let wallet = synced_wallet(&config).await?;
    let chain = tapswap_lib::open_chain(&config);

    tracing::info!(
        network = %config.network,
        electrum = %config.electrum_url,
        db = %config.db_path().display(),
        "starting tapswapd"
    );

    let mut service = SwapService::new(book, Arc::new(chain), Arc::new(wallet));
    let events = service.start(config.watch_interval())?;

    match events {
        Some(mut events) => loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(event) => log_event(&event),
                    None => {
                        tracing::warn!("order watcher exited");
                        break;
                    }
                },
            }
        },
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    tracing::info!("shutting down");
    service.shutdown();
    Ok(())
}

fn log_event(event: &WatchEvent) {
    match event {
        WatchEvent::StatusChanged {
            order_id,
            status,
            txid,
        } => match txid {
            Some(txid) => tracing::info!(%order_id, %status, %txid, "order status changed"),
            None => tracing::info!(%order_id, %status, "order status changed"),
        },
        WatchEvent::ExecutionFailed { order_id, reason } => {
            tracing::warn!(%order_id, %reason, "settlement failed")
        }
        WatchEvent::SweepFailed { reason } => tracing::error!(%reason, "sweep failed"),
    }
}
