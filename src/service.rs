use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tapswap_sdk::elements::AssetId;
use tapswap_sdk::market::markets_with_limits;
use tapswap_sdk::{
    AssetRegistry, ChainBackend, ElectrumBackend, LwkWallet, Market, Order, OrderFactory,
    OrderLocks, OrderRepository, OrderStatus, OrderWatcher, OrderWatcherConfig,
    OrderWatcherHandle, StatusEntry, WalletService, WatchEvent, WatcherError,
    spawn_order_watcher,
};
use tapswap_store::{StoreError, SwapStore};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(String),

    #[error("wallet not ready (initialized: {initialized}, unlocked: {unlocked})")]
    WalletNotReady { initialized: bool, unlocked: bool },

    #[error(transparent)]
    Sdk(#[from] tapswap_sdk::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("order watcher already running")]
    AlreadyRunning,
}

// ============================================================================
// Backends
// ============================================================================

/// Open the order database for the configured network, creating it on first use.
pub fn open_store(config: &Config) -> Result<SwapStore, ServiceError> {
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", parent.display())))?;
    }
    let path = path
        .to_str()
        .ok_or_else(|| ServiceError::Config(format!("non UTF-8 path: {}", path.display())))?;
    Ok(SwapStore::open(path)?)
}

/// Build the provider wallet from the configured mnemonic.
pub fn open_wallet(config: &Config) -> Result<LwkWallet, ServiceError> {
    let mnemonic = config
        .mnemonic
        .as_deref()
        .ok_or_else(|| ServiceError::Config("a wallet mnemonic is required".into()))?;
    Ok(LwkWallet::new(
        mnemonic,
        config.network,
        &config.electrum_url,
        &config.data_dir,
    )?)
}

pub fn open_chain(config: &Config) -> ElectrumBackend {
    ElectrumBackend::new(&config.electrum_url)
}

// ============================================================================
// Order views
// ============================================================================

/// An order as shown to traders and operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: String,
    pub network: String,
    pub created_at: String,
    pub status: OrderStatus,
    pub funding_address: String,
    pub trader_script: String,
    pub input_asset: String,
    pub input_amount: String,
    pub output_asset: String,
    pub output_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_txid: Option<String>,
}

impl OrderView {
    fn new(
        order: &Order,
        status: OrderStatus,
        history: &[StatusEntry],
        registry: &AssetRegistry,
    ) -> Self {
        let ticker = |id: &AssetId| {
            registry
                .by_id(id)
                .map(|a| a.ticker.clone())
                .unwrap_or_else(|| id.to_string())
        };
        Self {
            id: order.id().to_string(),
            network: order.network().to_string(),
            created_at: order.created_at().to_rfc3339(),
            status,
            funding_address: order.funding_address().to_string(),
            trader_script: hex::encode(order.trader_script().as_bytes()),
            input_asset: ticker(&order.input().asset),
            input_amount: order
                .input_value(registry)
                .unwrap_or_else(|| order.input().amount.to_string()),
            output_asset: ticker(&order.output().asset),
            output_amount: order
                .output_value(registry)
                .unwrap_or_else(|| order.output().amount.to_string()),
            settlement_txid: history
                .iter()
                .rev()
                .find_map(|e| e.txid)
                .map(|txid| txid.to_string()),
        }
    }
}

// ============================================================================
// Order book
// ============================================================================

/// Order creation and lookup over a shared repository.
pub struct OrderBook<R> {
    factory: OrderFactory,
    repository: Arc<Mutex<R>>,
}

impl<R: OrderRepository> OrderBook<R> {
    pub fn new(factory: OrderFactory, repository: Arc<Mutex<R>>) -> Self {
        Self {
            factory,
            repository,
        }
    }

    pub fn registry(&self) -> &AssetRegistry {
        self.factory.registry()
    }

    pub fn repository(&self) -> &Arc<Mutex<R>> {
        &self.repository
    }

    fn repo(&self) -> Result<MutexGuard<'_, R>, ServiceError> {
        self.repository
            .lock()
            .map_err(|_| ServiceError::Watcher(WatcherError::MutexPoisoned))
    }

    /// Create and persist an order; it starts out `Pending`.
    pub fn create_order(
        &self,
        trader_script_hex: &str,
        input_ticker: &str,
        input_value: &str,
        output_ticker: &str,
        output_value: &str,
    ) -> Result<OrderView, ServiceError> {
        let order = self.factory.create(
            trader_script_hex,
            input_ticker,
            input_value,
            output_ticker,
            output_value,
        )?;
        let mut repo = self.repo()?;
        repo.save(&order)?;
        let history = repo.status_history(order.id())?;
        log::info!(
            "order {} created: {input_value} {input_ticker} -> {output_value} {output_ticker} at {}",
            order.id(),
            order.funding_address()
        );
        Ok(OrderView::new(
            &order,
            OrderStatus::Pending,
            &history,
            self.registry(),
        ))
    }

    pub fn get_order(&self, id: &str) -> Result<OrderView, ServiceError> {
        let mut repo = self.repo()?;
        let (order, status) = repo
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        let history = repo.status_history(id)?;
        Ok(OrderView::new(&order, status, &history, self.registry()))
    }

    /// Every order still awaiting funding or settlement.
    pub fn open_orders(&self) -> Result<Vec<OrderView>, ServiceError> {
        let mut repo = self.repo()?;
        let open = repo.list_pending()?;
        let mut views = Vec::with_capacity(open.len());
        for (order, status) in &open {
            let history = repo.status_history(order.id())?;
            views.push(OrderView::new(order, *status, &history, self.registry()));
        }
        Ok(views)
    }
}

// ============================================================================
// Swap service
// ============================================================================

/// The running provider: order book, wallet and the background watcher.
pub struct SwapService<R, C, W> {
    book: OrderBook<R>,
    chain: Arc<C>,
    wallet: Arc<W>,
    locks: Arc<OrderLocks>,
    watcher: Option<OrderWatcherHandle>,
}

impl<R, C, W> SwapService<R, C, W>
where
    R: OrderRepository,
    C: ChainBackend + Send + Sync + 'static,
    W: WalletService + Send + Sync + 'static,
{
    pub fn new(book: OrderBook<R>, chain: Arc<C>, wallet: Arc<W>) -> Self {
        Self {
            book,
            chain,
            wallet,
            locks: Arc::new(OrderLocks::new()),
            watcher: None,
        }
    }

    pub fn book(&self) -> &OrderBook<R> {
        &self.book
    }

    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Check the wallet and start the watcher. With no interval the watcher
    /// stays off and no event receiver is returned.
    pub fn start(
        &mut self,
        interval: Option<Duration>,
    ) -> Result<Option<UnboundedReceiver<WatchEvent>>, ServiceError> {
        if self.watcher.is_some() {
            return Err(ServiceError::AlreadyRunning);
        }
        let status = self.wallet.status()?;
        if !status.is_ready() {
            return Err(ServiceError::WalletNotReady {
                initialized: status.initialized,
                unlocked: status.unlocked,
            });
        }

        let Some(interval) = interval else {
            log::info!("order watcher disabled");
            return Ok(None);
        };

        let watcher = OrderWatcher::new(
            self.book.repository().clone(),
            self.chain.clone(),
            self.wallet.clone(),
            self.locks.clone(),
        );
        let (handle, events) = spawn_order_watcher(watcher, OrderWatcherConfig::new(interval))?;
        log::info!("order watcher started, sweeping every {}s", interval.as_secs());
        self.watcher = Some(handle);
        Ok(Some(events))
    }

    /// Request an immediate sweep. Returns false when the watcher is not running.
    pub fn sweep_now(&self) -> bool {
        match &self.watcher {
            Some(handle) => {
                handle.sweep_now();
                true
            }
            None => false,
        }
    }

    /// Listed markets with limits taken from the wallet's balance.
    pub fn markets(&self) -> Result<Vec<Market>, ServiceError> {
        Ok(markets_with_limits(self.book.registry(), self.wallet.as_ref())?)
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.shutdown();
            log::info!("order watcher stopped");
        }
    }
}

impl<R, C, W> Drop for SwapService<R, C, W> {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.shutdown();
        }
    }
}
