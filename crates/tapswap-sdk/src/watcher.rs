//! `OrderWatcher` - periodic settlement sweep over open orders.
//!
//! Each sweep walks every `Pending`/`Funded` order: stale pending orders
//! expire, funded ones are settled through the wallet. A per-order lock
//! keeps a second sweep (or any other caller sharing the [`OrderLocks`])
//! from working on the same order at the same time.
//!
//! The watcher runs on a **dedicated OS thread** because every collaborator
//! call is blocking. Communication with async callers uses
//! `tokio::sync::mpsc` channels.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lwk_wollet::elements::Txid;

use crate::chain::ChainBackend;
use crate::error::WatcherError;
use crate::order::{Order, OrderStatus};
use crate::repository::OrderRepository;
use crate::trade::{Trade, TradeStatus};
use crate::wallet::WalletService;

/// How long an order may stay `Pending` before it expires.
pub const ORDER_EXPIRY: Duration = Duration::from_secs(10 * 60);

// ── Public types ────────────────────────────────────────────────────

/// Commands sent to the watcher thread.
#[derive(Debug)]
pub enum WatchCmd {
    SweepNow,
    Shutdown,
}

/// Events emitted by the watcher thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    StatusChanged {
        order_id: String,
        status: OrderStatus,
        txid: Option<Txid>,
    },
    ExecutionFailed {
        order_id: String,
        reason: String,
    },
    SweepFailed {
        reason: String,
    },
}

/// Configuration for the watcher thread.
#[derive(Debug, Clone)]
pub struct OrderWatcherConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// How often the thread checks for commands (default: 250ms).
    pub poll_interval: Duration,
}

impl OrderWatcherConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: Vec<String>,
    pub funded: Vec<String>,
    pub fulfilled: Vec<(String, Txid)>,
    /// Orders whose turn failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Orders skipped because another caller held their lock.
    pub skipped: Vec<String>,
}

impl SweepReport {
    pub fn events(&self) -> Vec<WatchEvent> {
        let changed = |id: &String, status, txid| WatchEvent::StatusChanged {
            order_id: id.clone(),
            status,
            txid,
        };
        let mut events = Vec::new();
        events.extend(self.expired.iter().map(|id| changed(id, OrderStatus::Expired, None)));
        events.extend(self.funded.iter().map(|id| changed(id, OrderStatus::Funded, None)));
        events.extend(
            self.fulfilled
                .iter()
                .map(|(id, txid)| changed(id, OrderStatus::Fulfilled, Some(*txid))),
        );
        events.extend(
            self.failed
                .iter()
                .map(|(id, reason)| WatchEvent::ExecutionFailed {
                    order_id: id.clone(),
                    reason: reason.clone(),
                }),
        );
        events
    }
}

// ── Order locks ─────────────────────────────────────────────────────

/// Set of order ids with an operation in flight.
#[derive(Debug, Default)]
pub struct OrderLocks {
    held: Mutex<HashSet<String>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `order_id`, or `None` if it is already held.
    pub fn try_lock(&self, order_id: &str) -> Result<Option<OrderLockGuard<'_>>, WatcherError> {
        let mut held = self.held.lock().map_err(|_| WatcherError::MutexPoisoned)?;
        if !held.insert(order_id.to_string()) {
            return Ok(None);
        }
        Ok(Some(OrderLockGuard {
            locks: self,
            order_id: order_id.to_string(),
        }))
    }

    pub fn is_locked(&self, order_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(order_id))
            .unwrap_or(false)
    }
}

/// Releases its order lock on drop.
#[derive(Debug)]
pub struct OrderLockGuard<'a> {
    locks: &'a OrderLocks,
    order_id: String,
}

impl Drop for OrderLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.order_id);
    }
}

// ── Sweep ───────────────────────────────────────────────────────────

pub struct OrderWatcher<R, C, W> {
    repository: Arc<Mutex<R>>,
    chain: Arc<C>,
    wallet: Arc<W>,
    locks: Arc<OrderLocks>,
    expiry: Duration,
}

impl<R, C, W> OrderWatcher<R, C, W>
where
    R: OrderRepository,
    C: ChainBackend,
    W: WalletService,
{
    pub fn new(
        repository: Arc<Mutex<R>>,
        chain: Arc<C>,
        wallet: Arc<W>,
        locks: Arc<OrderLocks>,
    ) -> Self {
        Self {
            repository,
            chain,
            wallet,
            locks,
            expiry: ORDER_EXPIRY,
        }
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn locks(&self) -> &Arc<OrderLocks> {
        &self.locks
    }

    fn repo(&self) -> Result<MutexGuard<'_, R>, WatcherError> {
        self.repository
            .lock()
            .map_err(|_| WatcherError::MutexPoisoned)
    }

    /// Run one sweep now.
    pub fn sweep(&self) -> Result<SweepReport, WatcherError> {
        self.sweep_at(Utc::now())
    }

    /// Run one sweep, judging expiry against `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, WatcherError> {
        let open = self.repo()?.list_pending()?;
        let mut report = SweepReport::default();

        for (order, status) in open {
            report.examined += 1;
            match self.process_order(&order, status, now, &mut report) {
                Ok(()) => {}
                Err(WatcherError::MutexPoisoned) => return Err(WatcherError::MutexPoisoned),
                Err(e) => {
                    log::warn!("order_watcher: order {} failed: {e}", order.id());
                    report.failed.push((order.id().to_string(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    fn process_order(
        &self,
        order: &Order,
        listed: OrderStatus,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> Result<(), WatcherError> {
        let id = order.id();
        let Some(_guard) = self.locks.try_lock(id)? else {
            log::debug!("order_watcher: order {id} is busy, skipping");
            report.skipped.push(id.to_string());
            return Ok(());
        };

        // Re-read under the lock; another caller may have moved the order on.
        let status = match self.repo()?.get_by_id(id)? {
            Some((_, status)) => status,
            None => return Ok(()),
        };
        if status != listed {
            log::debug!("order_watcher: order {id} moved from {listed} to {status}");
        }
        if status.is_terminal() {
            return Ok(());
        }

        if status == OrderStatus::Pending && order.is_expired(now, self.expiry) {
            self.repo()?
                .append_status(id, OrderStatus::Expired, now, None)?;
            log::info!("order_watcher: order {id} expired");
            report.expired.push(id.to_string());
            return Ok(());
        }

        let utxos = match self.chain.fetch_utxos(order.funding_address()) {
            Ok(utxos) => utxos,
            Err(e) => {
                log::warn!("order_watcher: fetching UTXOs for order {id} failed: {e}");
                report.failed.push((id.to_string(), e.to_string()));
                return Ok(());
            }
        };

        let mut trade = Trade::detect_funding(order, &utxos);
        if trade.status() != TradeStatus::Funded {
            log::debug!("order_watcher: order {id} awaiting funding");
            return Ok(());
        }

        if status == OrderStatus::Pending {
            self.repo()?
                .append_status(id, OrderStatus::Funded, now, None)?;
            log::info!(
                "order_watcher: order {id} funded with {} sats",
                trade.funded_amount()
            );
            report.funded.push(id.to_string());
        }

        match trade.execute(self.wallet.as_ref()) {
            Ok(txid) => {
                self.repo()?
                    .append_status(id, OrderStatus::Fulfilled, Utc::now(), Some(txid))?;
                log::info!("order_watcher: order {id} fulfilled in {txid}");
                report.fulfilled.push((id.to_string(), txid));
            }
            Err(e) => {
                log::warn!("order_watcher: executing order {id} failed: {e}");
                report.failed.push((id.to_string(), e.to_string()));
            }
        }
        Ok(())
    }
}

/// Handle for sending commands to a running watcher thread.
#[derive(Clone)]
pub struct OrderWatcherHandle {
    cmd_tx: tokio::sync::mpsc::UnboundedSender<WatchCmd>,
}

impl OrderWatcherHandle {
    /// Ask for a sweep without waiting for the interval.
    pub fn sweep_now(&self) {
        let _ = self.cmd_tx.send(WatchCmd::SweepNow);
    }

    /// Shut down the watcher thread.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(WatchCmd::Shutdown);
    }
}

// ── Spawn ───────────────────────────────────────────────────────────

/// Spawn the order watcher on a dedicated OS thread.
///
/// The first sweep runs immediately. Returns a handle for sending commands,
/// and a receiver for watch events.
pub fn spawn_order_watcher<R, C, W>(
    watcher: OrderWatcher<R, C, W>,
    config: OrderWatcherConfig,
) -> Result<
    (
        OrderWatcherHandle,
        tokio::sync::mpsc::UnboundedReceiver<WatchEvent>,
    ),
    WatcherError,
>
where
    R: OrderRepository,
    C: ChainBackend + Send + Sync + 'static,
    W: WalletService + Send + Sync + 'static,
{
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = OrderWatcherHandle { cmd_tx };

    std::thread::Builder::new()
        .name("order-watcher".into())
        .spawn(move || {
            watcher_thread_main(watcher, config, cmd_rx, event_tx);
        })
        .map_err(|e| WatcherError::Spawn(e.to_string()))?;

    Ok((handle, event_rx))
}

/// Main loop of the watcher thread.
fn watcher_thread_main<R, C, W>(
    watcher: OrderWatcher<R, C, W>,
    config: OrderWatcherConfig,
    mut cmd_rx: tokio::sync::mpsc::UnboundedReceiver<WatchCmd>,
    event_tx: tokio::sync::mpsc::UnboundedSender<WatchEvent>,
) where
    R: OrderRepository,
    C: ChainBackend,
    W: WalletService,
{
    log::info!(
        "order_watcher: started, sweeping every {:?}",
        config.interval
    );
    let mut last_sweep: Option<Instant> = None;

    loop {
        // 1. Drain all pending commands (non-blocking)
        let mut sweep_requested = false;
        loop {
            match cmd_rx.try_recv() {
                Ok(WatchCmd::SweepNow) => sweep_requested = true,
                Ok(WatchCmd::Shutdown) => {
                    log::info!("order_watcher: shutting down");
                    return;
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    log::info!("order_watcher: command channel closed, shutting down");
                    return;
                }
            }
        }

        // 2. Sweep when asked or when the interval has passed
        let due = last_sweep.is_none_or(|at| at.elapsed() >= config.interval);
        if sweep_requested || due {
            match watcher.sweep() {
                Ok(report) => {
                    log::debug!(
                        "order_watcher: sweep examined {} order(s)",
                        report.examined
                    );
                    for event in report.events() {
                        let _ = event_tx.send(event);
                    }
                }
                Err(e) => {
                    log::warn!("order_watcher: sweep failed: {e}");
                    let _ = event_tx.send(WatchEvent::SweepFailed {
                        reason: e.to_string(),
                    });
                }
            }
            last_sweep = Some(Instant::now());
        }

        // 3. Sleep before next poll
        std::thread::sleep(config.poll_interval);
    }
}

// ── Tests ───────────────────────────────────────────────────────────
