use chrono::{DateTime, Utc};
use lwk_wollet::elements::Txid;

use crate::error::Result;
use crate::order::{Order, OrderStatus};

/// One entry of an order's append-only status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    /// Settlement transaction, recorded with `Fulfilled`.
    pub txid: Option<Txid>,
}

/// Trait abstracting the order persistence the watcher and service need.
///
/// This avoids a dependency from `tapswap-sdk` on `tapswap-store`.
/// The `tapswap-store` crate implements this trait for `SwapStore`.
pub trait OrderRepository: Send + 'static {
    /// Persist a new order and record its initial `Pending` status.
    fn save(&mut self, order: &Order) -> Result<()>;

    /// The order and its current (latest) status.
    fn get_by_id(&mut self, id: &str) -> Result<Option<(Order, OrderStatus)>>;

    /// Every order whose current status is `Pending` or `Funded`, oldest first.
    fn list_pending(&mut self) -> Result<Vec<(Order, OrderStatus)>>;

    /// Append a status entry. The order must exist.
    fn append_status(
        &mut self,
        id: &str,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
        txid: Option<Txid>,
    ) -> Result<()>;

    /// The full status log of an order, oldest first.
    fn status_history(&mut self, id: &str) -> Result<Vec<StatusEntry>>;
}
