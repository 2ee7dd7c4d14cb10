use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use tapswap_sdk::elements::Txid;
use tapswap_sdk::{Network, Order, OrderRepository, OrderStatus, StatusEntry};

use crate::conversions::{new_order_row, new_status_row, status_from_text, timestamp_to_text};
use crate::error::StoreError;
use crate::models::{OrderRow, OrderStatusRow};
use crate::schema::{order_statuses, orders};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// --- Public types ---

/// An order with its current status.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order: Order,
    pub status: OrderStatus,
    /// When the current status was recorded.
    pub updated_at: DateTime<Utc>,
    /// Settlement transaction, once fulfilled.
    pub txid: Option<Txid>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub network: Option<Network>,
    pub status: Option<OrderStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

// --- SwapStore ---

/// Persistent storage for swap orders and their status log.
///
/// All methods take `&mut self` because Diesel's `SqliteConnection` requires
/// `&mut` for all operations, including reads.
pub struct SwapStore {
    conn: SqliteConnection,
}

impl SwapStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        let conn = SqliteConnection::establish(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = SqliteConnection::establish(":memory:")?;
        Self::init(conn)
    }

    fn init(mut conn: SqliteConnection) -> crate::Result<Self> {
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(SwapStore { conn })
    }

    // ==================== Orders ====================

    /// Insert a new order together with its initial `Pending` entry, stamped
    /// with the order's creation time.
    pub fn insert_order(&mut self, order: &Order) -> crate::Result<()> {
        let row = new_order_row(order)?;
        let pending = new_status_row(order.id(), OrderStatus::Pending, &order.created_at(), None);

        self.conn.transaction::<_, StoreError, _>(|conn| {
            diesel::insert_into(orders::table)
                .values(&row)
                .execute(conn)?;
            diesel::insert_into(order_statuses::table)
                .values(&pending)
                .execute(conn)?;
            Ok(())
        })?;
        log::debug!("store: inserted order {}", order.id());
        Ok(())
    }

    pub fn get_order(&mut self, id: &str) -> crate::Result<Option<OrderRecord>> {
        let row: Option<OrderRow> = orders::table
            .filter(orders::id.eq(id))
            .select(OrderRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let latest: Option<OrderStatusRow> = order_statuses::table
            .filter(order_statuses::order_id.eq(id))
            .order(order_statuses::id.desc())
            .select(OrderStatusRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        let latest = latest.ok_or_else(|| {
            StoreError::InvalidData(format!("order {id} has no status entries"))
        })?;

        record_from_rows(&row, &latest).map(Some)
    }

    /// Orders matching `filter`, oldest first.
    pub fn list_orders(&mut self, filter: &OrderFilter) -> crate::Result<Vec<OrderRecord>> {
        let mut query = orders::table
            .select(OrderRow::as_select())
            .order(orders::created_at.asc())
            .into_boxed();
        if let Some(network) = filter.network {
            query = query.filter(orders::network.eq(network.as_str()));
        }
        if let Some(after) = filter.created_after {
            query = query.filter(
                orders::created_at.gt(timestamp_to_text(&after)),
            );
        }
        let rows: Vec<OrderRow> = query.load(&mut self.conn)?;

        let latest = self.latest_statuses()?;
        let mut records = Vec::new();
        for row in &rows {
            let status_row = latest.get(&row.id).ok_or_else(|| {
                StoreError::InvalidData(format!("order {} has no status entries", row.id))
            })?;
            let record = record_from_rows(row, status_row)?;
            if filter.status.is_some_and(|s| s != record.status) {
                continue;
            }
            records.push(record);
            if filter.limit.is_some_and(|lim| records.len() >= lim) {
                break;
            }
        }
        Ok(records)
    }

    /// Orders the watcher still acts on (`Pending` or `Funded`), oldest first.
    ///
    /// Only rows whose latest status is open are decoded. An open row that
    /// fails to decode is logged and skipped so the other orders still settle.
    pub fn list_open(&mut self) -> crate::Result<Vec<OrderRecord>> {
        let latest: HashMap<String, OrderStatusRow> = self
            .latest_statuses()?
            .into_iter()
            .filter(|(_, row)| status_from_text(&row.status).is_ok_and(|s| s.is_open()))
            .collect();
        if latest.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = latest.keys().map(String::as_str).collect();
        let rows: Vec<OrderRow> = orders::table
            .filter(orders::id.eq_any(ids))
            .select(OrderRow::as_select())
            .order(orders::created_at.asc())
            .load(&mut self.conn)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(status_row) = latest.get(&row.id) else {
                continue;
            };
            match record_from_rows(row, status_row) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("store: skipping unreadable open order {}: {e}", row.id),
            }
        }
        Ok(records)
    }

    /// Latest status row per order id.
    fn latest_statuses(&mut self) -> crate::Result<HashMap<String, OrderStatusRow>> {
        let rows: Vec<OrderStatusRow> = order_statuses::table
            .order(order_statuses::id.asc())
            .select(OrderStatusRow::as_select())
            .load(&mut self.conn)?;
        // Later rows overwrite earlier ones.
        Ok(rows
            .into_iter()
            .map(|row| (row.order_id.clone(), row))
            .collect())
    }

    // ==================== Status log ====================

    /// Append a status entry. Fails with [`StoreError::UnknownOrder`] if the
    /// order does not exist.
    pub fn append_status(
        &mut self,
        id: &str,
        status: OrderStatus,
        timestamp: &DateTime<Utc>,
        txid: Option<&Txid>,
    ) -> crate::Result<()> {
        let exists: bool = diesel::select(diesel::dsl::exists(
            orders::table.filter(orders::id.eq(id)),
        ))
        .get_result(&mut self.conn)?;
        if !exists {
            return Err(StoreError::UnknownOrder(id.to_string()));
        }

        diesel::insert_into(order_statuses::table)
            .values(&new_status_row(id, status, timestamp, txid))
            .execute(&mut self.conn)?;
        log::debug!("store: order {id} -> {status}");
        Ok(())
    }

    /// The full status log of an order, oldest first. Empty for unknown ids.
    pub fn status_history(&mut self, id: &str) -> crate::Result<Vec<StatusEntry>> {
        let rows: Vec<OrderStatusRow> = order_statuses::table
            .filter(order_statuses::order_id.eq(id))
            .order(order_statuses::id.asc())
            .select(OrderStatusRow::as_select())
            .load(&mut self.conn)?;
        rows.iter().map(StatusEntry::try_from).collect()
    }
}

fn record_from_rows(row: &OrderRow, latest: &OrderStatusRow) -> crate::Result<OrderRecord> {
    let order = Order::try_from(row)?;
    let entry = StatusEntry::try_from(latest)?;
    Ok(OrderRecord {
        order,
        status: entry.status,
        updated_at: entry.timestamp,
        txid: entry.txid,
    })
}

// ==================== OrderRepository trait impl ====================

impl OrderRepository for SwapStore {
    fn save(&mut self, order: &Order) -> tapswap_sdk::Result<()> {
        Ok(self.insert_order(order)?)
    }

    fn get_by_id(&mut self, id: &str) -> tapswap_sdk::Result<Option<(Order, OrderStatus)>> {
        Ok(self.get_order(id)?.map(|r| (r.order, r.status)))
    }

    fn list_pending(&mut self) -> tapswap_sdk::Result<Vec<(Order, OrderStatus)>> {
        Ok(self
            .list_open()?
            .into_iter()
            .map(|r| (r.order, r.status))
            .collect())
    }

    fn append_status(
        &mut self,
        id: &str,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
        txid: Option<Txid>,
    ) -> tapswap_sdk::Result<()> {
        Ok(SwapStore::append_status(
            self,
            id,
            status,
            &timestamp,
            txid.as_ref(),
        )?)
    }

    fn status_history(&mut self, id: &str) -> tapswap_sdk::Result<Vec<StatusEntry>> {
        Ok(SwapStore::status_history(self, id)?)
    }
}
