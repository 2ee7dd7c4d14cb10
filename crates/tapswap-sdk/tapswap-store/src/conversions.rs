use chrono::{DateTime, SecondsFormat, Utc};
use tapswap_sdk::elements::{AssetId, Script, Txid};
use tapswap_sdk::{AssetAmount, Network, Order, OrderParts, OrderStatus, StatusEntry};

use crate::error::StoreError;
use crate::models::{NewOrderRow, NewOrderStatusRow, OrderRow, OrderStatusRow};

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub fn timestamp_to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn timestamp_from_text(text: &str, field: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("{field}: {e}")))
}

fn amount_to_i64(amount: u64, field: &str) -> std::result::Result<i64, StoreError> {
    i64::try_from(amount)
        .map_err(|_| StoreError::InvalidData(format!("{field}: {amount} does not fit in BIGINT")))
}

fn amount_from_i64(amount: i64, field: &str) -> std::result::Result<u64, StoreError> {
    u64::try_from(amount)
        .map_err(|_| StoreError::InvalidData(format!("{field}: negative amount {amount}")))
}

fn asset_from_text(text: &str, field: &str) -> std::result::Result<AssetId, StoreError> {
    text.parse()
        .map_err(|e| StoreError::InvalidData(format!("{field}: {e}")))
}

// --- Order <-> rows ---

pub fn new_order_row(order: &Order) -> std::result::Result<NewOrderRow, StoreError> {
    Ok(NewOrderRow {
        id: order.id().to_string(),
        network: order.network().as_str().to_string(),
        created_at: timestamp_to_text(&order.created_at()),
        funding_address: order.funding_address().to_string(),
        trader_script: order.trader_script().to_bytes(),
        input_asset: order.input().asset.to_string(),
        input_amount: amount_to_i64(order.input().amount, "input_amount")?,
        output_asset: order.output().asset.to_string(),
        output_amount: amount_to_i64(order.output().amount, "output_amount")?,
        fulfill_script: order.fulfill_script().to_bytes(),
        refund_script: order.refund_script().to_bytes(),
    })
}

impl TryFrom<&OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: &OrderRow) -> std::result::Result<Self, Self::Error> {
        let network: Network = row
            .network
            .parse()
            .map_err(|e: String| StoreError::InvalidData(e))?;
        let parts = OrderParts {
            id: row.id.clone(),
            created_at: timestamp_from_text(&row.created_at, "created_at")?,
            network,
            trader_script: Script::from(row.trader_script.clone()),
            input: AssetAmount {
                asset: asset_from_text(&row.input_asset, "input_asset")?,
                amount: amount_from_i64(row.input_amount, "input_amount")?,
            },
            output: AssetAmount {
                asset: asset_from_text(&row.output_asset, "output_asset")?,
                amount: amount_from_i64(row.output_amount, "output_amount")?,
            },
            fulfill_script: Script::from(row.fulfill_script.clone()),
            refund_script: Script::from(row.refund_script.clone()),
            funding_address: row.funding_address.clone(),
        };
        // Re-derives the script tree and checks it against the stored address.
        Ok(Order::from_parts(parts)?)
    }
}

// --- Status log ---

pub fn new_status_row(
    order_id: &str,
    status: OrderStatus,
    timestamp: &DateTime<Utc>,
    txid: Option<&Txid>,
) -> NewOrderStatusRow {
    NewOrderStatusRow {
        order_id: order_id.to_string(),
        status: status.as_str().to_string(),
        recorded_at: timestamp_to_text(timestamp),
        tx_hash: txid.map(|t| t.to_string()),
    }
}

pub fn status_from_text(text: &str) -> std::result::Result<OrderStatus, StoreError> {
    text.parse().map_err(StoreError::InvalidData)
}

impl TryFrom<&OrderStatusRow> for StatusEntry {
    type Error = StoreError;

    fn try_from(row: &OrderStatusRow) -> std::result::Result<Self, Self::Error> {
        let txid = row
            .tx_hash
            .as_deref()
            .map(|hash| {
                hash.parse::<Txid>()
                    .map_err(|e| StoreError::InvalidData(format!("tx_hash: {e}")))
            })
            .transpose()?;
        Ok(StatusEntry {
            status: status_from_text(&row.status)?,
            timestamp: timestamp_from_text(&row.recorded_at, "recorded_at")?,
            txid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_round_trip_exactly() {
        let ts = DateTime::parse_from_rfc3339("2025-03-04T05:06:07.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = timestamp_to_text(&ts);
        assert_eq!(text, "2025-03-04T05:06:07.123456789Z");
        assert_eq!(timestamp_from_text(&text, "t").unwrap(), ts);
        assert!(timestamp_from_text("yesterday", "t").is_err());
    }

    #[test]
    fn amounts_reject_out_of_range() {
        assert!(amount_to_i64(u64::MAX, "a").is_err());
        assert!(amount_from_i64(-1, "a").is_err());
        assert_eq!(amount_from_i64(42, "a").unwrap(), 42);
    }

    #[test]
    fn status_text_is_exact() {
        assert_eq!(status_from_text("Funded").unwrap(), OrderStatus::Funded);
        assert!(matches!(
            status_from_text("funded"),
            Err(StoreError::InvalidData(_))
        ));
    }
}
