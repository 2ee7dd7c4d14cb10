use diesel::prelude::*;

use crate::schema::{order_statuses, orders};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = orders)]
pub struct OrderRow {
    pub id: String,
    pub network: String,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub funding_address: String,
    pub trader_script: Vec<u8>,
    pub input_asset: String,
    pub input_amount: i64,
    pub output_asset: String,
    pub output_amount: i64,
    pub fulfill_script: Vec<u8>,
    pub refund_script: Vec<u8>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: String,
    pub network: String,
    pub created_at: String,
    pub funding_address: String,
    pub trader_script: Vec<u8>,
    pub input_asset: String,
    pub input_amount: i64,
    pub output_asset: String,
    pub output_amount: i64,
    pub fulfill_script: Vec<u8>,
    pub refund_script: Vec<u8>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = order_statuses)]
pub struct OrderStatusRow {
    pub id: i32,
    pub order_id: String,
    pub status: String,
    pub recorded_at: String,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = order_statuses)]
pub struct NewOrderStatusRow {
    pub order_id: String,
    pub status: String,
    pub recorded_at: String,
    pub tx_hash: Option<String>,
}
