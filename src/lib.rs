pub mod config;
pub mod logging;
pub mod service;

pub use config::{Config, ConfigOverrides};
pub use service::{
    OrderBook, OrderView, ServiceError, SwapService, open_chain, open_store, open_wallet,
};
