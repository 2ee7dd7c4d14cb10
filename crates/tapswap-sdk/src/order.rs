use chrono::{DateTime, Utc};
use lwk_wollet::elements::{Address, AssetId, Script};
use serde::{Deserialize, Serialize};

use crate::asset::AssetRegistry;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::script::{fulfill_script, refund_script};
use crate::taproot::FundingOutput;

/// Lifecycle status of an order, as recorded by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Funded,
    Fulfilled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Funded => "Funded",
            OrderStatus::Fulfilled => "Fulfilled",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Expired => "Expired",
        }
    }

    /// Statuses the watcher still acts on.
    pub fn is_open(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Funded)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Funded" => Ok(OrderStatus::Funded),
            "Fulfilled" => Ok(OrderStatus::Fulfilled),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            "Expired" => Ok(OrderStatus::Expired),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// An amount of a specific asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetAmount {
    pub asset: AssetId,
    pub amount: u64,
}

/// A swap order: the trader sends `input` to the funding address and
/// receives `output` at `trader_script`.
///
/// Orders are immutable once built; every field is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: String,
    created_at: DateTime<Utc>,
    network: Network,
    trader_script: Script,
    input: AssetAmount,
    output: AssetAmount,
    fulfill_script: Script,
    refund_script: Script,
    script_tree: FundingOutput,
}

/// The stored fields of an order, used to rebuild it after loading.
#[derive(Debug, Clone)]
pub struct OrderParts {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub network: Network,
    pub trader_script: Script,
    pub input: AssetAmount,
    pub output: AssetAmount,
    pub fulfill_script: Script,
    pub refund_script: Script,
    pub funding_address: String,
}

impl Order {
    /// Rebuild an order from stored parts, re-deriving its script tree.
    ///
    /// Fails with [`Error::ScriptTree`] if the derived address does not match
    /// the stored one.
    pub fn from_parts(parts: OrderParts) -> Result<Self> {
        let script_tree =
            FundingOutput::build(&parts.fulfill_script, &parts.refund_script, parts.network)?;
        let derived = script_tree.address().to_string();
        if derived != parts.funding_address {
            return Err(Error::ScriptTree(format!(
                "order {}: stored address {} does not match derived address {derived}",
                parts.id, parts.funding_address
            )));
        }
        Ok(Self {
            id: parts.id,
            created_at: parts.created_at,
            network: parts.network,
            trader_script: parts.trader_script,
            input: parts.input,
            output: parts.output,
            fulfill_script: parts.fulfill_script,
            refund_script: parts.refund_script,
            script_tree,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn trader_script(&self) -> &Script {
        &self.trader_script
    }

    /// What the trader sends.
    pub fn input(&self) -> &AssetAmount {
        &self.input
    }

    /// What the trader receives.
    pub fn output(&self) -> &AssetAmount {
        &self.output
    }

    pub fn fulfill_script(&self) -> &Script {
        &self.fulfill_script
    }

    pub fn refund_script(&self) -> &Script {
        &self.refund_script
    }

    pub fn script_tree(&self) -> &FundingOutput {
        &self.script_tree
    }

    pub fn funding_address(&self) -> &Address {
        self.script_tree.address()
    }

    /// Whether the order has waited longer than `expiry` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, expiry: std::time::Duration) -> bool {
        match (now - self.created_at).to_std() {
            Ok(elapsed) => elapsed > expiry,
            Err(_) => false,
        }
    }

    /// Input amount as a decimal string, if the registry knows the asset.
    pub fn input_value(&self, registry: &AssetRegistry) -> Option<String> {
        registry
            .by_id(&self.input.asset)
            .map(|a| a.format_amount(self.input.amount))
    }

    /// Output amount as a decimal string, if the registry knows the asset.
    pub fn output_value(&self, registry: &AssetRegistry) -> Option<String> {
        registry
            .by_id(&self.output.asset)
            .map(|a| a.format_amount(self.output.amount))
    }

    pub fn into_parts(self) -> OrderParts {
        let funding_address = self.script_tree.address().to_string();
        OrderParts {
            id: self.id,
            created_at: self.created_at,
            network: self.network,
            trader_script: self.trader_script,
            input: self.input,
            output: self.output,
            fulfill_script: self.fulfill_script,
            refund_script: self.refund_script,
            funding_address,
        }
    }
}

/// Builds orders for one network from ticker/decimal requests.
#[derive(Debug, Clone)]
pub struct OrderFactory {
    registry: AssetRegistry,
}

impl OrderFactory {
    pub fn new(registry: AssetRegistry) -> Self {
        Self { registry }
    }

    pub fn network(&self) -> Network {
        self.registry.network()
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Create an order swapping `input_value` of `input_currency` for
    /// `output_value` of `output_currency`, paid out to `trader_script_hex`.
    pub fn create(
        &self,
        trader_script_hex: &str,
        input_currency: &str,
        input_value: &str,
        output_currency: &str,
        output_value: &str,
    ) -> Result<Order> {
        self.create_at(
            trader_script_hex,
            input_currency,
            input_value,
            output_currency,
            output_value,
            Utc::now(),
        )
    }

    /// Same as [`OrderFactory::create`] with an explicit creation time.
    pub fn create_at(
        &self,
        trader_script_hex: &str,
        input_currency: &str,
        input_value: &str,
        output_currency: &str,
        output_value: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Order> {
        let trader_script = hex::decode(trader_script_hex)
            .map(Script::from)
            .map_err(|e| Error::ScriptCompile(format!("trader script is not hex: {e}")))?;

        let input_asset = self.registry.by_ticker(input_currency)?;
        let output_asset = self.registry.by_ticker(output_currency)?;

        let input_amount = positive_amount(input_asset.to_base_units(input_value)?, input_value)?;
        let output_amount =
            positive_amount(output_asset.to_base_units(output_value)?, output_value)?;

        let fulfill = fulfill_script(&trader_script, output_amount, &output_asset.id)?;
        let refund = refund_script(&trader_script, input_amount, &input_asset.id)?;
        let network = self.registry.network();
        let script_tree = FundingOutput::build(&fulfill, &refund, network)?;

        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            created_at,
            network,
            trader_script,
            input: AssetAmount {
                asset: input_asset.id,
                amount: input_amount,
            },
            output: AssetAmount {
                asset: output_asset.id,
                amount: output_amount,
            },
            fulfill_script: fulfill,
            refund_script: refund,
            script_tree,
        };
        log::debug!(
            "created order {} paying to {}",
            order.id,
            order.funding_address()
        );
        Ok(order)
    }
}

fn positive_amount(amount: u64, raw: &str) -> Result<u64> {
    if amount == 0 {
        return Err(Error::InvalidAmount(format!("'{raw}' rounds to zero")));
    }
    Ok(amount)
}
