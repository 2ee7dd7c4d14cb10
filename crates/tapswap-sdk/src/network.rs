use lwk_wollet::ElementsNetwork;
use lwk_wollet::elements::{AddressParams, AssetId};
use serde::{Deserialize, Serialize};

/// Network variants for Liquid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Liquid,
    LiquidTestnet,
    LiquidRegtest,
}

impl Network {
    pub fn into_lwk(self) -> ElementsNetwork {
        match self {
            Network::Liquid => ElementsNetwork::Liquid,
            Network::LiquidTestnet => ElementsNetwork::LiquidTestnet,
            Network::LiquidRegtest => ElementsNetwork::default_regtest(),
        }
    }

    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Liquid)
    }

    /// The asset that pays transaction fees (L-BTC on every network).
    pub fn policy_asset(self) -> AssetId {
        self.into_lwk().policy_asset()
    }

    pub fn default_electrum_url(self) -> &'static str {
        match self {
            Network::Liquid => "ssl://blockstream.info:995",
            Network::LiquidTestnet => "ssl://blockstream.info:465",
            Network::LiquidRegtest => "tcp://localhost:50001",
        }
    }

    /// Address parameters: `ex`/`lq` on Liquid, `tex`/`tlq` on testnet, `ert`/`el` on regtest.
    pub fn address_params(self) -> &'static AddressParams {
        match self {
            Network::Liquid => &AddressParams::LIQUID,
            Network::LiquidTestnet => &AddressParams::LIQUID_TESTNET,
            Network::LiquidRegtest => &AddressParams::ELEMENTS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Liquid => "liquid",
            Network::LiquidTestnet => "testnet",
            Network::LiquidRegtest => "regtest",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "liquid" => Ok(Network::Liquid),
            "testnet" | "liquid-testnet" | "liquidtestnet" => Ok(Network::LiquidTestnet),
            "regtest" | "liquid-regtest" | "liquidregtest" => Ok(Network::LiquidRegtest),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!("liquid".parse::<Network>().unwrap(), Network::Liquid);
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Liquid);
        assert_eq!(
            "liquid-testnet".parse::<Network>().unwrap(),
            Network::LiquidTestnet
        );
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::LiquidRegtest);
        assert!("bitcoin".parse::<Network>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for network in [
            Network::Liquid,
            Network::LiquidTestnet,
            Network::LiquidRegtest,
        ] {
            assert_eq!(network.to_string().parse::<Network>().unwrap(), network);
        }
    }

    #[test]
    fn policy_assets() {
        assert_eq!(
            Network::Liquid.policy_asset().to_string(),
            "6f0279e9ed041c3d710a9f57d0c02928416460c4b722ae3457a11eec381c526d"
        );
        assert_eq!(
            Network::LiquidTestnet.policy_asset().to_string(),
            "144c654344aa716d6f3abcc1ca90e5641e4e2a7f633bc09fe3baf64585819a49"
        );
    }

    #[test]
    fn address_prefixes() {
        assert_eq!(Network::Liquid.address_params().bech_hrp.as_str(), "ex");
        assert_eq!(Network::LiquidTestnet.address_params().bech_hrp.as_str(), "tex");
        assert_eq!(Network::LiquidRegtest.address_params().bech_hrp.as_str(), "ert");
    }
}
