//! Static per-chain configuration.
//!
//! Built-in presets cover the chains the classifier is usually run against;
//! any of them can be replaced by a JSON document of the same shape.

use std::collections::BTreeSet;
use std::path::Path;

use alloy::primitives::{address, Address, B256};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Chain-specific constants used during classification and reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConstants {
    /// EIP-155 chain id, passed to the price oracle.
    pub chain_id: u64,
    /// Human-readable preset name.
    pub name: String,
    /// Call targets whose presence rules a transaction out as arbitrage.
    #[serde(default)]
    pub blacklist: BTreeSet<Address>,
    /// Address tokens are minted from and burned to.
    #[serde(default)]
    pub mint_burn_addr: Address,
    /// Wrapped native token (WETH, WBNB, ...).
    pub native_wrapped: Address,
    /// Contracts whose repeated same-gas-price traffic is tracked as spam.
    #[serde(default)]
    pub watch_spam: BTreeSet<Address>,
    /// Explorer URL template; `{hash}` is replaced with the transaction hash.
    pub explorer_link: String,
}

impl ChainConstants {
    /// Ethereum mainnet.
    pub fn ethereum() -> Self {
        Self::new(
            1,
            "ethereum",
            address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            "https://app.sentio.xyz/tx/1/{hash}",
        )
    }

    /// BNB Smart Chain.
    pub fn bsc() -> Self {
        Self::new(
            56,
            "bsc",
            address!("bb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c"),
            "https://app.sentio.xyz/tx/56/{hash}",
        )
    }

    /// Polygon PoS.
    pub fn polygon() -> Self {
        Self::new(
            137,
            "polygon",
            address!("0d500b1d8e8ef31e21c99d1db9a6444d3adf1270"),
            "https://app.sentio.xyz/tx/137/{hash}",
        )
    }

    /// Moonbeam.
    pub fn moonbeam() -> Self {
        Self::new(
            1284,
            "moonbeam",
            address!("acc15dc74880c9944775448304b263d191c6077f"),
            "https://app.sentio.xyz/tx/1284/{hash}",
        )
    }

    fn new(chain_id: u64, name: &str, native_wrapped: Address, explorer_link: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            blacklist: BTreeSet::new(),
            mint_burn_addr: Address::ZERO,
            native_wrapped,
            watch_spam: BTreeSet::new(),
            explorer_link: explorer_link.to_string(),
        }
    }

    /// All built-in presets.
    pub fn presets() -> Vec<Self> {
        vec![Self::ethereum(), Self::bsc(), Self::polygon(), Self::moonbeam()]
    }

    /// Looks up a built-in preset by name (case-insensitive) or chain id.
    pub fn preset(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::presets().into_iter().find(|chain| {
            chain.name.eq_ignore_ascii_case(wanted) || chain.chain_id.to_string() == wanted
        })
    }

    /// Reads chain constants from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read chain config {}", path.display()))?;
        serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse chain config {}", path.display()))
    }

    /// Explorer link for a transaction.
    pub fn tx_link(&self, hash: &B256) -> String {
        self.explorer_link.replace("{hash}", &format!("{hash}"))
    }
}
