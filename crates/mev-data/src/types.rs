//! Type definitions for the block input consumed by the classifier.
//!
//! A [`RichBlock`] is the ingestion boundary: one finalized block with its
//! transactions, the value-transfer traces they produced, and their receipts.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, B256, U256};
use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};

/// A transferable asset: the chain's native currency or an ERC-20 token.
///
/// Serialized as `"native"` or as the lowercase token address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Asset {
    /// Native currency (ETH, BNB, MATIC, ...).
    Native,
    /// ERC-20 token identified by its contract address.
    Erc20(Address),
}

impl Asset {
    /// Token contract address, `None` for the native currency.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Native => None,
            Self::Erc20(addr) => Some(*addr),
        }
    }

    /// Folds the wrapped-native token into [`Asset::Native`].
    pub fn normalize(self, wrapped_native: Address) -> Self {
        match self {
            Self::Erc20(addr) if addr == wrapped_native => Self::Native,
            other => other,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Erc20(addr) => write!(f, "{addr:#x}"),
        }
    }
}

impl FromStr for Asset {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("native") {
            return Ok(Self::Native);
        }
        trimmed
            .parse::<Address>()
            .map(Self::Erc20)
            .map_err(|e| eyre!("invalid asset {trimmed:?}: {e}"))
    }
}

impl TryFrom<String> for Asset {
    type Error = eyre::Report;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Asset> for String {
    fn from(asset: Asset) -> Self {
        asset.to_string()
    }
}

/// Transaction included in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Position in the block.
    pub index: u64,
    /// Sender (EOA).
    pub from: Address,
    /// Immediate recipient; `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,
    /// Gas price in Wei.
    pub gas_price: u128,
    /// Raw calldata.
    #[serde(default)]
    pub input: Bytes,
}

/// Execution receipt of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: B256,
    /// Execution status (1=success, 0=revert).
    pub status: u8,
    /// Gas consumed; some nodes omit it.
    #[serde(default)]
    pub gas_used: Option<u64>,
}

impl TxReceipt {
    /// Whether the transaction reverted.
    pub fn reverted(&self) -> bool {
        self.status == 0
    }
}

/// One value transfer observed while executing a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    /// Transaction that produced the transfer.
    pub tx_hash: B256,
    /// Address the value left.
    pub from: Address,
    /// Address the value arrived at.
    pub to: Address,
    /// Transferred asset.
    pub asset: Asset,
    /// Raw amount (token base units).
    pub amount: U256,
    /// Contract invoked by the call that produced this transfer.
    #[serde(default)]
    pub call_target: Option<Address>,
}

/// A finalized block with everything the classifier needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichBlock {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Coinbase / fee recipient of the block.
    pub fee_recipient: Address,
    /// Transactions in block order.
    pub transactions: Vec<BlockTransaction>,
    /// Value-transfer traces of all transactions, in execution order.
    #[serde(default)]
    pub traces: Vec<Trace>,
    /// Receipts of all transactions.
    #[serde(default)]
    pub receipts: Vec<TxReceipt>,
}

impl RichBlock {
    /// Reads a block from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid block document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read block file {}", path.display()))?;
        let block: Self = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse block file {}", path.display()))?;
        tracing::debug!(
            block_number = block.number,
            txs = block.transactions.len(),
            traces = block.traces.len(),
            "loaded block"
        );
        Ok(block)
    }

    /// Reads several block files, sorted by block number.
    ///
    /// # Errors
    /// Fails on the first unreadable file.
    pub fn load_many<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Self>> {
        let mut blocks = paths.iter().map(Self::load).collect::<Result<Vec<_>>>()?;
        blocks.sort_by_key(|block| block.number);
        Ok(blocks)
    }

    /// Block timestamp as a UTC datetime, if representable.
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let secs = i64::try_from(self.timestamp).ok()?;
        chrono::DateTime::from_timestamp(secs, 0)
    }
}
