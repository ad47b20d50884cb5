//! mev-data crate
//!
//! Block input model, chain constants and token price oracles.

pub mod chain;
pub mod prices;
pub mod types;

pub use chain::ChainConstants;
pub use prices::{LlamaPriceOracle, PriceOracle, StaticPriceOracle, TokenPrice};
pub use types::{Asset, BlockTransaction, RichBlock, Trace, TxReceipt};
