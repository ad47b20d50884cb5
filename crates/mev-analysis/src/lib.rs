//! mev-analysis crate
//!
//! Per-block MEV classification: token flow graphs, SCC-based arbitrage
//! detection, sandwich detection, watched-contract spam grouping, USD
//! valuation of the results and event emission.

pub mod arbitrage;
pub mod balances;
pub mod block;
pub mod pnl;
pub mod report;
pub mod rewards;
pub mod sandwich;
pub mod token_graph;
pub mod txn_data;

#[cfg(test)]
pub(crate) mod testutil;

pub use block::{handle_block, BlockMevResult, SpamInfo};
pub use pnl::{compute_pnl, PnL, PnlContext};
pub use report::{emit_block, EmitStats, EventSink, JsonLinesSink, MevEvent};
pub use rewards::{txn_profit_and_cost, TxnResult};
pub use sandwich::SandwichResult;
