//! Priced event records and the sinks they are written to.
//!
//! [`emit_block`] turns a [`BlockMevResult`] into [`MevEvent`]s: every
//! arbitrage and sandwich is valued through [`compute_pnl`], records whose
//! priced revenue is not positive are dropped, and USD figures are rounded to
//! cents. Spam groups are emitted as-is with their gas price in gwei.

use std::io::Write;

use alloy::primitives::{Address, B256};
use eyre::{Context, Result};
use mev_data::prices::PriceOracle;
use mev_data::types::Asset;
use mev_data::ChainConstants;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::balances::AddressProperty;
use crate::block::BlockMevResult;
use crate::pnl::{compute_pnl, PnlContext};

/// A priced arbitrage transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageRecord {
    pub block_number: u64,
    pub mev_contract: Address,
    /// Explorer link of the transaction.
    pub link: String,
    pub index: u64,
    /// Addresses that took part in the value cycle.
    pub traders: Vec<Address>,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    /// Fee recipient, when it was paid by the transaction.
    pub paid_builder: Option<Address>,
    /// Every asset that moved.
    pub tokens: Vec<Asset>,
    /// Revenue assets with a known price.
    pub profit_tokens: Vec<Asset>,
    pub target_txn_hash: Option<B256>,
    pub target_txn_contract: Option<Address>,
}

/// A priced sandwich. `link`/`index` refer to the back-run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SandwichRecord {
    pub block_number: u64,
    pub mev_contract: Address,
    pub link: String,
    pub index: u64,
    pub front_link: String,
    pub front_index: u64,
    pub revenue: f64,
    pub cost: f64,
    pub profit: f64,
    pub paid_builder: Option<Address>,
    pub profit_tokens: Vec<Asset>,
    pub used_tokens: Vec<Asset>,
}

/// Activity of a watched contract at one gas price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpamRecord {
    pub block_number: u64,
    pub mev_contract: Address,
    /// Gas price in gwei.
    pub gas: f64,
    pub count: usize,
    pub min_index: u64,
    pub max_index: u64,
    /// Number of distinct calldata payloads.
    pub distinct_input: usize,
}

/// One emitted event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MevEvent {
    Arbitrage(ArbitrageRecord),
    Sandwich(SandwichRecord),
    Spam(SpamRecord),
}

/// Destination for emitted events.
pub trait EventSink {
    /// Record one event.
    ///
    /// # Errors
    /// Returns error if the underlying writer fails.
    fn emit(&mut self, event: MevEvent) -> Result<()>;
}

impl EventSink for Vec<MevEvent> {
    fn emit(&mut self, event: MevEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: MevEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &event).wrap_err("failed to encode event")?;
        self.writer
            .write_all(b"\n")
            .wrap_err("failed to write event")?;
        Ok(())
    }
}

/// What [`emit_block`] wrote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub arbitrages: usize,
    pub sandwiches: usize,
    pub spam: usize,
    /// Arbitrages and sandwiches dropped for non-positive revenue.
    pub suppressed: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Price and emit everything found in one block.
///
/// # Errors
/// Returns error if the sink rejects an event.
#[tracing::instrument(skip_all, fields(block = block_number))]
pub async fn emit_block(
    block_number: u64,
    result: &BlockMevResult,
    ctx: &PnlContext,
    chain: &ChainConstants,
    oracle: &dyn PriceOracle,
    sink: &mut dyn EventSink,
) -> Result<EmitStats> {
    let mut stats = EmitStats::default();

    for txn in &result.arb_txns {
        let Some(mev_contract) = txn.mev_contract else {
            continue;
        };
        let pnl = compute_pnl(&txn.revenue, &txn.costs, ctx, oracle).await;
        if pnl.revenue <= 0.0 {
            debug!(tx_hash = %txn.txn_hash, "revenue is 0, likely not a popular token");
            stats.suppressed += 1;
            continue;
        }
        let traders = txn
            .address_property
            .iter()
            .filter(|(_, property)| **property == AddressProperty::Trader)
            .map(|(addr, _)| *addr)
            .collect();

        sink.emit(MevEvent::Arbitrage(ArbitrageRecord {
            block_number,
            mev_contract,
            link: chain.tx_link(&txn.txn_hash),
            index: txn.txn_index,
            traders,
            revenue: round2(pnl.revenue),
            cost: round2(pnl.cost),
            profit: round2(pnl.profit()),
            paid_builder: txn.miner_payment,
            tokens: txn.used_tokens.iter().copied().collect(),
            profit_tokens: pnl.profit_tokens,
            target_txn_hash: txn.target_txn_hash,
            target_txn_contract: txn.target_txn_contract,
        }))?;
        stats.arbitrages += 1;
    }

    for sandwich in &result.sandwich_txns {
        let pnl = compute_pnl(&sandwich.revenue, &sandwich.costs, ctx, oracle).await;
        if pnl.revenue <= 0.0 {
            debug!(
                front = %sandwich.front_txn_hash,
                back = %sandwich.back_txn_hash,
                "revenue is 0, likely not a popular token"
            );
            stats.suppressed += 1;
            continue;
        }
        sink.emit(MevEvent::Sandwich(SandwichRecord {
            block_number,
            mev_contract: sandwich.mev_contract,
            link: chain.tx_link(&sandwich.back_txn_hash),
            index: sandwich.back_txn_index,
            front_link: chain.tx_link(&sandwich.front_txn_hash),
            front_index: sandwich.front_txn_index,
            revenue: round2(pnl.revenue),
            cost: round2(pnl.cost),
            profit: round2(pnl.profit()),
            paid_builder: sandwich.miner_payment,
            profit_tokens: pnl.profit_tokens,
            used_tokens: sandwich.used_tokens.iter().copied().collect(),
        }))?;
        stats.sandwiches += 1;
    }

    for (gas_price, per_contract) in &result.spam_info {
        for (contract, info) in per_contract {
            sink.emit(MevEvent::Spam(SpamRecord {
                block_number,
                mev_contract: *contract,
                gas: *gas_price as f64 / 1e9,
                count: info.count,
                min_index: info.min_index,
                max_index: info.max_index,
                distinct_input: info.distinct_input.len(),
            }))?;
            stats.spam += 1;
        }
    }

    info!(
        arbitrages = stats.arbitrages,
        sandwiches = stats.sandwiches,
        spam = stats.spam,
        suppressed = stats.suppressed,
        "block emitted"
    );
    Ok(stats)
}
