//! Whole-block MEV classification.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, Bytes, B256};
use mev_data::types::{BlockTransaction, RichBlock};
use mev_data::ChainConstants;
use tracing::{debug, info};

use crate::arbitrage::is_arbitrage;
use crate::balances::{get_roles_count, role_count, AddressProperty};
use crate::rewards::{txn_profit_and_cost, TxnResult};
use crate::sandwich::{find_sandwich, SandwichResult};
use crate::txn_data::get_data_by_txn;

/// Activity of one watched contract at one gas price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamInfo {
    /// Lowest block index seen.
    pub min_index: u64,
    /// Highest block index seen.
    pub max_index: u64,
    /// Number of transactions.
    pub count: usize,
    /// Distinct calldata payloads seen.
    pub distinct_input: BTreeSet<Bytes>,
}

/// Gas price (Wei) -> watched contract -> activity.
pub type SpamTable = BTreeMap<u128, BTreeMap<Address, SpamInfo>>;

/// Everything found in one block.
#[derive(Debug, Clone, Default)]
pub struct BlockMevResult {
    /// Arbitrage transactions, ordered by index.
    pub arb_txns: Vec<TxnResult>,
    /// Sandwiches, grouped by contract then ordered by front-run index.
    pub sandwich_txns: Vec<SandwichResult>,
    /// Watched-contract activity; empty when nothing is watched.
    pub spam_info: SpamTable,
}

/// Classify every transaction of `block`.
///
/// Transactions consumed by a sandwich are never reported as arbitrage.
#[tracing::instrument(skip_all, fields(block = block.number))]
pub fn handle_block(block: &RichBlock, chain: &ChainConstants) -> BlockMevResult {
    let data = get_data_by_txn(block);
    debug!(txns = data.len(), hash = %block.hash, "block split into transactions");

    let mut results: BTreeMap<u64, TxnResult> = data
        .iter()
        .map(|(index, txn)| (*index, txn_profit_and_cost(txn, chain)))
        .filter(|(_, result)| result.mev_contract.is_some())
        .collect();

    link_targets(&mut results);

    let sandwich_txns = find_sandwich(&data, &results);
    for sandwich in &sandwich_txns {
        results.remove(&sandwich.front_txn_index);
        results.remove(&sandwich.back_txn_index);
    }

    let arb_txns: Vec<TxnResult> = results
        .into_values()
        .filter(|result| {
            data.get(&result.txn_index).is_some_and(|txn| {
                is_arbitrage(
                    txn,
                    chain,
                    &result.revenue,
                    &result.address_property,
                    &result.graph,
                )
            })
        })
        .collect();

    let spam_info = if chain.watch_spam.is_empty() {
        SpamTable::new()
    } else {
        collect_spam(data.values().filter_map(|txn| {
            txn.true_receiver
                .filter(|receiver| chain.watch_spam.contains(receiver))
                .map(|receiver| (receiver, &txn.tx))
        }))
    };

    info!(
        txns = data.len(),
        arbitrages = arb_txns.len(),
        sandwiches = sandwich_txns.len(),
        spam_groups = spam_info.values().map(BTreeMap::len).sum::<usize>(),
        "block classified"
    );

    BlockMevResult {
        arb_txns,
        sandwich_txns,
        spam_info,
    }
}

/// Point each result at the analysed transaction right before it, when that
/// one traded (two or more traders).
fn link_targets(results: &mut BTreeMap<u64, TxnResult>) {
    let links: Vec<(u64, B256, Option<Address>)> = results
        .iter()
        .filter(|(index, _)| **index > 0)
        .filter_map(|(index, _)| {
            let prev = results.get(&(index - 1))?;
            let traders = role_count(
                &get_roles_count(&prev.address_property),
                AddressProperty::Trader,
            );
            (traders >= 2).then_some((*index, prev.txn_hash, prev.mev_contract))
        })
        .collect();

    for (index, hash, contract) in links {
        if let Some(result) = results.get_mut(&index) {
            result.target_txn_hash = Some(hash);
            result.target_txn_contract = contract;
        }
    }
}

fn collect_spam<'a>(
    watched: impl Iterator<Item = (Address, &'a BlockTransaction)>,
) -> SpamTable {
    let mut table = SpamTable::new();
    for (receiver, tx) in watched {
        let info = table
            .entry(tx.gas_price)
            .or_default()
            .entry(receiver)
            .or_insert_with(|| SpamInfo {
                min_index: tx.index,
                max_index: tx.index,
                count: 0,
                distinct_input: BTreeSet::new(),
            });
        info.min_index = info.min_index.min(tx.index);
        info.max_index = info.max_index.max(tx.index);
        info.count += 1;
        info.distinct_input.insert(tx.input.clone());
    }
    table
}
