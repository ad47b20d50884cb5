//! SCC-based arbitrage classification.
//!
//! A transaction is arbitrage when its token flows contain a value cycle,
//! every winner is downstream of the sender/receiver, and the group comes out
//! ahead either as a self-dealing block producer or through a trade involving
//! more than one trader.
//!
//! This rule is **protocol-agnostic**: it does not need to know which DEX or
//! AMM was used, only the transfer graph and the roles derived from it.

use std::collections::{BTreeMap, HashSet};

use alloy::primitives::Address;
use mev_data::ChainConstants;
use tracing::trace;

use crate::balances::{
    get_property, get_roles_count, role_count, AddressProperty, GroupKey, Ledger,
};
use crate::token_graph::TokenFlowGraph;
use crate::txn_data::TxnData;

/// Decide whether an analysed transaction is arbitrage.
///
/// Rejects when:
/// 1. any trace calls a blacklisted contract;
/// 2. the graph has no cycle (`num_nodes == scc count`, including the empty graph);
/// 3. a winner other than sender/receiver is not reachable from the
///    sender's or receiver's component;
/// 4. the group is not a winner, or it is but neither the fee recipient took
///    part nor more than one trader was involved.
pub fn is_arbitrage(
    data: &TxnData,
    chain: &ChainConstants,
    revenue: &Ledger,
    address_property: &BTreeMap<Address, AddressProperty>,
    graph: &TokenFlowGraph,
) -> bool {
    if let Some(hit) = data
        .traces
        .iter()
        .filter_map(|t| t.call_target)
        .find(|target| chain.blacklist.contains(target))
    {
        trace!(tx_hash = %data.tx.hash, target = %hit, "blacklisted call target");
        return false;
    }

    let sccs = graph.find_strongly_connected_components();
    if graph.num_nodes() == sccs.len() {
        return false;
    }

    if let Some(receiver) = data.true_receiver {
        let from = data.tx.from;
        if !winners_reachable(graph, sccs, address_property, from, receiver) {
            trace!(tx_hash = %data.tx.hash, "winner outside the call graph");
            return false;
        }
    }

    if get_property(GroupKey::Group, revenue) != AddressProperty::Winner {
        return false;
    }
    let roles = get_roles_count(address_property);
    let miner_is_winner = address_property.contains_key(&data.fee_recipient);
    miner_is_winner || role_count(&roles, AddressProperty::Trader) > 1
}

/// Every winner other than `from`/`to` must be forward-reachable from a node
/// in `from`'s or `to`'s component.
fn winners_reachable(
    graph: &TokenFlowGraph,
    sccs: &[Vec<Address>],
    address_property: &BTreeMap<Address, AddressProperty>,
    from: Address,
    to: Address,
) -> bool {
    let scc_index = graph.get_scc_index(sccs);
    let seeds: HashSet<usize> = [from, to]
        .iter()
        .filter_map(|addr| scc_index.get(addr).copied())
        .collect();

    let mut reach: HashSet<Address> = HashSet::new();
    for id in &seeds {
        for member in &sccs[*id] {
            graph.connected_to(*member, &mut reach);
        }
    }

    address_property.iter().all(|(addr, property)| {
        *addr == from
            || *addr == to
            || match property {
                AddressProperty::Winner => reach.contains(addr),
                AddressProperty::Trader | AddressProperty::Loser | AddressProperty::Neutral => {
                    true
                }
            }
    })
}
