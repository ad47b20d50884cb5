//! Per-address balance deltas and the economic roles derived from them.
//!
//! Balances are computed over **all** edges of the token flow graph, then
//! grouped by the SCC each address belongs to. Role assignment uses the
//! component size to tell round-trip participants (traders) apart from
//! one-way recipients (winners) and payers (losers).

use std::collections::BTreeMap;

use alloy::primitives::{Address, I256};
use mev_data::types::Asset;
use petgraph::visit::EdgeRef;

use crate::token_graph::{signed_amount, TokenFlowGraph};

/// Net amount per asset. Positive = received more than sent.
pub type Ledger = BTreeMap<Asset, I256>;

/// Balances of the addresses belonging to one SCC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentBalances {
    /// Number of graph nodes in the component (including zero-balance ones).
    pub size: usize,
    /// Non-zero balances per address.
    pub accounts: BTreeMap<Address, Ledger>,
}

/// Component id -> balances of its members.
pub type BalanceTable = BTreeMap<usize, ComponentBalances>;

/// Economic role of an address within one transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressProperty {
    /// Took part in a value cycle.
    Trader,
    /// Ended with a strictly positive balance in some asset.
    Winner,
    /// Only paid out.
    Loser,
    /// No net movement.
    Neutral,
}

/// Synthetic aggregate keys understood by [`get_property`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKey {
    /// Sender, receiver and (when grouped) the fee recipient, taken together.
    Group,
}

/// Net balance changes for every address, grouped by component id.
///
/// Component ids are positions in `components`. The graph's mint/burn address
/// is left out; zero balances are pruned and addresses without any remaining
/// balance are dropped.
pub fn find_balance_changes(components: &[Vec<Address>], graph: &TokenFlowGraph) -> BalanceTable {
    let mut deltas: BTreeMap<Address, Ledger> = BTreeMap::new();

    for edge_ref in graph.graph.edge_references() {
        let from = graph.graph[edge_ref.source()];
        let to = graph.graph[edge_ref.target()];
        let weight = edge_ref.weight();
        let amount = signed_amount(weight.amount);

        let out = deltas.entry(from).or_default().entry(weight.asset).or_default();
        *out = out.saturating_sub(amount);
        let inc = deltas.entry(to).or_default().entry(weight.asset).or_default();
        *inc = inc.saturating_add(amount);
    }

    let scc_index = graph.get_scc_index(components);
    let mint_burn = graph.mint_burn();
    let mut table = BalanceTable::new();

    for (addr, mut ledger) in deltas {
        if Some(addr) == mint_burn {
            continue;
        }
        ledger.retain(|_, amount| !amount.is_zero());
        if ledger.is_empty() {
            continue;
        }
        let Some(&id) = scc_index.get(&addr) else {
            continue;
        };
        table
            .entry(id)
            .or_insert_with(|| ComponentBalances {
                size: components[id].len(),
                accounts: BTreeMap::new(),
            })
            .accounts
            .insert(addr, ledger);
    }

    table
}

/// Role of every address present in the balance table.
///
/// - member of a component with two or more nodes: [`AddressProperty::Trader`]
/// - otherwise any strictly positive balance: [`AddressProperty::Winner`]
/// - otherwise: [`AddressProperty::Loser`]
pub fn get_address_property(balances: &BalanceTable) -> BTreeMap<Address, AddressProperty> {
    let mut properties = BTreeMap::new();
    for component in balances.values() {
        for (addr, ledger) in &component.accounts {
            properties.insert(*addr, classify(component.size, ledger));
        }
    }
    properties
}

fn classify(component_size: usize, ledger: &Ledger) -> AddressProperty {
    if component_size >= 2 {
        AddressProperty::Trader
    } else if ledger.values().any(I256::is_positive) {
        AddressProperty::Winner
    } else if ledger.values().any(I256::is_negative) {
        AddressProperty::Loser
    } else {
        AddressProperty::Neutral
    }
}

/// How many addresses hold each role.
pub fn get_roles_count(
    properties: &BTreeMap<Address, AddressProperty>,
) -> BTreeMap<AddressProperty, usize> {
    let mut counts = BTreeMap::new();
    for property in properties.values() {
        *counts.entry(*property).or_default() += 1;
    }
    counts
}

/// Count of one role, zero when absent.
pub fn role_count(counts: &BTreeMap<AddressProperty, usize>, role: AddressProperty) -> usize {
    counts.get(&role).copied().unwrap_or(0)
}

/// Role of a synthetic aggregate, judged from its revenue ledger.
pub fn get_property(key: GroupKey, revenue: &Ledger) -> AddressProperty {
    match key {
        GroupKey::Group => {
            if revenue.values().any(I256::is_positive) {
                AddressProperty::Winner
            } else {
                AddressProperty::Neutral
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use mev_data::types::Trace;

    use crate::testutil::{addr, amt, mk, token};

    fn analyze(graph: &TokenFlowGraph) -> BalanceTable {
        let sccs = graph.find_strongly_connected_components().to_vec();
        find_balance_changes(&sccs, graph)
    }

    #[test]
    fn triangle_balances_and_roles() {
        let bot = addr(1);
        let pool_a = addr(2);
        let pool_b = addr(3);
        let usdc = token(1);
        let weth = token(2);

        let traces = vec![
            mk(bot, pool_a, usdc, 100),
            mk(pool_a, pool_b, weth, 1),
            mk(pool_b, bot, usdc, 105),
        ];
        let graph = TokenFlowGraph::build(&traces, None);
        let table = analyze(&graph);

        assert_eq!(table.len(), 1);
        let component = table.values().next().unwrap();
        assert_eq!(component.size, 3);
        assert_eq!(component.accounts[&bot][&usdc], amt(5));
        assert_eq!(component.accounts[&pool_a][&usdc], amt(100));
        assert_eq!(component.accounts[&pool_a][&weth], amt(-1));

        let props = get_address_property(&table);
        assert!(props.values().all(|p| *p == AddressProperty::Trader));
    }

    #[test]
    fn one_way_transfers_yield_winner_and_loser() {
        let payer = addr(1);
        let payee = addr(2);
        let graph = TokenFlowGraph::build(&[mk(payer, payee, token(1), 10)], None);
        let props = get_address_property(&analyze(&graph));

        assert_eq!(props[&payer], AddressProperty::Loser);
        assert_eq!(props[&payee], AddressProperty::Winner);
    }

    #[test]
    fn conservation_per_asset() {
        let traces = vec![
            mk(addr(1), addr(2), token(1), 100),
            mk(addr(2), addr(3), token(2), 40),
            mk(addr(3), addr(1), token(1), 70),
            mk(addr(1), addr(4), token(2), 3),
        ];
        let graph = TokenFlowGraph::build(&traces, None);
        let table = analyze(&graph);

        let mut totals: Ledger = Ledger::new();
        for component in table.values() {
            for ledger in component.accounts.values() {
                for (asset, amount) in ledger {
                    *totals.entry(*asset).or_default() += *amount;
                }
            }
        }
        assert!(totals.values().all(|sum| sum.is_zero()));
    }

    #[test]
    fn amounts_beyond_128_bits_stay_exact() {
        let a = addr(1);
        let b = addr(2);
        let x = token(1);
        let big = U256::from(1u8) << 130;
        let half = U256::from(1u8) << 129;

        let traces = vec![
            Trace { amount: big, ..mk(a, b, x, 0) },
            Trace { amount: half, ..mk(b, a, x, 0) },
        ];
        let graph = TokenFlowGraph::build(&traces, None);
        let table = analyze(&graph);

        let component = table.values().next().unwrap();
        assert_eq!(component.accounts.len(), 2);
        let expected = I256::from_raw(half);
        assert_eq!(component.accounts[&a][&x], -expected);
        assert_eq!(component.accounts[&b][&x], expected);

        let props = get_address_property(&table);
        assert_eq!(role_count(&get_roles_count(&props), AddressProperty::Trader), 2);
    }

    #[test]
    fn mint_burn_address_is_excluded() {
        let zero = Address::ZERO;
        let lp = addr(5);
        let graph = TokenFlowGraph::build(&[mk(zero, lp, token(9), 1_000)], Some(zero));
        let table = analyze(&graph);

        let props = get_address_property(&table);
        assert_eq!(props.len(), 1);
        assert_eq!(props[&lp], AddressProperty::Winner);
    }

    #[test]
    fn pass_through_addresses_are_pruned() {
        let a = addr(1);
        let router = addr(2);
        let b = addr(3);
        let traces = vec![mk(a, router, token(1), 10), mk(router, b, token(1), 10)];
        let graph = TokenFlowGraph::build(&traces, None);
        let table = analyze(&graph);

        let props = get_address_property(&table);
        assert!(!props.contains_key(&router));
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn roles_count_sums_to_addresses_with_balance() {
        let traces = vec![
            mk(addr(1), addr(2), token(1), 100),
            mk(addr(2), addr(1), token(2), 5),
            mk(addr(1), addr(3), token(1), 2),
            mk(addr(4), addr(3), token(3), 1),
        ];
        let graph = TokenFlowGraph::build(&traces, None);
        let table = analyze(&graph);
        let props = get_address_property(&table);
        let counts = get_roles_count(&props);

        let with_balance: usize = table.values().map(|c| c.accounts.len()).sum();
        assert_eq!(counts.values().sum::<usize>(), with_balance);
        assert_eq!(role_count(&counts, AddressProperty::Trader), 2);
        assert_eq!(role_count(&counts, AddressProperty::Winner), 1);
        assert_eq!(role_count(&counts, AddressProperty::Loser), 1);
    }

    #[test]
    fn group_property_follows_revenue() {
        let mut revenue = Ledger::new();
        assert_eq!(get_property(GroupKey::Group, &revenue), AddressProperty::Neutral);
        revenue.insert(token(1), amt(7));
        assert_eq!(get_property(GroupKey::Group, &revenue), AddressProperty::Winner);
    }
}
