//! Token flow graph construction from a transaction's value-transfer traces.
//!
//! Nodes are addresses, edges are transfers of one asset between an ordered
//! pair of addresses. Repeated transfers of the same asset between the same
//! pair are aggregated into a single edge; different assets between the same
//! pair stay as parallel edges.
//!
//! The graph is the foundation for everything downstream: SCC decomposition
//! finds value cycles (see [`TokenFlowGraph::find_strongly_connected_components`]),
//! and edge amounts feed [`crate::balances`].

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use alloy::primitives::{Address, I256, U256};
use mev_data::types::{Asset, Trace};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::Bfs;

/// Edge weight: the total amount of one asset moved between two addresses.
#[derive(Debug, Clone)]
pub struct TransferEdge {
    /// Transferred asset.
    pub asset: Asset,
    /// Aggregated amount.
    pub amount: U256,
}

/// Directed multigraph of one transaction's token flows.
#[derive(Debug, Clone)]
pub struct TokenFlowGraph {
    /// The underlying petgraph directed graph.
    pub graph: DiGraph<Address, TransferEdge>,
    /// Lookup from address to node index.
    pub addr_to_ix: HashMap<Address, NodeIndex>,
    edge_ix: HashMap<(NodeIndex, NodeIndex, Asset), EdgeIndex>,
    mint_burn: Option<Address>,
    sccs: OnceLock<Vec<Vec<Address>>>,
}

impl TokenFlowGraph {
    /// Build the graph from a transaction's traces.
    ///
    /// Zero-amount traces are ignored. `mint_burn` is remembered so balance
    /// analysis can leave the supply-altering address out.
    pub fn build(traces: &[Trace], mint_burn: Option<Address>) -> Self {
        let mut graph: DiGraph<Address, TransferEdge> = DiGraph::new();
        let mut addr_to_ix: HashMap<Address, NodeIndex> = HashMap::new();
        let mut edge_ix: HashMap<(NodeIndex, NodeIndex, Asset), EdgeIndex> = HashMap::new();

        for trace in traces.iter().filter(|t| !t.amount.is_zero()) {
            let from_ix = *addr_to_ix
                .entry(trace.from)
                .or_insert_with(|| graph.add_node(trace.from));
            let to_ix = *addr_to_ix
                .entry(trace.to)
                .or_insert_with(|| graph.add_node(trace.to));

            match edge_ix.get(&(from_ix, to_ix, trace.asset)) {
                Some(&ix) => {
                    let edge = &mut graph[ix];
                    edge.amount = edge.amount.saturating_add(trace.amount);
                }
                None => {
                    let ix = graph.add_edge(
                        from_ix,
                        to_ix,
                        TransferEdge {
                            asset: trace.asset,
                            amount: trace.amount,
                        },
                    );
                    edge_ix.insert((from_ix, to_ix, trace.asset), ix);
                }
            }
        }

        Self {
            graph,
            addr_to_ix,
            edge_ix,
            mint_burn,
            sccs: OnceLock::new(),
        }
    }

    /// Number of distinct addresses in the graph.
    pub fn num_nodes(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of aggregated (from, to, asset) edges.
    pub fn num_edges(&self) -> usize {
        self.edge_ix.len()
    }

    /// The mint/burn address this graph was built with.
    pub fn mint_burn(&self) -> Option<Address> {
        self.mint_burn
    }

    /// Whether `addr` appears in any counted trace.
    pub fn contains(&self, addr: &Address) -> bool {
        self.addr_to_ix.contains_key(addr)
    }

    /// Strongly connected components, computed once per graph.
    ///
    /// Components come out of Tarjan's algorithm in reverse topological order
    /// of the condensation. Nodes are visited in insertion order, so the
    /// result is reproducible; members of a component are listed in insertion
    /// order as well.
    pub fn find_strongly_connected_components(&self) -> &[Vec<Address>] {
        self.sccs.get_or_init(|| {
            tarjan_scc(&self.graph)
                .into_iter()
                .map(|mut component| {
                    component.sort_unstable();
                    component.into_iter().map(|ix| self.graph[ix]).collect()
                })
                .collect()
        })
    }

    /// Map each address to the position of its component in `components`.
    pub fn get_scc_index(&self, components: &[Vec<Address>]) -> HashMap<Address, usize> {
        components
            .iter()
            .enumerate()
            .flat_map(|(id, members)| members.iter().map(move |addr| (*addr, id)))
            .collect()
    }

    /// Add `addr` and everything forward-reachable from it to `reach`.
    ///
    /// Asset identity is ignored. Addresses already in `reach` are assumed to
    /// have had their successors added by an earlier call.
    pub fn connected_to(&self, addr: Address, reach: &mut HashSet<Address>) {
        let Some(&start) = self.addr_to_ix.get(&addr) else {
            return;
        };
        if reach.contains(&addr) {
            return;
        }

        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(ix) = bfs.next(&self.graph) {
            reach.insert(self.graph[ix]);
        }
    }

    /// Whether the graph contains any value cycle.
    pub fn is_acyclic(&self) -> bool {
        self.num_nodes() == self.find_strongly_connected_components().len()
    }
}

/// Signed view of a transfer amount.
///
/// Exact for every amount below 2^255; anything larger saturates at
/// `I256::MAX`.
pub fn signed_amount(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}
