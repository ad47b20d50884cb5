//! Revenue and cost attribution for a transaction's primary contract.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, B256, I256, U256};
use mev_data::types::Asset;
use mev_data::ChainConstants;
use tracing::{debug, warn};

use crate::balances::{
    find_balance_changes, get_address_property, AddressProperty, BalanceTable, Ledger,
};
use crate::token_graph::TokenFlowGraph;
use crate::txn_data::TxnData;

/// Key of a cost ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CostKey {
    /// Gas paid for the transaction, in native Wei.
    Gas,
    /// Net outflow of an asset.
    Asset(Asset),
}

/// Costs per key, as positive magnitudes.
pub type CostLedger = BTreeMap<CostKey, I256>;

/// The addresses revenue and cost are attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Participants {
    /// Transaction sender (EOA).
    pub sender: Address,
    /// The transaction's true receiver.
    pub receiver: Address,
    /// Block fee recipient.
    pub fee_recipient: Address,
}

/// Classification output for one transaction.
#[derive(Debug, Clone)]
pub struct TxnResult {
    /// Transaction hash.
    pub txn_hash: B256,
    /// Transaction sender.
    pub tx_from: Address,
    /// Primary contract; `None` means the transaction was not analysed.
    pub mev_contract: Option<Address>,
    /// Position in the block.
    pub txn_index: u64,
    /// Positive net balances of the group.
    pub revenue: Ledger,
    /// Negative net balances of the group plus gas.
    pub costs: CostLedger,
    /// Role of every address with a balance.
    pub address_property: BTreeMap<Address, AddressProperty>,
    /// Every asset that moved.
    pub used_tokens: BTreeSet<Asset>,
    /// Fee recipient, when it came out of the transaction as a winner.
    pub miner_payment: Option<Address>,
    /// Preceding transaction this one appears to target.
    pub target_txn_hash: Option<B256>,
    /// Primary contract of the targeted transaction.
    pub target_txn_contract: Option<Address>,
    /// The token flow graph the result was derived from.
    pub graph: TokenFlowGraph,
}

impl TxnResult {
    /// A result that takes no further part in classification.
    pub fn empty(data: &TxnData) -> Self {
        Self {
            txn_hash: data.tx.hash,
            tx_from: data.tx.from,
            mev_contract: None,
            txn_index: data.tx.index,
            revenue: Ledger::new(),
            costs: CostLedger::new(),
            address_property: BTreeMap::new(),
            used_tokens: BTreeSet::new(),
            miner_payment: None,
            target_txn_hash: None,
            target_txn_contract: None,
            graph: TokenFlowGraph::build(&[], None),
        }
    }

    /// Gas cost entry, zero when absent.
    pub fn gas_cost(&self) -> I256 {
        self.costs.get(&CostKey::Gas).copied().unwrap_or(I256::ZERO)
    }
}

/// Revenue and cost of the sender/receiver group.
///
/// The group is the sender and the receiver, plus the fee recipient when it
/// sits in the receiver's component. Balances are netted per asset across the
/// group with the wrapped-native token folded into [`Asset::Native`]; the
/// mint/burn address never contributes. Gas is not included here.
pub fn winner_rewards(
    participants: &Participants,
    components: &[Vec<Address>],
    balances: &BalanceTable,
    graph: &TokenFlowGraph,
    mint_burn: Address,
    wrapped_native: Address,
) -> (Ledger, CostLedger) {
    let scc_index = graph.get_scc_index(components);

    let mut group: BTreeSet<Address> = BTreeSet::new();
    group.insert(participants.sender);
    group.insert(participants.receiver);
    let receiver_component = scc_index.get(&participants.receiver);
    if receiver_component.is_some()
        && scc_index.get(&participants.fee_recipient) == receiver_component
    {
        group.insert(participants.fee_recipient);
    }
    group.remove(&mint_burn);

    let mut net = Ledger::new();
    for component in balances.values() {
        for (addr, ledger) in &component.accounts {
            if !group.contains(addr) {
                continue;
            }
            for (asset, amount) in ledger {
                let entry = net.entry(asset.normalize(wrapped_native)).or_default();
                *entry = entry.saturating_add(*amount);
            }
        }
    }

    let mut revenue = Ledger::new();
    let mut costs = CostLedger::new();
    for (asset, amount) in net {
        if amount.is_positive() {
            revenue.insert(asset, amount);
        } else if amount.is_negative() {
            costs.insert(CostKey::Asset(asset), amount.saturating_neg());
        }
    }
    (revenue, costs)
}

/// Run graph construction, balance analysis, role assignment and reward
/// attribution for one transaction.
///
/// Transactions without a true receiver, or whose first receipt reports a
/// revert, come back as [`TxnResult::empty`].
pub fn txn_profit_and_cost(data: &TxnData, chain: &ChainConstants) -> TxnResult {
    let Some(receiver) = data.true_receiver else {
        return TxnResult::empty(data);
    };

    if data.receipts.is_empty() {
        warn!(tx_hash = %data.tx.hash, "no transaction receipt, gas cost assumed zero");
    } else if data.gas_used().is_none() {
        warn!(tx_hash = %data.tx.hash, "gas used is undefined, gas cost assumed zero");
    }
    if data.reverted() {
        debug!(tx_hash = %data.tx.hash, "reverted transaction skipped");
        return TxnResult::empty(data);
    }

    let graph = TokenFlowGraph::build(&data.traces, Some(chain.mint_burn_addr));
    let sccs = graph.find_strongly_connected_components().to_vec();
    let balances = find_balance_changes(&sccs, &graph);
    let address_property = get_address_property(&balances);

    let participants = Participants {
        sender: data.tx.from,
        receiver,
        fee_recipient: data.fee_recipient,
    };
    let (revenue, mut costs) = winner_rewards(
        &participants,
        &sccs,
        &balances,
        &graph,
        chain.mint_burn_addr,
        chain.native_wrapped,
    );

    // u64 * u128 stays far below 2^255.
    let gas_total = U256::from(data.gas_used().unwrap_or(0)) * U256::from(data.tx.gas_price);
    costs.insert(CostKey::Gas, I256::from_raw(gas_total));

    let miner_payment = (address_property.get(&data.fee_recipient)
        == Some(&AddressProperty::Winner))
    .then_some(data.fee_recipient);

    let used_tokens: BTreeSet<Asset> = balances
        .values()
        .flat_map(|component| component.accounts.values())
        .flat_map(|ledger| ledger.keys().copied())
        .collect();

    debug!(
        tx_hash = %data.tx.hash,
        index = data.tx.index,
        nodes = graph.num_nodes(),
        sccs = sccs.len(),
        revenue_assets = revenue.len(),
        "transaction analysed"
    );

    TxnResult {
        txn_hash: data.tx.hash,
        tx_from: data.tx.from,
        mev_contract: Some(receiver),
        txn_index: data.tx.index,
        revenue,
        costs,
        address_property,
        used_tokens,
        miner_payment,
        target_txn_hash: None,
        target_txn_contract: None,
        graph,
    }
}
