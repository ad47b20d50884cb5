//! Per-transaction bundles cut out of a [`RichBlock`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, B256};
use mev_data::types::{BlockTransaction, RichBlock, Trace, TxReceipt};
use tracing::warn;

/// Everything the classifier needs to know about one transaction.
#[derive(Debug, Clone)]
pub struct TxnData {
    /// The transaction itself.
    pub tx: BlockTransaction,
    /// Its traces, in execution order.
    pub traces: Vec<Trace>,
    /// Its receipts (normally exactly one).
    pub receipts: Vec<TxReceipt>,
    /// Contract ultimately responsible for the call, if any.
    pub true_receiver: Option<Address>,
    /// Fee recipient of the enclosing block.
    pub fee_recipient: Address,
}

impl TxnData {
    /// Gas used according to the first receipt, if reported.
    pub fn gas_used(&self) -> Option<u64> {
        self.receipts.first().and_then(|r| r.gas_used)
    }

    /// Whether the first receipt reports a revert.
    pub fn reverted(&self) -> bool {
        self.receipts.first().is_some_and(TxReceipt::reverted)
    }
}

/// The contract a transaction is really aimed at.
///
/// This is `tx.to`; for contract creations it falls back to the first call
/// target seen in the traces.
pub fn true_receiver(tx: &BlockTransaction, traces: &[Trace]) -> Option<Address> {
    tx.to
        .or_else(|| traces.iter().find_map(|trace| trace.call_target))
}

/// Split a block into per-transaction bundles, keyed by transaction index.
///
/// When two transactions claim the same index the first one listed wins and
/// the other is dropped with a warning.
pub fn get_data_by_txn(block: &RichBlock) -> BTreeMap<u64, TxnData> {
    let mut traces: HashMap<B256, Vec<Trace>> = HashMap::new();
    for trace in &block.traces {
        traces.entry(trace.tx_hash).or_default().push(trace.clone());
    }
    let mut receipts: HashMap<B256, Vec<TxReceipt>> = HashMap::new();
    for receipt in &block.receipts {
        receipts
            .entry(receipt.tx_hash)
            .or_default()
            .push(receipt.clone());
    }

    let mut bundles = BTreeMap::new();
    for tx in &block.transactions {
        let slot = match bundles.entry(tx.index) {
            Entry::Vacant(slot) => slot,
            Entry::Occupied(existing) => {
                let kept: &TxnData = existing.get();
                warn!(
                    block = block.number,
                    index = tx.index,
                    kept = %kept.tx.hash,
                    dropped = %tx.hash,
                    "duplicate transaction index"
                );
                continue;
            }
        };
        let traces = traces.remove(&tx.hash).unwrap_or_default();
        let receipts = receipts.remove(&tx.hash).unwrap_or_default();
        let true_receiver = true_receiver(tx, &traces);
        slot.insert(TxnData {
            tx: tx.clone(),
            traces,
            receipts,
            true_receiver,
            fee_recipient: block.fee_recipient,
        });
    }
    bundles
}
