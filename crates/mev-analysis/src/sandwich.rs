//! Sandwich detection.
//!
//! A sandwich is a pair of transactions into the same contract that bracket
//! one or more victim transactions: the front-run buys an asset the victims
//! trade, the back-run sells it again, and the pair together ends up ahead.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, B256, I256};
use mev_data::types::Asset;
use tracing::debug;

use crate::balances::Ledger;
use crate::rewards::{CostKey, CostLedger, TxnResult};
use crate::txn_data::TxnData;

/// A detected front-run / back-run pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandwichResult {
    /// Contract both legs were sent to.
    pub mev_contract: Address,
    /// Hash of the front-run.
    pub front_txn_hash: B256,
    /// Block index of the front-run.
    pub front_txn_index: u64,
    /// Hash of the back-run.
    pub back_txn_hash: B256,
    /// Block index of the back-run.
    pub back_txn_index: u64,
    /// Positive combined nets of both legs.
    pub revenue: Ledger,
    /// Negative combined nets plus the gas of both legs.
    pub costs: CostLedger,
    /// Union of the assets moved by either leg.
    pub used_tokens: BTreeSet<Asset>,
    /// Fee recipient paid by the front leg, else by the back leg.
    pub miner_payment: Option<Address>,
}

/// Judge a bracket `[front, victims.., back]`.
///
/// Accepted when both legs share a contract, some asset bought by the front
/// leg is sold by the back leg and touched by a victim, and the two legs
/// together net a strictly positive amount of some asset.
pub fn is_sandwich(bracket: &[&TxnResult]) -> Option<SandwichResult> {
    let [front, victims @ .., back] = bracket else {
        return None;
    };
    if victims.is_empty() {
        return None;
    }
    let mev_contract = front.mev_contract?;
    if back.mev_contract != Some(mev_contract) {
        return None;
    }

    let targeted = front
        .revenue
        .iter()
        .filter(|(_, amount)| amount.is_positive())
        .map(|(asset, _)| *asset)
        .filter(|asset| {
            back.costs
                .get(&CostKey::Asset(*asset))
                .is_some_and(I256::is_positive)
        })
        .find(|asset| victims.iter().any(|v| v.used_tokens.contains(asset)))?;

    let mut net = Ledger::new();
    for leg in [front, back] {
        for (asset, amount) in &leg.revenue {
            let entry = net.entry(*asset).or_default();
            *entry = entry.saturating_add(*amount);
        }
        for (key, amount) in &leg.costs {
            if let CostKey::Asset(asset) = key {
                let entry = net.entry(*asset).or_default();
                *entry = entry.saturating_sub(*amount);
            }
        }
    }
    if !net.values().any(I256::is_positive) {
        debug!(
            front = %front.txn_hash,
            back = %back.txn_hash,
            "bracket around {targeted} is not profitable"
        );
        return None;
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
    costs.insert(
        CostKey::Gas,
        front.gas_cost().saturating_add(back.gas_cost()),
    );

    Some(SandwichResult {
        mev_contract,
        front_txn_hash: front.txn_hash,
        front_txn_index: front.txn_index,
        back_txn_hash: back.txn_hash,
        back_txn_index: back.txn_index,
        revenue,
        costs,
        used_tokens: front.used_tokens.union(&back.used_tokens).copied().collect(),
        miner_payment: front.miner_payment.or(back.miner_payment),
    })
}

/// Scan a block for sandwiches.
///
/// `results` holds the analysed transactions by index. Candidates are grouped
/// by true receiver; within a group, each pair of non-adjacent transactions
/// is tried as a bracket around every analysed transaction between them.
/// A transaction is consumed by at most one sandwich.
pub fn find_sandwich(
    data: &BTreeMap<u64, TxnData>,
    results: &BTreeMap<u64, TxnResult>,
) -> Vec<SandwichResult> {
    let mut by_receiver: BTreeMap<Address, Vec<u64>> = BTreeMap::new();
    for (index, txn) in data {
        if !results.contains_key(index) {
            continue;
        }
        if let Some(receiver) = txn.true_receiver {
            by_receiver.entry(receiver).or_default().push(*index);
        }
    }

    let mut found = Vec::new();
    for indices in by_receiver.values().filter(|group| group.len() >= 2) {
        let mut start = 0;
        let mut i = 1;
        while i < indices.len() {
            let (lo, hi) = (indices[start], indices[i]);
            if hi - lo > 1 {
                let bracket: Vec<&TxnResult> = results
                    .range(lo..=hi)
                    .map(|(_, result)| result)
                    .collect();
                if let Some(sandwich) = is_sandwich(&bracket) {
                    debug!(
                        front = lo,
                        back = hi,
                        contract = %sandwich.mev_contract,
                        "sandwich found"
                    );
                    found.push(sandwich);
                    start = i + 1;
                    i += 2;
                    continue;
                }
            }
            start = i;
            i += 1;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::txn_profit_and_cost;
    use crate::testutil::{amt, block, sandwich_parts, token, SANDWICH_BOT};
    use crate::txn_data::get_data_by_txn;
    use mev_data::ChainConstants;

    fn analyse(
        parts: (
            Vec<mev_data::BlockTransaction>,
            Vec<mev_data::Trace>,
            Vec<mev_data::TxReceipt>,
        ),
    ) -> (BTreeMap<u64, TxnData>, BTreeMap<u64, TxnResult>) {
        let (txs, traces, receipts) = parts;
        let data = get_data_by_txn(&block(txs, traces, receipts));
        let chain = ChainConstants::ethereum();
        let results = data
            .iter()
            .map(|(index, txn)| (*index, txn_profit_and_cost(txn, &chain)))
            .filter(|(_, result)| result.mev_contract.is_some())
            .collect();
        (data, results)
    }

    #[test]
    fn profitable_bracket_is_a_sandwich() {
        let (_, results) = analyse(sandwich_parts(1, 110));
        let bracket: Vec<&TxnResult> = results.values().collect();

        let sandwich = is_sandwich(&bracket).expect("sandwich");
        assert_eq!(sandwich.mev_contract, SANDWICH_BOT);
        assert_eq!(sandwich.front_txn_index, 1);
        assert_eq!(sandwich.back_txn_index, 3);
        assert_eq!(sandwich.revenue.get(&token(2)), Some(&amt(10)));
        assert!(!sandwich.revenue.contains_key(&token(1)));
        assert_eq!(sandwich.costs.get(&CostKey::Gas), Some(&amt(400)));
        assert_eq!(sandwich.costs.len(), 1);
        assert!(sandwich.used_tokens.contains(&token(1)));
    }

    #[test]
    fn losing_bracket_is_rejected() {
        let (_, results) = analyse(sandwich_parts(1, 95));
        let bracket: Vec<&TxnResult> = results.values().collect();
        assert!(is_sandwich(&bracket).is_none());
    }

    #[test]
    fn bracket_without_victim_is_rejected() {
        let (_, results) = analyse(sandwich_parts(1, 110));
        let bracket = [&results[&1], &results[&3]];
        assert!(is_sandwich(&bracket).is_none());
    }

    #[test]
    fn victim_must_touch_the_targeted_asset() {
        let (_, mut results) = analyse(sandwich_parts(1, 110));
        if let Some(victim) = results.get_mut(&2) {
            victim.used_tokens.remove(&token(1));
        }
        let bracket: Vec<&TxnResult> = results.values().collect();
        assert!(is_sandwich(&bracket).is_none());
    }

    #[test]
    fn legs_must_share_a_contract() {
        let (_, mut results) = analyse(sandwich_parts(1, 110));
        if let Some(back) = results.get_mut(&3) {
            back.mev_contract = Some(Address::with_last_byte(0x99));
        }
        let bracket: Vec<&TxnResult> = results.values().collect();
        assert!(is_sandwich(&bracket).is_none());
    }

    #[test]
    fn scan_finds_consecutive_sandwiches_once_each() {
        let (mut txs, mut traces, mut receipts) = sandwich_parts(1, 110);
        let (txs2, traces2, receipts2) = sandwich_parts(4, 120);
        txs.extend(txs2);
        traces.extend(traces2);
        receipts.extend(receipts2);
        let (data, results) = analyse((txs, traces, receipts));

        let found = find_sandwich(&data, &results);
        assert_eq!(found.len(), 2);
        assert_eq!((found[0].front_txn_index, found[0].back_txn_index), (1, 3));
        assert_eq!((found[1].front_txn_index, found[1].back_txn_index), (4, 6));

        let mut seen = BTreeSet::new();
        for s in &found {
            assert!(seen.insert(s.front_txn_hash));
            assert!(seen.insert(s.back_txn_hash));
        }
    }

    #[test]
    fn scan_needs_an_analysed_victim_between_legs() {
        let (txs, traces, receipts) = sandwich_parts(1, 110);
        // Without the victim the legs are two indices apart with nothing
        // analysed in between.
        let victim = txs[1].hash;
        let txs = txs.into_iter().filter(|t| t.hash != victim).collect();
        let traces = traces.into_iter().filter(|t| t.tx_hash != victim).collect();
        let (data, results) = analyse((txs, traces, receipts));
        assert!(find_sandwich(&data, &results).is_empty());
    }
}
