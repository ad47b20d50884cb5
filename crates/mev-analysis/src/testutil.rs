//! Fixture builders shared by the unit tests of this crate.

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use mev_data::types::{Asset, BlockTransaction, RichBlock, Trace, TxReceipt};

use crate::txn_data::{true_receiver, TxnData};

/// Fee recipient of every fixture block.
pub const FEE_RECIPIENT: Address = Address::with_last_byte(0xfe);

pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from(bytes)
}

pub fn token(n: u8) -> Asset {
    let mut bytes = [0u8; 20];
    bytes[18] = 0xff;
    bytes[19] = n;
    Asset::Erc20(Address::from(bytes))
}

/// Ledger amount from a small literal.
pub fn amt(value: i128) -> I256 {
    I256::try_from(value).expect("fits in I256")
}

pub fn native() -> Asset {
    Asset::Native
}

/// A transfer not tied to any particular transaction.
pub fn mk(from: Address, to: Address, asset: Asset, amount: u64) -> Trace {
    Trace {
        tx_hash: B256::ZERO,
        from,
        to,
        asset,
        amount: U256::from(amount),
        call_target: None,
    }
}

/// A transfer emitted by `tx`.
pub fn mk_for(tx: &BlockTransaction, from: Address, to: Address, asset: Asset, amount: u64) -> Trace {
    Trace {
        tx_hash: tx.hash,
        ..mk(from, to, asset, amount)
    }
}

/// Transaction at `index`; its hash encodes `index + 1`.
pub fn tx_with(index: u64, from: Address, to: Option<Address>, gas_price: u128) -> BlockTransaction {
    BlockTransaction {
        hash: B256::left_padding_from(&(index + 1).to_be_bytes()),
        index,
        from,
        to,
        gas_price,
        input: Bytes::new(),
    }
}

pub fn receipt(tx: &BlockTransaction, status: u8, gas_used: Option<u64>) -> TxReceipt {
    TxReceipt {
        tx_hash: tx.hash,
        status,
        gas_used,
    }
}

pub fn block(
    transactions: Vec<BlockTransaction>,
    traces: Vec<Trace>,
    receipts: Vec<TxReceipt>,
) -> RichBlock {
    RichBlock {
        number: 18_000_000,
        hash: B256::with_last_byte(0xbb),
        timestamp: 1_700_000_000,
        fee_recipient: FEE_RECIPIENT,
        transactions,
        traces,
        receipts,
    }
}

pub fn txn_data(tx: BlockTransaction, traces: Vec<Trace>, receipts: Vec<TxReceipt>) -> TxnData {
    let true_receiver = true_receiver(&tx, &traces);
    TxnData {
        tx,
        traces,
        receipts,
        true_receiver,
        fee_recipient: FEE_RECIPIENT,
    }
}

/// Attacker contract used by [`sandwich_parts`].
pub const SANDWICH_BOT: Address = Address::with_last_byte(0x10);

/// Front-run at `base`, victim swap at `base + 1`, back-run at `base + 2`,
/// all against one pool.
///
/// The front-run buys 1000 of `token(1)` for 100 of `token(2)`; the back-run
/// sells them again for `back_out` of `token(2)`. The victim's swap is one-way
/// (router pays the pool, the pool pays the victim) so it never forms a cycle.
pub fn sandwich_parts(
    base: u64,
    back_out: u64,
) -> (Vec<BlockTransaction>, Vec<Trace>, Vec<TxReceipt>) {
    let attacker = addr(0x11);
    let pool = addr(0x20);
    let victim = addr(0x30);
    let router = addr(0x31);

    let front = tx_with(base, attacker, Some(SANDWICH_BOT), 2);
    let middle = tx_with(base + 1, victim, Some(router), 1);
    let back = tx_with(base + 2, attacker, Some(SANDWICH_BOT), 2);

    let traces = vec![
        mk_for(&front, SANDWICH_BOT, pool, token(2), 100),
        mk_for(&front, pool, SANDWICH_BOT, token(1), 1_000),
        mk_for(&middle, router, pool, token(2), 50),
        mk_for(&middle, pool, victim, token(1), 400),
        mk_for(&back, SANDWICH_BOT, pool, token(1), 1_000),
        mk_for(&back, pool, SANDWICH_BOT, token(2), back_out),
    ];
    let receipts = vec![
        receipt(&front, 1, Some(100)),
        receipt(&middle, 1, Some(100)),
        receipt(&back, 1, Some(100)),
    ];
    (vec![front, middle, back], traces, receipts)
}
