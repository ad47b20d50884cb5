//! Shared test helpers and utilities.
//!
//! Provides a small builder for synthetic blocks plus canned transaction
//! shapes (cyclic arbitrage, sandwich legs, plain transfers).

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256, U256};
use mev_data::types::{Asset, BlockTransaction, RichBlock, Trace, TxReceipt};

/// Fee recipient of every sample block.
pub const BUILDER: Address = Address::with_last_byte(0xfe);

/// Gas used by every sample transaction.
pub const GAS_USED: u64 = 100_000;

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

/// Incrementally assembles a [`RichBlock`].
///
/// Transactions get consecutive indices and a successful receipt using
/// [`GAS_USED`] unless changed afterwards.
///
/// # Example
/// ```ignore
/// let mut b = BlockBuilder::new(18_000_000);
/// let tx = b.tx(addr(1), Some(addr(2)), 1);
/// b.transfer(tx, addr(2), addr(3), token(1), 10);
/// let block = b.build();
/// ```
pub struct BlockBuilder {
    block: RichBlock,
}

impl BlockBuilder {
    pub fn new(number: u64) -> Self {
        Self {
            block: RichBlock {
                number,
                hash: B256::left_padding_from(&number.to_be_bytes()),
                timestamp: 1_700_000_000 + number * 12,
                fee_recipient: BUILDER,
                transactions: Vec::new(),
                traces: Vec::new(),
                receipts: Vec::new(),
            },
        }
    }

    /// Index the next transaction will get.
    pub fn next_index(&self) -> u64 {
        self.block.transactions.len() as u64
    }

    /// Appends a transaction and returns its hash.
    pub fn tx(&mut self, from: Address, to: Option<Address>, gas_price: u128) -> B256 {
        self.tx_with_input(from, to, gas_price, Bytes::new())
    }

    pub fn tx_with_input(
        &mut self,
        from: Address,
        to: Option<Address>,
        gas_price: u128,
        input: Bytes,
    ) -> B256 {
        let index = self.next_index();
        let mut seed = [0u8; 16];
        seed[..8].copy_from_slice(&self.block.number.to_be_bytes());
        seed[8..].copy_from_slice(&(index + 1).to_be_bytes());
        let hash = B256::left_padding_from(&seed);

        self.block.transactions.push(BlockTransaction {
            hash,
            index,
            from,
            to,
            gas_price,
            input,
        });
        self.block.receipts.push(TxReceipt {
            tx_hash: hash,
            status: 1,
            gas_used: Some(GAS_USED),
        });
        hash
    }

    pub fn transfer(
        &mut self,
        tx: B256,
        from: Address,
        to: Address,
        asset: Asset,
        amount: u64,
    ) -> &mut Self {
        self.block.traces.push(Trace {
            tx_hash: tx,
            from,
            to,
            asset,
            amount: U256::from(amount),
            call_target: None,
        });
        self
    }

    /// Marks a transaction as reverted.
    pub fn revert(&mut self, tx: B256) -> &mut Self {
        for receipt in self.block.receipts.iter_mut().filter(|r| r.tx_hash == tx) {
            receipt.status = 0;
        }
        self
    }

    /// Two-pool cycle through `bot` netting `profit` of `token(1)`.
    pub fn cycle_arb(&mut self, bot: Address, pool_a: Address, pool_b: Address, profit: u64) -> B256 {
        let tx = self.tx(addr(0x40), Some(bot), 10);
        self.transfer(tx, bot, pool_a, token(1), 1_000)
            .transfer(tx, pool_a, bot, token(2), 500)
            .transfer(tx, bot, pool_b, token(2), 500)
            .transfer(tx, pool_b, bot, token(1), 1_000 + profit);
        tx
    }

    /// One-way payment chain: no value cycle.
    pub fn payment(&mut self, payer: Address, via: Address, payee: Address, amount: u64) -> B256 {
        let tx = self.tx(payer, Some(via), 10);
        self.transfer(tx, payer, via, token(3), amount)
            .transfer(tx, via, payee, token(3), amount);
        tx
    }

    /// Front-run, victim swap and back-run of `bot` on `pool`.
    ///
    /// The front-run buys 1000 `token(1)` for 100 `token(2)`; the back-run
    /// sells them for `back_out` `token(2)`. Returns `(front, victim, back)`.
    pub fn sandwich(&mut self, bot: Address, pool: Address, back_out: u64) -> (B256, B256, B256) {
        let attacker = addr(0x11);
        let front = self.tx(attacker, Some(bot), 20);
        self.transfer(front, bot, pool, token(2), 100)
            .transfer(front, pool, bot, token(1), 1_000);

        let victim = self.tx(addr(0x30), Some(addr(0x31)), 10);
        self.transfer(victim, addr(0x31), pool, token(2), 50)
            .transfer(victim, pool, addr(0x30), token(1), 400);

        let back = self.tx(attacker, Some(bot), 20);
        self.transfer(back, bot, pool, token(1), 1_000)
            .transfer(back, pool, bot, token(2), back_out);
        (front, victim, back)
    }

    pub fn build(self) -> RichBlock {
        self.block
    }
}
