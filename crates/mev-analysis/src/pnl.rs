//! USD valuation of revenue and cost ledgers.
//!
//! Classification works in raw token units; this stage prices every asset
//! through a [`PriceOracle`] and sums the results. Lookups run concurrently,
//! bounded by a semaphore, and an asset whose price cannot be resolved is
//! left out of the totals rather than failing the whole valuation.

use std::collections::{BTreeMap, BTreeSet};

use alloy::primitives::{Address, I256};
use chrono::{DateTime, Utc};
use mev_data::prices::{PriceOracle, TokenPrice};
use mev_data::types::{Asset, RichBlock};
use mev_data::ChainConstants;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::balances::Ledger;
use crate::rewards::{CostKey, CostLedger};

/// Default number of concurrent price lookups.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Where and when the ledgers are priced.
#[derive(Clone, Debug)]
pub struct PnlContext {
    /// EIP-155 chain id passed to the oracle.
    pub chain_id: u64,
    /// Price timestamp (the block time).
    pub timestamp: DateTime<Utc>,
    /// Address used to price native currency and gas.
    pub native_wrapped: Address,
    /// Maximum concurrent oracle calls.
    pub concurrency: usize,
}

impl PnlContext {
    /// Context for pricing the results of `block` on `chain`.
    pub fn for_block(chain: &ChainConstants, block: &RichBlock, concurrency: usize) -> Self {
        let timestamp = block.datetime().unwrap_or_else(|| {
            warn!(block = block.number, timestamp = block.timestamp, "block timestamp out of range");
            DateTime::<Utc>::UNIX_EPOCH
        });
        Self {
            chain_id: chain.chain_id,
            timestamp,
            native_wrapped: chain.native_wrapped,
            concurrency,
        }
    }
}

/// USD totals of one classified transaction or sandwich.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PnL {
    /// Priced revenue in USD.
    pub revenue: f64,
    /// Priced cost, gas included, in USD.
    pub cost: f64,
    /// Revenue assets that were actually priced.
    pub profit_tokens: Vec<Asset>,
}

impl PnL {
    /// `revenue - cost`.
    pub fn profit(&self) -> f64 {
        self.revenue - self.cost
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Revenue,
    Cost,
}

/// Price `revenue` and `costs` in USD.
///
/// Gas entries are summed in Wei and converted once through the
/// wrapped-native price, as is [`Asset::Native`]. Each distinct token is
/// looked up once. Lookup failures and NaN prices are logged and skip that
/// asset.
#[tracing::instrument(skip_all, fields(chain_id = ctx.chain_id))]
pub async fn compute_pnl(
    revenue: &Ledger,
    costs: &CostLedger,
    ctx: &PnlContext,
    oracle: &dyn PriceOracle,
) -> PnL {
    let mut entries: Vec<(Side, Asset, I256)> = revenue
        .iter()
        .map(|(asset, amount)| (Side::Revenue, *asset, *amount))
        .collect();

    let mut gas = I256::ZERO;
    for (key, amount) in costs {
        match key {
            CostKey::Gas => gas = gas.saturating_add(*amount),
            CostKey::Asset(asset) => entries.push((Side::Cost, *asset, *amount)),
        }
    }
    if !gas.is_zero() {
        entries.push((Side::Cost, Asset::Native, gas));
    }

    let tokens: BTreeSet<Address> = entries
        .iter()
        .map(|(_, asset, _)| price_address(*asset, ctx))
        .collect();

    let semaphore = Semaphore::new(ctx.concurrency.max(1));
    let quotes: BTreeMap<Address, TokenPrice> =
        futures::future::join_all(tokens.into_iter().map(|token| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                (token, price_of(token, ctx, oracle).await)
            }
        }))
        .await
        .into_iter()
        .filter_map(|(token, quote)| quote.map(|quote| (token, quote)))
        .collect();

    let mut pnl = PnL::default();
    for (side, asset, amount) in entries {
        let Some(quote) = quotes.get(&price_address(asset, ctx)) else {
            continue;
        };
        let value = quote.value_of(amount);
        match side {
            Side::Revenue => {
                pnl.revenue += value;
                if amount.is_positive() {
                    pnl.profit_tokens.push(asset);
                }
            }
            Side::Cost => pnl.cost += value,
        }
    }

    debug!(
        revenue = pnl.revenue,
        cost = pnl.cost,
        tokens = quotes.len(),
        priced = pnl.profit_tokens.len(),
        "ledgers priced"
    );
    pnl
}

/// Token whose price values `asset`.
fn price_address(asset: Asset, ctx: &PnlContext) -> Address {
    asset.address().unwrap_or(ctx.native_wrapped)
}

async fn price_of(token: Address, ctx: &PnlContext, oracle: &dyn PriceOracle) -> Option<TokenPrice> {
    match oracle.get_price(token, ctx.chain_id, ctx.timestamp).await {
        Ok(quote) if quote.price.is_nan() => {
            warn!(token = %token, chain_id = ctx.chain_id, "price is NaN");
            None
        }
        Ok(quote) => Some(quote),
        Err(err) => {
            warn!(token = %token, chain_id = ctx.chain_id, error = %err, "price lookup failed");
            None
        }
    }
}
