//! # Token Price Oracles
//!
//! USD price lookups for a token at a point in time. The classifier only
//! depends on the [`PriceOracle`] trait; two implementations ship here:
//!
//! - [`StaticPriceOracle`]: a fixed table, for tests and offline runs.
//! - [`LlamaPriceOracle`]: the public DefiLlama coins API, which needs
//!   **no API key** and serves historical prices by unix timestamp.
//!
//! ## Rate Limits
//!
//! The coins endpoint answers HTTP 429 when hammered. The HTTP oracle honours
//! `Retry-After` and retries a bounded number of times; callers are expected
//! to bound concurrency themselves (the PnL stage uses a semaphore).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, I256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::{eyre, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default DefiLlama coins API base URL.
pub const LLAMA_BASE_URL: &str = "https://coins.llama.fi";

/// Maximum attempts per lookup when rate limited.
const MAX_ATTEMPTS: u32 = 3;

/// USD price of one whole token plus the token's decimals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    /// Price of one whole token in USD. May be NaN if the source is broken.
    pub price: f64,
    /// Token decimals used to scale raw amounts.
    pub decimals: u8,
}

impl TokenPrice {
    /// USD value of a raw (base-unit) amount.
    pub fn value_of(&self, raw_amount: I256) -> f64 {
        let scale = 10f64.powi(i32::from(self.decimals));
        let amount = raw_amount.to_string().parse::<f64>().unwrap_or(0.0);
        self.price * (amount / scale)
    }
}

/// Source of historical token prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of `token` on `chain_id` at `timestamp`.
    ///
    /// # Errors
    /// Returns error if the price is unknown or the source is unreachable.
    async fn get_price(
        &self,
        token: Address,
        chain_id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<TokenPrice>;
}

/// Fixed price table, independent of chain and time.
#[derive(Clone, Debug, Default)]
pub struct StaticPriceOracle {
    prices: HashMap<Address, TokenPrice>,
}

impl StaticPriceOracle {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a token price.
    pub fn with_price(mut self, token: Address, price: f64, decimals: u8) -> Self {
        self.prices.insert(token, TokenPrice { price, decimals });
        self
    }

    /// Reads a JSON object mapping token address to `{ "price", "decimals" }`.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read price file {}", path.display()))?;
        let prices: HashMap<Address, TokenPrice> = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse price file {}", path.display()))?;
        Ok(Self { prices })
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn get_price(
        &self,
        token: Address,
        _chain_id: u64,
        _timestamp: DateTime<Utc>,
    ) -> Result<TokenPrice> {
        self.prices
            .get(&token)
            .copied()
            .ok_or_else(|| eyre!("no static price for token {token:#x}"))
    }
}

/// DefiLlama chain slug for an EIP-155 chain id.
pub fn llama_chain_slug(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("ethereum"),
        10 => Some("optimism"),
        56 => Some("bsc"),
        137 => Some("polygon"),
        1284 => Some("moonbeam"),
        8453 => Some("base"),
        42161 => Some("arbitrum"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct LlamaResponse {
    coins: HashMap<String, LlamaCoin>,
}

#[derive(Debug, Deserialize)]
struct LlamaCoin {
    price: f64,
    #[serde(default)]
    decimals: Option<u8>,
}

type CacheKey = (u64, Address, i64);

/// Historical prices from the DefiLlama coins API, cached per
/// `(chain, token, timestamp)`.
pub struct LlamaPriceOracle {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<CacheKey, TokenPrice>>,
}

impl LlamaPriceOracle {
    /// Creates an oracle against `base_url` (see [`LLAMA_BASE_URL`]).
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, key: &CacheKey) -> Option<TokenPrice> {
        self.cache.lock().ok()?.get(key).copied()
    }

    fn remember(&self, key: CacheKey, price: TokenPrice) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, price);
        }
    }

    async fn fetch(&self, url: &str, coin_key: &str) -> Result<TokenPrice> {
        for attempt in 0..MAX_ATTEMPTS {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .wrap_err("price API HTTP request failed")?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt + 1 < MAX_ATTEMPTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                warn!(
                    status = status.as_u16(),
                    retry_after_s = retry_after,
                    "price API rate limit hit, waiting"
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(eyre!(
                    "price API returned HTTP {}: {}",
                    status.as_u16(),
                    body
                ));
            }

            let body = response
                .text()
                .await
                .wrap_err("failed to read price API response body")?;
            return parse_llama_coin(&body, coin_key);
        }

        Err(eyre!("price API still rate limited after {MAX_ATTEMPTS} attempts"))
    }
}

#[async_trait]
impl PriceOracle for LlamaPriceOracle {
    #[tracing::instrument(skip_all, fields(token = %token, chain_id = chain_id))]
    async fn get_price(
        &self,
        token: Address,
        chain_id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<TokenPrice> {
        let key = (chain_id, token, timestamp.timestamp());
        if let Some(price) = self.cached(&key) {
            return Ok(price);
        }

        let slug = llama_chain_slug(chain_id)
            .ok_or_else(|| eyre!("chain {chain_id} has no price source"))?;
        let coin_key = format!("{slug}:{token:#x}");
        let url = format!(
            "{}/prices/historical/{}/{}",
            self.base_url,
            timestamp.timestamp(),
            coin_key
        );
        debug!(url = url.as_str(), "fetching token price");

        let price = self.fetch(&url, &coin_key).await?;
        self.remember(key, price);
        Ok(price)
    }
}

/// Extracts one coin's quote from a DefiLlama `/prices` response body.
fn parse_llama_coin(body: &str, coin_key: &str) -> Result<TokenPrice> {
    let response: LlamaResponse =
        serde_json::from_str(body).wrap_err("failed to parse price API JSON")?;
    // The API lowercases keys; match case-insensitively to be safe.
    let coin = response
        .coins
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(coin_key))
        .map(|(_, coin)| coin)
        .ok_or_else(|| eyre!("price API has no quote for {coin_key}"))?;
    let decimals = coin
        .decimals
        .ok_or_else(|| eyre!("price API omitted decimals for {coin_key}"))?;
    Ok(TokenPrice {
        price: coin.price,
        decimals,
    })
}
