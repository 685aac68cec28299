// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::NATIVE_UNIT;
use crate::common::error::AppError;
use crate::common::math::{ONE_18, scale_18};
use crate::common::retry::retry_async;
use crate::core::types::TokenInfo;
use crate::network::provider::HttpProvider;
use crate::network::router::{RouteError, RouteFinder};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

// Memoise native-price lookups per block bucket so a tight dryrun loop
// doesn't recompute the same route.
const PRICE_TTL_SECS: u64 = 60;
const BLOCK_BUCKET: u64 = 5;

#[derive(Clone)]
pub struct GasOracle {
    provider: HttpProvider,
    price_cache: Arc<RwLock<HashMap<(Address, u64), (U256, Instant)>>>,
}

impl GasOracle {
    pub fn new(provider: HttpProvider) -> Self {
        Self {
            provider,
            price_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn gas_price(&self) -> Result<u128, AppError> {
        let provider = self.provider.clone();
        retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_gas_price().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Rpc(format!("gas price fetch failed: {e}")))
    }

    /// Price of one whole native token expressed in `buy`, 18-decimal,
    /// obtained by routing one native unit through the route finder.
    /// `None` when no route connects the wrapped native to the buy token.
    pub async fn native_price(
        &self,
        router: &dyn RouteFinder,
        wrapped_native: &TokenInfo,
        buy: &TokenInfo,
        block_number: u64,
    ) -> Result<Option<U256>, AppError> {
        if buy.address == wrapped_native.address {
            return Ok(Some(ONE_18));
        }

        let bucket = block_number / BLOCK_BUCKET;
        let key = (buy.address, bucket);
        {
            let cache = self.price_cache.read().await;
            if let Some((price, at)) = cache.get(&key) {
                if at.elapsed().as_secs() < PRICE_TTL_SECS {
                    return Ok(Some(*price));
                }
            }
        }

        let quote = match router.best_route(wrapped_native, buy, NATIVE_UNIT).await {
            Ok(q) => q,
            Err(RouteError::NoWay) => return Ok(None),
            Err(RouteError::Rpc(e)) => {
                return Err(AppError::Rpc(format!("native price route failed: {e}")));
            }
        };

        // Input is exactly 1.0 native, so the scaled output is the price.
        let price = scale_18(quote.amount_out, buy.decimals);
        self.price_cache.write().await.insert(key, (price, Instant::now()));
        Ok(Some(price))
    }
}
