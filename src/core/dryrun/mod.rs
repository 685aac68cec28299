// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod intra;
pub mod route;

use alloy::primitives::U256;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub use intra::IntraDryrun;
pub use route::RouteDryrun;

/// Per-pair inputs shared by every probe of a sizing run. Read-only except
/// for the `price_match` flag, which a probe clears when the top order prices
/// itself above market.
#[derive(Clone)]
pub struct DryrunCtx {
    pub gas_price: u128,
    /// Buy-token per 1 native, 18-decimal. `None` when no route prices it.
    pub native_price_buy: Option<U256>,
    /// Sell-token per 1 native, 18-decimal.
    pub native_price_sell: Option<U256>,
    pub block_number: u64,
    pub price_match: Arc<AtomicBool>,
}

impl DryrunCtx {
    pub fn new(gas_price: u128, block_number: u64) -> Self {
        Self {
            gas_price,
            native_price_buy: None,
            native_price_sell: None,
            block_number,
            price_match: Arc::new(AtomicBool::new(true)),
        }
    }
}
