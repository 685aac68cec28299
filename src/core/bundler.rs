// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::constants::MULTICALL3;
use crate::common::error::AppError;
use crate::common::math::scale_18;
use crate::core::types::{BundledPair, Order, OrderQuote, TakeOrder, TokenInfo};
use crate::data::abi::{IERC20, IMulticall3, IOrderBookV4, QuoteConfig};
use crate::network::provider::HttpProvider;
use alloy::primitives::Address;
use alloy_sol_types::SolCall;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Arc;

/// Groups take-order records into per-pair bundles keyed by
/// `(orderbook, sellToken, buyToken)`, with fresh on-chain quotes attached.
pub struct Bundler {
    provider: HttpProvider,
    bundle: bool,
    shuffle: bool,
}

impl Bundler {
    pub fn new(provider: HttpProvider, bundle: bool, shuffle: bool) -> Self {
        Self {
            provider,
            bundle,
            shuffle,
        }
    }

    /// Expand orders into one take-order per distinct (output, input)
    /// direction.
    pub fn extract_take_orders(orders: &[Arc<Order>]) -> Vec<TakeOrder> {
        let mut out = Vec::new();
        for order in orders {
            for (output_io, output) in order.inner.validOutputs.iter().enumerate() {
                for (input_io, input) in order.inner.validInputs.iter().enumerate() {
                    if input.token == output.token {
                        continue;
                    }
                    out.push(TakeOrder {
                        order: order.clone(),
                        input_io,
                        output_io,
                        quote: None,
                    });
                }
            }
        }
        out
    }

    /// Group quoted take-orders, preserving first-encounter order of pairs.
    /// Every emitted bundle holds at least one non-zero-balance order.
    pub fn group(
        take_orders: Vec<TakeOrder>,
        tokens: &HashMap<Address, TokenInfo>,
        bundle: bool,
    ) -> Vec<BundledPair> {
        let mut keys: Vec<(Address, Address, Address)> = Vec::new();
        let mut groups: HashMap<(Address, Address, Address), Vec<TakeOrder>> = HashMap::new();

        for to in take_orders {
            if to.max_output().is_zero() {
                continue;
            }
            let key = (to.order.orderbook, to.sell_token(), to.buy_token());
            let entry = groups.entry(key).or_default();
            if entry.is_empty() {
                keys.push(key);
            }
            entry.push(to);
        }

        let token_info = |addr: Address, decimals: u8| {
            tokens.get(&addr).cloned().unwrap_or(TokenInfo {
                address: addr,
                decimals,
                symbol: format!("{addr:#x}")[..10].to_string(),
            })
        };

        let mut out = Vec::new();
        for key in keys {
            let Some(members) = groups.remove(&key) else {
                continue;
            };
            let (orderbook, sell_addr, buy_addr) = key;
            let sell_decimals = members[0].sell_decimals();
            let buy_decimals = members[0].buy_decimals();
            let sell = token_info(sell_addr, sell_decimals);
            let buy = token_info(buy_addr, buy_decimals);

            if bundle {
                out.push(BundledPair {
                    orderbook,
                    sell,
                    buy,
                    take_orders: members,
                });
            } else {
                for to in members {
                    out.push(BundledPair {
                        orderbook,
                        sell: sell.clone(),
                        buy: buy.clone(),
                        take_orders: vec![to],
                    });
                }
            }
        }
        out
    }

    /// Read current quotes for every take-order in a single multicall.
    /// Individual quote failures skip that order; only a failed multicall is
    /// an error.
    async fn attach_quotes(&self, take_orders: &mut Vec<TakeOrder>) -> Result<(), AppError> {
        if take_orders.is_empty() {
            return Ok(());
        }

        let calls: Vec<IMulticall3::Call3> = take_orders
            .iter()
            .map(|to| IMulticall3::Call3 {
                target: to.order.orderbook,
                allowFailure: true,
                callData: IOrderBookV4::quoteCall {
                    quoteConfig: QuoteConfig {
                        order: to.order.inner.clone(),
                        inputIOIndex: alloy::primitives::U256::from(to.input_io as u64),
                        outputIOIndex: alloy::primitives::U256::from(to.output_io as u64),
                        signedContext: vec![],
                    },
                }
                .abi_encode()
                .into(),
            })
            .collect();

        let results = IMulticall3::new(MULTICALL3, self.provider.clone())
            .aggregate3(calls)
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("quote multicall failed: {e}")))?;

        for (to, result) in take_orders.iter_mut().zip(results) {
            if !result.success {
                tracing::warn!(
                    target: "bundler",
                    order = %to.order.hash,
                    "quote reverted, skipping take-order"
                );
                continue;
            }
            match IOrderBookV4::quoteCall::abi_decode_returns(&result.returnData) {
                Ok(ret) if ret.exists => {
                    // Amount math downstream is 18-decimal fixed point; the
                    // on-chain max output arrives in sell-token decimals.
                    to.quote = Some(OrderQuote {
                        max_output: scale_18(ret.outputMax, to.sell_decimals()),
                        ratio: ret.ioRatio,
                    });
                }
                Ok(_) => {
                    tracing::debug!(target: "bundler", order = %to.order.hash, "order no longer exists");
                }
                Err(e) => {
                    tracing::warn!(target: "bundler", order = %to.order.hash, error = %e, "quote decode failed");
                }
            }
        }
        Ok(())
    }

    async fn fetch_symbols(
        &self,
        take_orders: &[TakeOrder],
    ) -> Result<HashMap<Address, TokenInfo>, AppError> {
        let mut tokens: HashMap<Address, u8> = HashMap::new();
        for to in take_orders {
            tokens.entry(to.sell_token()).or_insert(to.sell_decimals());
            tokens.entry(to.buy_token()).or_insert(to.buy_decimals());
        }
        let addrs: Vec<Address> = tokens.keys().copied().collect();

        let calls: Vec<IMulticall3::Call3> = addrs
            .iter()
            .map(|addr| IMulticall3::Call3 {
                target: *addr,
                allowFailure: true,
                callData: IERC20::symbolCall {}.abi_encode().into(),
            })
            .collect();

        let results = IMulticall3::new(MULTICALL3, self.provider.clone())
            .aggregate3(calls)
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("symbol multicall failed: {e}")))?;

        let mut out = HashMap::new();
        for (addr, result) in addrs.into_iter().zip(results) {
            let symbol = if result.success {
                IERC20::symbolCall::abi_decode_returns(&result.returnData)
                    .unwrap_or_else(|_| format!("{addr:#x}")[..10].to_string())
            } else {
                format!("{addr:#x}")[..10].to_string()
            };
            out.insert(
                addr,
                TokenInfo {
                    address: addr,
                    decimals: tokens[&addr],
                    symbol,
                },
            );
        }
        Ok(out)
    }

    pub async fn bundle_orders(&self, orders: &[Arc<Order>]) -> Result<Vec<BundledPair>, AppError> {
        let mut take_orders = Self::extract_take_orders(orders);
        self.attach_quotes(&mut take_orders).await?;
        take_orders.retain(|to| to.quote.is_some());

        let tokens = self.fetch_symbols(&take_orders).await?;
        let mut pairs = Self::group(take_orders, &tokens, self.bundle);

        if self.shuffle {
            pairs.shuffle(&mut rand::thread_rng());
        }

        tracing::info!(target: "bundler", pairs = pairs.len(), "Bundled orders");
        Ok(pairs)
    }
}
