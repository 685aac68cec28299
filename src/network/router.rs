// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::core::types::TokenInfo;
use crate::network::pool_cache::{PoolCache, PoolState};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

/// Route-code wire format understood by the deployed route processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteVersion {
    V3,
    V3_1,
    V3_2,
    V4,
}

impl FromStr for RouteVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3" => Ok(RouteVersion::V3),
            "3.1" => Ok(RouteVersion::V3_1),
            "3.2" => Ok(RouteVersion::V3_2),
            "4" => Ok(RouteVersion::V4),
            other => Err(format!("unknown route version {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteLeg {
    pub pool: PoolState,
    pub token_in: Address,
    pub token_out: Address,
}

/// Best route found for an input size, with the quoted output in the
/// destination token's own decimals.
#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub amount_in: U256,
    pub amount_out: U256,
    pub legs: Vec<RouteLeg>,
    pub visual: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum RouteError {
    /// No pool path connects the pair at any size.
    NoWay,
    Rpc(String),
}

#[async_trait]
pub trait RouteFinder: Send + Sync {
    async fn best_route(
        &self,
        from: &TokenInfo,
        to: &TokenInfo,
        amount_in: U256,
    ) -> Result<RouteQuote, RouteError>;

    /// Encode a found route as route-processor calldata paying out to
    /// `recipient`.
    fn encode(&self, quote: &RouteQuote, recipient: Address) -> Bytes;
}

/// Routes across the cached V2-style pools: direct pairs and one-intermediate
/// paths, best-output wins.
pub struct PoolRouter {
    cache: Arc<PoolCache>,
    intermediates: Vec<Address>,
    version: RouteVersion,
}

// Route-processor command codes.
const CMD_PROCESS_USER_ERC20: u8 = 2;
const CMD_PROCESS_MY_ERC20: u8 = 1;
const POOL_TYPE_CONSTANT_PRODUCT: u8 = 0;
const FULL_SHARE: u16 = u16::MAX;

impl PoolRouter {
    pub fn new(cache: Arc<PoolCache>, intermediates: Vec<Address>, version: RouteVersion) -> Self {
        Self {
            cache,
            intermediates,
            version,
        }
    }

    fn quote_pool(pool: &PoolState, token_in: Address, amount_in: U256) -> Option<U256> {
        let (reserve_in, reserve_out) = if token_in == pool.token0 {
            (pool.reserve0, pool.reserve1)
        } else if token_in == pool.token1 {
            (pool.reserve1, pool.reserve0)
        } else {
            return None;
        };
        if reserve_in.is_zero() || reserve_out.is_zero() || amount_in.is_zero() {
            return None;
        }
        let fee_keep = U256::from(10_000 - pool.fee_bps);
        let amount_in_with_fee = amount_in.saturating_mul(fee_keep);
        let numerator = amount_in_with_fee.saturating_mul(reserve_out);
        let denominator = reserve_in
            .saturating_mul(U256::from(10_000u64))
            .saturating_add(amount_in_with_fee);
        if denominator.is_zero() {
            return None;
        }
        Some(numerator / denominator)
    }

    fn best_hop(&self, from: Address, to: Address, amount_in: U256) -> Option<(PoolState, U256)> {
        self.cache
            .pools_for(from, to)
            .into_iter()
            .filter_map(|pool| Self::quote_pool(&pool, from, amount_in).map(|out| (pool, out)))
            .max_by_key(|(_, out)| *out)
    }

    fn pool_byte_len(&self) -> usize {
        // type + address + direction + recipient, plus the v4 callback flag.
        match self.version {
            RouteVersion::V4 => 1 + 20 + 1 + 20 + 1,
            _ => 1 + 20 + 1 + 20,
        }
    }

    fn encode_pool(&self, out: &mut Vec<u8>, leg: &RouteLeg, recipient: Address) {
        out.push(POOL_TYPE_CONSTANT_PRODUCT);
        out.extend_from_slice(leg.pool.address.as_slice());
        out.push(if leg.token_in == leg.pool.token0 { 1 } else { 0 });
        out.extend_from_slice(recipient.as_slice());
        if self.version == RouteVersion::V4 {
            out.push(0); // no callback
        }
    }
}

#[async_trait]
impl RouteFinder for PoolRouter {
    async fn best_route(
        &self,
        from: &TokenInfo,
        to: &TokenInfo,
        amount_in: U256,
    ) -> Result<RouteQuote, RouteError> {
        let direct = self.best_hop(from.address, to.address, amount_in).map(
            |(pool, out)| RouteQuote {
                amount_in,
                amount_out: out,
                visual: vec![from.symbol.clone(), pool.lp.clone(), to.symbol.clone()],
                legs: vec![RouteLeg {
                    pool,
                    token_in: from.address,
                    token_out: to.address,
                }],
            },
        );

        let mut best = direct;
        for mid in &self.intermediates {
            if *mid == from.address || *mid == to.address {
                continue;
            }
            let Some((first, mid_out)) = self.best_hop(from.address, *mid, amount_in) else {
                continue;
            };
            let Some((second, out)) = self.best_hop(*mid, to.address, mid_out) else {
                continue;
            };
            let better = best
                .as_ref()
                .map(|b| out > b.amount_out)
                .unwrap_or(true);
            if better {
                best = Some(RouteQuote {
                    amount_in,
                    amount_out: out,
                    visual: vec![
                        from.symbol.clone(),
                        first.lp.clone(),
                        format!("{mid:#x}"),
                        second.lp.clone(),
                        to.symbol.clone(),
                    ],
                    legs: vec![
                        RouteLeg {
                            pool: first,
                            token_in: from.address,
                            token_out: *mid,
                        },
                        RouteLeg {
                            pool: second,
                            token_in: *mid,
                            token_out: to.address,
                        },
                    ],
                });
            }
        }

        best.ok_or(RouteError::NoWay)
    }

    fn encode(&self, quote: &RouteQuote, recipient: Address) -> Bytes {
        let mut out = Vec::with_capacity(quote.legs.len() * (24 + self.pool_byte_len()));
        for (i, leg) in quote.legs.iter().enumerate() {
            // First hop spends the caller's tokens, later hops spend the
            // processor's own balance deposited by the previous pool.
            out.push(if i == 0 {
                CMD_PROCESS_USER_ERC20
            } else {
                CMD_PROCESS_MY_ERC20
            });
            out.extend_from_slice(leg.token_in.as_slice());
            out.push(1); // pool count for this token
            out.extend_from_slice(&FULL_SHARE.to_be_bytes());
            let leg_recipient = if i + 1 == quote.legs.len() {
                recipient
            } else {
                quote.legs[i + 1].pool.address
            };
            self.encode_pool(&mut out, leg, leg_recipient);
        }
        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::provider::HttpProvider;
    use std::collections::HashMap;
    use url::Url;

    fn token(byte: u8, symbol: &str) -> TokenInfo {
        TokenInfo {
            address: Address::from([byte; 20]),
            decimals: 18,
            symbol: symbol.into(),
        }
    }

    fn pool(a: Address, b: Address, reserve_a: u64, reserve_b: u64) -> PoolState {
        let key = PoolCache::token_pair_key(a, b);
        let (r0, r1) = if key.0 == a {
            (reserve_a, reserve_b)
        } else {
            (reserve_b, reserve_a)
        };
        PoolState {
            address: Address::from([0xee; 20]),
            lp: "uniswap_v2".into(),
            token0: key.0,
            token1: key.1,
            reserve0: U256::from(r0),
            reserve1: U256::from(r1),
            fee_bps: 30,
        }
    }

    fn router_with(pools: Vec<PoolState>, intermediates: Vec<Address>) -> PoolRouter {
        let provider = HttpProvider::new_http(Url::parse("http://127.0.0.1:8545").unwrap());
        let dir = std::env::temp_dir().join(format!(
            "obclear-router-{}-{}",
            std::process::id(),
            pools.len()
        ));
        let cache = PoolCache::new(provider, HashMap::new(), dir);
        for p in &pools {
            // Seed through the public surface used by tests only.
            cache
                .test_insert(PoolCache::token_pair_key(p.token0, p.token1), p.clone());
        }
        PoolRouter::new(Arc::new(cache), intermediates, RouteVersion::V4)
    }

    #[tokio::test]
    async fn direct_route_quotes_constant_product() {
        let from = token(0x01, "SELL");
        let to = token(0x02, "BUY");
        let router = router_with(
            vec![pool(from.address, to.address, 1_000_000, 1_000_000)],
            vec![],
        );

        let quote = router
            .best_route(&from, &to, U256::from(1_000u64))
            .await
            .expect("route exists");
        // 1000 in on a balanced 1e6/1e6 pool with 0.3% fee pays out 996.
        assert_eq!(quote.amount_out, U256::from(996u64));
        assert_eq!(quote.legs.len(), 1);
        assert_eq!(quote.visual, vec!["SELL", "uniswap_v2", "BUY"]);
    }

    #[tokio::test]
    async fn missing_pool_is_no_way() {
        let from = token(0x01, "SELL");
        let to = token(0x02, "BUY");
        let router = router_with(vec![], vec![]);
        assert!(matches!(
            router.best_route(&from, &to, U256::from(1u64)).await,
            Err(RouteError::NoWay)
        ));
    }

    #[tokio::test]
    async fn intermediate_route_beats_absent_direct() {
        let from = token(0x01, "SELL");
        let to = token(0x02, "BUY");
        let mid = Address::from([0x03; 20]);
        let router = router_with(
            vec![
                pool(from.address, mid, 1_000_000, 1_000_000),
                pool(mid, to.address, 1_000_000, 1_000_000),
            ],
            vec![mid],
        );

        let quote = router
            .best_route(&from, &to, U256::from(1_000u64))
            .await
            .expect("two-hop route exists");
        assert_eq!(quote.legs.len(), 2);
        assert!(quote.amount_out < U256::from(996u64), "two fees paid");
    }

    #[tokio::test]
    async fn encoded_route_chains_recipients() {
        let from = token(0x01, "SELL");
        let to = token(0x02, "BUY");
        let mid = Address::from([0x03; 20]);
        let router = router_with(
            vec![
                pool(from.address, mid, 1_000_000, 1_000_000),
                pool(mid, to.address, 1_000_000, 1_000_000),
            ],
            vec![mid],
        );
        let quote = router
            .best_route(&from, &to, U256::from(1_000u64))
            .await
            .unwrap();

        let recipient = Address::from([0xaa; 20]);
        let encoded = router.encode(&quote, recipient);
        assert_eq!(encoded[0], CMD_PROCESS_USER_ERC20);
        // Final 21 bytes: recipient then the v4 callback flag.
        let tail = &encoded[encoded.len() - 21..];
        assert_eq!(&tail[..20], recipient.as_slice());
        assert_eq!(tail[20], 0);
    }
}
