// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::MULTICALL3;
use crate::common::error::AppError;
use crate::data::abi::{IMulticall3, IUniswapV2Factory, IUniswapV2Pair};
use crate::network::provider::HttpProvider;
use alloy::primitives::{Address, U256};
use alloy_sol_types::SolCall;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// One V2-style pool known to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub address: Address,
    pub lp: String,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee_bps: u32,
}

fn fee_for_lp(lp: &str) -> u32 {
    match lp {
        "pancakeswap" => 25,
        _ => 30,
    }
}

/// Pool memoisation shared across a round. Discovered pools persist under
/// `./mem-cache`; a refresh tick wipes and recreates that directory.
pub struct PoolCache {
    provider: HttpProvider,
    dir: PathBuf,
    factories: HashMap<String, Address>,
    pools: DashMap<(Address, Address), Vec<PoolState>>,
    // (pair key, lp) combinations known to have no pool, to skip re-lookups.
    absent: DashSet<(Address, Address, String)>,
}

impl PoolCache {
    pub fn new(
        provider: HttpProvider,
        factories: HashMap<String, Address>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        let cache = Self {
            provider,
            dir: dir.into(),
            factories,
            pools: DashMap::new(),
            absent: DashSet::new(),
        };
        cache.load_snapshot();
        cache
    }

    pub fn token_pair_key(a: Address, b: Address) -> (Address, Address) {
        if a < b { (a, b) } else { (b, a) }
    }

    pub fn pools_for(&self, a: Address, b: Address) -> Vec<PoolState> {
        self.pools
            .get(&Self::token_pair_key(a, b))
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Discover pools for a token pair across the allow-listed providers and
    /// bring their reserves up to date. One factory lookup per unknown
    /// (pair, lp); reserves are batched through Multicall3.
    pub async fn ensure_pair(&self, a: Address, b: Address) -> Result<(), AppError> {
        let key = Self::token_pair_key(a, b);

        for (lp, factory) in &self.factories {
            let known = self
                .pools
                .get(&key)
                .map(|entry| entry.iter().any(|p| &p.lp == lp))
                .unwrap_or(false);
            if known || self.absent.contains(&(key.0, key.1, lp.clone())) {
                continue;
            }

            let pair_addr = IUniswapV2Factory::new(*factory, self.provider.clone())
                .getPair(key.0, key.1)
                .call()
                .await
                .map_err(|e| AppError::Rpc(format!("getPair failed on {lp}: {e}")))?;

            if pair_addr == Address::ZERO {
                self.absent.insert((key.0, key.1, lp.clone()));
                continue;
            }

            self.pools.entry(key).or_default().push(PoolState {
                address: pair_addr,
                lp: lp.clone(),
                token0: key.0,
                token1: key.1,
                reserve0: U256::ZERO,
                reserve1: U256::ZERO,
                fee_bps: fee_for_lp(lp),
            });
        }

        self.update_reserves(key).await?;
        self.snapshot_to_disk();
        Ok(())
    }

    async fn update_reserves(&self, key: (Address, Address)) -> Result<(), AppError> {
        let pool_addrs: Vec<Address> = match self.pools.get(&key) {
            Some(entry) => entry.iter().map(|p| p.address).collect(),
            None => return Ok(()),
        };
        if pool_addrs.is_empty() {
            return Ok(());
        }

        let calls: Vec<IMulticall3::Call3> = pool_addrs
            .iter()
            .map(|addr| IMulticall3::Call3 {
                target: *addr,
                allowFailure: true,
                callData: IUniswapV2Pair::getReservesCall {}.abi_encode().into(),
            })
            .collect();

        let results = IMulticall3::new(MULTICALL3, self.provider.clone())
            .aggregate3(calls)
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("reserve multicall failed: {e}")))?;

        if let Some(mut entry) = self.pools.get_mut(&key) {
            for (pool, result) in entry.iter_mut().zip(results) {
                if !result.success {
                    tracing::debug!(target: "pools", pool = %pool.address, "getReserves reverted");
                    continue;
                }
                match IUniswapV2Pair::getReservesCall::abi_decode_returns(&result.returnData) {
                    Ok(reserves) => {
                        pool.reserve0 = reserves.reserve0.to::<U256>();
                        pool.reserve1 = reserves.reserve1.to::<U256>();
                    }
                    Err(e) => {
                        tracing::debug!(target: "pools", pool = %pool.address, error = %e, "reserve decode failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop in-memory state without touching the disk snapshot.
    pub fn invalidate(&self) {
        self.pools.clear();
        self.absent.clear();
    }

    /// Full refresh: forget everything and recreate the backing directory.
    pub fn refresh(&self) {
        self.invalidate();
        if self.dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                tracing::warn!(target: "pools", error = %e, "mem-cache removal failed");
            }
        }
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::warn!(target: "pools", error = %e, "mem-cache recreation failed");
        }
        tracing::info!(target: "pools", dir = %self.dir.display(), "Pool cache refreshed");
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join("pools.json")
    }

    fn snapshot_to_disk(&self) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            tracing::debug!(target: "pools", error = %e, "mem-cache dir create failed");
            return;
        }
        let all: Vec<PoolState> = self
            .pools
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        match serde_json::to_vec(&all) {
            Ok(bytes) => {
                if let Err(e) = fs::write(self.snapshot_path(), bytes) {
                    tracing::debug!(target: "pools", error = %e, "snapshot write failed");
                }
            }
            Err(e) => tracing::debug!(target: "pools", error = %e, "snapshot encode failed"),
        }
    }

    #[cfg(test)]
    pub fn test_insert(&self, key: (Address, Address), pool: PoolState) {
        self.pools.entry(key).or_default().push(pool);
    }

    fn load_snapshot(&self) {
        let Ok(raw) = fs::read(self.snapshot_path()) else {
            return;
        };
        let Ok(pools) = serde_json::from_slice::<Vec<PoolState>>(&raw) else {
            tracing::warn!(target: "pools", "Discarding unreadable pool snapshot");
            return;
        };
        let count = pools.len();
        for pool in pools {
            let key = Self::token_pair_key(pool.token0, pool.token1);
            self.pools.entry(key).or_default().push(pool);
        }
        tracing::info!(target: "pools", count, "Loaded pool snapshot");
    }
}
