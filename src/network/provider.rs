// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::RootProvider;
use rand::seq::SliceRandom;
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = RootProvider::new_http(url);
        Ok(provider)
    }

    /// Shuffle the configured endpoints so successive rounds spread load
    /// across providers instead of hammering the first entry.
    pub fn shuffled_endpoints(rpcs: &[String]) -> Vec<String> {
        let mut out = rpcs.to_vec();
        out.shuffle(&mut rand::thread_rng());
        out
    }

    /// Connect to the first reachable endpoint of an already-shuffled list.
    pub fn first_available(rpcs: &[String]) -> Result<HttpProvider, AppError> {
        let mut last_err = AppError::Config("No RPC endpoints configured".into());
        for rpc in rpcs {
            match Self::http(rpc) {
                Ok(provider) => {
                    tracing::debug!(target: "rpc", rpc = %rpc, "Using HTTP provider");
                    return Ok(provider);
                }
                Err(e) => {
                    tracing::warn!(target: "rpc", rpc = %rpc, error = %e, "Skipping invalid RPC URL");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}
