// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::constants::{
    self, MAX_HOPS, MAX_RETRIES, ROUTE_PROCESSOR_3, ROUTE_PROCESSOR_3_1, ROUTE_PROCESSOR_3_2,
    ROUTE_PROCESSOR_4,
};
use crate::common::error::AppError;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    // Transport
    pub rpc: Vec<String>,
    pub flashbot_rpc: Option<String>,

    // Identity
    pub key: String,

    // Contracts
    pub arb_address: Address,
    pub orderbook_address: Option<Address>,
    pub route_processors: Option<HashMap<String, String>>,
    #[serde(default = "default_route_version")]
    pub route_version: String,

    // Order sources and indexer filters
    pub orders: Option<String>,
    #[serde(default)]
    pub subgraph: Vec<String>,
    pub order_hash: Option<String>,
    pub order_owner: Option<Address>,
    pub order_interpreter: Option<Address>,

    // Liquidity
    pub lps: Option<Vec<String>>,
    #[serde(default = "default_pool_update_interval")]
    pub pool_update_interval: u64,

    // Clearing behaviour
    #[serde(default = "default_gas_coverage")]
    pub gas_coverage: u64,
    #[serde(default)]
    pub max_ratio: bool,
    #[serde(default = "default_true")]
    pub bundle: bool,
    #[serde(default = "default_hops")]
    pub hops: u32,
    #[serde(default = "default_retries")]
    pub retries: u32,

    // Round loop
    #[serde(default = "default_repetitions")]
    pub repetitions: i64,
    #[serde(default = "default_sleep")]
    pub sleep: u64,
    pub timeout: Option<u64>,

    // Misc
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

fn default_route_version() -> String {
    "4".to_string()
}
fn default_pool_update_interval() -> u64 {
    15
}
fn default_gas_coverage() -> u64 {
    100
}
fn default_true() -> bool {
    true
}
fn default_hops() -> u32 {
    constants::DEFAULT_HOPS
}
fn default_retries() -> u32 {
    1
}
fn default_repetitions() -> i64 {
    -1
}
fn default_sleep() -> u64 {
    10
}

impl Settings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        builder = builder.add_source(Environment::default().list_separator(",").with_list_parse_key("rpc").try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.rpc.is_empty() {
            return Err(AppError::Config("rpc list is empty".into()));
        }
        if self.key.trim().is_empty() {
            return Err(AppError::Config("KEY is missing".into()));
        }
        if self.orders.is_none() && self.subgraph.is_empty() {
            return Err(AppError::Config(
                "No order source: set `orders` (file) and/or `subgraph`".into(),
            ));
        }
        if !(1..=MAX_RETRIES).contains(&self.retries) {
            return Err(AppError::Config(format!(
                "retries must be in 1..={MAX_RETRIES}, got {}",
                self.retries
            )));
        }
        if !(1..=MAX_HOPS).contains(&self.hops) {
            return Err(AppError::Config(format!(
                "hops must be in 1..={MAX_HOPS}, got {}",
                self.hops
            )));
        }
        if !matches!(self.route_version.as_str(), "3" | "3.1" | "3.2" | "4") {
            return Err(AppError::Config(format!(
                "route_version must be one of 3, 3.1, 3.2, 4; got {}",
                self.route_version
            )));
        }
        if self.repetitions < -1 || self.repetitions == 0 {
            return Err(AppError::Config(
                "repetitions must be -1 (infinite) or a positive count".into(),
            ));
        }
        Ok(())
    }

    /// Route-processor deployment for the configured version: explicit config
    /// wins, otherwise the bundled default for that version.
    pub fn route_processor_address(&self) -> Result<Address, AppError> {
        if let Some(map) = &self.route_processors {
            if let Some(raw) = map.get(&self.route_version) {
                return Address::from_str(raw)
                    .map_err(|_| AppError::InvalidAddress(format!("route_processors: {raw}")));
            }
        }
        Ok(match self.route_version.as_str() {
            "3" => ROUTE_PROCESSOR_3,
            "3.1" => ROUTE_PROCESSOR_3_1,
            "3.2" => ROUTE_PROCESSOR_3_2,
            _ => ROUTE_PROCESSOR_4,
        })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.unwrap_or(60_000)
    }

    pub fn explorer_base(&self, chain_id: u64) -> String {
        self.explorer_url
            .clone()
            .unwrap_or_else(|| constants::explorer_for_chain(chain_id).to_string())
    }
}
