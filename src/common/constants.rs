// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use alloy::primitives::{Address, U256, address};
use lazy_static::lazy_static;
use std::collections::HashMap;

// =============================================================================
// NETWORK CONSTANTS
// =============================================================================

pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_BSC: u64 = 56;
pub const CHAIN_POLYGON: u64 = 137;
pub const CHAIN_ARBITRUM: u64 = 42161;

pub const WETH_MAINNET: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const WETH_ARBITRUM: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
pub const WMATIC_POLYGON: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
pub const WBNB_BSC: Address = address!("BB4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");

pub fn wrapped_native_for_chain(chain_id: u64) -> Address {
    match chain_id {
        CHAIN_BSC => WBNB_BSC,
        CHAIN_POLYGON => WMATIC_POLYGON,
        CHAIN_ARBITRUM => WETH_ARBITRUM,
        _ => WETH_MAINNET,
    }
}

pub fn explorer_for_chain(chain_id: u64) -> &'static str {
    match chain_id {
        CHAIN_BSC => "https://bscscan.com",
        CHAIN_POLYGON => "https://polygonscan.com",
        CHAIN_ARBITRUM => "https://arbiscan.io",
        _ => "https://etherscan.io",
    }
}

/// Canonical Multicall3 deployment, same address on every supported chain.
pub const MULTICALL3: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

// =============================================================================
// ROUTE PROCESSOR DEPLOYMENTS (config-overridable defaults, mainnet)
// =============================================================================

pub const ROUTE_PROCESSOR_3: Address = address!("827179dD56d07A7eeA32e3873493835da2866976");
pub const ROUTE_PROCESSOR_3_1: Address = address!("8615cd35eec376255b4752e4c4e5c2ba55eb0c9f");
pub const ROUTE_PROCESSOR_3_2: Address = address!("544bA588efD839d2692Fc31EA991cD39993c135F");
pub const ROUTE_PROCESSOR_4: Address = address!("e43ca1Dee3F0fc1e2df73A0745674545F11A59F5");

// =============================================================================
// LIQUIDITY PROVIDERS
// =============================================================================

lazy_static! {
    // V2-style factories keyed by the allow-list names accepted in config.
    pub static ref DEX_FACTORIES_MAINNET: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();
        m.insert("uniswap_v2", address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"));
        m.insert("sushiswap", address!("C0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac"));
        m.insert("pancakeswap", address!("1097053Fd2ea711dad45caCcc45EfF7548fCB362"));
        m
    };

    pub static ref DEX_FACTORIES_POLYGON: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();
        m.insert("sushiswap", address!("c35DADB65012eC5796536bD9864eD8773aBc74C4"));
        m.insert("quickswap", address!("5757371414417b8C6CAad45bAeF941aBc7d3Ab32"));
        m
    };

    pub static ref DEX_FACTORIES_ARBITRUM: HashMap<&'static str, Address> = {
        let mut m = HashMap::new();
        m.insert("sushiswap", address!("c35DADB65012eC5796536bD9864eD8773aBc74C4"));
        m.insert("camelot", address!("6EcCab422D763aC031210895C81787E87B43A652"));
        m
    };
}

pub fn default_factories_for_chain(chain_id: u64) -> HashMap<&'static str, Address> {
    match chain_id {
        CHAIN_POLYGON => DEX_FACTORIES_POLYGON.clone(),
        CHAIN_ARBITRUM => DEX_FACTORIES_ARBITRUM.clone(),
        _ => DEX_FACTORIES_MAINNET.clone(),
    }
}

// =============================================================================
// CLEARING CONSTANTS
// =============================================================================

/// Gas estimates and bounty floors are padded by 3% before use.
pub const GAS_HEADROOM_PERCENT: u64 = 103;

/// Bundle-mode price filter keeps orders priced within 2% of market.
pub const RATIO_HEADROOM_PERCENT: u64 = 102;

/// Vault id both sides of an intra-orderbook clear use for the bounty.
pub const BOUNTY_VAULT_ID: U256 = U256::from_limbs([1, 0, 0, 0]);

/// One whole unit of the native token, used to probe the native price route.
pub const NATIVE_UNIT: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

pub const DEFAULT_HOPS: u32 = 7;
pub const MAX_HOPS: u32 = 10;
pub const MAX_RETRIES: u32 = 3;

/// On-disk pool memoisation, wiped and recreated at every refresh tick.
pub const MEM_CACHE_DIR: &str = "./mem-cache";
