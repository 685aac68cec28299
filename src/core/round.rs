// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::app::config::Settings;
use crate::common::constants::{self, MEM_CACHE_DIR};
use crate::common::error::AppError;
use crate::core::bundler::Bundler;
use crate::core::dryrun::{IntraDryrun, RouteDryrun};
use crate::core::pair::{PairProcessor, ProcessorConfig};
use crate::core::simulator::TxSimulator;
use crate::core::types::{HaltReason, Order, PairReport, TakeOrder, TokenInfo};
use crate::data::orders::{self, OrderFilters, RawOrder};
use crate::network::gas::GasOracle;
use crate::network::pool_cache::PoolCache;
use crate::network::provider::{ConnectionFactory, HttpProvider};
use crate::network::router::{PoolRouter, RouteVersion};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Iterates bundles once per round and loops rounds until the configured
/// repetition count runs out. Owns the long-lived pieces: signer, settings,
/// order file contents and the pool-cache lifecycle.
pub struct Engine {
    settings: Settings,
    wallet: EthereumWallet,
    sender: Address,
    chain_id: u64,
    dry_run: bool,
}

impl Engine {
    pub fn new(
        settings: Settings,
        signer: PrivateKeySigner,
        chain_id: u64,
        dry_run: bool,
    ) -> Self {
        let sender = signer.address();
        Self {
            settings,
            wallet: EthereumWallet::from(signer),
            sender,
            chain_id,
            dry_run,
        }
    }

    pub async fn run(&self) -> Result<(), AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Initialization(format!("http client: {e}")))?;

        let file_orders: Option<Vec<RawOrder>> = match &self.settings.orders {
            Some(path) => Some(orders::load_from_file(path)?),
            None => None,
        };

        let refresh_interval = Duration::from_secs(self.settings.pool_update_interval * 60);
        let mut last_refresh = Instant::now();
        let mut round: i64 = 0;

        loop {
            round += 1;
            if self.settings.repetitions >= 0 && round > self.settings.repetitions {
                break;
            }

            let refresh_due = last_refresh.elapsed() >= refresh_interval;
            if refresh_due {
                last_refresh = Instant::now();
            }

            tracing::info!(target: "round", round, "Starting round");
            match self
                .run_round(&client, file_orders.as_deref(), refresh_due)
                .await
            {
                Ok(reports) => {
                    let cleared = reports
                        .iter()
                        .filter(|r| r.tx_url.is_some() && r.halt.is_none())
                        .count();
                    tracing::info!(
                        target: "round",
                        round,
                        pairs = reports.len(),
                        cleared,
                        "Round finished"
                    );
                }
                Err(e) => {
                    tracing::error!(target: "round", round, error = %e, "Round failed");
                }
            }

            sleep(Duration::from_secs(self.settings.sleep)).await;
        }
        Ok(())
    }

    /// One round: gather orders, bundle, process each pair in bundle order.
    /// Only `NoWalletFund` breaks the pair loop early.
    pub async fn run_round(
        &self,
        client: &reqwest::Client,
        file_orders: Option<&[RawOrder]>,
        refresh_due: bool,
    ) -> Result<Vec<PairReport>, AppError> {
        let rpcs = ConnectionFactory::shuffled_endpoints(&self.settings.rpc);
        let provider = ConnectionFactory::first_available(&rpcs)?;
        let submit_provider = match &self.settings.flashbot_rpc {
            Some(url) => ConnectionFactory::http(url)?,
            None => provider.clone(),
        };

        let orders = self.gather_orders(client, file_orders).await?;
        if orders.is_empty() {
            tracing::info!(target: "round", "No active orders");
            return Ok(vec![]);
        }

        let (processor, bundler) = self.wire(provider, submit_provider, refresh_due)?;

        let pairs = bundler.bundle_orders(&orders).await?;
        let opposing = opposing_map(&pairs);

        let mut reports = Vec::with_capacity(pairs.len());
        for mut pair in pairs {
            let key = (pair.orderbook, pair.buy.address, pair.sell.address);
            let counter = opposing.get(&key).map(Vec::as_slice).unwrap_or(&[]);
            let report = processor.process(&mut pair, counter).await;
            report.emit();
            let wallet_drained = report.halt == Some(HaltReason::NoWalletFund);
            reports.push(report);
            if wallet_drained {
                tracing::error!(
                    target: "round",
                    "Wallet cannot cover gas; abandoning remaining pairs"
                );
                break;
            }
        }
        Ok(reports)
    }

    async fn gather_orders(
        &self,
        client: &reqwest::Client,
        file_orders: Option<&[RawOrder]>,
    ) -> Result<Vec<Arc<Order>>, AppError> {
        let filters = OrderFilters {
            hash: self
                .settings
                .order_hash
                .as_deref()
                .map(|h| {
                    h.parse()
                        .map_err(|_| AppError::Config(format!("invalid order_hash {h}")))
                })
                .transpose()?,
            owner: self.settings.order_owner,
            interpreter: self.settings.order_interpreter,
        };

        let mut raws: Vec<RawOrder> = file_orders.map(|o| o.to_vec()).unwrap_or_default();
        for url in &self.settings.subgraph {
            match orders::fetch_from_subgraph(client, url).await {
                Ok(mut fetched) => raws.append(&mut fetched),
                Err(e) => {
                    tracing::warn!(target: "round", url = %url, error = %e, "subgraph fetch failed");
                }
            }
        }

        Ok(orders::into_orders(
            raws,
            &filters,
            self.settings.orderbook_address,
        ))
    }

    fn wire(
        &self,
        provider: HttpProvider,
        submit_provider: HttpProvider,
        refresh_due: bool,
    ) -> Result<(PairProcessor, Bundler), AppError> {
        let factories = allowed_factories(&self.settings, self.chain_id);
        let pool_cache = Arc::new(PoolCache::new(
            provider.clone(),
            factories,
            MEM_CACHE_DIR,
        ));
        if refresh_due {
            pool_cache.refresh();
        }

        let version = RouteVersion::from_str(&self.settings.route_version)
            .map_err(AppError::Config)?;
        let wrapped_native_addr = constants::wrapped_native_for_chain(self.chain_id);
        let wrapped_native = TokenInfo {
            address: wrapped_native_addr,
            decimals: 18,
            symbol: "WNATIVE".to_string(),
        };
        let router = Arc::new(PoolRouter::new(
            pool_cache.clone(),
            vec![wrapped_native_addr],
            version,
        ));
        let estimator = Arc::new(TxSimulator::new(provider.clone()));
        let gas_oracle = GasOracle::new(provider.clone());

        let route_dryrun = RouteDryrun::new(
            router.clone(),
            estimator.clone(),
            self.sender,
            self.settings.arb_address,
            self.settings.route_processor_address()?,
            self.settings.gas_coverage,
            self.settings.max_ratio,
        );
        let intra_dryrun = IntraDryrun::new(
            estimator,
            self.sender,
            self.settings.gas_coverage,
        );

        let processor = PairProcessor::new(
            provider.clone(),
            submit_provider,
            self.wallet.clone(),
            self.sender,
            gas_oracle,
            router,
            pool_cache,
            route_dryrun,
            intra_dryrun,
            wrapped_native,
            ProcessorConfig {
                gas_coverage: self.settings.gas_coverage,
                bundle: self.settings.bundle,
                hops: self.settings.hops,
                retries: self.settings.retries,
                timeout_ms: self.settings.timeout_ms(),
                explorer_base: self.settings.explorer_base(self.chain_id),
                chain_id: self.chain_id,
                dry_run: self.dry_run,
            },
        );

        let bundler = Bundler::new(provider, self.settings.bundle, true);
        Ok((processor, bundler))
    }
}

/// Reverse-direction take-orders per (orderbook, buyToken, sellToken), the
/// candidate "Bob" side for intra-orderbook clears.
fn opposing_map(
    pairs: &[crate::core::types::BundledPair],
) -> HashMap<(Address, Address, Address), Vec<TakeOrder>> {
    let mut map: HashMap<(Address, Address, Address), Vec<TakeOrder>> = HashMap::new();
    for pair in pairs {
        let key = (pair.orderbook, pair.sell.address, pair.buy.address);
        map.entry(key)
            .or_default()
            .extend(pair.take_orders.iter().cloned());
    }
    map
}

fn allowed_factories(settings: &Settings, chain_id: u64) -> HashMap<String, Address> {
    let defaults = constants::default_factories_for_chain(chain_id);
    match &settings.lps {
        Some(allowed) => defaults
            .into_iter()
            .filter(|(name, _)| allowed.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(name, addr)| (name.to_string(), addr))
            .collect(),
        None => defaults
            .into_iter()
            .map(|(name, addr)| (name.to_string(), addr))
            .collect(),
    }
}
