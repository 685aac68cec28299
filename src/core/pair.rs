// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::constants::MULTICALL3;
use crate::common::error::AppError;
use crate::common::math::{mul_18, scale_18};
use crate::common::retry::with_timeout;
use crate::core::dryrun::{DryrunCtx, IntraDryrun, RouteDryrun};
use crate::core::simulator::{classify_rpc_error, out_of_gas_diagnostic, SimFailure};
use crate::core::sizer::{
    IntraSizeProbe, RouteSizeProbe, find_best_size, find_best_with_retries,
};
use crate::core::types::{
    BundledPair, DryrunFailure, DryrunOutcome, ErrorSnapshot, FailReason, HaltReason, Mode,
    PairReport, PairStatus, TakeOrder, TokenInfo,
};
use crate::data::abi::{IERC20, IMulticall3, IOrderBookV4};
use crate::network::gas::GasOracle;
use crate::network::pool_cache::PoolCache;
use crate::network::provider::HttpProvider;
use crate::network::router::RouteFinder;
use alloy::eips::eip2718::Encodable2718;
use alloy::eips::BlockId;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, I256, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::TransactionReceipt;
use alloy_sol_types::{SolCall, SolEvent};
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub gas_coverage: u64,
    pub bundle: bool,
    pub hops: u32,
    pub retries: u32,
    pub timeout_ms: u64,
    pub explorer_base: String,
    pub chain_id: u64,
    /// Size opportunities but never submit.
    pub dry_run: bool,
}

/// End-to-end processing of one bundled pair: balances, pricing, sizing,
/// submission and receipt analysis. One in-flight transaction per wallet, so
/// pairs run strictly one after another.
pub struct PairProcessor {
    provider: HttpProvider,
    submit_provider: HttpProvider,
    wallet: EthereumWallet,
    sender: Address,
    gas_oracle: GasOracle,
    router: Arc<dyn RouteFinder>,
    pool_cache: Arc<PoolCache>,
    route_dryrun: RouteDryrun,
    intra_dryrun: IntraDryrun,
    wrapped_native: TokenInfo,
    config: ProcessorConfig,
}

enum OppSearch {
    Found(DryrunOutcome),
    Failed {
        all_no_route: bool,
        failure: Option<DryrunFailure>,
    },
    WalletFund(DryrunFailure),
}

impl PairProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: HttpProvider,
        submit_provider: HttpProvider,
        wallet: EthereumWallet,
        sender: Address,
        gas_oracle: GasOracle,
        router: Arc<dyn RouteFinder>,
        pool_cache: Arc<PoolCache>,
        route_dryrun: RouteDryrun,
        intra_dryrun: IntraDryrun,
        wrapped_native: TokenInfo,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            provider,
            submit_provider,
            wallet,
            sender,
            gas_oracle,
            router,
            pool_cache,
            route_dryrun,
            intra_dryrun,
            wrapped_native,
            config,
        }
    }

    pub async fn process(&self, pair: &mut BundledPair, opposing: &[TakeOrder]) -> PairReport {
        tracing::info!(
            target: "pair",
            pair = %pair.pair_label(),
            orders = pair.take_orders.len(),
            "Processing pair"
        );

        // [Init] -> [HaveBalance]
        if let Err(e) = self.refresh_balances(pair).await {
            tracing::warn!(target: "pair", error = %e, "vault balance fetch failed");
            return PairReport::halted(
                pair,
                PairStatus::NoOpportunity,
                HaltReason::FailedToGetVaultBalance,
            );
        }
        pair.take_orders.retain(|to| !to.max_output().is_zero());
        if pair.take_orders.is_empty() {
            return PairReport::new(pair, PairStatus::EmptyVault);
        }

        // [HaveBalance] -> [HaveGas&EthPrice]
        let gas_price = match self.gas_oracle.gas_price().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "gas price fetch failed");
                return PairReport::halted(
                    pair,
                    PairStatus::NoOpportunity,
                    HaltReason::FailedToGetGasPrice,
                );
            }
        };
        let block_number = match self.provider.get_block_number().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "block number fetch failed, using 0");
                0
            }
        };

        // [HaveGas&EthPrice] -> [HavePools]
        if let Err(e) = self.ensure_pools(pair).await {
            tracing::warn!(target: "pair", error = %e, "pool discovery failed");
            return PairReport::halted(
                pair,
                PairStatus::NoOpportunity,
                HaltReason::FailedToGetPools,
            );
        }

        let native_price_buy = match self
            .gas_oracle
            .native_price(self.router.as_ref(), &self.wrapped_native, &pair.buy, block_number)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "native price lookup failed");
                None
            }
        };
        if native_price_buy.is_none() && self.config.gas_coverage != 0 {
            // Without a reference price the bounty floor cannot be enforced.
            tracing::warn!(target: "pair", pair = %pair.pair_label(), "no native price for buy token");
            return PairReport::halted(
                pair,
                PairStatus::NoOpportunity,
                HaltReason::FailedToGetEthPrice,
            );
        }
        let native_price_sell = self
            .gas_oracle
            .native_price(self.router.as_ref(), &self.wrapped_native, &pair.sell, block_number)
            .await
            .unwrap_or(None);

        let mut ctx = DryrunCtx::new(gas_price, block_number);
        ctx.native_price_buy = native_price_buy;
        ctx.native_price_sell = native_price_sell;

        // [HavePools] -> [HaveOpportunity | NoOpportunity]
        match self.find_opportunity(pair, opposing, &ctx).await {
            OppSearch::Found(outcome) => self.submit_and_report(pair, outcome, &ctx).await,
            OppSearch::WalletFund(failure) => {
                let mut report = PairReport::halted(
                    pair,
                    PairStatus::NoOpportunity,
                    HaltReason::NoWalletFund,
                );
                report.snapshot = failure.snapshot;
                report
            }
            OppSearch::Failed {
                all_no_route,
                failure,
            } => {
                let halt = if all_no_route {
                    HaltReason::NoRoute
                } else {
                    HaltReason::NoOpportunity
                };
                let mut report = PairReport::halted(pair, PairStatus::NoOpportunity, halt);
                if let Some(f) = failure {
                    report.snapshot = f.snapshot;
                    report.attrs = f.attrs;
                }
                report
            }
        }
    }

    async fn refresh_balances(&self, pair: &mut BundledPair) -> Result<(), AppError> {
        let calls: Vec<IMulticall3::Call3> = pair
            .take_orders
            .iter()
            .map(|to| IMulticall3::Call3 {
                target: to.order.orderbook,
                allowFailure: true,
                callData: IOrderBookV4::vaultBalanceCall {
                    owner: to.order.inner.owner,
                    token: to.sell_token(),
                    vaultId: to.order.inner.validOutputs[to.output_io].vaultId,
                }
                .abi_encode()
                .into(),
            })
            .collect();

        let results = IMulticall3::new(MULTICALL3, self.provider.clone())
            .aggregate3(calls)
            .call()
            .await
            .map_err(|e| AppError::Rpc(format!("vault balance multicall failed: {e}")))?;

        for (to, result) in pair.take_orders.iter_mut().zip(results) {
            if !result.success {
                continue;
            }
            let Ok(balance) =
                IOrderBookV4::vaultBalanceCall::abi_decode_returns(&result.returnData)
            else {
                continue;
            };
            let balance = scale_18(balance, to.sell_decimals());
            if let Some(quote) = to.quote.as_mut() {
                quote.max_output = quote.max_output.min(balance);
            }
        }
        Ok(())
    }

    async fn ensure_pools(&self, pair: &BundledPair) -> Result<(), AppError> {
        let native = self.wrapped_native.address;
        self.pool_cache
            .ensure_pair(pair.sell.address, pair.buy.address)
            .await?;
        if native != pair.sell.address && native != pair.buy.address {
            self.pool_cache.ensure_pair(pair.sell.address, native).await?;
            self.pool_cache.ensure_pair(native, pair.buy.address).await?;
        }
        Ok(())
    }

    /// Larger cleared size wins; estimated profit breaks ties.
    fn merge_best(best: &mut Option<DryrunOutcome>, candidate: DryrunOutcome) {
        let replace = match best {
            Some(current) => {
                candidate.max_input > current.max_input
                    || (candidate.max_input == current.max_input
                        && candidate.estimated_profit > current.estimated_profit)
            }
            None => true,
        };
        if replace {
            *best = Some(candidate);
        }
    }

    /// Run every applicable clearing mode and keep the best outcome across
    /// them: the bundle sizer, the per-order retry fan-out and the
    /// intra-orderbook match all compete on cleared size.
    async fn find_opportunity(
        &self,
        pair: &BundledPair,
        opposing: &[TakeOrder],
        ctx: &DryrunCtx,
    ) -> OppSearch {
        let mut all_no_route = true;
        let mut last_failure: Option<DryrunFailure> = None;
        let mut best: Option<DryrunOutcome> = None;

        if self.config.bundle {
            let mut probe = RouteSizeProbe::new(
                &self.route_dryrun,
                pair.clone(),
                Mode::Bundle,
                ctx.clone(),
            );
            let balance = probe.vault_balance();
            match find_best_size(balance, self.config.hops, &mut probe).await {
                Ok(outcome) => {
                    all_no_route = false;
                    Self::merge_best(&mut best, outcome);
                }
                Err(f) if f.reason == FailReason::NoWalletFund => {
                    return OppSearch::WalletFund(f);
                }
                Err(f) => {
                    if f.reason != FailReason::NoRoute {
                        all_no_route = false;
                    }
                    last_failure = Some(f);
                }
            }
        }

        // Per-order retries only make sense while the top order still prices
        // itself at or below market.
        if ctx.price_match.load(Ordering::Relaxed) {
            match find_best_with_retries(
                &self.route_dryrun,
                pair,
                self.config.retries,
                self.config.hops,
                ctx,
            )
            .await
            {
                Ok(outcome) => {
                    all_no_route = false;
                    Self::merge_best(&mut best, outcome);
                }
                Err(f) if f.reason == FailReason::NoWalletFund => {
                    return OppSearch::WalletFund(f);
                }
                Err(f) => {
                    if f.reason != FailReason::NoRoute {
                        all_no_route = false;
                    }
                    last_failure = Some(f);
                }
            }
        }

        match self.find_intra(pair, opposing, ctx).await {
            Ok(Some(outcome)) => {
                all_no_route = false;
                Self::merge_best(&mut best, outcome);
            }
            Ok(None) => {}
            Err(f) => return OppSearch::WalletFund(f),
        }

        match best {
            Some(outcome) => OppSearch::Found(outcome),
            None => OppSearch::Failed {
                all_no_route,
                failure: last_failure,
            },
        }
    }

    /// Try clearing each of our orders directly against the opposing side of
    /// the same book. First viable match wins. Only `NoWalletFund` is an
    /// error; anything else means "no intra match".
    async fn find_intra(
        &self,
        pair: &BundledPair,
        opposing: &[TakeOrder],
        ctx: &DryrunCtx,
    ) -> Result<Option<DryrunOutcome>, DryrunFailure> {
        for alice in &pair.take_orders {
            for bob in opposing {
                if !IntraDryrun::viable(alice, bob) {
                    continue;
                }
                let mut probe = IntraSizeProbe::new(&self.intra_dryrun, pair, alice, bob, ctx);
                match find_best_size(alice.max_output(), self.config.hops, &mut probe).await {
                    Ok(outcome) => {
                        tracing::info!(
                            target: "pair",
                            alice = %alice.order.hash,
                            bob = %bob.order.hash,
                            "Intra-orderbook match found"
                        );
                        return Ok(Some(outcome));
                    }
                    Err(f) if f.reason == FailReason::NoWalletFund => return Err(f),
                    Err(_) => continue,
                }
            }
        }
        Ok(None)
    }

    // [HaveOpportunity] -> [Submitted] -> [Mined | TimedOut]
    async fn submit_and_report(
        &self,
        pair: &BundledPair,
        outcome: DryrunOutcome,
        ctx: &DryrunCtx,
    ) -> PairReport {
        let mut report = PairReport::new(pair, PairStatus::FoundOpportunity);
        report.cleared_orders = outcome.cleared_orders.clone();
        report
            .attrs
            .push(("details.route".into(), outcome.route_visual.join(" -> ")));
        report.attrs.push((
            "details.oppBlockNumber".into(),
            outcome.opp_block_number.to_string(),
        ));

        if self.config.dry_run {
            tracing::info!(
                target: "pair",
                pair = %pair.pair_label(),
                size = %outcome.max_input,
                estimated_profit = %outcome.estimated_profit,
                "Dry-run: would submit clearing transaction"
            );
            report.attrs.push(("details.dryRun".into(), "true".into()));
            return report;
        }

        let nonce = match self.provider.get_transaction_count(self.sender).pending().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "nonce fetch failed");
                report.halt = Some(HaltReason::TxFailed);
                return report;
            }
        };

        let tx = outcome
            .tx
            .clone()
            .with_nonce(nonce)
            .with_chain_id(self.config.chain_id);
        let envelope = match tx.build(&self.wallet).await {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "transaction signing failed");
                report.halt = Some(HaltReason::TxFailed);
                return report;
            }
        };
        let encoded = envelope.encoded_2718();

        let submit = async {
            self.submit_provider
                .send_raw_transaction(&encoded)
                .await
                .map_err(|e| AppError::Rpc(format!("submission failed: {e}")))
        };
        let pending = match with_timeout(submit, self.config.timeout_ms, "transaction submission")
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "transaction submission failed");
                report.halt = Some(HaltReason::TxFailed);
                return report;
            }
        };

        let tx_hash = *pending.tx_hash();
        report.tx_url = Some(format!("{}/tx/{tx_hash:#x}", self.config.explorer_base));
        tracing::info!(target: "pair", tx = %tx_hash, "Transaction submitted");

        // Receipt polling stays on the public RPC even when submission went
        // through a private endpoint.
        let wait = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(target: "pair", error = %e, "receipt poll failed");
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        };
        let receipt = match with_timeout(wait, self.config.timeout_ms, "receipt wait").await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "pair", error = %e, "receipt wait failed");
                report.halt = Some(HaltReason::TxMineFailed);
                return report;
            }
        };

        if receipt.status() {
            self.fill_mined_report(&mut report, pair, &outcome, &receipt, ctx);
        } else {
            report.halt = Some(HaltReason::TxMineFailed);
            report.snapshot = self.diagnose_revert(&outcome, &receipt).await;
            tracing::warn!(target: "pair", tx = %tx_hash, "Transaction reverted on-chain");
        }
        report
    }

    fn fill_mined_report(
        &self,
        report: &mut PairReport,
        pair: &BundledPair,
        outcome: &DryrunOutcome,
        receipt: &TransactionReceipt,
        ctx: &DryrunCtx,
    ) {
        let mut cleared = U256::ZERO;
        let mut income_raw = U256::ZERO;
        let mut spent_raw = U256::ZERO;

        for log in receipt.inner.logs() {
            if log.address() == pair.orderbook {
                if let Ok(event) = IOrderBookV4::TakeOrderV2::decode_log(&log.inner) {
                    cleared = cleared.saturating_add(event.data.output);
                }
                if let Ok(event) = IOrderBookV4::AfterClear::decode_log(&log.inner) {
                    cleared = cleared.saturating_add(event.data.clearStateChange.aliceOutput);
                }
            }
            if log.address() == pair.buy.address {
                if let Ok(event) = IERC20::Transfer::decode_log(&log.inner) {
                    if event.data.to == self.sender {
                        income_raw = income_raw.saturating_add(event.data.value);
                    }
                    if event.data.from == self.sender {
                        spent_raw = spent_raw.saturating_add(event.data.value);
                    }
                }
            }
        }

        let income = scale_18(income_raw.saturating_sub(spent_raw), pair.buy.decimals);
        let gas_wei = U256::from(receipt.effective_gas_price * receipt.gas_used as u128);
        let gas_cost_in_token = ctx
            .native_price_buy
            .map(|price| mul_18(gas_wei, price))
            .unwrap_or(U256::ZERO);

        let net_profit = I256::try_from(income)
            .unwrap_or(I256::MAX)
            .saturating_sub(I256::try_from(gas_cost_in_token).unwrap_or(I256::MAX));

        report.cleared_amount = Some(cleared);
        report.income = Some(income);
        report.gas_cost = Some(gas_cost_in_token);
        report.net_profit = Some(net_profit);

        tracing::info!(
            target: "pair",
            pair = %pair.pair_label(),
            cleared = %cleared,
            income = %income,
            net_profit = %net_profit,
            price = %outcome.price,
            "Pair cleared"
        );
    }

    /// Re-simulate the reverted transaction at its mined block to recover a
    /// revert reason for the report.
    async fn diagnose_revert(
        &self,
        outcome: &DryrunOutcome,
        receipt: &TransactionReceipt,
    ) -> Option<ErrorSnapshot> {
        let block = receipt.block_number.map(BlockId::number)?;
        let err = match self.provider.call(outcome.tx.clone()).block(block).await {
            Ok(_) => return None,
            Err(e) => e,
        };
        let mut snapshot = match classify_rpc_error(err) {
            SimFailure::WalletFund(s) | SimFailure::Revert(s) => s,
            SimFailure::Transport(msg) => {
                tracing::debug!(target: "pair", error = %msg, "revert re-simulation unreachable");
                return None;
            }
        };
        snapshot.gas_diagnostic = out_of_gas_diagnostic(
            receipt.gas_used,
            outcome.tx.gas.unwrap_or(0),
            true,
        );
        Some(snapshot)
    }
}
