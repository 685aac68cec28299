// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::core::dryrun::{DryrunCtx, IntraDryrun, RouteDryrun};
use crate::core::types::{
    BundledPair, DryrunFailure, DryrunOutcome, FailReason, Mode, TakeOrder,
};
use alloy::primitives::U256;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};

/// One feasibility probe as seen by the sizer. Implementations own whatever
/// working state a probe mutates so sizing runs never alias.
#[async_trait]
pub trait SizeProbe: Send {
    async fn probe(
        &mut self,
        max_input: U256,
        first_hop: bool,
        hop: u32,
    ) -> Result<DryrunOutcome, DryrunFailure>;
}

/// Find the largest input not exceeding `vault_balance` for which the probe
/// succeeds, refining by halving steps across `hops` iterations.
///
/// A success on the first hop means the full balance clears and is returned
/// as-is; a success on the last hop is the refined answer. In between,
/// successes push the cursor up and failures push it down by the next halved
/// step. `NoWalletFund` aborts immediately.
pub async fn find_best_size(
    vault_balance: U256,
    hops: u32,
    probe: &mut dyn SizeProbe,
) -> Result<DryrunOutcome, DryrunFailure> {
    let mut cursor = vault_balance;
    let mut candidate: Option<DryrunOutcome> = None;
    let mut all_no_route = true;
    let mut last_failure: Option<DryrunFailure> = None;

    for hop in 1..=hops {
        match probe.probe(cursor, hop == 1, hop).await {
            Ok(outcome) => {
                all_no_route = false;
                if hop == 1 || hop == hops {
                    return Ok(outcome);
                }
                candidate = Some(outcome);
                cursor = cursor.saturating_add(vault_balance >> ((hop + 1) as usize));
            }
            Err(failure) if failure.reason == FailReason::NoWalletFund => {
                return Err(failure);
            }
            Err(failure) => {
                if failure.reason != FailReason::NoRoute {
                    all_no_route = false;
                }
                last_failure = Some(failure);
                cursor = cursor.saturating_sub(vault_balance >> ((hop + 1) as usize));
            }
        }
    }

    if let Some(outcome) = candidate {
        return Ok(outcome);
    }
    if all_no_route {
        return Err(DryrunFailure::no_route());
    }
    Err(last_failure.unwrap_or_else(|| DryrunFailure::no_opportunity("no feasible size")))
}

/// Route-processor probe over the sizer's own working clone of the pair. The
/// first-hop bundle filter mutates only this clone.
pub struct RouteSizeProbe<'a> {
    dryrun: &'a RouteDryrun,
    pair: BundledPair,
    mode: Mode,
    ctx: DryrunCtx,
}

impl<'a> RouteSizeProbe<'a> {
    pub fn new(dryrun: &'a RouteDryrun, pair: BundledPair, mode: Mode, ctx: DryrunCtx) -> Self {
        Self {
            dryrun,
            pair,
            mode,
            ctx,
        }
    }

    /// Search bound for this run. Bundle mode can clear the whole bundle;
    /// the duplication modes only ever clear the head order, so their bound
    /// is that order's vault alone.
    pub fn vault_balance(&self) -> U256 {
        match self.mode {
            Mode::Bundle => self.pair.vault_balance(),
            _ => self
                .pair
                .take_orders
                .first()
                .map(|t| t.max_output())
                .unwrap_or(U256::ZERO),
        }
    }
}

#[async_trait]
impl SizeProbe for RouteSizeProbe<'_> {
    async fn probe(
        &mut self,
        max_input: U256,
        first_hop: bool,
        _hop: u32,
    ) -> Result<DryrunOutcome, DryrunFailure> {
        self.dryrun
            .probe(&mut self.pair, max_input, self.mode, first_hop, &self.ctx)
            .await
    }
}

/// Intra-orderbook probe. Clear sizes are decided on-chain by the two order
/// evaluations, so the probe is input-size independent and a viable match
/// resolves on the first hop.
pub struct IntraSizeProbe<'a> {
    dryrun: &'a IntraDryrun,
    pair: &'a BundledPair,
    alice: &'a TakeOrder,
    bob: &'a TakeOrder,
    ctx: &'a DryrunCtx,
}

impl<'a> IntraSizeProbe<'a> {
    pub fn new(
        dryrun: &'a IntraDryrun,
        pair: &'a BundledPair,
        alice: &'a TakeOrder,
        bob: &'a TakeOrder,
        ctx: &'a DryrunCtx,
    ) -> Self {
        Self {
            dryrun,
            pair,
            alice,
            bob,
            ctx,
        }
    }
}

#[async_trait]
impl SizeProbe for IntraSizeProbe<'_> {
    async fn probe(
        &mut self,
        _max_input: U256,
        _first_hop: bool,
        _hop: u32,
    ) -> Result<DryrunOutcome, DryrunFailure> {
        self.dryrun
            .probe(self.pair, self.alice, self.bob, self.ctx)
            .await
    }
}

/// Fan out one sizing run per retry mode (single, double, triple order
/// duplication) and keep the fulfilled outcome clearing the most input.
/// A terminal `NoWalletFund` cancels the remaining runs.
pub async fn find_best_with_retries(
    dryrun: &RouteDryrun,
    pair: &BundledPair,
    retries: u32,
    hops: u32,
    ctx: &DryrunCtx,
) -> Result<DryrunOutcome, DryrunFailure> {
    let mut runs = FuturesUnordered::new();
    for retry in 1..=retries {
        let mode = Mode::from_retry(retry);
        let working = pair.clone();
        let ctx = ctx.clone();
        runs.push(async move {
            let mut probe = RouteSizeProbe::new(dryrun, working, mode, ctx);
            let balance = probe.vault_balance();
            find_best_size(balance, hops, &mut probe).await
        });
    }

    let mut best: Option<DryrunOutcome> = None;
    let mut all_no_route = true;
    let mut last_failure: Option<DryrunFailure> = None;

    while let Some(result) = runs.next().await {
        match result {
            Ok(outcome) => {
                all_no_route = false;
                let better = best
                    .as_ref()
                    .map(|b| outcome.max_input > b.max_input)
                    .unwrap_or(true);
                if better {
                    best = Some(outcome);
                }
            }
            Err(failure) if failure.reason == FailReason::NoWalletFund => {
                // Dropping the stream cancels the peer runs.
                return Err(failure);
            }
            Err(failure) => {
                if failure.reason != FailReason::NoRoute {
                    all_no_route = false;
                }
                last_failure = Some(failure);
            }
        }
    }

    if let Some(outcome) = best {
        return Ok(outcome);
    }
    if all_no_route {
        return Err(DryrunFailure::no_route());
    }
    Err(last_failure.unwrap_or_else(|| DryrunFailure::no_opportunity("all retries failed")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::types::eth::TransactionRequest;

    fn outcome(max_input: U256) -> DryrunOutcome {
        DryrunOutcome {
            tx: TransactionRequest::default(),
            max_input,
            price: U256::from(1u64),
            route_visual: vec![],
            gas_cost_in_token: U256::ZERO,
            estimated_profit: U256::ZERO,
            opp_block_number: 0,
            cleared_orders: vec![],
        }
    }

    /// Succeeds exactly when the probed size does not exceed `feasible`.
    struct ThresholdProbe {
        feasible: U256,
        failure: FailReason,
        calls: Vec<(U256, bool)>,
    }

    impl ThresholdProbe {
        fn new(feasible: U256) -> Self {
            Self {
                feasible,
                failure: FailReason::NoOpportunity,
                calls: vec![],
            }
        }
    }

    #[async_trait]
    impl SizeProbe for ThresholdProbe {
        async fn probe(
            &mut self,
            max_input: U256,
            first_hop: bool,
            _hop: u32,
        ) -> Result<DryrunOutcome, DryrunFailure> {
            self.calls.push((max_input, first_hop));
            if max_input <= self.feasible && !self.feasible.is_zero() {
                Ok(outcome(max_input))
            } else {
                match self.failure {
                    FailReason::NoRoute => Err(DryrunFailure::no_route()),
                    _ => Err(DryrunFailure::no_opportunity("too big")),
                }
            }
        }
    }

    #[tokio::test]
    async fn full_balance_clears_on_first_hop() {
        let vault = U256::from(1_000_000_000_000_000_000u64);
        let mut probe = ThresholdProbe::new(vault);
        let result = find_best_size(vault, 7, &mut probe).await.unwrap();
        assert_eq!(result.max_input, vault);
        assert_eq!(probe.calls.len(), 1);
        assert!(probe.calls[0].1, "first call is the first hop");
    }

    #[tokio::test]
    async fn refines_to_true_maximum_within_tolerance() {
        let vault = U256::from(1024u64);
        let feasible = U256::from(600u64);
        let mut probe = ThresholdProbe::new(feasible);
        let result = find_best_size(vault, 7, &mut probe).await.unwrap();
        assert!(result.max_input <= feasible);
        // Final size is within vault / 2^hops of the true maximum.
        assert!(feasible - result.max_input <= vault >> 7usize);
        // Only the first probe may apply the first-hop filter.
        assert_eq!(probe.calls.iter().filter(|(_, first)| *first).count(), 1);
    }

    #[tokio::test]
    async fn cursor_never_exceeds_vault_balance() {
        let vault = U256::from(1024u64);
        let mut probe = ThresholdProbe::new(U256::from(512u64));
        let _ = find_best_size(vault, 10, &mut probe).await;
        assert!(probe.calls.iter().all(|(size, _)| *size <= vault));
    }

    #[tokio::test]
    async fn infeasible_everywhere_is_no_opportunity() {
        let vault = U256::from(1024u64);
        let mut probe = ThresholdProbe::new(U256::ZERO);
        let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();
        assert_eq!(err.reason, FailReason::NoOpportunity);
        assert_eq!(probe.calls.len(), 7, "no early exit on failures");
    }

    #[tokio::test]
    async fn all_no_route_surfaces_no_route() {
        let vault = U256::from(1024u64);
        let mut probe = ThresholdProbe::new(U256::ZERO);
        probe.failure = FailReason::NoRoute;
        let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();
        assert_eq!(err.reason, FailReason::NoRoute);
    }

    struct WalletFundAtHop {
        at: u32,
    }

    #[async_trait]
    impl SizeProbe for WalletFundAtHop {
        async fn probe(
            &mut self,
            _max_input: U256,
            _first_hop: bool,
            hop: u32,
        ) -> Result<DryrunOutcome, DryrunFailure> {
            if hop >= self.at {
                Err(DryrunFailure::no_wallet_fund(None))
            } else {
                Err(DryrunFailure::no_opportunity("not yet"))
            }
        }
    }

    #[tokio::test]
    async fn wallet_fund_aborts_the_sizer() {
        let vault = U256::from(1024u64);
        let mut probe = WalletFundAtHop { at: 3 };
        let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();
        assert_eq!(err.reason, FailReason::NoWalletFund);
    }
}
