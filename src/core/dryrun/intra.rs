// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::{BOUNTY_VAULT_ID, GAS_HEADROOM_PERCENT};
use crate::common::math::{ONE_18, div_18, mul_18, mul_div};
use crate::core::dryrun::DryrunCtx;
use crate::core::simulator::{GasEstimator, SimFailure};
use crate::core::types::{BundledPair, DryrunFailure, DryrunOutcome, TakeOrder};
use crate::data::abi::{
    ClearConfig, EvaluableV3, IOrderBookV4, TaskV1, ensure_bounty_bytecode,
};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::eth::TransactionRequest;
use alloy_sol_types::SolCall;
use std::sync::Arc;

/// Probes clearing one order directly against an opposing order on the same
/// orderbook, skimming the price overlap into the bounty vault and
/// withdrawing it in the same transaction.
pub struct IntraDryrun {
    estimator: Arc<dyn GasEstimator>,
    sender: Address,
    gas_coverage: u64,
}

impl IntraDryrun {
    pub fn new(estimator: Arc<dyn GasEstimator>, sender: Address, gas_coverage: u64) -> Self {
        Self {
            estimator,
            sender,
            gas_coverage,
        }
    }

    /// Candidate filter: an order cannot clear against itself or its own
    /// owner, and the two ratios must overlap. Rejections here never reach
    /// simulation.
    pub fn viable(alice: &TakeOrder, bob: &TakeOrder) -> bool {
        if alice.order.hash == bob.order.hash {
            return false;
        }
        if alice.order.inner.owner == bob.order.inner.owner {
            return false;
        }
        mul_18(alice.ratio(), bob.ratio()) < ONE_18
    }

    fn bounty_task(&self, alice: &TakeOrder, ctx: &DryrunCtx, min_bounty_wei: U256) -> TaskV1 {
        // Vault deltas are valued in native terms: token-per-native prices
        // invert to native-per-token.
        let input_price = ctx
            .native_price_buy
            .map(|p| div_18(ONE_18, p))
            .unwrap_or(U256::ZERO);
        let output_price = ctx
            .native_price_sell
            .map(|p| div_18(ONE_18, p))
            .unwrap_or(U256::ZERO);
        TaskV1 {
            evaluable: EvaluableV3 {
                interpreter: alice.order.inner.evaluable.interpreter,
                store: alice.order.inner.evaluable.store,
                bytecode: if min_bounty_wei.is_zero() {
                    Bytes::new()
                } else {
                    ensure_bounty_bytecode(input_price, output_price, min_bounty_wei)
                },
            },
            signedContext: vec![],
        }
    }

    fn build_tx(
        &self,
        pair: &BundledPair,
        alice: &TakeOrder,
        bob: &TakeOrder,
        task: TaskV1,
        gas_price: u128,
    ) -> TransactionRequest {
        let clear = IOrderBookV4::clear2Call {
            aliceOrder: alice.order.inner.clone(),
            bobOrder: bob.order.inner.clone(),
            clearConfig: ClearConfig {
                aliceInputIOIndex: U256::from(alice.input_io as u64),
                aliceOutputIOIndex: U256::from(alice.output_io as u64),
                bobInputIOIndex: U256::from(bob.input_io as u64),
                bobOutputIOIndex: U256::from(bob.output_io as u64),
                aliceBountyVaultId: BOUNTY_VAULT_ID,
                bobBountyVaultId: BOUNTY_VAULT_ID,
            },
            aliceSignedContext: vec![],
            bobSignedContext: vec![],
        }
        .abi_encode();

        let withdraw_buy = IOrderBookV4::withdraw2Call {
            token: pair.buy.address,
            vaultId: BOUNTY_VAULT_ID,
            targetAmount: U256::MAX,
            post: vec![],
        }
        .abi_encode();

        let withdraw_sell = IOrderBookV4::withdraw2Call {
            token: pair.sell.address,
            vaultId: BOUNTY_VAULT_ID,
            targetAmount: U256::MAX,
            post: vec![task],
        }
        .abi_encode();

        let calldata = IOrderBookV4::multicallCall {
            data: vec![clear.into(), withdraw_buy.into(), withdraw_sell.into()],
        }
        .abi_encode();

        TransactionRequest::default()
            .with_from(self.sender)
            .with_to(pair.orderbook)
            .with_input(calldata)
            .with_gas_price(gas_price)
    }

    fn map_sim_failure(failure: SimFailure, stage: u8) -> DryrunFailure {
        match failure {
            SimFailure::WalletFund(snapshot) => DryrunFailure::no_wallet_fund(Some(snapshot)),
            SimFailure::Revert(snapshot) => {
                let mut f = DryrunFailure::no_opportunity("clear simulation reverted");
                f.node_error = true;
                f.snapshot = Some(snapshot);
                f.with_attr("details.stage", stage.to_string())
            }
            SimFailure::Transport(msg) => {
                DryrunFailure::no_opportunity("clear simulation unreachable")
                    .with_attr("details.transport", msg)
            }
        }
    }

    pub async fn probe(
        &self,
        pair: &BundledPair,
        alice: &TakeOrder,
        bob: &TakeOrder,
        ctx: &DryrunCtx,
    ) -> Result<DryrunOutcome, DryrunFailure> {
        if !Self::viable(alice, bob) {
            return Err(DryrunFailure::no_opportunity(
                "no price overlap with opposing order",
            ));
        }

        let mut task = self.bounty_task(alice, ctx, U256::ZERO);
        let mut tx = self.build_tx(pair, alice, bob, task.clone(), ctx.gas_price);

        let gas_limit = self
            .estimator
            .estimate(&tx)
            .await
            .map_err(|f| Self::map_sim_failure(f, 1))?;

        let mut final_gas_limit = gas_limit;
        let gas_cost_wei = U256::from(gas_limit as u128 * ctx.gas_price);
        let mut gas_cost_in_token = ctx
            .native_price_buy
            .map(|price| mul_18(gas_cost_wei, price))
            .unwrap_or(U256::ZERO);

        if self.gas_coverage != 0 {
            let padded = mul_div(
                gas_cost_wei,
                U256::from(self.gas_coverage * GAS_HEADROOM_PERCENT),
                U256::from(10_000u64),
            );
            task = self.bounty_task(alice, ctx, padded);
            tx = self.build_tx(pair, alice, bob, task.clone(), ctx.gas_price);

            let gas_limit2 = self
                .estimator
                .estimate(&tx)
                .await
                .map_err(|f| Self::map_sim_failure(f, 2))?;

            let gas_cost_wei2 = U256::from(gas_limit2 as u128 * ctx.gas_price);
            let exact = mul_div(
                gas_cost_wei2,
                U256::from(self.gas_coverage),
                U256::from(100u64),
            );
            task = self.bounty_task(alice, ctx, exact);
            tx = self.build_tx(pair, alice, bob, task, ctx.gas_price);
            final_gas_limit = gas_limit2;
            gas_cost_in_token = ctx
                .native_price_buy
                .map(|price| mul_18(gas_cost_wei2, price))
                .unwrap_or(U256::ZERO);
        }

        tx = tx.with_gas_limit(final_gas_limit);

        // Clearable size: alice's vault, capped by what bob's vault can pay
        // for at alice's demanded ratio.
        let alice_ratio = alice.ratio();
        let bob_capacity = if alice_ratio.is_zero() {
            U256::MAX
        } else {
            div_18(bob.max_output(), alice_ratio)
        };
        let max_input = alice.max_output().min(bob_capacity);

        // Bob's ratio prices the buy token in sell terms; its inverse is the
        // effective market price of this match.
        let price = if bob.ratio().is_zero() {
            U256::ZERO
        } else {
            div_18(ONE_18, bob.ratio())
        };
        let spread = price.saturating_sub(alice_ratio);
        let estimated_profit = mul_18(max_input, spread).saturating_sub(gas_cost_in_token);

        Ok(DryrunOutcome {
            tx,
            max_input,
            price,
            route_visual: vec![
                pair.sell.symbol.clone(),
                "intra-orderbook".to_string(),
                pair.buy.symbol.clone(),
            ],
            gas_cost_in_token,
            estimated_profit,
            opp_block_number: ctx.block_number,
            cleared_orders: vec![alice.order.hash, bob.order.hash],
        })
    }
}
