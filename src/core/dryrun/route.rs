// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::constants::{GAS_HEADROOM_PERCENT, RATIO_HEADROOM_PERCENT};
use crate::common::math::{ONE_18, div_18, mul_18, mul_div, scale_18, scale_from_18};
use crate::core::dryrun::DryrunCtx;
use crate::core::simulator::{GasEstimator, SimFailure};
use crate::core::types::{BundledPair, DryrunFailure, DryrunOutcome, Mode};
use crate::data::abi::{
    EvaluableV3, IRouteProcessorArb, TakeOrdersConfigV3, TaskV1, ensure_bounty_bytecode,
};
use crate::network::router::{RouteError, RouteFinder};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::eth::TransactionRequest;
use alloy_sol_types::{SolCall, SolValue};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Probes clearing a bundle against external AMM liquidity through the route
/// processor. One probe builds the full `arb3` calldata for a candidate input
/// size and asks the node whether it would execute.
pub struct RouteDryrun {
    router: Arc<dyn RouteFinder>,
    estimator: Arc<dyn GasEstimator>,
    sender: Address,
    arb_address: Address,
    route_processor: Address,
    gas_coverage: u64,
    max_ratio: bool,
}

impl RouteDryrun {
    pub fn new(
        router: Arc<dyn RouteFinder>,
        estimator: Arc<dyn GasEstimator>,
        sender: Address,
        arb_address: Address,
        route_processor: Address,
        gas_coverage: u64,
        max_ratio: bool,
    ) -> Self {
        Self {
            router,
            estimator,
            sender,
            arb_address,
            route_processor,
            gas_coverage,
            max_ratio,
        }
    }

    /// The arb contract expects `(routeProcessor, routeCode)` packed into the
    /// take-orders data field.
    fn exchange_data(&self, route_code: Bytes) -> Bytes {
        (self.route_processor, route_code).abi_encode_params().into()
    }

    fn zero_task(pair: &BundledPair) -> TaskV1 {
        let evaluable = pair
            .take_orders
            .first()
            .map(|t| EvaluableV3 {
                interpreter: t.order.inner.evaluable.interpreter,
                store: t.order.inner.evaluable.store,
                bytecode: Bytes::new(),
            })
            .unwrap_or(EvaluableV3 {
                interpreter: Address::ZERO,
                store: Address::ZERO,
                bytecode: Bytes::new(),
            });
        TaskV1 {
            evaluable,
            signedContext: vec![],
        }
    }

    fn build_tx(
        &self,
        pair: &BundledPair,
        config: &TakeOrdersConfigV3,
        task: &TaskV1,
        gas_price: u128,
    ) -> TransactionRequest {
        let calldata = IRouteProcessorArb::arb3Call {
            orderBook: pair.orderbook,
            takeOrders: config.clone(),
            task: task.clone(),
        }
        .abi_encode();
        TransactionRequest::default()
            .with_from(self.sender)
            .with_to(self.arb_address)
            .with_input(calldata)
            .with_gas_price(gas_price)
    }

    fn map_sim_failure(failure: SimFailure, stage: u8) -> DryrunFailure {
        match failure {
            SimFailure::WalletFund(snapshot) => DryrunFailure::no_wallet_fund(Some(snapshot)),
            SimFailure::Revert(snapshot) => {
                let mut f = DryrunFailure::no_opportunity("simulation reverted");
                f.node_error = true;
                f.snapshot = Some(snapshot);
                f.with_attr("details.stage", stage.to_string())
            }
            SimFailure::Transport(msg) => {
                DryrunFailure::no_opportunity("simulation unreachable")
                    .with_attr("details.transport", msg)
            }
        }
    }

    /// One feasibility probe at `max_input` (18-decimal sell-token space).
    /// `first_hop` marks the first iteration of a sizing run; only there may
    /// a bundle-mode probe shrink the working order set, and `pair` is the
    /// sizer's own clone so the round's bundle stays untouched.
    pub async fn probe(
        &self,
        pair: &mut BundledPair,
        max_input: U256,
        mode: Mode,
        first_hop: bool,
        ctx: &DryrunCtx,
    ) -> Result<DryrunOutcome, DryrunFailure> {
        let amount_in = scale_from_18(max_input, pair.sell.decimals);
        if amount_in.is_zero() {
            return Err(DryrunFailure::no_opportunity(
                "input truncates to zero in token decimals",
            ));
        }

        let route = match self.router.best_route(&pair.sell, &pair.buy, amount_in).await {
            Ok(route) => route,
            Err(RouteError::NoWay) => return Err(DryrunFailure::no_route()),
            Err(RouteError::Rpc(e)) => {
                return Err(
                    DryrunFailure::no_opportunity("route lookup failed")
                        .with_attr("details.routeError", e),
                );
            }
        };

        let amount_out = scale_18(route.amount_out, pair.buy.decimals);
        let market_price = div_18(amount_out, max_input);

        let top_ratio = pair
            .take_orders
            .first()
            .map(|t| t.ratio())
            .unwrap_or(U256::ZERO);
        if market_price < top_ratio {
            ctx.price_match.store(false, Ordering::Relaxed);
            return Err(DryrunFailure::no_opportunity("ratio greater than market price")
                .with_attr("details.marketPrice", market_price.to_string())
                .with_attr("details.ratio", top_ratio.to_string()));
        }

        if first_hop && mode == Mode::Bundle && !self.max_ratio {
            // 2% headroom over market absorbs price drift between the quoted
            // block and inclusion. Orders filtered here do not re-enter at
            // later hops.
            let ceiling = mul_div(
                market_price,
                U256::from(RATIO_HEADROOM_PERCENT),
                U256::from(100u64),
            );
            pair.take_orders.retain(|t| t.ratio() <= ceiling);
            if pair.take_orders.is_empty() {
                return Err(DryrunFailure::no_opportunity(
                    "no order priced within market range",
                ));
            }
        }

        let config = TakeOrdersConfigV3 {
            minimumInput: U256::from(1u64),
            maximumInput: amount_in,
            maximumIORatio: if self.max_ratio {
                U256::MAX
            } else {
                market_price
            },
            orders: mode.expand(&pair.take_orders),
            data: self.exchange_data(self.router.encode(&route, self.arb_address)),
        };

        let mut task = Self::zero_task(pair);
        let mut tx = self.build_tx(pair, &config, &task, ctx.gas_price);

        // Stage 1: will it execute at all with no bounty floor.
        let gas_limit = self
            .estimator
            .estimate(&tx)
            .await
            .map_err(|f| Self::map_sim_failure(f, 1))?;

        let gas_cost_wei = U256::from(gas_limit as u128 * ctx.gas_price);
        let mut gas_cost_in_token = ctx
            .native_price_buy
            .map(|price| mul_18(gas_cost_wei, price))
            .unwrap_or(U256::ZERO);
        let mut final_gas_limit = gas_limit;

        if self.gas_coverage != 0 {
            let Some(native_price) = ctx.native_price_buy else {
                return Err(DryrunFailure::no_opportunity(
                    "no native price to enforce gas coverage",
                ));
            };

            // Stage 2: re-simulate with a padded bounty floor, then lock the
            // exact coverage and the gas limit into the final payload.
            let padded = mul_div(
                gas_cost_in_token,
                U256::from(self.gas_coverage * GAS_HEADROOM_PERCENT),
                U256::from(10_000u64),
            );
            task.evaluable.bytecode = ensure_bounty_bytecode(U256::ZERO, ONE_18, padded);
            tx = self.build_tx(pair, &config, &task, ctx.gas_price);

            let gas_limit2 = self
                .estimator
                .estimate(&tx)
                .await
                .map_err(|f| Self::map_sim_failure(f, 2))?;

            let gas_cost_wei2 = U256::from(gas_limit2 as u128 * ctx.gas_price);
            gas_cost_in_token = mul_18(gas_cost_wei2, native_price);
            let exact = mul_div(
                gas_cost_in_token,
                U256::from(self.gas_coverage),
                U256::from(100u64),
            );
            task.evaluable.bytecode = ensure_bounty_bytecode(U256::ZERO, ONE_18, exact);
            tx = self.build_tx(pair, &config, &task, ctx.gas_price);
            final_gas_limit = gas_limit2;
        }

        tx = tx.with_gas_limit(final_gas_limit);

        let expected_income = mul_18(max_input, market_price);
        let expected_payout = mul_18(max_input, top_ratio);
        let estimated_profit = expected_income
            .saturating_sub(expected_payout)
            .saturating_sub(gas_cost_in_token);

        Ok(DryrunOutcome {
            tx,
            max_input,
            price: market_price,
            route_visual: route.visual.clone(),
            gas_cost_in_token,
            estimated_profit,
            opp_block_number: ctx.block_number,
            cleared_orders: match mode {
                Mode::Bundle => pair.take_orders.iter().map(|t| t.order.hash).collect(),
                _ => pair
                    .take_orders
                    .first()
                    .map(|t| vec![t.order.hash])
                    .unwrap_or_default(),
            },
        })
    }
}
