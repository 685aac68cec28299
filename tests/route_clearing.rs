// SPDX-License-Identifier: MIT
// Drives the route-processor dryrun and the binary-search sizer together
// against scripted router and estimator stubs, checking the calldata and the
// failure taxonomy without a live chain.

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use obclear::common::math::{ONE_18, mul_18, scale_18, scale_from_18};
use obclear::core::dryrun::{DryrunCtx, RouteDryrun};
use obclear::core::simulator::{GasEstimator, SimFailure};
use obclear::core::sizer::{RouteSizeProbe, find_best_size, find_best_with_retries};
use obclear::core::types::{
    BundledPair, ErrorSnapshot, FailReason, Mode, Order, OrderQuote, Severity, TakeOrder,
    TokenInfo,
};
use obclear::data::abi::{EvaluableV3, IO, IRouteProcessorArb, OrderV3};
use obclear::network::router::{RouteError, RouteFinder, RouteQuote};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Quotes every size at a fixed 18-decimal price; `None` means no route.
/// Amounts cross the trait boundary in each token's own decimals.
struct FixedPriceRouter {
    price: Option<U256>,
}

#[async_trait]
impl RouteFinder for FixedPriceRouter {
    async fn best_route(
        &self,
        from: &TokenInfo,
        to: &TokenInfo,
        amount_in: U256,
    ) -> Result<RouteQuote, RouteError> {
        match self.price {
            Some(price) => {
                let out = mul_18(scale_18(amount_in, from.decimals), price);
                Ok(RouteQuote {
                    amount_in,
                    amount_out: scale_from_18(out, to.decimals),
                    legs: vec![],
                    visual: vec![from.symbol.clone(), "stub".into(), to.symbol.clone()],
                })
            }
            None => Err(RouteError::NoWay),
        }
    }

    fn encode(&self, _quote: &RouteQuote, _recipient: Address) -> Bytes {
        Bytes::from(vec![0x02])
    }
}

enum EstimatorScript {
    Ok(u64),
    WalletFund,
}

struct ScriptedEstimator {
    script: EstimatorScript,
    calls: AtomicUsize,
}

impl ScriptedEstimator {
    fn ok(gas: u64) -> Self {
        Self {
            script: EstimatorScript::Ok(gas),
            calls: AtomicUsize::new(0),
        }
    }

    fn wallet_fund() -> Self {
        Self {
            script: EstimatorScript::WalletFund,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GasEstimator for ScriptedEstimator {
    async fn estimate(
        &self,
        _tx: &alloy::rpc::types::eth::TransactionRequest,
    ) -> Result<u64, SimFailure> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.script {
            EstimatorScript::Ok(gas) => Ok(gas),
            EstimatorScript::WalletFund => Err(SimFailure::WalletFund(ErrorSnapshot {
                message: "insufficient funds for gas * price + value".into(),
                name: "InsufficientFundsForGas".into(),
                details: "".into(),
                decoded_args: None,
                gas_diagnostic: None,
                severity: Severity::High,
            })),
        }
    }
}

fn take_order(hash_byte: u8, ratio: U256, max_output: U256) -> TakeOrder {
    let order = Order {
        hash: B256::from([hash_byte; 32]),
        orderbook: Address::from([0x0b; 20]),
        inner: OrderV3 {
            owner: Address::from([hash_byte; 20]),
            evaluable: EvaluableV3 {
                interpreter: Address::from([0x1a; 20]),
                store: Address::from([0x1b; 20]),
                bytecode: Bytes::new(),
            },
            validInputs: vec![IO {
                token: Address::from([0x03; 20]),
                decimals: 18,
                vaultId: U256::ZERO,
            }],
            validOutputs: vec![IO {
                token: Address::from([0x04; 20]),
                decimals: 18,
                vaultId: U256::ZERO,
            }],
            nonce: B256::ZERO,
        },
    };
    TakeOrder {
        order: Arc::new(order),
        input_io: 0,
        output_io: 0,
        quote: Some(OrderQuote { max_output, ratio }),
    }
}

fn pair_with(orders: Vec<TakeOrder>) -> BundledPair {
    BundledPair {
        orderbook: Address::from([0x0b; 20]),
        sell: TokenInfo {
            address: Address::from([0x04; 20]),
            decimals: 18,
            symbol: "SELL".into(),
        },
        buy: TokenInfo {
            address: Address::from([0x03; 20]),
            decimals: 18,
            symbol: "BUY".into(),
        },
        take_orders: orders,
    }
}

fn dryrun(
    router: Arc<dyn RouteFinder>,
    estimator: Arc<dyn GasEstimator>,
    gas_coverage: u64,
) -> RouteDryrun {
    RouteDryrun::new(
        router,
        estimator,
        Address::from([0xfe; 20]),
        Address::from([0xaa; 20]),
        Address::from([0xbb; 20]),
        gas_coverage,
        false,
    )
}

fn ctx() -> DryrunCtx {
    let mut ctx = DryrunCtx::new(10_000_000_000, 1234);
    ctx.native_price_buy = Some(ONE_18);
    ctx.native_price_sell = Some(ONE_18);
    ctx
}

fn ratio(numerator: u64, denominator: u64) -> U256 {
    U256::from(numerator) * ONE_18 / U256::from(denominator)
}

#[tokio::test]
async fn full_balance_clear_returns_on_first_hop() {
    let vault = ONE_18;
    let pair = pair_with(vec![take_order(0x01, ratio(1, 2), vault)]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let estimator = Arc::new(ScriptedEstimator::ok(100_000));
    let dryrun = dryrun(router, estimator.clone(), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair.clone(), Mode::Bundle, ctx.clone());
    let outcome = find_best_size(vault, 7, &mut probe).await.expect("clears");

    assert_eq!(outcome.max_input, vault);
    assert_eq!(outcome.price, ONE_18);
    assert_eq!(outcome.opp_block_number, 1234);
    assert_eq!(
        estimator.calls.load(Ordering::Relaxed),
        1,
        "coverage 0 skips stage 2 and later hops never run"
    );
    assert!(ctx.price_match.load(Ordering::Relaxed));
}

#[tokio::test]
async fn zero_coverage_leaves_task_bytecode_empty() {
    let vault = ONE_18;
    let pair = pair_with(vec![take_order(0x01, ratio(1, 2), vault)]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx);
    let outcome = find_best_size(vault, 7, &mut probe).await.unwrap();

    let input = outcome.tx.input.input().expect("calldata present");
    let call = IRouteProcessorArb::arb3Call::abi_decode(input).expect("arb3 calldata");
    assert!(call.task.evaluable.bytecode.is_empty());
    assert_eq!(call.takeOrders.minimumInput, U256::from(1u64));
}

#[tokio::test]
async fn nonzero_coverage_embeds_bounty_guard() {
    let vault = ONE_18;
    let pair = pair_with(vec![take_order(0x01, ratio(1, 2), vault)]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let estimator = Arc::new(ScriptedEstimator::ok(100_000));
    let dryrun = dryrun(router, estimator.clone(), 100);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx);
    let outcome = find_best_size(vault, 7, &mut probe).await.unwrap();

    assert_eq!(
        estimator.calls.load(Ordering::Relaxed),
        2,
        "headroom stage then exact stage"
    );
    let input = outcome.tx.input.input().expect("calldata present");
    let call = IRouteProcessorArb::arb3Call::abi_decode(input).expect("arb3 calldata");
    assert!(!call.task.evaluable.bytecode.is_empty());
    assert_eq!(outcome.tx.gas, Some(100_000), "stage-2 gas limit locked in");
}

#[tokio::test]
async fn ratio_above_market_is_no_opportunity_without_simulation() {
    let vault = ONE_18;
    // Market at 0.5, order demands 0.6.
    let pair = pair_with(vec![take_order(0x01, ratio(6, 10), vault)]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ratio(1, 2)),
    });
    let estimator = Arc::new(ScriptedEstimator::ok(100_000));
    let dryrun = dryrun(router, estimator.clone(), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx.clone());
    let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();

    assert_eq!(err.reason, FailReason::NoOpportunity);
    assert!(!ctx.price_match.load(Ordering::Relaxed), "price match cleared");
    assert_eq!(estimator.calls.load(Ordering::Relaxed), 0, "never simulated");
}

#[tokio::test]
async fn no_route_anywhere_reports_no_route() {
    let vault = ONE_18;
    let pair = pair_with(vec![take_order(0x01, ratio(1, 2), vault)]);
    let router = Arc::new(FixedPriceRouter { price: None });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx);
    let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();
    assert_eq!(err.reason, FailReason::NoRoute);
}

#[tokio::test]
async fn wallet_fund_exhaustion_aborts_immediately() {
    let vault = ONE_18;
    let pair = pair_with(vec![take_order(0x01, ratio(1, 2), vault)]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let estimator = Arc::new(ScriptedEstimator::wallet_fund());
    let dryrun = dryrun(router, estimator.clone(), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx);
    let err = find_best_size(vault, 7, &mut probe).await.unwrap_err();

    assert_eq!(err.reason, FailReason::NoWalletFund);
    assert_eq!(
        estimator.calls.load(Ordering::Relaxed),
        1,
        "no further hops after a terminal failure"
    );
}

#[tokio::test]
async fn bundle_filter_drops_orders_priced_beyond_headroom() {
    let vault = ONE_18 * U256::from(2u64);
    // Market at 1.0: 0.5 stays, 1.5 is filtered at the first hop.
    let keep = take_order(0x01, ratio(1, 2), ONE_18);
    let drop = take_order(0x02, ratio(3, 2), ONE_18);
    let pair = pair_with(vec![keep, drop]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair.clone(), Mode::Bundle, ctx);
    let outcome = find_best_size(vault, 7, &mut probe).await.unwrap();

    let input = outcome.tx.input.input().expect("calldata present");
    let call = IRouteProcessorArb::arb3Call::abi_decode(input).expect("arb3 calldata");
    assert_eq!(call.takeOrders.orders.len(), 1);
    assert_eq!(outcome.cleared_orders, vec![B256::from([0x01; 32])]);
    // The round's bundle is untouched; only the sizer's clone was filtered.
    assert_eq!(pair.take_orders.len(), 2);
}

#[tokio::test]
async fn six_decimal_sell_token_sizes_calldata_in_token_units() {
    // 1000.0 of a 6-decimal sell token, held as 18-decimal fixed point.
    let vault = U256::from(1_000u64) * ONE_18;
    let mut to = take_order(0x01, ratio(1, 2), vault);
    {
        let order = Arc::get_mut(&mut to.order).unwrap();
        order.inner.validOutputs[0].decimals = 6;
    }
    let mut pair = pair_with(vec![to]);
    pair.sell.decimals = 6;

    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Bundle, ctx);
    let outcome = find_best_size(vault, 7, &mut probe).await.expect("clears");

    // Search space stays 18-decimal; only the emitted calldata truncates.
    assert_eq!(outcome.max_input, vault);
    assert_eq!(outcome.price, ONE_18);
    let input = outcome.tx.input.input().expect("calldata present");
    let call = IRouteProcessorArb::arb3Call::abi_decode(input).expect("arb3 calldata");
    assert_eq!(call.takeOrders.maximumInput, U256::from(1_000_000_000u64));
}

#[tokio::test]
async fn retry_sizing_is_bounded_by_the_head_order_vault() {
    // Two orders of 1.0 each: a single-order retry must size against the
    // head order's vault, not the bundle total.
    let pair = pair_with(vec![
        take_order(0x01, ratio(1, 2), ONE_18),
        take_order(0x02, ratio(1, 2), ONE_18),
    ]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let outcome = find_best_with_retries(&dryrun, &pair, 1, 7, &ctx)
        .await
        .expect("clears");
    assert_eq!(outcome.max_input, ONE_18);
    assert_eq!(outcome.cleared_orders, vec![B256::from([0x01; 32])]);
}

#[tokio::test]
async fn duplication_modes_repeat_the_head_order() {
    let vault = ONE_18;
    let pair = pair_with(vec![
        take_order(0x01, ratio(1, 2), vault),
        take_order(0x02, ratio(1, 2), vault),
    ]);
    let router = Arc::new(FixedPriceRouter {
        price: Some(ONE_18),
    });
    let dryrun = dryrun(router, Arc::new(ScriptedEstimator::ok(100_000)), 0);

    let ctx = ctx();
    let mut probe = RouteSizeProbe::new(&dryrun, pair, Mode::Triple, ctx);
    let outcome = find_best_size(vault, 7, &mut probe).await.unwrap();

    let input = outcome.tx.input.input().expect("calldata present");
    let call = IRouteProcessorArb::arb3Call::abi_decode(input).expect("arb3 calldata");
    assert_eq!(call.takeOrders.orders.len(), 3);
    let first = &call.takeOrders.orders[0].order;
    assert!(call.takeOrders.orders.iter().all(|o| &o.order == first));
}
