// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::data::abi::{OrderV3, TakeOrderConfigV3};
use alloy::primitives::{Address, B256, I256, U256};
use alloy::rpc::types::eth::TransactionRequest;
use std::fmt;
use std::sync::Arc;

/// Token identity plus the metadata needed for fixed-point conversions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

/// An on-chain order, immutable for the duration of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub hash: B256,
    pub orderbook: Address,
    pub inner: OrderV3,
}

/// Latest on-chain quote for one direction of an order, 18-decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQuote {
    pub max_output: U256,
    pub ratio: U256,
}

/// One buy/sell direction extracted from an order.
#[derive(Debug, Clone)]
pub struct TakeOrder {
    pub order: Arc<Order>,
    pub input_io: usize,
    pub output_io: usize,
    pub quote: Option<OrderQuote>,
}

impl TakeOrder {
    /// Token the order pays out, which the bot sells onward.
    pub fn sell_token(&self) -> Address {
        self.order.inner.validOutputs[self.output_io].token
    }

    pub fn sell_decimals(&self) -> u8 {
        self.order.inner.validOutputs[self.output_io].decimals
    }

    /// Token the order wants back.
    pub fn buy_token(&self) -> Address {
        self.order.inner.validInputs[self.input_io].token
    }

    pub fn buy_decimals(&self) -> u8 {
        self.order.inner.validInputs[self.input_io].decimals
    }

    pub fn ratio(&self) -> U256 {
        self.quote.map(|q| q.ratio).unwrap_or(U256::ZERO)
    }

    pub fn max_output(&self) -> U256 {
        self.quote.map(|q| q.max_output).unwrap_or(U256::ZERO)
    }

    pub fn config(&self) -> TakeOrderConfigV3 {
        TakeOrderConfigV3 {
            order: self.order.inner.clone(),
            inputIOIndex: U256::from(self.input_io as u64),
            outputIOIndex: U256::from(self.output_io as u64),
            signedContext: vec![],
        }
    }
}

/// Take-orders sharing `(orderbook, sellToken, buyToken)`, cleared together.
#[derive(Debug, Clone)]
pub struct BundledPair {
    pub orderbook: Address,
    pub sell: TokenInfo,
    pub buy: TokenInfo,
    pub take_orders: Vec<TakeOrder>,
}

impl BundledPair {
    /// Total clearable size, 18-decimal: the sum of quoted max outputs.
    pub fn vault_balance(&self) -> U256 {
        self.take_orders
            .iter()
            .fold(U256::ZERO, |acc, t| acc.saturating_add(t.max_output()))
    }

    pub fn pair_label(&self) -> String {
        format!("{}/{}", self.buy.symbol, self.sell.symbol)
    }
}

/// How the dryrun expands the bundle into the `orders` array of the
/// take-orders config. Duplication amplifies dust aggregation on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Bundle,
    Single,
    Double,
    Triple,
}

impl Mode {
    pub fn from_retry(retry: u32) -> Self {
        match retry {
            2 => Mode::Double,
            3 => Mode::Triple,
            _ => Mode::Single,
        }
    }

    pub fn expand(&self, take_orders: &[TakeOrder]) -> Vec<TakeOrderConfigV3> {
        let Some(first) = take_orders.first() else {
            return vec![];
        };
        match self {
            Mode::Bundle => take_orders.iter().map(TakeOrder::config).collect(),
            Mode::Single => vec![first.config()],
            Mode::Double => vec![first.config(); 2],
            Mode::Triple => vec![first.config(); 3],
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Bundle => write!(f, "bundle"),
            Mode::Single => write!(f, "single"),
            Mode::Double => write!(f, "double"),
            Mode::Triple => write!(f, "triple"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// Diagnostic capture of a failed call, attached to reports and telemetry.
#[derive(Debug, Clone)]
pub struct ErrorSnapshot {
    pub message: String,
    pub name: String,
    pub details: String,
    pub decoded_args: Option<String>,
    pub gas_diagnostic: Option<String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NoRoute,
    NoOpportunity,
    NoWalletFund,
}

/// A dryrun probe that did not produce a clearable transaction.
#[derive(Debug, Clone)]
pub struct DryrunFailure {
    pub reason: FailReason,
    pub node_error: bool,
    pub snapshot: Option<ErrorSnapshot>,
    pub attrs: Vec<(String, String)>,
}

impl DryrunFailure {
    pub fn no_route() -> Self {
        Self {
            reason: FailReason::NoRoute,
            node_error: false,
            snapshot: None,
            attrs: vec![],
        }
    }

    pub fn no_opportunity(detail: &str) -> Self {
        Self {
            reason: FailReason::NoOpportunity,
            node_error: false,
            snapshot: None,
            attrs: vec![("details.reason".into(), detail.to_string())],
        }
    }

    pub fn no_wallet_fund(snapshot: Option<ErrorSnapshot>) -> Self {
        Self {
            reason: FailReason::NoWalletFund,
            node_error: true,
            snapshot,
            attrs: vec![],
        }
    }

    pub fn with_attr(mut self, key: &str, value: String) -> Self {
        self.attrs.push((key.to_string(), value));
        self
    }
}

/// A feasible clearing transaction found by a dryrun, ready for submission.
#[derive(Debug, Clone)]
pub struct DryrunOutcome {
    pub tx: TransactionRequest,
    /// Cleared input size, 18-decimal sell-token space.
    pub max_input: U256,
    /// Market price achieved by the route, 18-decimal buy-per-sell.
    pub price: U256,
    pub route_visual: Vec<String>,
    /// Estimated gas cost expressed in the buy token, 18-decimal.
    pub gas_cost_in_token: U256,
    pub estimated_profit: U256,
    pub opp_block_number: u64,
    /// Order hashes included in the clearing calldata.
    pub cleared_orders: Vec<B256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    EmptyVault,
    NoOpportunity,
    FoundOpportunity,
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairStatus::EmptyVault => write!(f, "EmptyVault"),
            PairStatus::NoOpportunity => write!(f, "NoOpportunity"),
            PairStatus::FoundOpportunity => write!(f, "FoundOpportunity"),
        }
    }
}

/// Why processing of a pair stopped where it did. Surfaces verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    NoWalletFund,
    FailedToGetVaultBalance,
    FailedToGetGasPrice,
    FailedToGetEthPrice,
    FailedToGetPools,
    NoRoute,
    NoOpportunity,
    TxFailed,
    TxMineFailed,
    UnexpectedError,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HaltReason::NoWalletFund => "NoWalletFund",
            HaltReason::FailedToGetVaultBalance => "FailedToGetVaultBalance",
            HaltReason::FailedToGetGasPrice => "FailedToGetGasPrice",
            HaltReason::FailedToGetEthPrice => "FailedToGetEthPrice",
            HaltReason::FailedToGetPools => "FailedToGetPools",
            HaltReason::NoRoute => "NoRoute",
            HaltReason::NoOpportunity => "NoOpportunity",
            HaltReason::TxFailed => "TxFailed",
            HaltReason::TxMineFailed => "TxMineFailed",
            HaltReason::UnexpectedError => "UnexpectedError",
        };
        write!(f, "{s}")
    }
}

/// Per-pair outcome of a round, serialised by the front-end as one telemetry
/// span with `details.*` attributes.
#[derive(Debug, Clone)]
pub struct PairReport {
    pub status: PairStatus,
    pub token_pair: String,
    pub buy_token: Address,
    pub sell_token: Address,
    pub tx_url: Option<String>,
    pub cleared_amount: Option<U256>,
    pub income: Option<U256>,
    pub net_profit: Option<I256>,
    pub gas_cost: Option<U256>,
    pub cleared_orders: Vec<B256>,
    pub halt: Option<HaltReason>,
    pub snapshot: Option<ErrorSnapshot>,
    pub attrs: Vec<(String, String)>,
}

impl PairReport {
    pub fn new(pair: &BundledPair, status: PairStatus) -> Self {
        Self {
            status,
            token_pair: pair.pair_label(),
            buy_token: pair.buy.address,
            sell_token: pair.sell.address,
            tx_url: None,
            cleared_amount: None,
            income: None,
            net_profit: None,
            gas_cost: None,
            cleared_orders: vec![],
            halt: None,
            snapshot: None,
            attrs: vec![],
        }
    }

    pub fn halted(pair: &BundledPair, status: PairStatus, halt: HaltReason) -> Self {
        let mut report = Self::new(pair, status);
        report.halt = Some(halt);
        report
    }

    /// Emit the report as a telemetry span. Attribute keys are stable; the
    /// transport is whatever subscriber is installed.
    pub fn emit(&self) {
        let span = tracing::info_span!(
            "pair",
            "details.pair" = %self.token_pair,
            "details.status" = %self.status,
        );
        let _entered = span.enter();
        if let Some(halt) = &self.halt {
            tracing::info!("details.halt" = %halt, "pair halted");
        }
        if let Some(snapshot) = &self.snapshot {
            tracing::warn!(
                "details.error" = %snapshot.message,
                "details.severity" = %snapshot.severity,
                "pair error"
            );
        }
        if let Some(url) = &self.tx_url {
            tracing::info!(
                "details.txUrl" = %url,
                "details.clearedAmount" = %self.cleared_amount.map(|v| v.to_string()).unwrap_or_default(),
                "details.income" = %self.income.map(|v| v.to_string()).unwrap_or_default(),
                "details.netProfit" = %self.net_profit.map(|v| v.to_string()).unwrap_or_default(),
                "details.gasCost" = %self.gas_cost.map(|v| v.to_string()).unwrap_or_default(),
                "pair cleared"
            );
        }
        for (key, value) in &self.attrs {
            tracing::debug!(key = %key, value = %value, "pair attribute");
        }
    }
}
