// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::constants::GAS_HEADROOM_PERCENT;
use crate::core::types::{ErrorSnapshot, Severity};
use crate::data::abi::{IOrderBookV4, IRouteProcessorArb};
use crate::network::provider::HttpProvider;
use alloy::providers::Provider;
use alloy::rpc::types::eth::TransactionRequest;
use alloy::transports::{RpcError, TransportErrorKind};
use alloy_sol_types::{Panic, Revert, SolError, SolInterface};
use async_trait::async_trait;

/// How a failed estimate is classified, which decides propagation policy.
#[derive(Debug, Clone)]
pub enum SimFailure {
    /// The wallet cannot pay for gas. Terminal for the whole round.
    WalletFund(ErrorSnapshot),
    /// Node-side revert carrying decodable diagnostics.
    Revert(ErrorSnapshot),
    /// Transport or timeout trouble; retryable locally.
    Transport(String),
}

#[async_trait]
pub trait GasEstimator: Send + Sync {
    /// Estimate gas for `tx`, already padded with headroom.
    async fn estimate(&self, tx: &TransactionRequest) -> Result<u64, SimFailure>;
}

#[derive(Clone)]
pub struct TxSimulator {
    provider: HttpProvider,
}

impl TxSimulator {
    pub fn new(provider: HttpProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl GasEstimator for TxSimulator {
    async fn estimate(&self, tx: &TransactionRequest) -> Result<u64, SimFailure> {
        match self.provider.estimate_gas(tx.clone()).await {
            Ok(gas) => Ok(gas * GAS_HEADROOM_PERCENT / 100),
            Err(e) => Err(classify_rpc_error(e)),
        }
    }
}

pub fn classify_rpc_error(err: RpcError<TransportErrorKind>) -> SimFailure {
    if let Some(resp) = err.as_error_resp() {
        let message = resp.message.to_string();
        if message.to_lowercase().contains("insufficient funds") {
            return SimFailure::WalletFund(ErrorSnapshot {
                message,
                name: "InsufficientFundsForGas".into(),
                details: "wallet cannot cover gas for the clearing transaction".into(),
                decoded_args: None,
                gas_diagnostic: None,
                severity: Severity::High,
            });
        }
        if let Some(data) = resp.as_revert_data() {
            return SimFailure::Revert(decode_revert(&data, &message));
        }
        return SimFailure::Revert(ErrorSnapshot {
            message,
            name: "NodeError".into(),
            details: "node rejected the call without revert data".into(),
            decoded_args: None,
            gas_diagnostic: None,
            severity: Severity::Low,
        });
    }
    SimFailure::Transport(err.to_string())
}

/// Decode revert bytes against the known contract ABIs, falling back to the
/// standard `Error(string)` / `Panic(uint256)` selectors and raw hex.
pub fn decode_revert(data: &[u8], message: &str) -> ErrorSnapshot {
    let (name, decoded_args) = if let Ok(err) =
        IOrderBookV4::IOrderBookV4Errors::abi_decode(data)
    {
        match err {
            IOrderBookV4::IOrderBookV4Errors::NoOrders(_) => ("NoOrders".to_string(), None),
            IOrderBookV4::IOrderBookV4Errors::SameOwner(_) => ("SameOwner".to_string(), None),
            IOrderBookV4::IOrderBookV4Errors::TokenDecimalsMismatch(e) => (
                "TokenDecimalsMismatch".to_string(),
                Some(format!(
                    "alice: {}, bob: {}",
                    e.aliceTokenDecimals, e.bobTokenDecimals
                )),
            ),
            IOrderBookV4::IOrderBookV4Errors::MinimumInput(e) => (
                "MinimumInput".to_string(),
                Some(format!("minimum: {}, input: {}", e.minimumInput, e.input)),
            ),
            IOrderBookV4::IOrderBookV4Errors::OrderNoHandleIO(e) => (
                "OrderNoHandleIO".to_string(),
                Some(format!("sender: {:#x}", e.sender)),
            ),
        }
    } else if let Ok(err) = IRouteProcessorArb::IRouteProcessorArbErrors::abi_decode(data) {
        match err {
            IRouteProcessorArb::IRouteProcessorArbErrors::MinimumOutput(e) => (
                "MinimumOutput".to_string(),
                Some(format!("minimum: {}, actual: {}", e.minimum, e.actual)),
            ),
            IRouteProcessorArb::IRouteProcessorArbErrors::NonZeroBeforeArb(_) => {
                ("NonZeroBeforeArb".to_string(), None)
            }
            IRouteProcessorArb::IRouteProcessorArbErrors::BadLender(e) => (
                "BadLender".to_string(),
                Some(format!("lender: {:#x}", e.lender)),
            ),
        }
    } else if let Ok(revert) = Revert::abi_decode(data) {
        ("Error".to_string(), Some(revert.reason().to_string()))
    } else if let Ok(panic) = Panic::abi_decode(data) {
        ("Panic".to_string(), Some(format!("code: {}", panic.code)))
    } else if data.is_empty() {
        ("EmptyRevert".to_string(), None)
    } else {
        ("UnknownRevert".to_string(), Some(format!("0x{}", hex::encode(data))))
    };

    ErrorSnapshot {
        message: message.to_string(),
        name,
        details: "simulated execution reverted".into(),
        decoded_args,
        gas_diagnostic: None,
        severity: Severity::Low,
    }
}

/// Gas diagnostic for a mined receipt, mirroring the wording surfaced in
/// telemetry.
pub fn out_of_gas_diagnostic(gas_used: u64, gas_limit: u64, balance_covered: bool) -> Option<String> {
    if !balance_covered {
        return Some("account ran out of gas".to_string());
    }
    if gas_limit > 0 && gas_used >= gas_limit {
        return Some("transaction ran out of specified gas".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use alloy_sol_types::SolError;

    #[test]
    fn decodes_standard_error_string() {
        let data = Revert::from("ratio too high").abi_encode();
        let snapshot = decode_revert(&data, "execution reverted");
        assert_eq!(snapshot.name, "Error");
        assert_eq!(snapshot.decoded_args.as_deref(), Some("ratio too high"));
    }

    #[test]
    fn decodes_minimum_output() {
        let err = IRouteProcessorArb::MinimumOutput {
            minimum: U256::from(100u64),
            actual: U256::from(7u64),
        };
        let snapshot = decode_revert(&err.abi_encode(), "execution reverted");
        assert_eq!(snapshot.name, "MinimumOutput");
        assert_eq!(
            snapshot.decoded_args.as_deref(),
            Some("minimum: 100, actual: 7")
        );
    }

    #[test]
    fn unknown_selector_falls_back_to_hex() {
        let snapshot = decode_revert(&[0xde, 0xad, 0xbe, 0xef], "boom");
        assert_eq!(snapshot.name, "UnknownRevert");
        assert_eq!(snapshot.decoded_args.as_deref(), Some("0xdeadbeef"));
    }

    #[test]
    fn empty_revert_is_labelled() {
        let snapshot = decode_revert(&[], "reverted");
        assert_eq!(snapshot.name, "EmptyRevert");
    }

    #[test]
    fn gas_diagnostics() {
        assert_eq!(
            out_of_gas_diagnostic(100, 100, true).as_deref(),
            Some("transaction ran out of specified gas")
        );
        assert_eq!(
            out_of_gas_diagnostic(50, 100, false).as_deref(),
            Some("account ran out of gas")
        );
        assert!(out_of_gas_diagnostic(50, 100, true).is_none());
    }
}
