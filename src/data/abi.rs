// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::primitives::{Bytes, U256};
use alloy::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct EvaluableV3 {
        address interpreter;
        address store;
        bytes bytecode;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct IO {
        address token;
        uint8 decimals;
        uint256 vaultId;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct OrderV3 {
        address owner;
        EvaluableV3 evaluable;
        IO[] validInputs;
        IO[] validOutputs;
        bytes32 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedContextV1 {
        address signer;
        uint256[] context;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TakeOrderConfigV3 {
        OrderV3 order;
        uint256 inputIOIndex;
        uint256 outputIOIndex;
        SignedContextV1[] signedContext;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TakeOrdersConfigV3 {
        uint256 minimumInput;
        uint256 maximumInput;
        uint256 maximumIORatio;
        TakeOrderConfigV3[] orders;
        bytes data;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TaskV1 {
        EvaluableV3 evaluable;
        SignedContextV1[] signedContext;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ClearConfig {
        uint256 aliceInputIOIndex;
        uint256 aliceOutputIOIndex;
        uint256 bobInputIOIndex;
        uint256 bobOutputIOIndex;
        uint256 aliceBountyVaultId;
        uint256 bobBountyVaultId;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ClearStateChange {
        uint256 aliceOutput;
        uint256 bobOutput;
        uint256 aliceInput;
        uint256 bobInput;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct QuoteConfig {
        OrderV3 order;
        uint256 inputIOIndex;
        uint256 outputIOIndex;
        SignedContextV1[] signedContext;
    }

    #[sol(rpc)]
    interface IOrderBookV4 {
        function quote(QuoteConfig calldata quoteConfig)
            external
            view
            returns (bool exists, uint256 outputMax, uint256 ioRatio);

        function vaultBalance(address owner, address token, uint256 vaultId)
            external
            view
            returns (uint256 balance);

        function clear2(
            OrderV3 memory aliceOrder,
            OrderV3 memory bobOrder,
            ClearConfig calldata clearConfig,
            SignedContextV1[] memory aliceSignedContext,
            SignedContextV1[] memory bobSignedContext
        ) external;

        function withdraw2(
            address token,
            uint256 vaultId,
            uint256 targetAmount,
            TaskV1[] calldata post
        ) external;

        function multicall(bytes[] calldata data) external returns (bytes[] memory results);

        event TakeOrderV2(address sender, TakeOrderConfigV3 config, uint256 input, uint256 output);
        event ClearV2(
            address sender,
            OrderV3 alice,
            OrderV3 bob,
            ClearConfig clearConfig
        );
        event AfterClear(address sender, ClearStateChange clearStateChange);

        error NoOrders();
        error SameOwner();
        error TokenDecimalsMismatch(uint8 aliceTokenDecimals, uint8 bobTokenDecimals);
        error MinimumInput(uint256 minimumInput, uint256 input);
        error OrderNoHandleIO(address sender);
    }

    #[sol(rpc)]
    interface IRouteProcessorArb {
        function arb3(
            address orderBook,
            TakeOrdersConfigV3 calldata takeOrders,
            TaskV1 calldata task
        ) external payable;

        error MinimumOutput(uint256 minimum, uint256 actual);
        error NonZeroBeforeArb();
        error BadLender(address lender);
    }

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }

    #[sol(rpc)]
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls)
            external
            payable
            returns (Result[] memory returnData);
    }

    #[sol(rpc)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    #[sol(rpc)]
    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

/// Compiled interpreter prelude for the bounty guard. The expression reads the
/// two vault balance deltas from context, prices them with the first two
/// constants and requires the sum to reach the third constant.
const ENSURE_BOUNTY_PRELUDE: [u8; 40] = [
    0x01, 0x00, 0x00, 0x03, 0x02, 0x01, 0x01, 0x00, 0x00, 0x01, 0x10, 0x00, 0x00, 0x01, 0x10,
    0x00, 0x01, 0x01, 0x10, 0x00, 0x02, 0x2a, 0x10, 0x00, 0x00, 0x2a, 0x10, 0x00, 0x01, 0x29,
    0x10, 0x00, 0x00, 0x23, 0x10, 0x00, 0x00, 0x45, 0x00, 0x00,
];

/// Build the bounty-guard bytecode with its constant region filled in:
/// `delta(input) * input_price + delta(output) * output_price >= min_bounty`,
/// all 18-decimal. An empty program (no guard) is expressed as empty bytes by
/// the caller, not here.
pub fn ensure_bounty_bytecode(input_price: U256, output_price: U256, min_bounty: U256) -> Bytes {
    let mut out = Vec::with_capacity(ENSURE_BOUNTY_PRELUDE.len() + 96);
    out.extend_from_slice(&ENSURE_BOUNTY_PRELUDE);
    out.extend_from_slice(&input_price.to_be_bytes::<32>());
    out.extend_from_slice(&output_price.to_be_bytes::<32>());
    out.extend_from_slice(&min_bounty.to_be_bytes::<32>());
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};
    use alloy_sol_types::SolCall;

    fn order() -> OrderV3 {
        OrderV3 {
            owner: Address::from([0x11; 20]),
            evaluable: EvaluableV3 {
                interpreter: Address::from([0x22; 20]),
                store: Address::from([0x33; 20]),
                bytecode: Bytes::from(vec![0x01, 0x02]),
            },
            validInputs: vec![IO {
                token: Address::from([0x44; 20]),
                decimals: 6,
                vaultId: U256::from(1u64),
            }],
            validOutputs: vec![IO {
                token: Address::from([0x55; 20]),
                decimals: 18,
                vaultId: U256::from(2u64),
            }],
            nonce: B256::from([0x66; 32]),
        }
    }

    #[test]
    fn arb3_calldata_roundtrips() {
        let config = TakeOrdersConfigV3 {
            minimumInput: U256::from(1u64),
            maximumInput: U256::from(1_000_000u64),
            maximumIORatio: U256::MAX,
            orders: vec![TakeOrderConfigV3 {
                order: order(),
                inputIOIndex: U256::ZERO,
                outputIOIndex: U256::ZERO,
                signedContext: vec![],
            }],
            data: Bytes::from(vec![0x02]),
        };
        let call = IRouteProcessorArb::arb3Call {
            orderBook: Address::from([0x77; 20]),
            takeOrders: config,
            task: TaskV1 {
                evaluable: EvaluableV3 {
                    interpreter: Address::ZERO,
                    store: Address::ZERO,
                    bytecode: Bytes::new(),
                },
                signedContext: vec![],
            },
        };
        let encoded = call.abi_encode();
        let decoded = IRouteProcessorArb::arb3Call::abi_decode(&encoded).expect("decode arb3");
        assert_eq!(decoded.takeOrders.orders.len(), 1);
        assert_eq!(decoded.takeOrders.minimumInput, U256::from(1u64));
        assert!(decoded.task.evaluable.bytecode.is_empty());
    }

    #[test]
    fn bounty_bytecode_embeds_constant_region() {
        let bytecode = ensure_bounty_bytecode(
            U256::from(2u64),
            U256::from(3u64),
            U256::from(500u64),
        );
        assert_eq!(bytecode.len(), ENSURE_BOUNTY_PRELUDE.len() + 96);
        let tail = &bytecode[bytecode.len() - 32..];
        assert_eq!(U256::from_be_slice(tail), U256::from(500u64));
    }
}
