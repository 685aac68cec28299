// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::core::types::Order;
use crate::data::abi::{EvaluableV3, IO, OrderV3};
use alloy::primitives::{Address, B256, Bytes, U256};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct RawIo {
    pub token: Address,
    pub decimals: u8,
    #[serde(rename = "vaultId")]
    pub vault_id: U256,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvaluable {
    pub interpreter: Address,
    pub store: Address,
    pub bytecode: Bytes,
}

/// One order record as produced by the file exporter or the subgraph mapper.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub id: B256,
    pub orderbook: Address,
    pub owner: Address,
    #[serde(default)]
    pub nonce: B256,
    pub evaluable: RawEvaluable,
    pub valid_inputs: Vec<RawIo>,
    pub valid_outputs: Vec<RawIo>,
}

/// Indexer-side filters from configuration.
#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub hash: Option<B256>,
    pub owner: Option<Address>,
    pub interpreter: Option<Address>,
}

impl OrderFilters {
    pub fn matches(&self, order: &RawOrder) -> bool {
        if let Some(hash) = self.hash {
            if order.id != hash {
                return false;
            }
        }
        if let Some(owner) = self.owner {
            if order.owner != owner {
                return false;
            }
        }
        if let Some(interpreter) = self.interpreter {
            if order.evaluable.interpreter != interpreter {
                return false;
            }
        }
        true
    }
}

pub fn load_from_file(path: &str) -> Result<Vec<RawOrder>, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Ingest(format!("orders file read failed: {e}")))?;
    serde_json::from_str(&raw).map_err(|e| AppError::Ingest(format!("orders file parse failed: {e}")))
}

const ORDERS_QUERY: &str = r#"{
  orders(first: 1000, where: { active: true }) {
    id
    owner
    nonce
    orderbook { id }
    evaluable { interpreter store bytecode }
    validInputs { token { id decimals } vaultId }
    validOutputs { token { id decimals } vaultId }
  }
}"#;

#[derive(Debug, Deserialize)]
struct SgToken {
    id: Address,
    decimals: u8,
}

#[derive(Debug, Deserialize)]
struct SgIo {
    token: SgToken,
    #[serde(rename = "vaultId")]
    vault_id: U256,
}

#[derive(Debug, Deserialize)]
struct SgOrderbook {
    id: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SgOrder {
    id: B256,
    owner: Address,
    #[serde(default)]
    nonce: B256,
    orderbook: SgOrderbook,
    evaluable: RawEvaluable,
    valid_inputs: Vec<SgIo>,
    valid_outputs: Vec<SgIo>,
}

#[derive(Debug, Deserialize)]
struct SgData {
    orders: Vec<SgOrder>,
}

#[derive(Debug, Deserialize)]
struct SgResponse {
    data: Option<SgData>,
}

pub async fn fetch_from_subgraph(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<RawOrder>, AppError> {
    let response = client
        .post(url)
        .json(&json!({ "query": ORDERS_QUERY }))
        .send()
        .await
        .map_err(|e| AppError::Ingest(format!("subgraph request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::Ingest(format!(
            "subgraph returned {}",
            response.status()
        )));
    }

    let parsed: SgResponse = response
        .json()
        .await
        .map_err(|e| AppError::Ingest(format!("subgraph response parse failed: {e}")))?;

    let orders = parsed
        .data
        .ok_or_else(|| AppError::Ingest("subgraph response missing data".into()))?
        .orders;

    Ok(orders
        .into_iter()
        .map(|o| RawOrder {
            id: o.id,
            orderbook: o.orderbook.id,
            owner: o.owner,
            nonce: o.nonce,
            evaluable: o.evaluable,
            valid_inputs: o
                .valid_inputs
                .into_iter()
                .map(|io| RawIo {
                    token: io.token.id,
                    decimals: io.token.decimals,
                    vault_id: io.vault_id,
                })
                .collect(),
            valid_outputs: o
                .valid_outputs
                .into_iter()
                .map(|io| RawIo {
                    token: io.token.id,
                    decimals: io.token.decimals,
                    vault_id: io.vault_id,
                })
                .collect(),
        })
        .collect())
}

/// Apply filters and convert raw records into round-owned orders. An
/// optional orderbook restriction drops records from other deployments.
pub fn into_orders(
    raws: Vec<RawOrder>,
    filters: &OrderFilters,
    orderbook: Option<Address>,
) -> Vec<Arc<Order>> {
    raws.into_iter()
        .filter(|raw| filters.matches(raw))
        .filter(|raw| orderbook.map(|ob| raw.orderbook == ob).unwrap_or(true))
        .map(|raw| {
            Arc::new(Order {
                hash: raw.id,
                orderbook: raw.orderbook,
                inner: OrderV3 {
                    owner: raw.owner,
                    evaluable: EvaluableV3 {
                        interpreter: raw.evaluable.interpreter,
                        store: raw.evaluable.store,
                        bytecode: raw.evaluable.bytecode,
                    },
                    validInputs: raw
                        .valid_inputs
                        .into_iter()
                        .map(|io| IO {
                            token: io.token,
                            decimals: io.decimals,
                            vaultId: io.vault_id,
                        })
                        .collect(),
                    validOutputs: raw
                        .valid_outputs
                        .into_iter()
                        .map(|io| IO {
                            token: io.token,
                            decimals: io.decimals,
                            vaultId: io.vault_id,
                        })
                        .collect(),
                    nonce: raw.nonce,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
      {
        "id": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "orderbook": "0x7777777777777777777777777777777777777777",
        "owner": "0x2222222222222222222222222222222222222222",
        "evaluable": {
          "interpreter": "0x3333333333333333333333333333333333333333",
          "store": "0x4444444444444444444444444444444444444444",
          "bytecode": "0x0102"
        },
        "validInputs": [
          { "token": "0x5555555555555555555555555555555555555555", "decimals": 6, "vaultId": "0x1" }
        ],
        "validOutputs": [
          { "token": "0x6666666666666666666666666666666666666666", "decimals": 18, "vaultId": "0x2" }
        ]
      }
    ]"#;

    fn sample() -> Vec<RawOrder> {
        serde_json::from_str(SAMPLE).expect("sample parses")
    }

    #[test]
    fn parses_order_file_shape() {
        let orders = sample();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].valid_inputs[0].decimals, 6);
        assert_eq!(orders[0].valid_outputs[0].vault_id, U256::from(2u64));
    }

    #[test]
    fn owner_filter_drops_mismatches() {
        let filters = OrderFilters {
            owner: Some(Address::from([0x99; 20])),
            ..Default::default()
        };
        assert!(into_orders(sample(), &filters, None).is_empty());

        let filters = OrderFilters {
            owner: Some(Address::from([0x22; 20])),
            ..Default::default()
        };
        assert_eq!(into_orders(sample(), &filters, None).len(), 1);
    }

    #[test]
    fn orderbook_restriction_applies() {
        let orders = into_orders(sample(), &OrderFilters::default(), Some(Address::from([0x01; 20])));
        assert!(orders.is_empty());
    }

    #[test]
    fn converted_order_keeps_io_layout() {
        let orders = into_orders(sample(), &OrderFilters::default(), None);
        assert_eq!(orders.len(), 1);
        let inner = &orders[0].inner;
        assert_eq!(inner.validInputs.len(), 1);
        assert_eq!(inner.validOutputs.len(), 1);
        assert_eq!(inner.validInputs[0].decimals, 6);
    }
}
