use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{hex, Address, U256};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::domain::{Account, RecordIndex};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
    abi::{self, RECORD_AT_SIGNATURE, RECORD_COUNT_SIGNATURE},
    IdentityProvider, RawRecord, RecordSource,
};

/// EIP-1193 "user rejected request".
const USER_REJECTED_REQUEST: i64 = 4001;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize, Error)]
#[error("json-rpc error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

struct JsonRpcClient {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    fn new(rpc_url: &str) -> Result<Self> {
        let endpoint =
            Url::parse(rpc_url).with_context(|| format!("invalid json-rpc url: {rpc_url}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("json-rpc url must start with http:// or https://"));
        }
        Ok(Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc: call method={method} id={id}");
        let response: JsonRpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&JsonRpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .with_context(|| format!("failed to reach json-rpc endpoint {}", self.endpoint))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("invalid json-rpc response for {method}"))?;

        if let Some(err) = response.error {
            return Err(err.into());
        }
        response
            .result
            .ok_or_else(|| anyhow!("json-rpc response for {method} carries no result"))
    }
}

fn decode_hex_payload(raw: &str) -> Result<Vec<u8>> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("hex payload must start with 0x"))?;
    hex::decode(digits).context("hex payload is not valid hex")
}

/// Reads theorem records from the bounty contract through `eth_call`.
pub struct EvmRecordSource {
    rpc: JsonRpcClient,
    contract: Address,
}

impl EvmRecordSource {
    pub fn new(rpc_url: &str, contract: Address) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(rpc_url)?,
            contract,
        })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    async fn eth_call(&self, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": self.contract.to_string(),
                "data": format!("0x{}", hex::encode(&calldata)),
            },
            "latest"
        ]);
        let result = self.rpc.call("eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| anyhow!("eth_call result is not a hex string"))?;
        decode_hex_payload(raw)
    }
}

#[async_trait]
impl RecordSource for EvmRecordSource {
    async fn record_count(&self) -> Result<U256> {
        let output = self
            .eth_call(abi::encode_call(RECORD_COUNT_SIGNATURE, &[]))
            .await
            .context("record count call failed")?;
        abi::decode_uint(&output).context("malformed record count")
    }

    async fn record_at(&self, index: RecordIndex) -> Result<RawRecord> {
        let output = self
            .eth_call(abi::encode_call(RECORD_AT_SIGNATURE, &[U256::from(index.0)]))
            .await
            .with_context(|| format!("record {index} call failed"))?;
        abi::decode_record(&output).with_context(|| format!("malformed record {index}"))
    }
}

/// Asks the node's wallet for accounts, e.g. `eth_requestAccounts`.
pub struct RpcIdentityProvider {
    rpc: JsonRpcClient,
    method: String,
}

impl RpcIdentityProvider {
    pub fn new(rpc_url: &str, method: impl Into<String>) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(rpc_url)?,
            method: method.into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for RpcIdentityProvider {
    async fn request_accounts(&self) -> Result<Vec<Account>> {
        let result = match self.rpc.call(&self.method, json!([])).await {
            Ok(result) => result,
            Err(err) => {
                let rejected = err
                    .downcast_ref::<JsonRpcError>()
                    .is_some_and(|rpc_err| rpc_err.code == USER_REJECTED_REQUEST);
                if rejected {
                    info!("identity: account request rejected by user");
                    return Ok(Vec::new());
                }
                return Err(err);
            }
        };

        let raw: Vec<String> =
            serde_json::from_value(result).context("accounts result is not a list of strings")?;
        raw.iter()
            .map(|value| {
                value
                    .parse::<Address>()
                    .map(Account)
                    .with_context(|| format!("invalid account address: {value}"))
            })
            .collect()
    }
}

/// Identity provider for shells that already know which account to use.
pub struct StaticIdentityProvider {
    account: Option<Account>,
}

impl StaticIdentityProvider {
    pub fn new(account: Option<Account>) -> Self {
        Self { account }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn request_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.account.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
